use taskhive::bootstrapper::{self, StartupError};

#[tokio::main]
async fn main() {
    // Load .env if present so local runs pick up DATABASE_URL and friends.
    let _ = dotenvy::dotenv();

    match bootstrapper::run().await {
        Ok(()) => {}
        Err(StartupError::Config(e)) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
        Err(StartupError::Dependency(e)) => {
            eprintln!("dependency unavailable: {e}");
            std::process::exit(2);
        }
        Err(StartupError::Runtime(e)) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    }
}
