use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "refresh_tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    /// SHA-256 digest of the opaque token value; the raw value never
    /// persists.
    #[sea_orm(unique)]
    pub token_hash: String,
    #[sea_orm(unique)]
    pub jti: String,
    /// Stable across every rotation descending from one login.
    pub family_id: Uuid,
    pub parent_token_id: Option<Uuid>,
    pub device_fingerprint_hash: Option<String>,
    pub is_revoked: bool,
    /// When revocation happened. Distinguishes a true replay (revoked
    /// before the presenting request began) from the loser of a concurrent
    /// rotation race.
    pub revoked_at: Option<DateTimeUtc>,
    pub expires_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
