//! Success response envelope.
//!
//! Every 2xx body has the shape
//! `{"success": true, "data": ..., "metadata": {"timestamp", "pagination"?}}`.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Metadata {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub metadata: Metadata,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            metadata: Metadata {
                timestamp: chrono::Utc::now().to_rfc3339(),
                pagination: None,
            },
        }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            success: true,
            data,
            metadata: Metadata {
                timestamp: chrono::Utc::now().to_rfc3339(),
                pagination: Some(pagination),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let body = serde_json::to_value(ApiResponse::new(serde_json::json!({"id": 1}))).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], 1);
        assert!(body["metadata"]["timestamp"].is_string());
        assert!(body["metadata"].get("pagination").is_none());
    }

    #[test]
    fn pagination_is_included_when_present() {
        let body = serde_json::to_value(ApiResponse::paginated(
            vec![1, 2, 3],
            Pagination {
                page: 1,
                page_size: 20,
                total: 3,
            },
        ))
        .unwrap();
        assert_eq!(body["metadata"]["pagination"]["total"], 3);
    }
}
