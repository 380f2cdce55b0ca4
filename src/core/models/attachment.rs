use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Attachment {
    pub id: String,
    pub expense_id: String,
    pub original_filename: String,
    pub content_type: String,
    /// Key of the payload in the blob store.
    pub file_url: String,
    pub uploaded_by: String,
    #[schema(value_type = String, example = "2024-06-01T12:34:56Z")]
    pub uploaded_at: DateTime<Utc>,
}
