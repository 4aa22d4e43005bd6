use serde::{Deserialize, Serialize};

use super::repo_types::GenerationRow;

pub const STATUS_SUCCEEDED: &str = "succeeded";

/// Generation as returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub id: i64,
    pub user_id: i64,
    pub image_url: String,
    pub prompt: String,
    pub style: String,
    pub status: String,
    pub created_at: String,
}

impl From<GenerationRow> for Generation {
    fn from(r: GenerationRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            image_url: r.image_url,
            prompt: r.prompt,
            style: r.style,
            status: r.status,
            created_at: r.created_at,
        }
    }
}

/// `?limit=N`; kept as text so junk values fall back to the default
/// instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
}
