use sqlx::FromRow;

/// Generation record as stored.
#[derive(Debug, Clone, FromRow)]
pub struct GenerationRow {
    pub id: i64,
    pub user_id: i64,
    pub image_url: String,
    pub prompt: String,
    pub style: String,
    pub status: String,
    pub created_at: String,
}

/// Fields supplied by the caller; `id` is assigned on insert.
#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub user_id: i64,
    pub image_url: String,
    pub prompt: String,
    pub style: String,
    pub status: String,
    pub created_at: String,
}
