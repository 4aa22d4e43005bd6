use anyhow::Context;
use sqlx::SqlitePool;

use super::repo_types::{GenerationRow, NewGeneration};

/// Insert a generation and return it with its assigned id.
pub async fn create(db: &SqlitePool, new: &NewGeneration) -> anyhow::Result<GenerationRow> {
    let row = sqlx::query_as::<_, GenerationRow>(
        r#"
        INSERT INTO generations (user_id, image_url, prompt, style, status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        RETURNING id, user_id, image_url, prompt, style, status, created_at
        "#,
    )
    .bind(new.user_id)
    .bind(&new.image_url)
    .bind(&new.prompt)
    .bind(&new.style)
    .bind(&new.status)
    .bind(&new.created_at)
    .fetch_one(db)
    .await
    .context("insert generation")?;

    Ok(row)
}

/// Newest first by id, at most `limit` rows.
pub async fn recent_for_user(
    db: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> anyhow::Result<Vec<GenerationRow>> {
    let rows = sqlx::query_as::<_, GenerationRow>(
        r#"
        SELECT id, user_id, image_url, prompt, style, status, created_at
          FROM generations
         WHERE user_id = ?1
         ORDER BY id DESC
         LIMIT ?2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("list generations by user")?;

    Ok(rows)
}
