use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::{dto::Generation, dto::HistoryQuery, services};
use crate::{
    auth::AuthUser,
    error::AppError,
    state::AppState,
    validators::{GenerationForm, ImageUpload, IMAGE_TOO_LARGE, MAX_IMAGE_BYTES},
};

/// Room for the form fields on top of the largest accepted image, so an
/// oversized image is reported by validation rather than by the transport.
const BODY_LIMIT: usize = MAX_IMAGE_BYTES + 2 * 1024 * 1024;

pub fn generation_routes() -> Router<AppState> {
    Router::new()
        .route("/generations", get(list_generations).post(create_generation))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

/// POST /generations (multipart: prompt, style, image)
#[instrument(skip(state, user, mp), fields(user_id = user.id))]
pub async fn create_generation(
    State(state): State<AppState>,
    user: AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Generation>), AppError> {
    let mut mp = mp.map_err(|e| AppError::Validation(e.body_text()))?;
    let mut form = GenerationForm::default();
    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prompt" => form.prompt = Some(field.text().await.map_err(bad_multipart)?),
            "style" => form.style = Some(field.text().await.map_err(bad_multipart)?),
            "image" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let body = field.bytes().await.map_err(bad_multipart)?;
                form.image = Some(ImageUpload {
                    file_name,
                    content_type,
                    body,
                });
            }
            _ => {}
        }
    }

    let generation = services::submit(&state, &user, form).await?;
    Ok((StatusCode::CREATED, Json(generation)))
}

/// GET /generations?limit=N
#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn list_generations(
    State(state): State<AppState>,
    user: AuthUser,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Generation>>, AppError> {
    // an unreadable query string gets the default limit like any other junk
    let requested = query
        .ok()
        .and_then(|Query(q)| q.limit)
        .and_then(|v| v.trim().parse::<i64>().ok());
    let items = services::history(&state, user.id, requested).await?;
    Ok(Json(items))
}

fn bad_multipart(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::Validation(IMAGE_TOO_LARGE.into());
    }
    AppError::Validation(e.body_text())
}
