use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::{
    dto::{Generation, STATUS_SUCCEEDED},
    repo,
    repo_types::NewGeneration,
};
use crate::{
    auth::AuthUser,
    config::{GenerationConfig, OverloadPolicy},
    db::now_timestamp,
    error::AppError,
    images::services::{discard_upload, store_upload},
    state::AppState,
    validators::{validate_generation, GenerationForm, ValidGeneration},
};

pub const MAX_HISTORY: i64 = 5;

/// Validate, store the upload, wait out the simulated latency, maybe
/// report an overload, then persist. The stored upload never outlives a
/// failed submission.
pub async fn submit(
    state: &AppState,
    user: &AuthUser,
    form: GenerationForm,
) -> Result<Generation, AppError> {
    let valid = validate_generation(form)?;
    let key = store_upload(state, &valid.image).await?;

    match process(state, user, valid, &key).await {
        Ok(generation) => {
            info!(user_id = user.id, generation_id = generation.id, "generation succeeded");
            Ok(generation)
        }
        Err(e) => {
            discard_upload(state, &key).await;
            Err(e)
        }
    }
}

async fn process(
    state: &AppState,
    user: &AuthUser,
    valid: ValidGeneration,
    key: &str,
) -> Result<Generation, AppError> {
    let cfg = &state.config.generation;
    if let Some(delay) = processing_delay(cfg) {
        debug!(delay_ms = delay.as_millis() as u64, "simulating generation latency");
        tokio::time::sleep(delay).await;
    }

    if should_overload(cfg.overload) {
        warn!(user_id = user.id, "simulated model overload");
        return Err(AppError::Overloaded);
    }

    let image_url = build_image_url(
        state.config.base_url.as_deref(),
        &state.storage.public_path(key),
    );
    let row = repo::create(
        &state.db,
        &NewGeneration {
            user_id: user.id,
            image_url,
            prompt: valid.prompt,
            style: valid.style.as_str().to_string(),
            status: STATUS_SUCCEEDED.to_string(),
            created_at: now_timestamp()?,
        },
    )
    .await?;

    Ok(normalized(row.into()))
}

pub async fn history(
    state: &AppState,
    user_id: i64,
    requested: Option<i64>,
) -> Result<Vec<Generation>, AppError> {
    let rows = repo::recent_for_user(&state.db, user_id, clamp_limit(requested)).await?;
    Ok(rows.into_iter().map(|r| normalized(r.into())).collect())
}

/// Anything outside `1..=MAX_HISTORY` falls back to `MAX_HISTORY`.
pub fn clamp_limit(requested: Option<i64>) -> i64 {
    match requested {
        Some(n) if (1..=MAX_HISTORY).contains(&n) => n,
        _ => MAX_HISTORY,
    }
}

fn processing_delay(cfg: &GenerationConfig) -> Option<Duration> {
    if !cfg.simulate_delay {
        return None;
    }
    let ms = if cfg.delay_max_ms > cfg.delay_min_ms {
        rand::thread_rng().gen_range(cfg.delay_min_ms..cfg.delay_max_ms)
    } else {
        cfg.delay_min_ms
    };
    Some(Duration::from_millis(ms))
}

fn should_overload(policy: OverloadPolicy) -> bool {
    match policy {
        OverloadPolicy::Always => true,
        OverloadPolicy::Never => false,
        OverloadPolicy::Random(p) => rand::thread_rng().gen_bool(p.clamp(0.0, 1.0)),
    }
}

pub fn build_image_url(base_url: Option<&str>, relative_path: &str) -> String {
    let relative = normalize_url(relative_path);
    let relative = relative.trim_start_matches('/');
    match base_url {
        Some(base) if !base.is_empty() => format!("{}/{}", base.trim_end_matches('/'), relative),
        _ => format!("/{}", relative),
    }
}

fn normalize_url(url: &str) -> String {
    url.replace('\\', "/")
}

fn normalized(mut g: Generation) -> Generation {
    g.image_url = normalize_url(&g.image_url);
    g
}
