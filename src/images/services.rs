use anyhow::Context;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;
use crate::validators::ValidImage;

/// Write a validated upload to storage and return its object key,
/// `<unix-millis>-<uuid>.<ext>`.
pub async fn store_upload(st: &AppState, image: &ValidImage) -> anyhow::Result<String> {
    let ext = ext_from_mime(image.content_type).unwrap_or("bin");
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let key = format!("{}-{}.{}", millis, Uuid::new_v4().simple(), ext);
    st.storage
        .put_object(&key, image.body.clone(), image.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(key)
}

/// Best-effort removal; failures are logged and swallowed.
pub async fn discard_upload(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, key, "failed to remove upload");
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}
