use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    scope::Scope,
    state::AppState,
    store::RecipeRecord,
};

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Stores `body` as the recipe's image, replacing any previous one.
pub async fn upload_image(
    st: &AppState,
    scope: Scope,
    recipe_id: i64,
    body: Bytes,
    content_type: &str,
) -> AppResult<RecipeRecord> {
    let current = st
        .store
        .find_recipe(scope, recipe_id)
        .await?
        .ok_or_else(|| AppError::not_found("recipe"))?;

    let ext = ext_from_mime(content_type)
        .ok_or_else(|| AppError::field("image", "upload a valid image"))?;
    if body.is_empty() {
        return Err(AppError::field("image", "the submitted file is empty"));
    }

    let key = format!(
        "recipes/{}/{}-{}.{}",
        scope.user_id(),
        recipe_id,
        Uuid::new_v4(),
        ext
    );
    st.storage
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    let Some(updated) = st
        .store
        .set_recipe_image(scope, recipe_id, Some(&key))
        .await?
    else {
        // Recipe vanished between the two calls.
        discard(st, &key).await;
        return Err(AppError::not_found("recipe"));
    };

    if let Some(old) = current.image.as_deref().filter(|old| *old != key) {
        discard(st, old).await;
    }
    info!(recipe_id, key = %key, "recipe image stored");
    Ok(updated)
}

async fn discard(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, key = %key, "failed to delete image object");
    }
}

/// Time-limited URL for a stored image key.
pub async fn image_url(st: &AppState, key: Option<&str>) -> AppResult<Option<String>> {
    let Some(key) = key else {
        return Ok(None);
    };
    let url = st
        .storage
        .presign_get(key, st.config.image_url_ttl_secs)
        .await
        .with_context(|| format!("presign url for key {}", key))?;
    Ok(Some(url))
}
