use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{
        RecipeDetailResponse, RecipeImageResponse, RecipeListQuery, RecipeRequest,
        RecipeResponse,
    },
    images,
    services::{self, RecipePatch, RecipeView},
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::ApiJson,
    state::AppState,
    store::RecipeFilter,
};

pub fn recipe_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(list_recipes).post(create_recipe))
        .route(
            "/:id",
            get(get_recipe)
                .put(put_recipe)
                .patch(patch_recipe)
                .delete(delete_recipe),
        )
        .route(
            "/:id/upload-image",
            post(upload_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}

async fn detail(state: &AppState, view: RecipeView) -> AppResult<RecipeDetailResponse> {
    let image = images::image_url(state, view.record.image.as_deref()).await?;
    let description = view.record.description.clone();
    Ok(RecipeDetailResponse {
        summary: view.into(),
        description,
        image,
    })
}

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<RecipeListQuery>,
) -> AppResult<Json<Vec<RecipeResponse>>> {
    let filter = RecipeFilter {
        tag_ids: services::parse_id_list("tags", q.tags.as_deref())?,
        ingredient_ids: services::parse_id_list("ingredients", q.ingredients.as_deref())?,
    };
    let recipes = services::list(&state, auth.scope(), &filter).await?;
    Ok(Json(recipes.into_iter().map(RecipeResponse::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<RecipeDetailResponse>> {
    let view = services::get(&state, auth.scope(), id).await?;
    Ok(Json(detail(&state, view).await?))
}

#[instrument(skip(state, body))]
pub async fn create_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<RecipeRequest>,
) -> AppResult<(StatusCode, Json<RecipeDetailResponse>)> {
    let view = services::create(&state, auth.scope(), body.into()).await?;
    Ok((StatusCode::CREATED, Json(detail(&state, view).await?)))
}

/// Full update: title, time_minutes and price are required.
#[instrument(skip(state, body))]
pub async fn put_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<RecipeRequest>,
) -> AppResult<Json<RecipeDetailResponse>> {
    let patch = RecipePatch::from(body);
    patch.require_complete()?;
    let view = services::update(&state, auth.scope(), id, patch).await?;
    Ok(Json(detail(&state, view).await?))
}

#[instrument(skip(state, body))]
pub async fn patch_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<RecipeRequest>,
) -> AppResult<Json<RecipeDetailResponse>> {
    let view = services::update(&state, auth.scope(), id, body.into()).await?;
    Ok(Json(detail(&state, view).await?))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    services::delete(&state, auth.scope(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Multipart upload; the file goes in the `image` field.
#[instrument(skip(state, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    mut mp: Multipart,
) -> AppResult<Json<RecipeImageResponse>> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::field("image", e.body_text()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::field("image", e.body_text()))?;

        let record = images::upload_image(&state, auth.scope(), id, data, &content_type).await?;
        let image = images::image_url(&state, record.image.as_deref()).await?;
        return Ok(Json(RecipeImageResponse {
            id: record.id,
            image,
        }));
    }
    Err(AppError::field("image", "no file was submitted"))
}
