use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{AttrRequest, AttrResponse, ListQuery},
    services, Catalog,
};
use crate::{auth::AuthUser, error::AppResult, extract::ApiJson, state::AppState};

pub fn catalog_routes<C: Catalog>() -> Router<AppState> {
    Router::new()
        .route("/", get(list_attrs::<C>).post(create_attr::<C>))
        .route(
            "/:id",
            axum::routing::put(update_attr::<C>)
                .patch(update_attr::<C>)
                .delete(delete_attr::<C>),
        )
}

#[instrument(skip(state), fields(kind = C::KIND.label()))]
pub async fn list_attrs<C: Catalog>(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<Vec<AttrResponse>>> {
    let assigned_only = services::parse_assigned_only(q.assigned_only.as_deref())?;
    let attrs = services::list(&state, auth.scope(), C::KIND, assigned_only).await?;
    Ok(Json(attrs.into_iter().map(AttrResponse::from).collect()))
}

#[instrument(skip(state), fields(kind = C::KIND.label()))]
pub async fn create_attr<C: Catalog>(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<AttrRequest>,
) -> AppResult<(StatusCode, Json<AttrResponse>)> {
    let attr = services::create(&state, auth.scope(), C::KIND, &body.name).await?;
    Ok((StatusCode::CREATED, Json(attr.into())))
}

#[instrument(skip(state), fields(kind = C::KIND.label()))]
pub async fn update_attr<C: Catalog>(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<AttrRequest>,
) -> AppResult<Json<AttrResponse>> {
    let attr = services::update(&state, auth.scope(), C::KIND, id, &body.name).await?;
    Ok(Json(attr.into()))
}

#[instrument(skip(state), fields(kind = C::KIND.label()))]
pub async fn delete_attr<C: Catalog>(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    services::delete(&state, auth.scope(), C::KIND, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
