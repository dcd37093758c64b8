pub mod dto;
pub mod handlers;
pub mod images;
pub mod services;

use axum::Router;

use crate::state::AppState;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new().nest("/recipe/recipes", handlers::recipe_routes(max_upload_bytes))
}
