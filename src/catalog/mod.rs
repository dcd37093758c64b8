//! Tag and ingredient catalogs: one implementation, two attribute kinds.

pub mod dto;
pub mod handlers;
pub mod services;

use crate::{state::AppState, store::AttrKind};
use axum::Router;

/// Compile-time selector for the catalog a route serves.
pub trait Catalog: Send + Sync + 'static {
    const KIND: AttrKind;
}

pub struct Tags;
pub struct Ingredients;

impl Catalog for Tags {
    const KIND: AttrKind = AttrKind::Tag;
}

impl Catalog for Ingredients {
    const KIND: AttrKind = AttrKind::Ingredient;
}

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/recipe/tags", handlers::catalog_routes::<Tags>())
        .nest("/recipe/ingredients", handlers::catalog_routes::<Ingredients>())
}
