use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::services::{RecipePatch, RecipeView};
use crate::catalog::dto::{AttrRequest, AttrResponse};

#[derive(Debug, Deserialize)]
pub struct RecipeListQuery {
    /// Comma-separated tag ids.
    pub tags: Option<String>,
    /// Comma-separated ingredient ids.
    pub ingredients: Option<String>,
}

/// Body for create, PUT and PATCH. An owner field in the payload is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeRequest {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub tags: Option<Vec<AttrRequest>>,
    pub ingredients: Option<Vec<AttrRequest>>,
}

impl From<RecipeRequest> for RecipePatch {
    fn from(r: RecipeRequest) -> Self {
        let names = |items: Vec<AttrRequest>| -> Vec<String> {
            items.into_iter().map(|i| i.name).collect()
        };
        Self {
            title: r.title,
            time_minutes: r.time_minutes,
            price: r.price,
            description: r.description,
            link: r.link,
            tags: r.tags.map(names),
            ingredients: r.ingredients.map(names),
        }
    }
}

/// List representation.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecipeResponse {
    pub id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<AttrResponse>,
    pub ingredients: Vec<AttrResponse>,
}

/// Detail representation.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecipeDetailResponse {
    #[serde(flatten)]
    pub summary: RecipeResponse,
    pub description: String,
    /// Time-limited URL of the uploaded image.
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecipeImageResponse {
    pub id: i64,
    pub image: Option<String>,
}

impl From<RecipeView> for RecipeResponse {
    fn from(v: RecipeView) -> Self {
        Self {
            id: v.record.id,
            title: v.record.title,
            time_minutes: v.record.time_minutes,
            price: v.record.price,
            link: v.record.link,
            tags: v.tags.into_iter().map(AttrResponse::from).collect(),
            ingredients: v.ingredients.into_iter().map(AttrResponse::from).collect(),
        }
    }
}
