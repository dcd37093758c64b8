//! Persistence port.
//!
//! Services talk to a `Store`; the Postgres adapter backs production and the
//! in-memory adapter backs local runs without a database and the test suite.
//! Every tag, ingredient and recipe method takes a [`Scope`] and must filter
//! by its owner before applying anything else.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::FromRow;

use crate::scope::Scope;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated on {0}")]
    Conflict(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The two recipe attribute catalogs share one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    Tag,
    Ingredient,
}

impl AttrKind {
    pub fn label(self) -> &'static str {
        match self {
            AttrKind::Tag => "tag",
            AttrKind::Ingredient => "ingredient",
        }
    }

    pub(crate) fn table(self) -> &'static str {
        match self {
            AttrKind::Tag => "tags",
            AttrKind::Ingredient => "ingredients",
        }
    }

    pub(crate) fn link_table(self) -> &'static str {
        match self {
            AttrKind::Tag => "recipe_tags",
            AttrKind::Ingredient => "recipe_ingredients",
        }
    }

    pub(crate) fn link_column(self) -> &'static str {
        match self {
            AttrKind::Tag => "tag_id",
            AttrKind::Ingredient => "ingredient_id",
        }
    }
}

/// User row. `password_hash` never leaves the service layer.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
}

/// Tag or ingredient row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AttrRecord {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct RecipeRecord {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub description: String,
    pub link: String,
    pub image: Option<String>,
}

/// Scalar recipe columns written on insert and update.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeFields {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub description: String,
    pub link: String,
}

impl RecipeFields {
    pub fn from_record(r: &RecipeRecord) -> Self {
        Self {
            title: r.title.clone(),
            time_minutes: r.time_minutes,
            price: r.price,
            description: r.description.clone(),
            link: r.link.clone(),
        }
    }
}

/// Membership filters for recipe listing. `None` means "no filter"; within a
/// list any id matches, across lists both must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    pub tag_ids: Option<Vec<i64>>,
    pub ingredient_ids: Option<Vec<i64>>,
}

impl RecipeFilter {
    pub(crate) fn ids(&self, kind: AttrKind) -> Option<&[i64]> {
        match kind {
            AttrKind::Tag => self.tag_ids.as_deref(),
            AttrKind::Ingredient => self.ingredient_ids.as_deref(),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // ---- users ----

    /// Insert a user; `Conflict` when the email is taken.
    async fn insert_user(&self, user: NewUser) -> StoreResult<UserRecord>;
    async fn find_user(&self, id: i64) -> StoreResult<Option<UserRecord>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;
    async fn update_user(&self, id: i64, changes: UserChanges) -> StoreResult<Option<UserRecord>>;

    // ---- tags / ingredients ----

    /// Owned entities by name descending, ties by id descending. With
    /// `assigned_only`, only those linked to at least one recipe, once each.
    async fn list_attrs(
        &self,
        scope: Scope,
        kind: AttrKind,
        assigned_only: bool,
    ) -> StoreResult<Vec<AttrRecord>>;
    /// Existing `(owner, name)` entity or a newly inserted one.
    async fn get_or_create_attr(
        &self,
        scope: Scope,
        kind: AttrKind,
        name: &str,
    ) -> StoreResult<AttrRecord>;
    async fn rename_attr(
        &self,
        scope: Scope,
        kind: AttrKind,
        id: i64,
        name: &str,
    ) -> StoreResult<Option<AttrRecord>>;
    /// `false` when nothing owned matched.
    async fn delete_attr(&self, scope: Scope, kind: AttrKind, id: i64) -> StoreResult<bool>;

    // ---- recipes ----

    /// Owned recipes matching `filter`, distinct, id descending.
    async fn list_recipes(&self, scope: Scope, filter: &RecipeFilter)
        -> StoreResult<Vec<RecipeRecord>>;
    async fn find_recipe(&self, scope: Scope, id: i64) -> StoreResult<Option<RecipeRecord>>;
    async fn insert_recipe(&self, scope: Scope, fields: &RecipeFields) -> StoreResult<RecipeRecord>;
    async fn update_recipe(
        &self,
        scope: Scope,
        id: i64,
        fields: &RecipeFields,
    ) -> StoreResult<Option<RecipeRecord>>;
    async fn set_recipe_image(
        &self,
        scope: Scope,
        id: i64,
        image: Option<&str>,
    ) -> StoreResult<Option<RecipeRecord>>;
    /// Removes the recipe and its association rows, not the attributes.
    async fn delete_recipe(&self, scope: Scope, id: i64) -> StoreResult<bool>;

    /// Attributes linked to an owned recipe, ordered by name.
    async fn recipe_attrs(
        &self,
        scope: Scope,
        kind: AttrKind,
        recipe_id: i64,
    ) -> StoreResult<Vec<AttrRecord>>;
    /// Replace the whole association set. Ids not owned by `scope` are skipped.
    async fn replace_recipe_attrs(
        &self,
        scope: Scope,
        kind: AttrKind,
        recipe_id: i64,
        attr_ids: &[i64],
    ) -> StoreResult<()>;
}
