use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::{
    catalog,
    error::{AppError, AppResult},
    scope::Scope,
    state::AppState,
    store::{AttrKind, AttrRecord, RecipeFields, RecipeFilter, RecipeRecord},
};

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_LINK_LEN: usize = 255;
/// NUMERIC(5, 2): two fractional digits, three integral.
pub const PRICE_SCALE: u32 = 2;
const PRICE_LIMIT: Decimal = Decimal::ONE_THOUSAND;

/// A recipe with its resolved associations.
#[derive(Debug, Clone)]
pub struct RecipeView {
    pub record: RecipeRecord,
    pub tags: Vec<AttrRecord>,
    pub ingredients: Vec<AttrRecord>,
}

/// Caller-supplied recipe changes. For `tags` / `ingredients`, `Some` replaces
/// the whole association set and `None` leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct RecipePatch {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub tags: Option<Vec<String>>,
    pub ingredients: Option<Vec<String>>,
}

impl RecipePatch {
    /// Fields a create or full update must carry.
    pub fn require_complete(&self) -> AppResult<()> {
        if self.title.is_none() {
            return Err(AppError::field("title", "this field is required"));
        }
        if self.time_minutes.is_none() {
            return Err(AppError::field("time_minutes", "this field is required"));
        }
        if self.price.is_none() {
            return Err(AppError::field("price", "this field is required"));
        }
        Ok(())
    }

    fn apply(&self, mut fields: RecipeFields) -> RecipeFields {
        if let Some(title) = &self.title {
            fields.title = title.trim().to_string();
        }
        if let Some(minutes) = self.time_minutes {
            fields.time_minutes = minutes;
        }
        if let Some(price) = self.price {
            fields.price = price;
        }
        if let Some(description) = &self.description {
            fields.description = description.clone();
        }
        if let Some(link) = &self.link {
            fields.link = link.trim().to_string();
        }
        fields
    }

    fn attrs(&self, kind: AttrKind) -> Option<&[String]> {
        match kind {
            AttrKind::Tag => self.tags.as_deref(),
            AttrKind::Ingredient => self.ingredients.as_deref(),
        }
    }

    /// Rejects bad attribute names before anything is written.
    fn check_attr_names(&self) -> AppResult<()> {
        for kind in [AttrKind::Tag, AttrKind::Ingredient] {
            for name in self.attrs(kind).unwrap_or_default() {
                catalog::services::checked_name(name)?;
            }
        }
        Ok(())
    }
}

/// Parses a comma-separated id list; blank means no filter.
pub fn parse_id_list(field: &str, raw: Option<&str>) -> AppResult<Option<Vec<i64>>> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    raw.split(',')
        .map(|part| {
            part.trim().parse::<i64>().map_err(|_| {
                AppError::field(field, format!("{:?} is not a valid id", part.trim()))
            })
        })
        .collect::<AppResult<Vec<i64>>>()
        .map(Some)
}

fn normalize_price(price: Decimal) -> AppResult<Decimal> {
    if price.normalize().scale() > PRICE_SCALE {
        return Err(AppError::field(
            "price",
            "ensure that there are no more than 2 decimal places",
        ));
    }
    if price.abs() >= PRICE_LIMIT {
        return Err(AppError::field(
            "price",
            "ensure that there are no more than 5 digits in total",
        ));
    }
    let mut price = price;
    price.rescale(PRICE_SCALE);
    Ok(price)
}

fn validate(mut fields: RecipeFields) -> AppResult<RecipeFields> {
    if fields.title.is_empty() {
        return Err(AppError::field("title", "this field may not be blank"));
    }
    if fields.title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::field(
            "title",
            "ensure this field has no more than 255 characters",
        ));
    }
    if fields.time_minutes < 0 {
        return Err(AppError::field(
            "time_minutes",
            "ensure this value is greater than or equal to 0",
        ));
    }
    if fields.link.chars().count() > MAX_LINK_LEN {
        return Err(AppError::field(
            "link",
            "ensure this field has no more than 255 characters",
        ));
    }
    fields.price = normalize_price(fields.price)?;
    Ok(fields)
}

async fn view(state: &AppState, scope: Scope, record: RecipeRecord) -> AppResult<RecipeView> {
    let tags = state.store.recipe_attrs(scope, AttrKind::Tag, record.id).await?;
    let ingredients = state
        .store
        .recipe_attrs(scope, AttrKind::Ingredient, record.id)
        .await?;
    Ok(RecipeView {
        record,
        tags,
        ingredients,
    })
}

/// Association sets present in `patch`, resolved to owned ids through
/// get-or-create. Runs before the recipe row is written so a failure here
/// leaves the recipe untouched.
async fn resolve_attrs(
    state: &AppState,
    scope: Scope,
    patch: &RecipePatch,
) -> AppResult<Vec<(AttrKind, Vec<i64>)>> {
    let mut resolved = Vec::new();
    for kind in [AttrKind::Tag, AttrKind::Ingredient] {
        let Some(names) = patch.attrs(kind) else {
            continue;
        };
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let attr = catalog::services::get_or_create(state, scope, kind, name).await?;
            if !ids.contains(&attr.id) {
                ids.push(attr.id);
            }
        }
        resolved.push((kind, ids));
    }
    Ok(resolved)
}

/// Replaces each resolved association set wholesale.
async fn link_attrs(
    state: &AppState,
    scope: Scope,
    recipe_id: i64,
    resolved: &[(AttrKind, Vec<i64>)],
) -> AppResult<()> {
    for (kind, ids) in resolved {
        state
            .store
            .replace_recipe_attrs(scope, *kind, recipe_id, ids)
            .await?;
    }
    Ok(())
}

pub async fn list(
    state: &AppState,
    scope: Scope,
    filter: &RecipeFilter,
) -> AppResult<Vec<RecipeView>> {
    let records = state.store.list_recipes(scope, filter).await?;
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        out.push(view(state, scope, record).await?);
    }
    Ok(out)
}

async fn load(state: &AppState, scope: Scope, id: i64) -> AppResult<RecipeRecord> {
    state
        .store
        .find_recipe(scope, id)
        .await?
        .ok_or_else(|| AppError::not_found("recipe"))
}

pub async fn get(state: &AppState, scope: Scope, id: i64) -> AppResult<RecipeView> {
    let record = load(state, scope, id).await?;
    view(state, scope, record).await
}

pub async fn create(state: &AppState, scope: Scope, patch: RecipePatch) -> AppResult<RecipeView> {
    patch.require_complete()?;
    let blank = RecipeFields {
        title: String::new(),
        time_minutes: 0,
        price: Decimal::ZERO,
        description: String::new(),
        link: String::new(),
    };
    let fields = validate(patch.apply(blank))?;
    patch.check_attr_names()?;
    let resolved = resolve_attrs(state, scope, &patch).await?;
    let record = state.store.insert_recipe(scope, &fields).await?;
    link_attrs(state, scope, record.id, &resolved).await?;
    info!(recipe_id = record.id, user_id = scope.user_id(), "recipe created");
    view(state, scope, record).await
}

pub async fn update(
    state: &AppState,
    scope: Scope,
    id: i64,
    patch: RecipePatch,
) -> AppResult<RecipeView> {
    let current = load(state, scope, id).await?;
    if !scope.owns(current.user_id) {
        warn!(recipe_id = id, user_id = scope.user_id(), "owner mismatch after scoped load");
        return Err(AppError::Forbidden(
            "you do not have permission to perform this action".into(),
        ));
    }

    let fields = validate(patch.apply(RecipeFields::from_record(&current)))?;
    patch.check_attr_names()?;
    let resolved = resolve_attrs(state, scope, &patch).await?;
    let record = state
        .store
        .update_recipe(scope, id, &fields)
        .await?
        .ok_or_else(|| AppError::not_found("recipe"))?;
    link_attrs(state, scope, id, &resolved).await?;
    info!(recipe_id = id, user_id = scope.user_id(), "recipe updated");
    view(state, scope, record).await
}

pub async fn delete(state: &AppState, scope: Scope, id: i64) -> AppResult<()> {
    let current = load(state, scope, id).await?;
    if !state.store.delete_recipe(scope, id).await? {
        return Err(AppError::not_found("recipe"));
    }
    if let Some(key) = current.image {
        if let Err(e) = state.storage.delete_object(&key).await {
            warn!(error = %e, key = %key, "orphaned recipe image");
        }
    }
    info!(recipe_id = id, user_id = scope.user_id(), "recipe deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecipePatch {
        RecipePatch {
            title: Some("Simple recipe".into()),
            time_minutes: Some(22),
            price: Some(Decimal::new(550, 2)),
            description: Some("Sample description".into()),
            link: Some("http://example.com/recipe.pdf".into()),
            ..Default::default()
        }
    }

    fn with_tags(names: &[&str]) -> RecipePatch {
        RecipePatch {
            tags: Some(names.iter().map(|n| n.to_string()).collect()),
            ..sample()
        }
    }

    fn tag_names(v: &RecipeView) -> Vec<&str> {
        v.tags.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn id_lists() {
        assert_eq!(parse_id_list("tags", None).unwrap(), None);
        assert_eq!(parse_id_list("tags", Some("")).unwrap(), None);
        assert_eq!(parse_id_list("tags", Some("3, 1")).unwrap(), Some(vec![3, 1]));
        assert!(parse_id_list("tags", Some("1,x")).is_err());
    }

    #[test]
    fn price_rules() {
        assert_eq!(normalize_price(Decimal::new(55, 1)).unwrap().to_string(), "5.50");
        assert!(normalize_price(Decimal::new(5555, 3)).is_err());
        assert!(normalize_price(Decimal::new(100000, 2)).is_err());
        assert!(normalize_price(Decimal::new(99999, 2)).is_ok());
        // Trailing zeros beyond two places are fine.
        assert!(normalize_price(Decimal::new(55000, 4)).is_ok());
    }

    #[tokio::test]
    async fn create_requires_core_fields() {
        let state = AppState::fake();
        let patch = RecipePatch {
            title: Some("No price".into()),
            time_minutes: Some(5),
            ..Default::default()
        };
        let err = create(&state, Scope::owner(1), patch).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn create_with_inline_tags_reuses_existing() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        let first = create(&state, me, with_tags(&["Vegan"])).await.unwrap();
        assert_eq!(tag_names(&first), vec!["Vegan"]);
        assert_eq!(first.tags[0].user_id, 1);

        let second = create(&state, me, with_tags(&["Vegan", "Vegan"])).await.unwrap();
        assert_eq!(second.tags, first.tags);

        let all = catalog::services::list(&state, me, AttrKind::Tag, false)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn update_replaces_tag_set() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        let recipe = create(&state, me, with_tags(&["Vegan"])).await.unwrap();

        let patch = RecipePatch {
            tags: Some(vec!["Dessert".into()]),
            ..Default::default()
        };
        let updated = update(&state, me, recipe.record.id, patch).await.unwrap();
        assert_eq!(tag_names(&updated), vec!["Dessert"]);

        let clear = RecipePatch {
            tags: Some(Vec::new()),
            ..Default::default()
        };
        let cleared = update(&state, me, recipe.record.id, clear).await.unwrap();
        assert!(cleared.tags.is_empty());
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields_and_associations() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        let mut patch = with_tags(&["Vegan"]);
        patch.ingredients = Some(vec!["Salt".into()]);
        let recipe = create(&state, me, patch).await.unwrap();

        let title_only = RecipePatch {
            title: Some("Updated Recipe Title".into()),
            ..Default::default()
        };
        let updated = update(&state, me, recipe.record.id, title_only).await.unwrap();
        assert_eq!(updated.record.title, "Updated Recipe Title");
        assert_eq!(updated.record.link, "http://example.com/recipe.pdf");
        assert_eq!(updated.record.user_id, 1);
        assert_eq!(tag_names(&updated), vec!["Vegan"]);
        assert_eq!(updated.ingredients.len(), 1);
    }

    #[tokio::test]
    async fn other_users_recipes_are_invisible() {
        let state = AppState::fake();
        let owner = Scope::owner(1);
        let intruder = Scope::owner(2);
        let recipe = create(&state, owner, sample()).await.unwrap();
        let id = recipe.record.id;

        assert!(list(&state, intruder, &RecipeFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(get(&state, intruder, id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            update(&state, intruder, id, sample()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(delete(&state, intruder, id).await, Err(AppError::NotFound(_))));

        let untouched = get(&state, owner, id).await.unwrap();
        assert_eq!(untouched.record, recipe.record);
    }

    #[tokio::test]
    async fn filter_by_tags_is_union_without_duplicates() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        let both = create(&state, me, with_tags(&["Vegan", "Quick"])).await.unwrap();
        let vegan = create(&state, me, with_tags(&["Vegan"])).await.unwrap();
        let plain = create(&state, me, sample()).await.unwrap();
        create(&state, Scope::owner(2), with_tags(&["Vegan"])).await.unwrap();

        let ids: Vec<i64> = both.tags.iter().map(|t| t.id).collect();
        let filter = RecipeFilter {
            tag_ids: Some(ids),
            ingredient_ids: None,
        };
        let found: Vec<i64> = list(&state, me, &filter)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.record.id)
            .collect();
        assert_eq!(found, vec![vegan.record.id, both.record.id]);
        assert!(!found.contains(&plain.record.id));
    }

    #[tokio::test]
    async fn filters_combine_across_kinds() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        let mut patch = with_tags(&["Vegan"]);
        patch.ingredients = Some(vec!["Tofu".into()]);
        let match_both = create(&state, me, patch).await.unwrap();
        let tag_only = create(&state, me, with_tags(&["Vegan"])).await.unwrap();

        let filter = RecipeFilter {
            tag_ids: Some(vec![tag_only.tags[0].id]),
            ingredient_ids: Some(vec![match_both.ingredients[0].id]),
        };
        let found = list(&state, me, &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].record.id, match_both.record.id);
    }

    #[tokio::test]
    async fn delete_then_not_found() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        let recipe = create(&state, me, with_tags(&["Vegan"])).await.unwrap();

        delete(&state, me, recipe.record.id).await.unwrap();
        assert!(matches!(get(&state, me, recipe.record.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            delete(&state, me, recipe.record.id).await,
            Err(AppError::NotFound(_))
        ));
        // The tag itself survives.
        let tags = catalog::services::list(&state, me, AttrKind::Tag, false)
            .await
            .unwrap();
        assert_eq!(tags.len(), 1);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        let a = create(&state, me, sample()).await.unwrap();
        let b = create(&state, me, sample()).await.unwrap();
        let ids: Vec<i64> = list(&state, me, &RecipeFilter::default())
            .await
            .unwrap()
            .iter()
            .map(|v| v.record.id)
            .collect();
        assert_eq!(ids, vec![b.record.id, a.record.id]);
    }

    mod failing_attrs {
        use std::sync::Arc;

        use async_trait::async_trait;

        use super::*;
        use crate::store::{
            MemoryStore, NewUser, Store, StoreError, StoreResult, UserChanges, UserRecord,
        };

        /// Memory store whose get-or-create always loses the uniqueness race.
        pub struct ConflictingAttrs(pub MemoryStore);

        #[async_trait]
        impl Store for ConflictingAttrs {
            async fn insert_user(&self, user: NewUser) -> StoreResult<UserRecord> {
                self.0.insert_user(user).await
            }
            async fn find_user(&self, id: i64) -> StoreResult<Option<UserRecord>> {
                self.0.find_user(id).await
            }
            async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
                self.0.find_user_by_email(email).await
            }
            async fn update_user(
                &self,
                id: i64,
                changes: UserChanges,
            ) -> StoreResult<Option<UserRecord>> {
                self.0.update_user(id, changes).await
            }
            async fn list_attrs(
                &self,
                scope: Scope,
                kind: AttrKind,
                assigned_only: bool,
            ) -> StoreResult<Vec<AttrRecord>> {
                self.0.list_attrs(scope, kind, assigned_only).await
            }
            async fn get_or_create_attr(
                &self,
                _scope: Scope,
                kind: AttrKind,
                _name: &str,
            ) -> StoreResult<AttrRecord> {
                Err(StoreError::Conflict(format!("{}.name", kind.label())))
            }
            async fn rename_attr(
                &self,
                scope: Scope,
                kind: AttrKind,
                id: i64,
                name: &str,
            ) -> StoreResult<Option<AttrRecord>> {
                self.0.rename_attr(scope, kind, id, name).await
            }
            async fn delete_attr(
                &self,
                scope: Scope,
                kind: AttrKind,
                id: i64,
            ) -> StoreResult<bool> {
                self.0.delete_attr(scope, kind, id).await
            }
            async fn list_recipes(
                &self,
                scope: Scope,
                filter: &RecipeFilter,
            ) -> StoreResult<Vec<RecipeRecord>> {
                self.0.list_recipes(scope, filter).await
            }
            async fn find_recipe(
                &self,
                scope: Scope,
                id: i64,
            ) -> StoreResult<Option<RecipeRecord>> {
                self.0.find_recipe(scope, id).await
            }
            async fn insert_recipe(
                &self,
                scope: Scope,
                fields: &RecipeFields,
            ) -> StoreResult<RecipeRecord> {
                self.0.insert_recipe(scope, fields).await
            }
            async fn update_recipe(
                &self,
                scope: Scope,
                id: i64,
                fields: &RecipeFields,
            ) -> StoreResult<Option<RecipeRecord>> {
                self.0.update_recipe(scope, id, fields).await
            }
            async fn set_recipe_image(
                &self,
                scope: Scope,
                id: i64,
                image: Option<&str>,
            ) -> StoreResult<Option<RecipeRecord>> {
                self.0.set_recipe_image(scope, id, image).await
            }
            async fn delete_recipe(&self, scope: Scope, id: i64) -> StoreResult<bool> {
                self.0.delete_recipe(scope, id).await
            }
            async fn recipe_attrs(
                &self,
                scope: Scope,
                kind: AttrKind,
                recipe_id: i64,
            ) -> StoreResult<Vec<AttrRecord>> {
                self.0.recipe_attrs(scope, kind, recipe_id).await
            }
            async fn replace_recipe_attrs(
                &self,
                scope: Scope,
                kind: AttrKind,
                recipe_id: i64,
                attr_ids: &[i64],
            ) -> StoreResult<()> {
                self.0
                    .replace_recipe_attrs(scope, kind, recipe_id, attr_ids)
                    .await
            }
        }

        fn state() -> AppState {
            let mut state = AppState::fake();
            state.store = Arc::new(ConflictingAttrs(MemoryStore::new()));
            state
        }

        #[tokio::test]
        async fn failed_tag_resolution_creates_no_recipe() {
            let state = state();
            let me = Scope::owner(1);
            let err = create(&state, me, with_tags(&["Vegan"])).await.unwrap_err();
            assert!(matches!(err, AppError::Conflict(_)));
            assert!(list(&state, me, &RecipeFilter::default())
                .await
                .unwrap()
                .is_empty());
        }

        #[tokio::test]
        async fn failed_tag_resolution_leaves_update_unapplied() {
            let state = state();
            let me = Scope::owner(1);
            let recipe = create(&state, me, sample()).await.unwrap();

            let patch = RecipePatch {
                title: Some("Renamed".into()),
                tags: Some(vec!["Vegan".into()]),
                ..Default::default()
            };
            let err = update(&state, me, recipe.record.id, patch).await.unwrap_err();
            assert!(matches!(err, AppError::Conflict(_)));
            let current = get(&state, me, recipe.record.id).await.unwrap();
            assert_eq!(current.record.title, "Simple recipe");
        }
    }
}
