use tracing::{debug, info};

use crate::{
    error::{AppError, AppResult},
    scope::Scope,
    state::AppState,
    store::{AttrKind, AttrRecord, StoreError},
};

pub const MAX_NAME_LEN: usize = 255;
const GET_OR_CREATE_ATTEMPTS: usize = 3;

/// `assigned_only` accepts `0`, `1` or nothing.
pub fn parse_assigned_only(raw: Option<&str>) -> AppResult<bool> {
    match raw.map(str::trim) {
        None | Some("") | Some("0") => Ok(false),
        Some("1") => Ok(true),
        Some(other) => Err(AppError::field(
            "assigned_only",
            format!("expected 0 or 1, got {:?}", other),
        )),
    }
}

pub(crate) fn checked_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::field("name", "this field may not be blank"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::field(
            "name",
            format!("ensure this field has no more than {} characters", MAX_NAME_LEN),
        ));
    }
    Ok(name.to_string())
}

pub async fn list(
    state: &AppState,
    scope: Scope,
    kind: AttrKind,
    assigned_only: bool,
) -> AppResult<Vec<AttrRecord>> {
    Ok(state.store.list_attrs(scope, kind, assigned_only).await?)
}

/// Existing `(owner, name)` entity or a new one. A uniqueness conflict from a
/// concurrent identical call is retried.
pub async fn get_or_create(
    state: &AppState,
    scope: Scope,
    kind: AttrKind,
    name: &str,
) -> AppResult<AttrRecord> {
    let name = checked_name(name)?;
    let mut attempt = 1;
    loop {
        match state.store.get_or_create_attr(scope, kind, &name).await {
            Ok(attr) => return Ok(attr),
            Err(StoreError::Conflict(what)) if attempt < GET_OR_CREATE_ATTEMPTS => {
                debug!(kind = kind.label(), %what, attempt, "get_or_create conflict, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

pub async fn create(
    state: &AppState,
    scope: Scope,
    kind: AttrKind,
    name: &str,
) -> AppResult<AttrRecord> {
    let attr = get_or_create(state, scope, kind, name).await?;
    info!(kind = kind.label(), id = attr.id, user_id = scope.user_id(), "attribute created");
    Ok(attr)
}

pub async fn update(
    state: &AppState,
    scope: Scope,
    kind: AttrKind,
    id: i64,
    name: &str,
) -> AppResult<AttrRecord> {
    let name = checked_name(name)?;
    state
        .store
        .rename_attr(scope, kind, id, &name)
        .await?
        .ok_or_else(|| AppError::not_found(kind.label()))
}

pub async fn delete(state: &AppState, scope: Scope, kind: AttrKind, id: i64) -> AppResult<()> {
    if !state.store.delete_attr(scope, kind, id).await? {
        return Err(AppError::not_found(kind.label()));
    }
    info!(kind = kind.label(), id, user_id = scope.user_id(), "attribute deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecipeFields;
    use rust_decimal::Decimal;

    async fn recipe_with(state: &AppState, scope: Scope, kind: AttrKind, ids: &[i64]) -> i64 {
        let fields = RecipeFields {
            title: "Sample".into(),
            time_minutes: 10,
            price: Decimal::new(500, 2),
            description: String::new(),
            link: String::new(),
        };
        let recipe = state.store.insert_recipe(scope, &fields).await.unwrap();
        state
            .store
            .replace_recipe_attrs(scope, kind, recipe.id, ids)
            .await
            .unwrap();
        recipe.id
    }

    fn names(attrs: &[AttrRecord]) -> Vec<&str> {
        attrs.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn assigned_only_parsing() {
        assert!(!parse_assigned_only(None).unwrap());
        assert!(!parse_assigned_only(Some("0")).unwrap());
        assert!(parse_assigned_only(Some("1")).unwrap());
        assert!(parse_assigned_only(Some("yes")).is_err());
    }

    #[tokio::test]
    async fn list_is_owner_scoped_and_ordered_by_name_desc() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        let other = Scope::owner(2);
        for name in ["Dessert", "Vegan", "Breakfast"] {
            create(&state, me, AttrKind::Tag, name).await.unwrap();
        }
        create(&state, other, AttrKind::Tag, "Fruity").await.unwrap();

        let tags = list(&state, me, AttrKind::Tag, false).await.unwrap();
        assert_eq!(names(&tags), vec!["Vegan", "Dessert", "Breakfast"]);
    }

    #[tokio::test]
    async fn assigned_only_filters_and_dedupes() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        let eggs = create(&state, me, AttrKind::Ingredient, "Eggs").await.unwrap();
        create(&state, me, AttrKind::Ingredient, "Lentils").await.unwrap();
        recipe_with(&state, me, AttrKind::Ingredient, &[eggs.id]).await;
        recipe_with(&state, me, AttrKind::Ingredient, &[eggs.id]).await;

        let assigned = list(&state, me, AttrKind::Ingredient, true).await.unwrap();
        assert_eq!(assigned, vec![eggs]);
    }

    #[tokio::test]
    async fn get_or_create_reuses_existing() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        let first = get_or_create(&state, me, AttrKind::Tag, "Vegan").await.unwrap();
        let second = get_or_create(&state, me, AttrKind::Tag, " Vegan ").await.unwrap();
        assert_eq!(first, second);

        let theirs = get_or_create(&state, Scope::owner(2), AttrKind::Tag, "Vegan")
            .await
            .unwrap();
        assert_ne!(first.id, theirs.id);
        assert_eq!(theirs.user_id, 2);
    }

    #[tokio::test]
    async fn foreign_entities_are_not_found() {
        let state = AppState::fake();
        let owner = Scope::owner(1);
        let intruder = Scope::owner(2);
        let tag = create(&state, owner, AttrKind::Tag, "Dinner").await.unwrap();

        let err = update(&state, intruder, AttrKind::Tag, tag.id, "Mine")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = delete(&state, intruder, AttrKind::Tag, tag.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let still = list(&state, owner, AttrKind::Tag, false).await.unwrap();
        assert_eq!(still, vec![tag]);
    }

    #[tokio::test]
    async fn foreign_rename_onto_own_name_is_not_found() {
        let state = AppState::fake();
        let owner = Scope::owner(1);
        let intruder = Scope::owner(2);
        let dinner = create(&state, owner, AttrKind::Tag, "Dinner").await.unwrap();
        create(&state, intruder, AttrKind::Tag, "Mine").await.unwrap();

        let err = update(&state, intruder, AttrKind::Tag, dinner.id, "Mine")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let still = list(&state, owner, AttrKind::Tag, false).await.unwrap();
        assert_eq!(still, vec![dinner]);
    }

    #[tokio::test]
    async fn update_and_delete_own_entity() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        let tag = create(&state, me, AttrKind::Tag, "Dinner").await.unwrap();

        let renamed = update(&state, me, AttrKind::Tag, tag.id, "Lunch").await.unwrap();
        assert_eq!(renamed.name, "Lunch");

        delete(&state, me, AttrKind::Tag, tag.id).await.unwrap();
        let err = delete(&state, me, AttrKind::Tag, tag.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn rename_onto_existing_name_conflicts() {
        let state = AppState::fake();
        let me = Scope::owner(1);
        create(&state, me, AttrKind::Tag, "Lunch").await.unwrap();
        let dinner = create(&state, me, AttrKind::Tag, "Dinner").await.unwrap();
        let err = update(&state, me, AttrKind::Tag, dinner.id, "Lunch")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let state = AppState::fake();
        let err = create(&state, Scope::owner(1), AttrKind::Tag, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
