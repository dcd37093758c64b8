use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    AttrKind, AttrRecord, NewUser, RecipeFields, RecipeFilter, RecipeRecord, Store, StoreError,
    StoreResult, UserChanges, UserRecord,
};
use crate::scope::Scope;

#[derive(Default)]
struct Tables {
    user_seq: i64,
    attr_seq: HashMap<AttrKind, i64>,
    recipe_seq: i64,
    users: BTreeMap<i64, UserRecord>,
    attrs: HashMap<AttrKind, BTreeMap<i64, AttrRecord>>,
    recipes: BTreeMap<i64, RecipeRecord>,
    /// (recipe_id, attr_id) pairs per kind.
    links: HashMap<AttrKind, BTreeSet<(i64, i64)>>,
}

impl Tables {
    fn owned_recipe(&self, scope: Scope, id: i64) -> Option<&RecipeRecord> {
        self.recipes.get(&id).filter(|r| scope.owns(r.user_id))
    }

    fn attrs(&self, kind: AttrKind) -> impl Iterator<Item = &AttrRecord> {
        self.attrs.get(&kind).into_iter().flat_map(|m| m.values())
    }

    fn links(&self, kind: AttrKind) -> impl Iterator<Item = &(i64, i64)> {
        self.links.get(&kind).into_iter().flat_map(|s| s.iter())
    }

    fn unlink_recipe(&mut self, recipe_id: i64) {
        for set in self.links.values_mut() {
            set.retain(|(r, _)| *r != recipe_id);
        }
    }
}

/// Process-local store. Data lives as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("users.email".into()));
        }
        t.user_seq += 1;
        let record = UserRecord {
            id: t.user_seq,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            is_active: true,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        };
        t.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<UserRecord>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> StoreResult<Option<UserRecord>> {
        let mut t = self.tables.write().await;
        if let Some(email) = &changes.email {
            if t.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::Conflict("users.email".into()));
            }
        }
        let Some(user) = t.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(active) = changes.is_active {
            user.is_active = active;
        }
        Ok(Some(user.clone()))
    }

    async fn list_attrs(
        &self,
        scope: Scope,
        kind: AttrKind,
        assigned_only: bool,
    ) -> StoreResult<Vec<AttrRecord>> {
        let t = self.tables.read().await;
        let assigned: BTreeSet<i64> = t
            .links(kind)
            .filter(|(recipe_id, _)| t.owned_recipe(scope, *recipe_id).is_some())
            .map(|(_, attr_id)| *attr_id)
            .collect();
        let mut out: Vec<AttrRecord> = t
            .attrs(kind)
            .filter(|a| scope.owns(a.user_id))
            .filter(|a| !assigned_only || assigned.contains(&a.id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.name.cmp(&a.name).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn get_or_create_attr(
        &self,
        scope: Scope,
        kind: AttrKind,
        name: &str,
    ) -> StoreResult<AttrRecord> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t
            .attrs(kind)
            .find(|a| scope.owns(a.user_id) && a.name == name)
        {
            return Ok(existing.clone());
        }
        let seq = t.attr_seq.entry(kind).or_default();
        *seq += 1;
        let record = AttrRecord {
            id: *seq,
            user_id: scope.user_id(),
            name: name.to_string(),
        };
        t.attrs
            .entry(kind)
            .or_default()
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn rename_attr(
        &self,
        scope: Scope,
        kind: AttrKind,
        id: i64,
        name: &str,
    ) -> StoreResult<Option<AttrRecord>> {
        let mut t = self.tables.write().await;
        let owned = t
            .attrs
            .get(&kind)
            .and_then(|m| m.get(&id))
            .is_some_and(|a| scope.owns(a.user_id));
        if !owned {
            return Ok(None);
        }
        if t
            .attrs(kind)
            .any(|a| scope.owns(a.user_id) && a.id != id && a.name == name)
        {
            return Err(StoreError::Conflict(format!("{}.name", kind.table())));
        }
        let Some(attr) = t
            .attrs
            .get_mut(&kind)
            .and_then(|m| m.get_mut(&id))
            .filter(|a| scope.owns(a.user_id))
        else {
            return Ok(None);
        };
        attr.name = name.to_string();
        Ok(Some(attr.clone()))
    }

    async fn delete_attr(&self, scope: Scope, kind: AttrKind, id: i64) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        let owned = t
            .attrs
            .get(&kind)
            .and_then(|m| m.get(&id))
            .is_some_and(|a| scope.owns(a.user_id));
        if !owned {
            return Ok(false);
        }
        if let Some(m) = t.attrs.get_mut(&kind) {
            m.remove(&id);
        }
        if let Some(set) = t.links.get_mut(&kind) {
            set.retain(|(_, attr_id)| *attr_id != id);
        }
        Ok(true)
    }

    async fn list_recipes(
        &self,
        scope: Scope,
        filter: &RecipeFilter,
    ) -> StoreResult<Vec<RecipeRecord>> {
        let t = self.tables.read().await;
        let matches = |kind: AttrKind, recipe_id: i64| match filter.ids(kind) {
            None => true,
            Some(ids) => t
                .links(kind)
                .any(|(r, a)| *r == recipe_id && ids.contains(a)),
        };
        Ok(t.recipes
            .values()
            .rev()
            .filter(|r| scope.owns(r.user_id))
            .filter(|r| matches(AttrKind::Tag, r.id) && matches(AttrKind::Ingredient, r.id))
            .cloned()
            .collect())
    }

    async fn find_recipe(&self, scope: Scope, id: i64) -> StoreResult<Option<RecipeRecord>> {
        Ok(self.tables.read().await.owned_recipe(scope, id).cloned())
    }

    async fn insert_recipe(
        &self,
        scope: Scope,
        fields: &RecipeFields,
    ) -> StoreResult<RecipeRecord> {
        let mut t = self.tables.write().await;
        t.recipe_seq += 1;
        let record = RecipeRecord {
            id: t.recipe_seq,
            user_id: scope.user_id(),
            title: fields.title.clone(),
            time_minutes: fields.time_minutes,
            price: fields.price,
            description: fields.description.clone(),
            link: fields.link.clone(),
            image: None,
        };
        t.recipes.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_recipe(
        &self,
        scope: Scope,
        id: i64,
        fields: &RecipeFields,
    ) -> StoreResult<Option<RecipeRecord>> {
        let mut t = self.tables.write().await;
        let Some(r) = t.recipes.get_mut(&id).filter(|r| scope.owns(r.user_id)) else {
            return Ok(None);
        };
        r.title = fields.title.clone();
        r.time_minutes = fields.time_minutes;
        r.price = fields.price;
        r.description = fields.description.clone();
        r.link = fields.link.clone();
        Ok(Some(r.clone()))
    }

    async fn set_recipe_image(
        &self,
        scope: Scope,
        id: i64,
        image: Option<&str>,
    ) -> StoreResult<Option<RecipeRecord>> {
        let mut t = self.tables.write().await;
        let Some(r) = t.recipes.get_mut(&id).filter(|r| scope.owns(r.user_id)) else {
            return Ok(None);
        };
        r.image = image.map(str::to_string);
        Ok(Some(r.clone()))
    }

    async fn delete_recipe(&self, scope: Scope, id: i64) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        if t.owned_recipe(scope, id).is_none() {
            return Ok(false);
        }
        t.recipes.remove(&id);
        t.unlink_recipe(id);
        Ok(true)
    }

    async fn recipe_attrs(
        &self,
        scope: Scope,
        kind: AttrKind,
        recipe_id: i64,
    ) -> StoreResult<Vec<AttrRecord>> {
        let t = self.tables.read().await;
        if t.owned_recipe(scope, recipe_id).is_none() {
            return Ok(Vec::new());
        }
        let ids: BTreeSet<i64> = t
            .links(kind)
            .filter(|(r, _)| *r == recipe_id)
            .map(|(_, a)| *a)
            .collect();
        let mut out: Vec<AttrRecord> = t
            .attrs(kind)
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn replace_recipe_attrs(
        &self,
        scope: Scope,
        kind: AttrKind,
        recipe_id: i64,
        attr_ids: &[i64],
    ) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.owned_recipe(scope, recipe_id).is_none() {
            return Ok(());
        }
        let owned: Vec<i64> = t
            .attrs(kind)
            .filter(|a| scope.owns(a.user_id) && attr_ids.contains(&a.id))
            .map(|a| a.id)
            .collect();
        let set = t.links.entry(kind).or_default();
        set.retain(|(r, _)| *r != recipe_id);
        set.extend(owned.into_iter().map(|a| (recipe_id, a)));
        Ok(())
    }
}
