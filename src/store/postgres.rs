use async_trait::async_trait;
use sqlx::PgPool;

use super::{
    AttrKind, AttrRecord, NewUser, RecipeFields, RecipeFilter, RecipeRecord, Store, StoreError,
    StoreResult, UserChanges, UserRecord,
};
use crate::scope::Scope;

const USER_COLUMNS: &str = "id, email, name, password_hash, is_active, is_staff, is_superuser";
const RECIPE_COLUMNS: &str = "id, user_id, title, time_minutes, price, description, link, image";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.constraint().unwrap_or("unique").to_string());
            }
        }
        StoreError::Backend(anyhow::Error::new(e))
    }
}

/// Postgres adapter. Table names are only ever interpolated from `AttrKind`.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        let sql = format!(
            r#"
            INSERT INTO users (email, name, password_hash, is_staff, is_superuser)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(user.is_staff)
            .bind(user.is_superuser)
            .fetch_one(&self.db)
            .await?;
        Ok(row)
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> StoreResult<Option<UserRecord>> {
        let sql = format!(
            r#"
            UPDATE users
               SET email = COALESCE($2, email),
                   name = COALESCE($3, name),
                   password_hash = COALESCE($4, password_hash),
                   is_active = COALESCE($5, is_active)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(changes.email)
            .bind(changes.name)
            .bind(changes.password_hash)
            .bind(changes.is_active)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_attrs(
        &self,
        scope: Scope,
        kind: AttrKind,
        assigned_only: bool,
    ) -> StoreResult<Vec<AttrRecord>> {
        let sql = format!(
            r#"
            SELECT a.id, a.user_id, a.name
              FROM {table} a
             WHERE a.user_id = $1
               AND (NOT $2 OR EXISTS (
                    SELECT 1
                      FROM {link} l
                      JOIN recipes r ON r.id = l.recipe_id
                     WHERE l.{col} = a.id AND r.user_id = $1))
             ORDER BY a.name DESC, a.id DESC
            "#,
            table = kind.table(),
            link = kind.link_table(),
            col = kind.link_column(),
        );
        let rows = sqlx::query_as::<_, AttrRecord>(&sql)
            .bind(scope.user_id())
            .bind(assigned_only)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn get_or_create_attr(
        &self,
        scope: Scope,
        kind: AttrKind,
        name: &str,
    ) -> StoreResult<AttrRecord> {
        let insert = format!(
            r#"
            INSERT INTO {table} (user_id, name)
            VALUES ($1, $2)
            ON CONFLICT (user_id, name) DO NOTHING
            RETURNING id, user_id, name
            "#,
            table = kind.table(),
        );
        if let Some(row) = sqlx::query_as::<_, AttrRecord>(&insert)
            .bind(scope.user_id())
            .bind(name)
            .fetch_optional(&self.db)
            .await?
        {
            return Ok(row);
        }

        let select = format!(
            "SELECT id, user_id, name FROM {table} WHERE user_id = $1 AND name = $2",
            table = kind.table(),
        );
        sqlx::query_as::<_, AttrRecord>(&select)
            .bind(scope.user_id())
            .bind(name)
            .fetch_optional(&self.db)
            .await?
            // Lost a race with a concurrent delete; the caller retries.
            .ok_or_else(|| StoreError::Conflict(format!("{}.name", kind.table())))
    }

    async fn rename_attr(
        &self,
        scope: Scope,
        kind: AttrKind,
        id: i64,
        name: &str,
    ) -> StoreResult<Option<AttrRecord>> {
        let sql = format!(
            r#"
            UPDATE {table} SET name = $3
             WHERE id = $2 AND user_id = $1
            RETURNING id, user_id, name
            "#,
            table = kind.table(),
        );
        let row = sqlx::query_as::<_, AttrRecord>(&sql)
            .bind(scope.user_id())
            .bind(id)
            .bind(name)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn delete_attr(&self, scope: Scope, kind: AttrKind, id: i64) -> StoreResult<bool> {
        let sql = format!(
            "DELETE FROM {table} WHERE id = $2 AND user_id = $1",
            table = kind.table(),
        );
        let res = sqlx::query(&sql)
            .bind(scope.user_id())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_recipes(
        &self,
        scope: Scope,
        filter: &RecipeFilter,
    ) -> StoreResult<Vec<RecipeRecord>> {
        let sql = format!(
            r#"
            SELECT {RECIPE_COLUMNS}
              FROM recipes r
             WHERE r.user_id = $1
               AND ($2::BIGINT[] IS NULL OR EXISTS (
                    SELECT 1 FROM recipe_tags rt
                     WHERE rt.recipe_id = r.id AND rt.tag_id = ANY($2)))
               AND ($3::BIGINT[] IS NULL OR EXISTS (
                    SELECT 1 FROM recipe_ingredients ri
                     WHERE ri.recipe_id = r.id AND ri.ingredient_id = ANY($3)))
             ORDER BY r.id DESC
            "#
        );
        let rows = sqlx::query_as::<_, RecipeRecord>(&sql)
            .bind(scope.user_id())
            .bind(filter.tag_ids.clone())
            .bind(filter.ingredient_ids.clone())
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn find_recipe(&self, scope: Scope, id: i64) -> StoreResult<Option<RecipeRecord>> {
        let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $2 AND user_id = $1");
        let row = sqlx::query_as::<_, RecipeRecord>(&sql)
            .bind(scope.user_id())
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn insert_recipe(
        &self,
        scope: Scope,
        fields: &RecipeFields,
    ) -> StoreResult<RecipeRecord> {
        let sql = format!(
            r#"
            INSERT INTO recipes (user_id, title, time_minutes, price, description, link)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {RECIPE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RecipeRecord>(&sql)
            .bind(scope.user_id())
            .bind(&fields.title)
            .bind(fields.time_minutes)
            .bind(fields.price)
            .bind(&fields.description)
            .bind(&fields.link)
            .fetch_one(&self.db)
            .await?;
        Ok(row)
    }

    async fn update_recipe(
        &self,
        scope: Scope,
        id: i64,
        fields: &RecipeFields,
    ) -> StoreResult<Option<RecipeRecord>> {
        let sql = format!(
            r#"
            UPDATE recipes
               SET title = $3, time_minutes = $4, price = $5, description = $6, link = $7
             WHERE id = $2 AND user_id = $1
            RETURNING {RECIPE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RecipeRecord>(&sql)
            .bind(scope.user_id())
            .bind(id)
            .bind(&fields.title)
            .bind(fields.time_minutes)
            .bind(fields.price)
            .bind(&fields.description)
            .bind(&fields.link)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn set_recipe_image(
        &self,
        scope: Scope,
        id: i64,
        image: Option<&str>,
    ) -> StoreResult<Option<RecipeRecord>> {
        let sql = format!(
            r#"
            UPDATE recipes SET image = $3
             WHERE id = $2 AND user_id = $1
            RETURNING {RECIPE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RecipeRecord>(&sql)
            .bind(scope.user_id())
            .bind(id)
            .bind(image)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn delete_recipe(&self, scope: Scope, id: i64) -> StoreResult<bool> {
        // Join rows go with ON DELETE CASCADE.
        let res = sqlx::query("DELETE FROM recipes WHERE id = $2 AND user_id = $1")
            .bind(scope.user_id())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn recipe_attrs(
        &self,
        scope: Scope,
        kind: AttrKind,
        recipe_id: i64,
    ) -> StoreResult<Vec<AttrRecord>> {
        let sql = format!(
            r#"
            SELECT a.id, a.user_id, a.name
              FROM {table} a
              JOIN {link} l ON l.{col} = a.id
              JOIN recipes r ON r.id = l.recipe_id
             WHERE r.id = $2 AND r.user_id = $1
             ORDER BY a.name, a.id
            "#,
            table = kind.table(),
            link = kind.link_table(),
            col = kind.link_column(),
        );
        let rows = sqlx::query_as::<_, AttrRecord>(&sql)
            .bind(scope.user_id())
            .bind(recipe_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn replace_recipe_attrs(
        &self,
        scope: Scope,
        kind: AttrKind,
        recipe_id: i64,
        attr_ids: &[i64],
    ) -> StoreResult<()> {
        let clear = format!(
            r#"
            DELETE FROM {link} l
             USING recipes r
             WHERE r.id = l.recipe_id AND l.recipe_id = $2 AND r.user_id = $1
            "#,
            link = kind.link_table(),
        );
        let add = format!(
            r#"
            INSERT INTO {link} (recipe_id, {col})
            SELECT r.id, a.id
              FROM recipes r
              JOIN {table} a ON a.user_id = r.user_id
             WHERE r.id = $2 AND r.user_id = $1 AND a.id = ANY($3)
            ON CONFLICT DO NOTHING
            "#,
            table = kind.table(),
            link = kind.link_table(),
            col = kind.link_column(),
        );

        let mut tx = self.db.begin().await?;
        sqlx::query(&clear)
            .bind(scope.user_id())
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&add)
            .bind(scope.user_id())
            .bind(recipe_id)
            .bind(attr_ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
