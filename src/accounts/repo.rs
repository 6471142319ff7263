use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{DependentTable, Profile, ProfileChanges, ProfilePage, ProfileQuery, Role};
use crate::error::{StoreError, StoreResult};

/// Relational store used by the account service.
///
/// Single-row reads follow "exactly one" semantics and report a missing
/// row as [`StoreError::NoRows`].
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Profile>;
    async fn get_profile_by_tag(&self, tag: &str) -> StoreResult<Profile>;
    /// True when a profile other than `exclude` already holds `tag`.
    async fn tag_taken(&self, tag: &str, exclude: Option<Uuid>) -> StoreResult<bool>;
    /// `None` when no profile carries `email` or it has no name.
    async fn full_name_by_email(&self, email: &str) -> StoreResult<Option<String>>;

    async fn update_profile(&self, id: Uuid, email: &str, changes: &ProfileChanges) -> StoreResult<Profile>;
    async fn set_avatar_url(&self, id: Uuid, url: &str) -> StoreResult<Profile>;
    async fn set_role(&self, id: Uuid, role: Role) -> StoreResult<Profile>;

    async fn list_profiles(&self, query: &ProfileQuery) -> StoreResult<ProfilePage>;
    async fn count_profiles(&self) -> StoreResult<i64>;
    async fn list_roles(&self) -> StoreResult<Vec<String>>;

    async fn count_dishes_by_user(&self, user_id: Uuid) -> StoreResult<i64>;
    async fn count_likes_by_user(&self, user_id: Uuid) -> StoreResult<i64>;
    async fn count_collection_items_by_user(&self, user_id: Uuid) -> StoreResult<i64>;

    /// Removes the caller's rows from `table`; returns affected row count.
    async fn delete_dependents(&self, table: DependentTable, user_id: Uuid) -> StoreResult<u64>;
    async fn delete_profile(&self, id: Uuid) -> StoreResult<u64>;

    /// Zero-or-one variant of [`ProfileStore::get_profile`].
    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        match self.get_profile(id).await {
            Ok(p) => Ok(Some(p)),
            Err(StoreError::NoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

const PROFILE_COLUMNS: &str =
    "id, email, full_name, profile_tag, avatar_url, role, created_at, updated_at";

#[derive(Clone)]
pub struct PgProfileStore {
    db: PgPool,
}

impl PgProfileStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn count(&self, sql: &str, user_id: Uuid) -> StoreResult<i64> {
        let (n,): (i64,) = sqlx::query_as(sql).bind(user_id).fetch_one(&self.db).await?;
        Ok(n)
    }
}

/// Escapes LIKE metacharacters and wraps the term for substring matching.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Profile> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        let profile = sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .fetch_one(&self.db)
            .await?;
        Ok(profile)
    }

    async fn get_profile_by_tag(&self, tag: &str) -> StoreResult<Profile> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE profile_tag = $1");
        let profile = sqlx::query_as::<_, Profile>(&sql)
            .bind(tag)
            .fetch_one(&self.db)
            .await?;
        Ok(profile)
    }

    async fn tag_taken(&self, tag: &str, exclude: Option<Uuid>) -> StoreResult<bool> {
        let (taken,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM profiles
                WHERE profile_tag = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(tag)
        .bind(exclude)
        .fetch_one(&self.db)
        .await?;
        Ok(taken)
    }

    async fn full_name_by_email(&self, email: &str) -> StoreResult<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as(r#"SELECT full_name FROM profiles WHERE email = $1 LIMIT 1"#)
                .bind(email)
                .fetch_optional(&self.db)
                .await?;
        Ok(row.and_then(|(name,)| name))
    }

    async fn update_profile(&self, id: Uuid, email: &str, changes: &ProfileChanges) -> StoreResult<Profile> {
        let sql = format!(
            r#"
            UPDATE profiles
               SET email = $2,
                   full_name = COALESCE($3, full_name),
                   profile_tag = COALESCE($4, profile_tag),
                   avatar_url = COALESCE($5, avatar_url),
                   updated_at = now()
             WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        );
        let profile = sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .bind(email)
            .bind(changes.full_name.as_deref())
            .bind(changes.profile_tag.as_deref())
            .bind(changes.avatar_url.as_deref())
            .fetch_one(&self.db)
            .await?;
        Ok(profile)
    }

    async fn set_avatar_url(&self, id: Uuid, url: &str) -> StoreResult<Profile> {
        let sql = format!(
            "UPDATE profiles SET avatar_url = $2, updated_at = now() WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        );
        let profile = sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .bind(url)
            .fetch_one(&self.db)
            .await?;
        Ok(profile)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> StoreResult<Profile> {
        let sql = format!(
            "UPDATE profiles SET role = $2, updated_at = now() WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        );
        let profile = sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_one(&self.db)
            .await?;
        Ok(profile)
    }

    async fn list_profiles(&self, query: &ProfileQuery) -> StoreResult<ProfilePage> {
        let pattern = query.search.as_deref().map(like_pattern);
        let filter = r#"($1::text IS NULL
                         OR full_name ILIKE $1
                         OR profile_tag ILIKE $1
                         OR email ILIKE $1)"#;

        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM profiles WHERE {filter}"))
            .bind(pattern.as_deref())
            .fetch_one(&self.db)
            .await?;

        let sql = format!(
            r#"
            SELECT {PROFILE_COLUMNS}
            FROM profiles
            WHERE {filter}
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, Profile>(&sql)
            .bind(pattern.as_deref())
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.db)
            .await?;

        Ok(ProfilePage { rows, total })
    }

    async fn count_profiles(&self) -> StoreResult<i64> {
        let (n,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM profiles"#)
            .fetch_one(&self.db)
            .await?;
        Ok(n)
    }

    async fn list_roles(&self) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(r#"SELECT role FROM profiles"#)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|(r,)| r).collect())
    }

    async fn count_dishes_by_user(&self, user_id: Uuid) -> StoreResult<i64> {
        self.count(r#"SELECT COUNT(*) FROM dishes WHERE user_id = $1"#, user_id)
            .await
    }

    async fn count_likes_by_user(&self, user_id: Uuid) -> StoreResult<i64> {
        self.count(
            r#"SELECT COUNT(*) FROM ratings WHERE user_id = $1 AND rating = 1"#,
            user_id,
        )
        .await
    }

    async fn count_collection_items_by_user(&self, user_id: Uuid) -> StoreResult<i64> {
        self.count(
            r#"SELECT COUNT(*) FROM collection_dishes WHERE user_id = $1"#,
            user_id,
        )
        .await
    }

    async fn delete_dependents(&self, table: DependentTable, user_id: Uuid) -> StoreResult<u64> {
        let sql = match table {
            DependentTable::Comments => "DELETE FROM comments WHERE user_id = $1",
            DependentTable::Ratings => "DELETE FROM ratings WHERE user_id = $1",
            DependentTable::CollectionDishes => {
                "DELETE FROM collection_dishes
                  WHERE collection_id IN (SELECT id FROM collections WHERE user_id = $1)"
            }
            DependentTable::Collections => "DELETE FROM collections WHERE user_id = $1",
            DependentTable::DishCategories => {
                "DELETE FROM dish_categories
                  WHERE dish_id IN (SELECT id FROM dishes WHERE user_id = $1)"
            }
            DependentTable::DishIngredients => {
                "DELETE FROM dish_ingredients
                  WHERE dish_id IN (SELECT id FROM dishes WHERE user_id = $1)"
            }
            DependentTable::DishSteps => {
                "DELETE FROM dish_steps
                  WHERE dish_id IN (SELECT id FROM dishes WHERE user_id = $1)"
            }
            DependentTable::Dishes => "DELETE FROM dishes WHERE user_id = $1",
        };
        let res = sqlx::query(sql).bind(user_id).execute(&self.db).await?;
        Ok(res.rows_affected())
    }

    async fn delete_profile(&self, id: Uuid) -> StoreResult<u64> {
        let res = sqlx::query(r#"DELETE FROM profiles WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }
}
