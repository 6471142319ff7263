use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{CategoryRow, DishRow, DishStatus, IngredientRow, RatingRow, StepRow};
use crate::accounts::repo::like_pattern;
use crate::error::StoreResult;

const DISH_COLUMNS: &str = "id, user_id, title, description, servings, status, rejection_reason, \
                            main_image, created_at, updated_at";

pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    status: Option<DishStatus>,
    search: Option<&str>,
) -> StoreResult<Vec<DishRow>> {
    let pattern = search.map(like_pattern);
    let rows = sqlx::query_as::<_, DishRow>(&format!(
        r#"
        SELECT {DISH_COLUMNS}
        FROM dishes
        WHERE user_id = $1
          AND ($2::text IS NULL OR status = $2)
          AND ($3::text IS NULL OR title ILIKE $3 OR description ILIKE $3)
        ORDER BY created_at DESC
        "#
    ))
    .bind(user_id)
    .bind(status.map(|s| s.as_str()))
    .bind(pattern.as_deref())
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn get_dish(db: &PgPool, dish_id: Uuid) -> StoreResult<DishRow> {
    let row = sqlx::query_as::<_, DishRow>(&format!(
        "SELECT {DISH_COLUMNS} FROM dishes WHERE id = $1"
    ))
    .bind(dish_id)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn ingredients_for(db: &PgPool, dish_ids: &[Uuid]) -> StoreResult<Vec<IngredientRow>> {
    let rows = sqlx::query_as::<_, IngredientRow>(
        r#"
        SELECT dish_id, name, amount, unit, position
        FROM dish_ingredients
        WHERE dish_id = ANY($1)
        ORDER BY position
        "#,
    )
    .bind(dish_ids)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn steps_for(db: &PgPool, dish_ids: &[Uuid]) -> StoreResult<Vec<StepRow>> {
    let rows = sqlx::query_as::<_, StepRow>(
        r#"
        SELECT dish_id, step_number, description, image_url, duration_minutes
        FROM dish_steps
        WHERE dish_id = ANY($1)
        ORDER BY step_number
        "#,
    )
    .bind(dish_ids)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn categories_for(db: &PgPool, dish_ids: &[Uuid]) -> StoreResult<Vec<CategoryRow>> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        r#"
        SELECT dc.dish_id, c.id, c.name
        FROM dish_categories dc
        JOIN categories c ON c.id = dc.category_id
        WHERE dc.dish_id = ANY($1)
        ORDER BY c.name
        "#,
    )
    .bind(dish_ids)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn ratings_for(db: &PgPool, dish_ids: &[Uuid]) -> StoreResult<Vec<RatingRow>> {
    let rows = sqlx::query_as::<_, RatingRow>(
        "SELECT dish_id, rating FROM ratings WHERE dish_id = ANY($1)",
    )
    .bind(dish_ids)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
