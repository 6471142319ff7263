use std::collections::HashMap;

use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::dto::{CategoryItem, DishDetails, DishListItem};
use super::repo;
use super::repo_types::{CategoryRow, DishRow, DishStatus, IngredientRow, RatingRow, StepRow};
use crate::error::{ServiceError, ServiceResult, StoreError};

pub const DISH_NOT_FOUND: &str = "Dish not found";
pub const DISHES_FETCH_FAILED: &str = "Unable to fetch dishes";
pub const INVALID_STATUS: &str = "Invalid status";

/// Sum of step durations in minutes.
pub fn total_cooking_time<'a>(steps: impl IntoIterator<Item = &'a StepRow>) -> i64 {
    steps
        .into_iter()
        .filter_map(|s| s.duration_minutes)
        .map(i64::from)
        .sum()
}

/// Ratings of exactly 1 are likes.
pub fn likes_count<'a>(ratings: impl IntoIterator<Item = &'a RatingRow>) -> usize {
    ratings.into_iter().filter(|r| r.rating == 1).count()
}

/// Flattens category links, dropping duplicates while keeping order.
pub fn flatten_categories<'a>(links: impl IntoIterator<Item = &'a CategoryRow>) -> Vec<CategoryItem> {
    let mut out: Vec<CategoryItem> = Vec::new();
    for link in links {
        if !out.iter().any(|c| c.id == link.id) {
            out.push(CategoryItem {
                id: link.id,
                name: link.name.clone(),
            });
        }
    }
    out
}

pub fn parse_status_filter(raw: Option<&str>) -> ServiceResult<Option<DishStatus>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => DishStatus::parse(s).map(Some).ok_or_else(|| {
            ServiceError::validation(
                INVALID_STATUS,
                "Status must be one of: draft, pending, approved, rejected",
            )
            .with("status", s)
        }),
    }
}

/// Approved dishes are public; anything else only to its author.
pub fn visible_to(dish: &DishRow, caller: Uuid) -> bool {
    dish.user_id == caller || DishStatus::from_stored(&dish.status) == DishStatus::Approved
}

fn group_by_dish<T>(rows: Vec<T>, dish_id: impl Fn(&T) -> Uuid) -> HashMap<Uuid, Vec<T>> {
    let mut map: HashMap<Uuid, Vec<T>> = HashMap::new();
    for row in rows {
        map.entry(dish_id(&row)).or_default().push(row);
    }
    map
}

pub struct Related {
    pub ingredients: Vec<IngredientRow>,
    pub steps: Vec<StepRow>,
    pub categories: Vec<CategoryRow>,
    pub ratings: Vec<RatingRow>,
}

pub fn assemble_list(dishes: Vec<DishRow>, related: Related) -> Vec<DishListItem> {
    let ingredients = group_by_dish(related.ingredients, |r| r.dish_id);
    let steps = group_by_dish(related.steps, |r| r.dish_id);
    let categories = group_by_dish(related.categories, |r| r.dish_id);
    let ratings = group_by_dish(related.ratings, |r| r.dish_id);

    dishes
        .into_iter()
        .map(|d| {
            let minutes = steps.get(&d.id).map_or(0, |s| total_cooking_time(s));
            DishListItem {
                id: d.id,
                status: DishStatus::from_stored(&d.status),
                title: d.title,
                description: d.description,
                rejection_reason: d.rejection_reason,
                main_image: d.main_image,
                servings: d.servings,
                total_cooking_time: (minutes > 0).then_some(minutes),
                likes_count: ratings.get(&d.id).map_or(0, |r| likes_count(r)),
                ingredients_count: ingredients.get(&d.id).map_or(0, Vec::len),
                categories: categories
                    .get(&d.id)
                    .map(|c| flatten_categories(c))
                    .unwrap_or_default(),
                created_at: d.created_at,
            }
        })
        .collect()
}

pub fn assemble_details(dish: DishRow, related: Related) -> DishDetails {
    DishDetails {
        id: dish.id,
        user_id: dish.user_id,
        status: DishStatus::from_stored(&dish.status),
        title: dish.title,
        description: dish.description,
        rejection_reason: dish.rejection_reason,
        main_image: dish.main_image,
        servings: dish.servings,
        total_cooking_time: total_cooking_time(&related.steps),
        likes_count: likes_count(&related.ratings),
        ratings_count: related.ratings.len(),
        categories: flatten_categories(&related.categories),
        ingredients: related.ingredients,
        steps: related.steps,
        created_at: dish.created_at,
        updated_at: dish.updated_at,
    }
}

async fn load_related(db: &PgPool, ids: &[Uuid]) -> Result<Related, StoreError> {
    let (ingredients, steps, categories, ratings) = tokio::try_join!(
        repo::ingredients_for(db, ids),
        repo::steps_for(db, ids),
        repo::categories_for(db, ids),
        repo::ratings_for(db, ids),
    )?;
    Ok(Related {
        ingredients,
        steps,
        categories,
        ratings,
    })
}

fn fetch_failed(e: StoreError) -> ServiceError {
    ServiceError::internal(DISHES_FETCH_FAILED, e.to_string())
}

pub async fn list_my_dishes(
    db: &PgPool,
    user_id: Uuid,
    status: Option<&str>,
    search: Option<&str>,
) -> ServiceResult<Vec<DishListItem>> {
    let status = parse_status_filter(status)?;
    let search = search.map(str::trim).filter(|s| !s.is_empty());

    let dishes = repo::list_by_user(db, user_id, status, search)
        .await
        .map_err(fetch_failed)?;
    if dishes.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = dishes.iter().map(|d| d.id).collect();
    let related = load_related(db, &ids).await.map_err(|e| {
        error!(user_id = %user_id, error = %e, "loading dish relations failed");
        fetch_failed(e)
    })?;
    Ok(assemble_list(dishes, related))
}

pub async fn dish_details(db: &PgPool, caller: Uuid, dish_id: Uuid) -> ServiceResult<DishDetails> {
    let not_found = || ServiceError::not_found(DISH_NOT_FOUND, DISH_NOT_FOUND).with("dish_id", dish_id);

    let dish = match repo::get_dish(db, dish_id).await {
        Ok(d) => d,
        Err(StoreError::NoRows) => return Err(not_found()),
        Err(e) => return Err(fetch_failed(e)),
    };
    if !visible_to(&dish, caller) {
        return Err(not_found());
    }

    let related = load_related(db, &[dish.id]).await.map_err(fetch_failed)?;
    Ok(assemble_details(dish, related))
}
