use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{DishStatus, IngredientRow, StepRow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryItem {
    pub id: Uuid,
    pub name: String,
}

/// One card in the caller's dish list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DishListItem {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: DishStatus,
    pub rejection_reason: Option<String>,
    pub main_image: Option<String>,
    pub servings: i32,
    pub total_cooking_time: Option<i64>,
    pub likes_count: usize,
    pub ingredients_count: usize,
    pub categories: Vec<CategoryItem>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DishDetails {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: DishStatus,
    pub rejection_reason: Option<String>,
    pub main_image: Option<String>,
    pub servings: i32,
    pub total_cooking_time: i64,
    pub likes_count: usize,
    pub ratings_count: usize,
    pub categories: Vec<CategoryItem>,
    pub ingredients: Vec<IngredientRow>,
    pub steps: Vec<StepRow>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Default, Deserialize)]
pub struct DishListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DishesBody {
    pub dishes: Vec<DishListItem>,
}

#[derive(Debug, Serialize)]
pub struct DishBody {
    pub dish: DishDetails,
}
