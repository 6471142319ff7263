use std::fmt;

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Moderation state of a dish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DishStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl DishStatus {
    pub const ALL: [DishStatus; 4] = [
        DishStatus::Draft,
        DishStatus::Pending,
        DishStatus::Approved,
        DishStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DishStatus::Draft => "draft",
            DishStatus::Pending => "pending",
            DishStatus::Approved => "approved",
            DishStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    /// Unknown stored values render as drafts.
    pub fn from_stored(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(DishStatus::Draft)
    }
}

impl fmt::Display for DishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DishRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub servings: i32,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub main_image: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct IngredientRow {
    #[serde(skip)]
    pub dish_id: Uuid,
    pub name: String,
    pub amount: Option<String>,
    pub unit: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StepRow {
    #[serde(skip)]
    pub dish_id: Uuid,
    pub step_number: i32,
    pub description: String,
    pub image_url: Option<String>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CategoryRow {
    pub dish_id: Uuid,
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct RatingRow {
    pub dish_id: Uuid,
    pub rating: i32,
}
