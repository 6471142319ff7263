use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Application-level user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub profile_tag: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// What other signed-in users may see when looking a handle up.
#[derive(Debug, Clone, Serialize)]
pub struct TaggedProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub profile_tag: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Profile> for TaggedProfile {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            email: p.email,
            full_name: p.full_name,
            profile_tag: p.profile_tag,
            avatar_url: p.avatar_url,
            created_at: p.created_at,
        }
    }
}

/// Author card shown next to dishes.
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Profile> for PublicProfile {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            full_name: p.full_name,
            avatar_url: p.avatar_url,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::User, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields written by a profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub profile_tag: Option<String>,
    pub avatar_url: Option<String>,
}

/// Admin listing query after clamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileQuery {
    pub offset: i64,
    pub limit: i64,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfilePage {
    pub rows: Vec<Profile>,
    pub total: i64,
}

/// Tables holding rows that reference a profile and must be cleared before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependentTable {
    Comments,
    Ratings,
    CollectionDishes,
    Collections,
    DishCategories,
    DishIngredients,
    DishSteps,
    Dishes,
}

impl DependentTable {
    pub fn table(self) -> &'static str {
        match self {
            DependentTable::Comments => "comments",
            DependentTable::Ratings => "ratings",
            DependentTable::CollectionDishes => "collection_dishes",
            DependentTable::Collections => "collections",
            DependentTable::DishCategories => "dish_categories",
            DependentTable::DishIngredients => "dish_ingredients",
            DependentTable::DishSteps => "dish_steps",
            DependentTable::Dishes => "dishes",
        }
    }
}

impl fmt::Display for DependentTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}
