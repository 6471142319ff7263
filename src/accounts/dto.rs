use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::{Profile, ProfileQuery};

pub const MAX_PAGE_SIZE: i64 = 100;

/// Clamped page selection for the admin user listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn clamped(page: i64, limit: i64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn query(&self, search: Option<&str>) -> ProfileQuery {
        let search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        ProfileQuery {
            offset: self.offset(),
            limit: self.limit,
            search,
        }
    }

    pub fn info(&self, total: i64) -> PageInfo {
        PageInfo {
            page: self.page,
            limit: self.limit,
            total,
            total_pages: total / self.limit + i64::from(total % self.limit != 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<Profile>,
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarUpload {
    pub avatar_url: String,
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub recipes_created: i64,
    pub likes_given: i64,
    pub favorite_recipes: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    pub email_confirmed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub total_users: i64,
    pub role_distribution: BTreeMap<String, i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

/// A best-effort step that failed during account deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepWarning {
    pub step: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletionReport {
    pub warnings: Vec<StepWarning>,
}

// --- request bodies ---

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: String,
    pub full_name: Option<String>,
    pub profile_tag: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub search: Option<String>,
}
fn default_page() -> i64 { 1 }
fn default_limit() -> i64 { 10 }

// --- response bodies ---

#[derive(Debug, Serialize)]
pub struct ProfileBody<T: Serialize> {
    pub profile: T,
}

#[derive(Debug, Serialize)]
pub struct UserBody {
    pub user: Profile,
}

#[derive(Debug, Serialize)]
pub struct StatsBody<T: Serialize> {
    pub stats: T,
}

#[derive(Debug, Serialize)]
pub struct Empty {}
