use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use tracing::{instrument, warn};

use super::dto::{
    ChangePasswordRequest, Empty, ProfileBody, StatsBody, UpdateProfileRequest, UpdateRoleRequest,
    UserBody, UserListQuery,
};
use super::repo_types::ProfileChanges;
use super::validation::VALIDATION_FAILED;
use crate::{
    auth::{AdminUser, AuthUser},
    error::{Envelope, ServiceError, ServiceResult},
    state::AppState,
};

/// Headroom over the avatar limit so oversized files reach validation.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn profile_routes(max_avatar_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/profile/password", put(change_password))
        .route("/profile/stats", get(get_user_stats))
        .route(
            "/profile/avatar",
            post(upload_avatar).layer(DefaultBodyLimit::max(max_avatar_bytes + MULTIPART_OVERHEAD)),
        )
        .route("/profiles/tag/:tag", get(get_user_by_tag))
        .route("/users/:id/public", get(get_public_profile))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", get(get_user_details).delete(delete_user))
        .route("/admin/users/:id/role", put(update_user_role))
        .route("/admin/stats", get(get_system_stats))
}

// --- profile ---

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ServiceResult<Envelope<ProfileBody<super::repo_types::Profile>>> {
    let profile = state.accounts.get_profile(&user_id.to_string()).await?;
    Ok(Envelope::ok(ProfileBody { profile }))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> ServiceResult<Envelope<ProfileBody<super::repo_types::Profile>>> {
    let email = payload.email.trim().to_lowercase();
    let changes = ProfileChanges {
        full_name: payload.full_name,
        profile_tag: payload.profile_tag,
        avatar_url: payload.avatar_url,
    };
    let profile = state
        .accounts
        .update_profile(&user_id.to_string(), &email, changes)
        .await?;
    Ok(Envelope::with_message(
        ProfileBody { profile },
        "Profile updated successfully",
    ))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> ServiceResult<Envelope<Empty>> {
    state
        .accounts
        .change_password(&user_id.to_string(), &payload.current_password, &payload.new_password)
        .await?;
    Ok(Envelope::with_message(Empty {}, "Password updated successfully"))
}

#[instrument(skip(state))]
pub async fn get_user_stats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ServiceResult<Envelope<StatsBody<super::dto::UserStats>>> {
    let stats = state.accounts.get_user_stats(&user_id.to_string()).await?;
    Ok(Envelope::ok(StatsBody { stats }))
}

/// POST /profile/avatar (multipart), field `avatar`.
#[instrument(skip(state, mp))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> ServiceResult<Envelope<super::dto::AvatarUpload>> {
    let mut file: Option<(Bytes, String, String)> = None;
    loop {
        let field = match mp.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "malformed multipart body");
                return Err(ServiceError::validation(VALIDATION_FAILED, e.body_text()));
            }
        };
        if field.name() != Some("avatar") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let filename = field.file_name().unwrap_or("avatar").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ServiceError::validation(VALIDATION_FAILED, e.body_text()))?;
        file = Some((data, content_type, filename));
    }

    let (body, content_type, filename) = file
        .ok_or_else(|| ServiceError::validation(VALIDATION_FAILED, "No file uploaded"))?;

    let upload = state
        .accounts
        .upload_avatar(&user_id.to_string(), body, &content_type, &filename)
        .await?;
    Ok(Envelope::with_message(upload, "Avatar uploaded successfully"))
}

#[instrument(skip(state, _caller))]
pub async fn get_user_by_tag(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(tag): Path<String>,
) -> ServiceResult<Envelope<ProfileBody<super::repo_types::TaggedProfile>>> {
    let profile = state.accounts.get_user_by_tag(&tag).await?;
    Ok(Envelope::ok(ProfileBody { profile }))
}

#[instrument(skip(state))]
pub async fn get_public_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<ProfileBody<super::repo_types::PublicProfile>>> {
    let profile = state.accounts.get_public_profile(&id).await?;
    Ok(Envelope::ok(ProfileBody { profile }))
}

// --- admin ---

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(q): Query<UserListQuery>,
) -> ServiceResult<Envelope<super::dto::UserPage>> {
    let page = state
        .accounts
        .list_users(q.page, q.limit, q.search.as_deref())
        .await?;
    Ok(Envelope::ok(page))
}

#[instrument(skip(state, _admin))]
pub async fn get_user_details(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<UserBody>> {
    let user = state.accounts.get_user_details_for_admin(&id).await?;
    Ok(Envelope::ok(UserBody { user }))
}

#[instrument(skip(state, admin, payload))]
pub async fn update_user_role(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ServiceResult<Envelope<UserBody>> {
    let user = state.accounts.update_user_role(&id, &payload.role).await?;
    tracing::info!(admin_id = %admin.0, user_id = %id, role = %payload.role, "role changed by admin");
    Ok(Envelope::with_message(
        UserBody { user },
        "User role updated successfully",
    ))
}

#[instrument(skip(state, admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<super::dto::DeletionReport>> {
    if admin.0.to_string() == id {
        return Err(ServiceError::validation(
            VALIDATION_FAILED,
            "Admins cannot delete their own account",
        ));
    }
    let report = state.accounts.delete_user_by_admin(&id).await?;
    Ok(Envelope::with_message(
        report,
        "User and all related data deleted successfully",
    ))
}

#[instrument(skip(state, _admin))]
pub async fn get_system_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ServiceResult<Envelope<StatsBody<super::dto::SystemStats>>> {
    let stats = state.accounts.get_system_stats().await?;
    Ok(Envelope::ok(StatsBody { stats }))
}
