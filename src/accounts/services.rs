use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use rand::{distributions::Alphanumeric, Rng};
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::deletion;
use super::dto::{AvatarUpload, DeletionReport, PageRequest, SystemStats, UserPage, UserStats};
use super::repo::ProfileStore;
use super::repo_types::{Profile, ProfileChanges, PublicProfile, Role, TaggedProfile};
use super::validation::{
    validate_email, validate_image, validate_password_change, validate_role, validate_user_id,
    VALIDATION_FAILED,
};
use crate::auth::{IdentityAdmin, IdentityProvider};
use crate::config::AccountConfig;
use crate::error::{ErrorDetail, ServiceError, ServiceResult, StoreError};
use crate::notify::Notifier;
use crate::storage::ObjectStorage;

pub const PROFILE_NOT_FOUND: &str = "Profile not found";
pub const USER_NOT_FOUND: &str = "User not found";
pub const TAG_EXISTS: &str = "Profile tag already exists";
pub const PASSWORD_INCORRECT: &str = "Current password is incorrect";
pub const UPLOAD_FAILED: &str = "Failed to upload avatar";
pub const SYSTEM_STATS_FAILED: &str = "Unable to fetch system stats";
pub const ROLE_STATS_FAILED: &str = "Unable to fetch role stats";
pub const INTERNAL_ERROR: &str = "Internal server error";

/// Maps a store failure, turning "no rows" into a not-found error.
fn fetch_error(e: StoreError, not_found: &'static str, not_found_msg: &str, other: &'static str) -> ServiceError {
    match e {
        StoreError::NoRows => ServiceError::not_found(not_found, not_found_msg),
        e => ServiceError::internal(other, e.to_string()),
    }
}

fn store_error(category: &'static str) -> impl FnOnce(StoreError) -> ServiceError {
    move |e| ServiceError::internal(category, e.to_string())
}

/// Logs a failed operation once, at the boundary where it is returned.
fn reported<T>(op: &'static str, res: ServiceResult<T>) -> ServiceResult<T> {
    if let Err(e) = &res {
        let detail = e.detail();
        error!(
            op,
            category = detail.category,
            error = %detail.message,
            context = ?detail.context,
            "account operation failed"
        );
    }
    res
}

/// `<user>-<millis>-<token>.<ext>`, ext taken from the MIME subtype.
pub(crate) fn avatar_object_name(user_id: Uuid, mimetype: &str, millis: i128, token: &str) -> String {
    let ext = mimetype.split('/').nth(1).unwrap_or("bin");
    format!("{user_id}-{millis}-{token}.{ext}")
}

fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(11)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

/// Account and profile operations over the store, the avatar bucket and the
/// identity provider.
pub struct AccountService {
    config: AccountConfig,
    store: Arc<dyn ProfileStore>,
    storage: Arc<dyn ObjectStorage>,
    identity: Arc<dyn IdentityProvider>,
    identity_admin: Option<Arc<dyn IdentityAdmin>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl AccountService {
    pub fn new(
        config: AccountConfig,
        store: Arc<dyn ProfileStore>,
        storage: Arc<dyn ObjectStorage>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            identity,
            identity_admin: None,
            notifier: None,
        }
    }

    pub fn with_identity_admin(mut self, admin: Arc<dyn IdentityAdmin>) -> Self {
        self.identity_admin = Some(admin);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    pub async fn get_profile(&self, user_id: &str) -> ServiceResult<Profile> {
        reported("get_profile", self.load_profile(user_id, PROFILE_NOT_FOUND, "Unable to fetch profile").await)
    }

    async fn load_profile(
        &self,
        user_id: &str,
        not_found: &'static str,
        other: &'static str,
    ) -> ServiceResult<Profile> {
        let id = validate_user_id(user_id)?;
        self.store
            .get_profile(id)
            .await
            .map_err(|e| fetch_error(e, not_found, not_found, other).with("user_id", id))
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        email: &str,
        changes: ProfileChanges,
    ) -> ServiceResult<Profile> {
        reported("update_profile", self.update_profile_inner(user_id, email, changes).await)
    }

    async fn update_profile_inner(
        &self,
        user_id: &str,
        email: &str,
        changes: ProfileChanges,
    ) -> ServiceResult<Profile> {
        let id = validate_user_id(user_id)?;
        validate_email(email)?;

        if let Some(tag) = changes.profile_tag.as_deref().filter(|t| !t.is_empty()) {
            // the store's unique index still backs this up under concurrent updates
            let taken = self
                .store
                .tag_taken(tag, Some(id))
                .await
                .map_err(store_error("Unable to check profile tag"))?;
            if taken {
                return Err(ServiceError::Duplicate(
                    ErrorDetail::new(TAG_EXISTS, "This profile tag is already taken by another user")
                        .with("profile_tag", tag),
                ));
            }
        }

        let profile = self
            .store
            .update_profile(id, email, &changes)
            .await
            .map_err(|e| fetch_error(e, PROFILE_NOT_FOUND, PROFILE_NOT_FOUND, "Unable to update profile").with("user_id", id))?;

        info!(user_id = %id, "profile updated");
        Ok(profile)
    }

    pub async fn get_user_by_tag(&self, profile_tag: &str) -> ServiceResult<TaggedProfile> {
        reported("get_user_by_tag", self.user_by_tag_inner(profile_tag).await)
    }

    async fn user_by_tag_inner(&self, profile_tag: &str) -> ServiceResult<TaggedProfile> {
        let tag = profile_tag.trim();
        if tag.is_empty() {
            return Err(ServiceError::validation(VALIDATION_FAILED, "Profile tag is required"));
        }
        let profile = self.store.get_profile_by_tag(tag).await.map_err(|e| {
            fetch_error(e, USER_NOT_FOUND, "No user found with this profile tag", "Unable to search user")
                .with("profile_tag", tag)
        })?;
        Ok(TaggedProfile::from(profile))
    }

    pub async fn get_public_profile(&self, user_id: &str) -> ServiceResult<PublicProfile> {
        reported("get_public_profile", self.public_profile_inner(user_id).await)
    }

    async fn public_profile_inner(&self, user_id: &str) -> ServiceResult<PublicProfile> {
        let id = validate_user_id(user_id)?;
        let profile = self.store.get_profile(id).await.map_err(|e| {
            fetch_error(
                e,
                USER_NOT_FOUND,
                "The requested user profile does not exist",
                "Unable to fetch profile",
            )
            .with("user_id", id)
        })?;
        Ok(PublicProfile::from(profile))
    }

    /// Activity counters for the caller. Each counter is best-effort and
    /// reads as zero when its query fails.
    pub async fn get_user_stats(&self, user_id: &str) -> ServiceResult<UserStats> {
        reported("get_user_stats", self.user_stats_inner(user_id).await)
    }

    async fn user_stats_inner(&self, user_id: &str) -> ServiceResult<UserStats> {
        let id = validate_user_id(user_id)?;
        let identity = self
            .identity
            .find_identity(id)
            .await
            .map_err(|e| ServiceError::internal(INTERNAL_ERROR, format!("{e:#}")).with("user_id", id))?
            .ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND, "Valid user object is required").with("user_id", id))?;

        let recipes_created = best_effort_count("dishes", id, self.store.count_dishes_by_user(id).await);
        let likes_given = best_effort_count("likes", id, self.store.count_likes_by_user(id).await);
        let favorite_recipes =
            best_effort_count("favorites", id, self.store.count_collection_items_by_user(id).await);

        Ok(UserStats {
            recipes_created,
            likes_given,
            favorite_recipes,
            last_login: identity.last_sign_in_at,
            email_confirmed: identity.email_confirmed_at.is_some(),
        })
    }

    /// Password change for an authenticated caller. Re-authentication uses
    /// the identity's email, which can differ from the profile's.
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        reported(
            "change_password",
            self.change_password_inner(user_id, current_password, new_password).await,
        )
    }

    async fn change_password_inner(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        let id = validate_user_id(user_id)?;
        validate_password_change(current_password, new_password)?;
        let identity = self
            .identity
            .find_identity(id)
            .await
            .map_err(|e| ServiceError::internal(INTERNAL_ERROR, format!("{e:#}")).with("user_id", id))?
            .ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND, "Valid user object is required").with("user_id", id))?;
        self.replace_password(&identity.email, current_password, new_password)
            .await
    }

    async fn replace_password(
        &self,
        email: &str,
        current_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        validate_email(email)?;

        // the provider's reason is not passed on to the caller
        let identity_id = match self.identity.verify_password(email, current_password).await {
            Ok(id) => id,
            Err(e) => {
                warn!(email = %email, error = %e, "current password verification failed");
                return Err(ServiceError::validation(
                    PASSWORD_INCORRECT,
                    "Please verify your current password",
                ));
            }
        };

        self.identity
            .update_password(identity_id, new_password)
            .await
            .map_err(|e| {
                ServiceError::internal("Unable to update password", format!("{e:#}")).with("email", email)
            })?;

        self.notify_password_changed(email).await;

        info!(email = %email, "password updated");
        Ok(())
    }

    async fn notify_password_changed(&self, email: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = self.send_password_notice(notifier.as_ref(), email).await {
            warn!(
                email = %email,
                error = %e,
                side_effect = "password_change_notice",
                "failed to send password change notification"
            );
        }
    }

    async fn send_password_notice(&self, notifier: &dyn Notifier, email: &str) -> anyhow::Result<()> {
        // a missing profile row still gets the notice, without a name
        let full_name = self.store.full_name_by_email(email).await?;
        notifier.password_changed(email, full_name.as_deref()).await
    }

    pub async fn upload_avatar(
        &self,
        user_id: &str,
        body: Bytes,
        mimetype: &str,
        filename: &str,
    ) -> ServiceResult<AvatarUpload> {
        reported("upload_avatar", self.upload_avatar_inner(user_id, body, mimetype, filename).await)
    }

    async fn upload_avatar_inner(
        &self,
        user_id: &str,
        body: Bytes,
        mimetype: &str,
        filename: &str,
    ) -> ServiceResult<AvatarUpload> {
        let id = validate_user_id(user_id)?;
        validate_image(&self.config, body.len(), mimetype)?;

        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let key = avatar_object_name(id, mimetype, millis, &random_token());
        info!(user_id = %id, filename, size = body.len(), mimetype, key = %key, "uploading avatar");

        // step 1: store the object; rolled back if anything after it fails
        self.storage
            .put_object(&key, body, mimetype, false)
            .await
            .map_err(|e| {
                ServiceError::UploadFailed(
                    ErrorDetail::new(UPLOAD_FAILED, format!("{e:#}"))
                        .with("user_id", id)
                        .with("key", &key),
                )
            })?;

        // step 2: point the profile at it
        match self.link_avatar(id, &key).await {
            Ok(upload) => {
                info!(user_id = %id, key = %key, url = %upload.avatar_url, "avatar uploaded");
                Ok(upload)
            }
            Err(e) => {
                self.discard_object(&key).await;
                Err(e)
            }
        }
    }

    async fn link_avatar(&self, id: Uuid, key: &str) -> ServiceResult<AvatarUpload> {
        let avatar_url = self.storage.public_url(key);
        if avatar_url.is_empty() {
            return Err(ServiceError::UploadFailed(
                ErrorDetail::new("Failed to get avatar URL", "Failed to get public URL").with("key", key),
            ));
        }

        let profile = self
            .store
            .set_avatar_url(id, &avatar_url)
            .await
            .map_err(|e| {
                fetch_error(e, PROFILE_NOT_FOUND, PROFILE_NOT_FOUND, "Failed to update profile with avatar")
                    .with("user_id", id)
                    .with("url", &avatar_url)
            })?;

        Ok(AvatarUpload { avatar_url, profile })
    }

    /// Compensation for a stored object that could not be linked. May leave
    /// an orphaned object behind if the delete fails too.
    async fn discard_object(&self, key: &str) {
        if let Err(e) = self.storage.delete_object(key).await {
            warn!(
                key,
                error = %e,
                side_effect = "avatar_cleanup",
                "failed to remove unlinked avatar object"
            );
        }
    }

    // --- admin ---

    pub async fn is_admin(&self, user_id: Uuid) -> ServiceResult<bool> {
        let res = self
            .store
            .find_profile(user_id)
            .await
            .map(|p| p.map_or(false, |p| p.role == Role::Admin.as_str()))
            .map_err(store_error("Unable to check user"));
        reported("is_admin", res)
    }

    pub async fn list_users(&self, page: i64, limit: i64, search: Option<&str>) -> ServiceResult<UserPage> {
        let req = PageRequest::clamped(page, limit);
        let res = self
            .store
            .list_profiles(&req.query(search))
            .await
            .map(|found| UserPage {
                users: found.rows,
                pagination: req.info(found.total),
            })
            .map_err(store_error("Unable to fetch users"));
        reported("list_users", res)
    }

    pub async fn get_user_details_for_admin(&self, user_id: &str) -> ServiceResult<Profile> {
        reported(
            "get_user_details_for_admin",
            self.load_profile(user_id, USER_NOT_FOUND, "Unable to fetch user details").await,
        )
    }

    pub async fn update_user_role(&self, user_id: &str, role: &str) -> ServiceResult<Profile> {
        reported("update_user_role", self.update_role_inner(user_id, role).await)
    }

    async fn update_role_inner(&self, user_id: &str, role: &str) -> ServiceResult<Profile> {
        let id = validate_user_id(user_id)?;
        let role = validate_role(role)?;

        let existing = self
            .store
            .find_profile(id)
            .await
            .map_err(|e| ServiceError::internal("Unable to check user", e.to_string()).with("user_id", id))?;
        if existing.is_none() {
            return Err(ServiceError::not_found(USER_NOT_FOUND, "No user found with the provided ID").with("user_id", id));
        }

        let profile = self.store.set_role(id, role).await.map_err(|e| {
            fetch_error(e, USER_NOT_FOUND, "No user found with the provided ID", "Unable to update user role")
                .with("user_id", id)
                .with("role", role)
        })?;

        info!(user_id = %id, role = %role, "user role updated");
        Ok(profile)
    }

    /// Removes the user and everything referencing them, children first.
    pub async fn delete_user_by_admin(&self, user_id: &str) -> ServiceResult<DeletionReport> {
        reported("delete_user_by_admin", self.delete_user_inner(user_id).await)
    }

    async fn delete_user_inner(&self, user_id: &str) -> ServiceResult<DeletionReport> {
        let id = validate_user_id(user_id)?;

        let existing = self
            .store
            .get_profile(id)
            .await
            .map_err(|_| ServiceError::not_found(USER_NOT_FOUND, USER_NOT_FOUND).with("user_id", id))?;

        let plan = deletion::deletion_plan(self.identity_admin.is_some());
        let report = deletion::execute(&plan, id, self.store.as_ref(), self.identity_admin.as_deref()).await?;

        info!(
            user_id = %id,
            email = %existing.email,
            warnings = report.warnings.len(),
            "user and related data deleted by admin"
        );
        Ok(report)
    }

    /// Profile total and role distribution, read concurrently.
    pub async fn get_system_stats(&self) -> ServiceResult<SystemStats> {
        let (total, roles) = tokio::join!(self.store.count_profiles(), self.store.list_roles());

        let res = match (total, roles) {
            (Err(e), _) => Err(store_error(SYSTEM_STATS_FAILED)(e)),
            (_, Err(e)) => Err(store_error(ROLE_STATS_FAILED)(e)),
            (Ok(total_users), Ok(roles)) => Ok(SystemStats {
                total_users,
                role_distribution: role_distribution(roles),
                generated_at: OffsetDateTime::now_utc(),
            }),
        };
        reported("get_system_stats", res)
    }
}

fn role_distribution(roles: Vec<String>) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();
    for role in roles {
        *counts.entry(role).or_insert(0) += 1;
    }
    counts
}

fn best_effort_count(counter: &'static str, user_id: Uuid, res: Result<i64, StoreError>) -> i64 {
    res.unwrap_or_else(|e| {
        warn!(
            user_id = %user_id,
            counter,
            error = %e,
            side_effect = "user_stats_counter",
            "user stats counter failed"
        );
        0
    })
}
