//! In-memory collaborators for service tests. Each records the operations it
//! receives and fails any operation whose name was passed to `fail`.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::repo::ProfileStore;
use super::repo_types::{DependentTable, Profile, ProfileChanges, ProfilePage, ProfileQuery, Role};
use super::services::AccountService;
use crate::auth::identity::Identity;
use crate::auth::{IdentityAdmin, IdentityProvider};
use crate::config::AccountConfig;
use crate::error::{StoreError, StoreResult};
use crate::notify::Notifier;
use crate::storage::ObjectStorage;

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl Recorder {
    fn hit(&self, op: &str) -> Result<(), String> {
        self.calls.lock().unwrap().push(op.to_string());
        if self.failing.lock().unwrap().contains(op) {
            return Err(format!("{op} failed"));
        }
        Ok(())
    }

    fn fail(&self, op: &str) {
        self.failing.lock().unwrap().insert(op.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    rec: Recorder,
    profiles: Mutex<Vec<Profile>>,
    rows: Mutex<BTreeMap<DependentTable, Vec<(Uuid, i32)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, email: &str, tag: Option<&str>) -> Uuid {
        self.add_user_with_role(email, tag, Role::User)
    }

    pub fn add_user_with_role(&self, email: &str, tag: Option<&str>, role: Role) -> Uuid {
        let mut profiles = self.profiles.lock().unwrap();
        let created_at = OffsetDateTime::now_utc() + Duration::seconds(profiles.len() as i64);
        let profile = Profile {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: email.split('@').next().map(str::to_string),
            profile_tag: tag.map(str::to_string),
            avatar_url: None,
            role: role.as_str().to_string(),
            created_at,
            updated_at: created_at,
        };
        let id = profile.id;
        profiles.push(profile);
        id
    }

    /// Adds `n` rows owned by `user_id`; ratings get the value 1.
    pub fn add_rows(&self, user_id: Uuid, table: DependentTable, n: usize) {
        let value = if table == DependentTable::Ratings { 1 } else { 0 };
        self.add_valued_rows(user_id, table, n, value);
    }

    pub fn add_valued_rows(&self, user_id: Uuid, table: DependentTable, n: usize, value: i32) {
        let mut rows = self.rows.lock().unwrap();
        let entry = rows.entry(table).or_default();
        entry.extend(std::iter::repeat((user_id, value)).take(n));
    }

    pub fn rows(&self, user_id: Uuid, table: DependentTable) -> usize {
        self.rows
            .lock()
            .unwrap()
            .get(&table)
            .map(|r| r.iter().filter(|(owner, _)| *owner == user_id).count())
            .unwrap_or(0)
    }

    pub fn rows_for(&self, user_id: Uuid) -> usize {
        let rows = self.rows.lock().unwrap();
        rows.values()
            .flat_map(|r| r.iter())
            .filter(|(owner, _)| *owner == user_id)
            .count()
    }

    pub fn profile(&self, id: Uuid) -> Option<Profile> {
        self.profiles.lock().unwrap().iter().find(|p| p.id == id).cloned()
    }

    pub fn fail(&self, op: &str) {
        self.rec.fail(op);
    }

    pub fn calls(&self) -> Vec<String> {
        self.rec.calls()
    }

    fn check(&self, op: &str) -> StoreResult<()> {
        self.rec.hit(op).map_err(|e| StoreError::Database(sqlx::Error::Protocol(e)))
    }

    fn modify(&self, id: Uuid, f: impl FnOnce(&mut Profile)) -> StoreResult<Profile> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NoRows)?;
        f(profile);
        profile.updated_at = OffsetDateTime::now_utc();
        Ok(profile.clone())
    }

    fn count_rows(&self, table: DependentTable, user_id: Uuid, value: Option<i32>) -> i64 {
        self.rows
            .lock()
            .unwrap()
            .get(&table)
            .map(|r| {
                r.iter()
                    .filter(|(owner, v)| *owner == user_id && value.map_or(true, |x| x == *v))
                    .count() as i64
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Profile> {
        self.check("get_profile")?;
        self.profile(id).ok_or(StoreError::NoRows)
    }

    async fn get_profile_by_tag(&self, tag: &str) -> StoreResult<Profile> {
        self.check("get_profile_by_tag")?;
        self.profiles
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.profile_tag.as_deref() == Some(tag))
            .cloned()
            .ok_or(StoreError::NoRows)
    }

    async fn tag_taken(&self, tag: &str, exclude: Option<Uuid>) -> StoreResult<bool> {
        self.check("tag_taken")?;
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.profile_tag.as_deref() == Some(tag) && Some(p.id) != exclude))
    }

    async fn full_name_by_email(&self, email: &str) -> StoreResult<Option<String>> {
        self.check("full_name_by_email")?;
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.email == email)
            .and_then(|p| p.full_name.clone()))
    }

    async fn update_profile(&self, id: Uuid, email: &str, changes: &ProfileChanges) -> StoreResult<Profile> {
        self.check("update_profile")?;
        self.modify(id, |p| {
            p.email = email.to_string();
            if let Some(v) = &changes.full_name {
                p.full_name = Some(v.clone());
            }
            if let Some(v) = &changes.profile_tag {
                p.profile_tag = Some(v.clone());
            }
            if let Some(v) = &changes.avatar_url {
                p.avatar_url = Some(v.clone());
            }
        })
    }

    async fn set_avatar_url(&self, id: Uuid, url: &str) -> StoreResult<Profile> {
        self.check("set_avatar_url")?;
        self.modify(id, |p| p.avatar_url = Some(url.to_string()))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> StoreResult<Profile> {
        self.check("set_role")?;
        self.modify(id, |p| p.role = role.as_str().to_string())
    }

    async fn list_profiles(&self, query: &ProfileQuery) -> StoreResult<ProfilePage> {
        self.check("list_profiles")?;
        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut matched: Vec<Profile> = self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .filter(|p| match &needle {
                None => true,
                Some(n) => {
                    contains(p.full_name.as_deref(), n)
                        || contains(p.profile_tag.as_deref(), n)
                        || contains(Some(p.email.as_str()), n)
                }
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matched.len() as i64;
        let rows = matched
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();
        Ok(ProfilePage { rows, total })
    }

    async fn count_profiles(&self) -> StoreResult<i64> {
        self.check("count_profiles")?;
        Ok(self.profiles.lock().unwrap().len() as i64)
    }

    async fn list_roles(&self) -> StoreResult<Vec<String>> {
        self.check("list_roles")?;
        Ok(self.profiles.lock().unwrap().iter().map(|p| p.role.clone()).collect())
    }

    async fn count_dishes_by_user(&self, user_id: Uuid) -> StoreResult<i64> {
        self.check("count_dishes")?;
        Ok(self.count_rows(DependentTable::Dishes, user_id, None))
    }

    async fn count_likes_by_user(&self, user_id: Uuid) -> StoreResult<i64> {
        self.check("count_likes")?;
        Ok(self.count_rows(DependentTable::Ratings, user_id, Some(1)))
    }

    async fn count_collection_items_by_user(&self, user_id: Uuid) -> StoreResult<i64> {
        self.check("count_collection_items")?;
        Ok(self.count_rows(DependentTable::CollectionDishes, user_id, None))
    }

    async fn delete_dependents(&self, table: DependentTable, user_id: Uuid) -> StoreResult<u64> {
        self.check(&format!("delete:{}", table.table()))?;
        let mut rows = self.rows.lock().unwrap();
        let Some(entries) = rows.get_mut(&table) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|(owner, _)| *owner != user_id);
        Ok((before - entries.len()) as u64)
    }

    async fn delete_profile(&self, id: Uuid) -> StoreResult<u64> {
        self.check("delete_profile")?;
        let mut profiles = self.profiles.lock().unwrap();
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        Ok((before - profiles.len()) as u64)
    }
}

fn contains(field: Option<&str>, needle: &str) -> bool {
    field.map_or(false, |f| f.to_lowercase().contains(needle))
}

#[derive(Default)]
pub struct MemoryStorage {
    rec: Recorder,
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, op: &str) {
        self.rec.fail(op);
    }

    pub fn calls(&self) -> Vec<String> {
        self.rec.calls()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        overwrite: bool,
    ) -> anyhow::Result<()> {
        self.rec.hit("put_object").map_err(anyhow::Error::msg)?;
        let mut objects = self.objects.lock().unwrap();
        if !overwrite && objects.contains_key(key) {
            anyhow::bail!("object {key} already exists");
        }
        objects.insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.rec.hit("delete_object").map_err(anyhow::Error::msg)?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        if self.rec.hit("public_url").is_err() {
            return String::new();
        }
        format!("https://storage.test/avatars/{key}")
    }
}

struct Account {
    id: Uuid,
    email: String,
    password: String,
}

#[derive(Default)]
pub struct MemoryIdentity {
    rec: Recorder,
    accounts: Mutex<Vec<Account>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: Uuid, email: &str, password: &str) {
        self.accounts.lock().unwrap().push(Account {
            id,
            email: email.to_string(),
            password: password.to_string(),
        });
    }

    pub fn password_of(&self, id: Uuid) -> Option<String> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.password.clone())
    }

    pub fn fail(&self, op: &str) {
        self.rec.fail(op);
    }

    pub fn calls(&self) -> Vec<String> {
        self.rec.calls()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn verify_password(&self, email: &str, password: &str) -> anyhow::Result<Uuid> {
        self.rec.hit("verify_password").map_err(anyhow::Error::msg)?;
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.email == email && a.password == password)
            .map(|a| a.id)
            .ok_or_else(|| anyhow::anyhow!("invalid login credentials"))
    }

    async fn update_password(&self, user_id: Uuid, new_password: &str) -> anyhow::Result<()> {
        self.rec.hit("update_password").map_err(anyhow::Error::msg)?;
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .iter_mut()
            .find(|a| a.id == user_id)
            .ok_or_else(|| anyhow::anyhow!("identity not found"))?;
        account.password = new_password.to_string();
        Ok(())
    }

    async fn find_identity(&self, user_id: Uuid) -> anyhow::Result<Option<Identity>> {
        self.rec.hit("find_identity").map_err(anyhow::Error::msg)?;
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == user_id)
            .map(|a| Identity {
                id: a.id,
                email: a.email.clone(),
                last_sign_in_at: None,
                email_confirmed_at: Some(OffsetDateTime::UNIX_EPOCH),
            }))
    }
}

#[async_trait]
impl IdentityAdmin for MemoryIdentity {
    async fn delete_identity(&self, user_id: Uuid) -> anyhow::Result<()> {
        self.rec.hit("delete_identity").map_err(anyhow::Error::msg)?;
        self.accounts.lock().unwrap().retain(|a| a.id != user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    rec: Recorder,
    sent: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingNotifier {
    pub fn fail(&self) {
        self.rec.fail("password_changed");
    }

    pub fn attempts(&self) -> usize {
        self.rec.calls().len()
    }

    pub fn sent(&self) -> Vec<(String, Option<String>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn password_changed(&self, email: &str, full_name: Option<&str>) -> anyhow::Result<()> {
        self.rec.hit("password_changed").map_err(anyhow::Error::msg)?;
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), full_name.map(str::to_string)));
        Ok(())
    }
}

/// Service wired to fresh in-memory collaborators.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryStorage>,
    pub identity: Arc<MemoryIdentity>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: AccountService,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let identity = Arc::new(MemoryIdentity::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = AccountService::new(
            AccountConfig::default(),
            store.clone(),
            storage.clone(),
            identity.clone(),
        )
        .with_identity_admin(identity.clone())
        .with_notifier(notifier.clone());
        Self {
            store,
            storage,
            identity,
            notifier,
            service,
        }
    }

    /// Service without the elevated identity client.
    pub fn without_identity_admin() -> Self {
        let mut h = Self::new();
        h.service = AccountService::new(
            AccountConfig::default(),
            h.store.clone(),
            h.storage.clone(),
            h.identity.clone(),
        )
        .with_notifier(h.notifier.clone());
        h
    }
}
