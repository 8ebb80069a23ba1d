use crate::app::profile_storage::ProfileStorage;
use anyhow::Context;
use flowers::{
    Profile,
    store::SledScoreStore,
};
use sled::{
    Config,
    Db,
    Tree,
};
use std::{
    collections::{
        HashMap,
        hash_map::Entry,
    },
    path::Path,
};

const PROFILES_TREE: &str = "profiles";
const USERS_TREE: &str = "profile_users";

/// Profiles keyed by id, with a `user_id -> id` index. Each profile's score
/// and history live in their own [`SledScoreStore`] trees.
pub struct SledProfileStorage {
    db: Db,
    profiles: Tree,
    users: Tree,
    stores: HashMap<String, SledScoreStore>,
    history_limit: usize,
}

impl SledProfileStorage {
    pub fn new(db: Db, history_limit: usize) -> crate::Result<Self> {
        let profiles = db
            .open_tree(PROFILES_TREE)
            .context("open profiles tree")?;
        let users = db.open_tree(USERS_TREE).context("open profile users tree")?;
        Ok(Self {
            db,
            profiles,
            users,
            stores: HashMap::new(),
            history_limit,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P, history_limit: usize) -> crate::Result<Self> {
        let db = Config::default()
            .path(path)
            .open()
            .context("open sled database")?;
        Self::new(db, history_limit)
    }

    fn write_profile(&self, profile: &Profile) -> crate::Result<()> {
        let bytes = serde_json::to_vec(profile).context("serialize profile")?;
        self.profiles
            .insert(profile.id.as_bytes(), bytes)
            .context("write profile")?;
        self.users
            .insert(profile.user_id.as_bytes(), profile.id.as_bytes())
            .context("index profile user")?;
        self.db.flush().context("flush profile write")?;
        Ok(())
    }
}

impl ProfileStorage for SledProfileStorage {
    type Store = SledScoreStore;

    fn get_or_create(
        &mut self,
        user_id: &str,
        child_name: Option<&str>,
    ) -> crate::Result<Profile> {
        if let Some(id) = self.users.get(user_id.as_bytes()).context("read profile user")? {
            let id = String::from_utf8(id.to_vec()).context("profile id should be utf-8")?;
            if let Some(profile) = self.profile(&id)? {
                return Ok(profile);
            }
            tracing::warn!("user {user_id} points at missing profile {id}, recreating");
        }
        let profile = Profile::new(user_id, child_name.map(str::to_string));
        self.write_profile(&profile)?;
        tracing::info!("created profile {} for user {user_id}", profile.id);
        Ok(profile)
    }

    fn profile(&self, profile_id: &str) -> crate::Result<Option<Profile>> {
        self.profiles
            .get(profile_id.as_bytes())
            .context("read profile")?
            .map(|bytes| serde_json::from_slice(&bytes).context("deserialize profile"))
            .transpose()
    }

    fn store(&mut self, profile_id: &str) -> crate::Result<Option<&mut SledScoreStore>> {
        if !self.profiles.contains_key(profile_id.as_bytes())? {
            return Ok(None);
        }
        let store = match self.stores.entry(profile_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(SledScoreStore::new(
                &self.db,
                profile_id,
                self.history_limit,
            )?),
        };
        Ok(Some(store))
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use flowers::{
        Direction,
        HistoryEntry,
        ScoreStore,
    };
    use tempdir::TempDir;

    #[test]
    fn get_or_create__returns_same_profile_for_same_user() {
        // given
        let tmp = TempDir::new("profiles").unwrap();
        let mut sut = SledProfileStorage::open(tmp.path(), 10).unwrap();

        // when
        let first = sut.get_or_create("parent@example.com", Some("Mia")).unwrap();
        let second = sut.get_or_create("parent@example.com", None).unwrap();

        // then
        assert_eq!(first, second);
        assert_eq!(first.child_name.as_deref(), Some("Mia"));
        assert_eq!(sut.profile(&first.id).unwrap(), Some(first));
    }

    #[test]
    fn store__unknown_profile_is_none() {
        // given
        let tmp = TempDir::new("profiles").unwrap();
        let mut sut = SledProfileStorage::open(tmp.path(), 10).unwrap();

        // then
        assert!(sut.store("nope").unwrap().is_none());
        assert!(sut.profile("nope").unwrap().is_none());
    }

    #[tokio::test]
    async fn store__keeps_profiles_apart() {
        // given
        let tmp = TempDir::new("profiles").unwrap();
        let mut sut = SledProfileStorage::open(tmp.path(), 10).unwrap();
        let a = sut.get_or_create("a", None).unwrap();
        let b = sut.get_or_create("b", None).unwrap();

        // when
        let store_a = sut.store(&a.id).unwrap().unwrap();
        store_a.set_score(42).await.unwrap();
        store_a
            .append_history(&HistoryEntry::new(Direction::Decrease, "Talked back", 58, 100, 42))
            .await
            .unwrap();

        // then
        let store_b = sut.store(&b.id).unwrap().unwrap();
        assert_eq!(store_b.score().await.unwrap(), 100);
        assert!(store_b.history().await.unwrap().is_empty());
        let store_a = sut.store(&a.id).unwrap().unwrap();
        assert_eq!(store_a.score().await.unwrap(), 42);
    }
}
