use crate::app::profile_storage::ProfileStorage;
use flowers::{
    Profile,
    store::{
        DEFAULT_HISTORY_LIMIT,
        InMemoryScoreStore,
    },
};
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemoryProfileStorage {
    profiles: HashMap<String, Profile>,
    stores: HashMap<String, InMemoryScoreStore>,
}

impl InMemoryProfileStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStorage for InMemoryProfileStorage {
    type Store = InMemoryScoreStore;

    fn get_or_create(
        &mut self,
        user_id: &str,
        child_name: Option<&str>,
    ) -> crate::Result<Profile> {
        if let Some(existing) = self
            .profiles
            .values()
            .find(|profile| profile.user_id == user_id)
        {
            return Ok(existing.clone());
        }
        let profile = Profile::new(user_id, child_name.map(str::to_string));
        self.stores.insert(
            profile.id.clone(),
            InMemoryScoreStore::with_history_limit(DEFAULT_HISTORY_LIMIT),
        );
        self.profiles.insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    fn profile(&self, profile_id: &str) -> crate::Result<Option<Profile>> {
        Ok(self.profiles.get(profile_id).cloned())
    }

    fn store(&mut self, profile_id: &str) -> crate::Result<Option<&mut InMemoryScoreStore>> {
        Ok(self.stores.get_mut(profile_id))
    }
}
