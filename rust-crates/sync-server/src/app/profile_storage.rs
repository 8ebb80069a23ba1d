use flowers::{
    Profile,
    ScoreStore,
};

/// Profiles and their per-profile score stores.
pub trait ProfileStorage {
    type Store: ScoreStore;

    /// Returns the existing profile for `user_id`, or creates one.
    fn get_or_create(
        &mut self,
        user_id: &str,
        child_name: Option<&str>,
    ) -> crate::Result<Profile>;

    fn profile(&self, profile_id: &str) -> crate::Result<Option<Profile>>;

    /// `None` when the profile does not exist.
    fn store(&mut self, profile_id: &str) -> crate::Result<Option<&mut Self::Store>>;
}
