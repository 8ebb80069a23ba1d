pub mod art;
pub mod settings;
pub mod storage;
pub mod sync_client;
