//! 持久化层：白名单与默认设置

pub mod settings;

pub use settings::{JsonFileStore, MemoryStore, SettingsStore, Storage, StoreError, StoredSettings};
