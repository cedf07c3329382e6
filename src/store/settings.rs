//! 白名单与默认设置的持久化
//!
//! 单文件 JSON（默认 storage.json），字段沿用驼峰命名；文件缺失或损坏时写入默认内容。
//! 每次修改立即同步落盘。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage format error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 持久化内容根
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Storage {
    #[serde(default)]
    pub whitelisted_players: Vec<String>,
    #[serde(default)]
    pub settings: StoredSettings,
    #[serde(default)]
    pub saved_servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSettings {
    pub default_bot_name: String,
    #[serde(rename = "defaultServerIP")]
    pub default_server_ip: String,
    /// 指令冷却（毫秒）；存在时覆盖配置文件中的默认值
    #[serde(default)]
    pub command_cooldown: Option<u64>,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            default_bot_name: "BOB101".to_string(),
            default_server_ip: "localhost:60996".to_string(),
            command_cooldown: Some(2000),
        }
    }
}

impl Storage {
    /// 默认内容：白名单只包含 owner
    pub fn with_owner(owner: &str) -> Self {
        Self {
            whitelisted_players: vec![owner.to_string()],
            settings: StoredSettings::default(),
            saved_servers: Vec::new(),
        }
    }

    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.whitelisted_players.iter().any(|p| p == name)
    }

    /// 返回 false 表示已在白名单中
    pub fn add_player(&mut self, name: &str) -> bool {
        if self.is_whitelisted(name) {
            return false;
        }
        self.whitelisted_players.push(name.to_string());
        true
    }

    /// 返回 false 表示不在白名单中
    pub fn remove_player(&mut self, name: &str) -> bool {
        let before = self.whitelisted_players.len();
        self.whitelisted_players.retain(|p| p != name);
        before != self.whitelisted_players.len()
    }
}

/// 设置存储能力（同步读写）
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Storage, StoreError>;
    fn save(&self, storage: &Storage) -> Result<(), StoreError>;
}

/// JSON 文件存储
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    owner: String,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>, owner: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            owner: owner.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<Storage, StoreError> {
        let parsed = std::fs::read_to_string(&self.path)
            .map_err(StoreError::from)
            .and_then(|data| serde_json::from_str::<Storage>(&data).map_err(StoreError::from));
        match parsed {
            Ok(storage) => Ok(storage),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Storage unreadable ({}), writing defaults", e);
                let storage = Storage::with_owner(&self.owner);
                self.save(&storage)?;
                Ok(storage)
            }
        }
    }

    fn save(&self, storage: &Storage) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(storage)?)?;
        Ok(())
    }
}

/// 内存存储（测试与离线模式）
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Storage>,
}

impl MemoryStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            inner: Mutex::new(storage),
        }
    }

    pub fn snapshot(&self) -> Storage {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Storage, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, storage: &Storage) -> Result<(), StoreError> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = storage.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let store = JsonFileStore::new(&path, "SupremeYT");

        let storage = store.load().unwrap();
        assert_eq!(storage.whitelisted_players, vec!["SupremeYT".to_string()]);
        assert_eq!(storage.settings.default_bot_name, "BOB101");
        assert!(path.exists());
    }

    #[test]
    fn test_reads_original_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(
            &path,
            r#"{
                "whitelistedPlayers": ["SupremeYT", "Alice"],
                "settings": {
                    "defaultBotName": "Miner",
                    "defaultServerIP": "mc.example.org:25570",
                    "commandCooldown": 1500
                },
                "savedServers": []
            }"#,
        )
        .unwrap();

        let storage = JsonFileStore::new(&path, "SupremeYT").load().unwrap();
        assert!(storage.is_whitelisted("Alice"));
        assert_eq!(storage.settings.default_server_ip, "mc.example.org:25570");
        assert_eq!(storage.settings.command_cooldown, Some(1500));
    }

    #[test]
    fn test_save_round_trip_keeps_whitelist_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/storage.json"), "SupremeYT");
        let mut storage = store.load().unwrap();
        assert!(storage.add_player("Bob"));
        assert!(!storage.add_player("Bob"));
        store.save(&storage).unwrap();

        let reloaded = store.load().unwrap();
        assert!(reloaded.is_whitelisted("Bob"));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{ not json").unwrap();
        let storage = JsonFileStore::new(&path, "Owner").load().unwrap();
        assert_eq!(storage.whitelisted_players, vec!["Owner".to_string()]);
    }
}
