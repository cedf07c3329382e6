//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MINEBOT__*` 覆盖（双下划线表示嵌套，如 `MINEBOT__BOT__OWNER=Steve`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bot: BotSection,
    pub timing: TimingSection,
    pub reconnect: ReconnectSection,
    pub storage: StorageSection,
    pub translator: TranslatorSection,
}

/// [bot] 段：主人、登录密码、实时画面端口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotSection {
    /// 主人的用户名；其自由聊天会被当作自然语言指令
    pub owner: String,
    /// 服务器要求注册/登录时使用；未设置则不自动登录
    pub password: Option<String>,
    pub viewer_port: u16,
    /// 公共聊天里白名单玩家下达指令的前缀
    pub chat_prefix: String,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            password: None,
            viewer_port: default_viewer_port(),
            chat_prefix: "*".to_string(),
        }
    }
}

fn default_owner() -> String {
    "SupremeYT".to_string()
}

fn default_viewer_port() -> u16 {
    3001
}

/// [timing] 段：所有毫秒级节奏
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    /// 每个发送者两次指令的最小间隔；None 时使用存储里的 commandCooldown
    pub command_cooldown_ms: Option<u64>,
    /// 移动一步按住方向键的时长
    pub step_ms: u64,
    /// 跳跃按下与松开各占的时长
    pub jump_pulse_ms: u64,
    pub follow_interval_ms: u64,
    pub patrol_step_delay_ms: u64,
    /// 翻译出的多条指令之间的间隔
    pub translated_command_gap_ms: u64,
    /// 注册后到发送登录的延迟
    pub login_delay_ms: u64,
    /// 冷却记录超过 cooldown * factor 未更新即被清理
    pub cooldown_eviction_factor: u32,
    pub cooldown_sweep_secs: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            command_cooldown_ms: None,
            step_ms: 250,
            jump_pulse_ms: 250,
            follow_interval_ms: 1000,
            patrol_step_delay_ms: 1000,
            translated_command_gap_ms: 500,
            login_delay_ms: 2000,
            cooldown_eviction_factor: 30,
            cooldown_sweep_secs: 60,
        }
    }
}

impl TimingSection {
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn jump_pulse(&self) -> Duration {
        Duration::from_millis(self.jump_pulse_ms)
    }

    pub fn follow_interval(&self) -> Duration {
        Duration::from_millis(self.follow_interval_ms)
    }

    pub fn patrol_step_delay(&self) -> Duration {
        Duration::from_millis(self.patrol_step_delay_ms)
    }

    pub fn translated_command_gap(&self) -> Duration {
        Duration::from_millis(self.translated_command_gap_ms)
    }

    pub fn login_delay(&self) -> Duration {
        Duration::from_millis(self.login_delay_ms)
    }

    /// 清理周期至少 1 秒
    pub fn cooldown_sweep(&self) -> Duration {
        Duration::from_secs(self.cooldown_sweep_secs.max(1))
    }
}

/// [reconnect] 段：固定间隔重连
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    /// 连续失败达到上限后额外等待的冷却
    pub cooldown_secs: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_secs: 30,
            cooldown_secs: 30,
        }
    }
}

impl ReconnectSection {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// [storage] 段：白名单与默认设置文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("storage.json"),
        }
    }
}

/// [translator] 段：rules / openai
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslatorSection {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for TranslatorSection {
    fn default() -> Self {
        Self {
            provider: "rules".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 MINEBOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MINEBOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MINEBOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.bot.owner, "SupremeYT");
        assert_eq!(cfg.timing.step_ms, 250);
        assert_eq!(cfg.reconnect.max_attempts, 3);
        assert_eq!(cfg.reconnect.retry_delay(), Duration::from_secs(30));
        assert_eq!(cfg.translator.provider, "rules");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[bot]\nowner = \"Steve\"\n\n[timing]\ncommand_cooldown_ms = 500").unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.bot.owner, "Steve");
        assert_eq!(cfg.bot.viewer_port, 3001);
        assert_eq!(cfg.timing.command_cooldown_ms, Some(500));
        assert_eq!(cfg.timing.follow_interval_ms, 1000);
    }
}
