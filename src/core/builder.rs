//! Bot 构建器：统一的编排器初始化逻辑
//!
//! 控制台与测试共用同一套组装方式；未显式提供的协作方按配置补齐。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::orchestrator::{create_bot, BotChannels, BotDeps};
use crate::core::BotError;
use crate::store::{JsonFileStore, SettingsStore};
use crate::translator::{create_translator_from_config, Translator};
use crate::world::{LiveView, SimConnector, SimWorld, WorldConnector};

/// Bot 构建器：配置协作方并启动编排器
pub struct BotBuilder {
    config: AppConfig,
    connector: Option<Arc<dyn WorldConnector>>,
    store: Option<Arc<dyn SettingsStore>>,
    translator: Option<Arc<dyn Translator>>,
    live_view: Option<Arc<dyn LiveView>>,
}

impl BotBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            connector: None,
            store: None,
            translator: None,
            live_view: None,
        }
    }

    /// 设置世界连接器
    pub fn with_connector(mut self, connector: Arc<dyn WorldConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 设置白名单 / 默认设置存储
    pub fn with_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// 设置实时视角（可选）
    pub fn with_live_view(mut self, live_view: Arc<dyn LiveView>) -> Self {
        self.live_view = Some(live_view);
        self
    }

    /// 获取配置
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 组装依赖并启动编排器；必须在 tokio 运行时内调用
    pub fn build(self) -> Result<BotChannels, BotError> {
        let connector = self.connector.unwrap_or_else(|| {
            tracing::warn!("No world connector configured, using the simulated world");
            Arc::new(SimConnector::new(SimWorld::new()))
        });
        let store = self.store.unwrap_or_else(|| {
            Arc::new(JsonFileStore::new(
                &self.config.storage.path,
                &self.config.bot.owner,
            ))
        });
        let translator = self
            .translator
            .unwrap_or_else(|| create_translator_from_config(&self.config));

        create_bot(BotDeps {
            config: self.config,
            connector,
            store,
            translator,
            live_view: self.live_view,
        })
    }
}

/// 便捷函数：从默认路径加载配置并创建 BotBuilder
pub fn create_bot_builder(config_path: Option<PathBuf>) -> BotBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    BotBuilder::new(config)
}
