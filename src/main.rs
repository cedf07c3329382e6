//! MineBot 控制台前端
//!
//! 入口：初始化日志、加载配置与存储、启动编排器，然后逐行读取 stdin 作为控制台指令。
//! `exit` 退出；`status` 打印当前状态快照；其余输入都以控制台身份路由。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use minebot::config::load_config;
use minebot::core::{
    run_with_graceful_shutdown, BotBuilder, Notice, Sender, ShutdownManager, ShutdownReason,
};
use minebot::store::{JsonFileStore, SettingsStore};
use minebot::world::{ServerAddress, SimConnector, SimLiveView, SimWorld};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    minebot::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;

    let store = Arc::new(JsonFileStore::new(&config.storage.path, &config.bot.owner));
    let storage = store.load().context("Failed to load storage")?;
    let address: ServerAddress = storage
        .settings
        .default_server_ip
        .parse()
        .context("Invalid default server address")?;
    let identity = storage.settings.default_bot_name.clone();

    // 尚未接入真实协议适配器：运行在模拟世界里
    let (bot, status_rx, mut notices) = BotBuilder::new(config)
        .with_connector(Arc::new(SimConnector::new(SimWorld::new())))
        .with_store(store)
        .with_live_view(Arc::new(SimLiveView::default()))
        .build()
        .context("Failed to start bot")?;

    bot.start_session(address, identity)
        .context("Failed to start session")?;

    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(Notice::Broadcast(text)) => println!("[broadcast] {text}"),
                Ok(Notice::Feedback { .. }) => {}
                Err(RecvError::Lagged(n)) => tracing::warn!("Dropped {} notices", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let shutdown = ShutdownManager::new();

    // 编排器退出（包括异常终止）时状态通道关闭：非主动退出则触发关闭
    {
        let mut status_rx = status_rx.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {}
            if !shutdown.is_shutdown() {
                tracing::error!("Bot orchestrator stopped unexpectedly, shutting down");
                shutdown.shutdown(ShutdownReason::BotStopped);
            }
        });
    }

    let app = {
        let bot = bot.clone();
        let status_rx = status_rx.clone();
        let shutdown = shutdown.clone();
        async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match line.trim() {
                    "" => continue,
                    "exit" => break,
                    "status" => {
                        let rendered = serde_json::to_string_pretty(&*status_rx.borrow());
                        match rendered {
                            Ok(json) => println!("{json}"),
                            Err(e) => tracing::warn!("Failed to render status: {}", e),
                        }
                    }
                    text => {
                        if bot.route_command(text, Sender::console()).is_err() {
                            shutdown.shutdown(ShutdownReason::BotStopped);
                            break;
                        }
                    }
                }
            }
        }
    };

    let mut status_rx = status_rx;
    let stopping = shutdown.clone();
    run_with_graceful_shutdown(shutdown, app, || async move {
        stopping.shutdown(ShutdownReason::UserInitiated);
        let _ = bot.quit();
        // 编排器退出时会丢弃状态发送端
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while status_rx.changed().await.is_ok() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("Bot did not stop within 2s");
        }
    })
    .await;

    Ok(())
}
