//! 优雅关闭处理
//!
//! 统一监听 Ctrl+C / SIGTERM / exit 指令，触发后先结束会话（断开连接、松开所有输入）再退出。

use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// 关闭信号管理器；只记录第一次触发的原因
#[derive(Clone)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
}

/// 关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 控制台 exit 或 Ctrl+C
    UserInitiated,
    /// SIGTERM 信号
    Signal,
    /// 编排器已退出
    BotStopped,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// 触发关闭；重复触发只保留最初的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.reason.set(reason).is_ok() {
            tracing::info!(?reason, "Shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 运行前端直到其结束或收到关闭信号，然后执行清理
pub async fn run_with_graceful_shutdown<F, Fut>(
    shutdown_manager: ShutdownManager,
    app: F,
    cleanup: impl FnOnce() -> Fut,
) where
    F: Future<Output = ()>,
    Fut: Future<Output = ()>,
{
    shutdown_manager.install_signal_handlers();

    tokio::select! {
        _ = app => {
            tracing::info!("Console closed");
        }
        _ = shutdown_manager.wait_for_shutdown() => {
            tracing::info!(reason = ?shutdown_manager.reason(), "Stopping console");
        }
    }

    cleanup().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_first_reason_wins() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutdown());
        assert_eq!(manager.reason(), None);

        manager.clone().shutdown(ShutdownReason::BotStopped);
        manager.shutdown(ShutdownReason::Signal);
        assert!(manager.is_shutdown());
        assert_eq!(manager.reason(), Some(ShutdownReason::BotStopped));
    }

    #[tokio::test]
    async fn test_cleanup_runs_after_app_finishes() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = cleaned.clone();
        run_with_graceful_shutdown(ShutdownManager::new(), async {}, || async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_running_app() {
        let manager = ShutdownManager::new();
        let trigger = manager.clone();
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = cleaned.clone();
        run_with_graceful_shutdown(
            manager,
            async move {
                trigger.shutdown(ShutdownReason::BotStopped);
                std::future::pending::<()>().await
            },
            || async move {
                flag.store(true, Ordering::SeqCst);
            },
        )
        .await;
        assert!(cleaned.load(Ordering::SeqCst));
    }
}
