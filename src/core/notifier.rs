//! 反馈与广播
//!
//! feedback 发给单个发送者（控制台打印，玩家走私聊）；broadcast 发到公共聊天，受通知开关控制。
//! 两者都会同时推送到 broadcast 通道，供前端订阅。

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::core::Sender;
use crate::world::WorldSession;

/// 推送给前端的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// 给某个发送者的反馈
    Feedback { to: String, text: String },
    /// 面向全服的通知
    Broadcast(String),
}

pub struct Notifier {
    enabled: bool,
    notices: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new(notices: broadcast::Sender<Notice>) -> Self {
        Self {
            enabled: true,
            notices,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// 给发送者反馈；session 为 None 表示当前不在世界中
    pub fn feedback(&self, session: Option<&Arc<dyn WorldSession>>, to: &Sender, text: &str) {
        if to.is_console() {
            tracing::info!("[BOT] {}", text);
            if let (true, Some(session)) = (self.enabled, session) {
                if let Err(e) = session.send_chat(&format!("§b[Console] {text}")) {
                    tracing::warn!("Error sending feedback: {}", e);
                }
            }
        } else if let Some(session) = session {
            tracing::info!("[BOT -> {}] {}", to.name, text);
            if let Err(e) = session.send_direct(&to.name, text) {
                tracing::warn!("Error sending feedback to {}: {}", to.name, e);
            }
        } else {
            tracing::info!("[QUEUED MESSAGE -> {}] {}", to.name, text);
        }
        let _ = self.notices.send(Notice::Feedback {
            to: to.name.clone(),
            text: text.to_string(),
        });
    }

    /// 公共聊天广播；不含颜色码时加上 §b
    pub fn broadcast(&self, session: Option<&Arc<dyn WorldSession>>, text: &str) {
        if !self.enabled {
            return;
        }
        let text = if text.contains('§') {
            text.to_string()
        } else {
            format!("§b{text}")
        };
        if let Some(session) = session {
            tracing::info!("[NOTIFY] {}", text);
            if let Err(e) = session.send_chat(&text) {
                tracing::warn!("Error sending notification: {}", e);
            }
        }
        let _ = self.notices.send(Notice::Broadcast(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{SimAction, SimConnector, SimWorld, WorldConnector};
    use tokio::sync::mpsc;

    async fn session(world: &SimWorld) -> Arc<dyn WorldSession> {
        let (tx, _rx) = mpsc::unbounded_channel();
        SimConnector::new(world.clone())
            .connect(&"localhost".parse().unwrap(), "BOB101", tx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_console_feedback_echoes_to_chat_when_enabled() {
        let world = SimWorld::new();
        let session = session(&world).await;
        let (tx, mut rx) = broadcast::channel(8);
        let mut notifier = Notifier::new(tx);

        notifier.feedback(Some(&session), &Sender::console(), "hello");
        notifier.set_enabled(false);
        notifier.feedback(Some(&session), &Sender::console(), "quiet");

        assert_eq!(world.chats(), vec!["§b[Console] hello".to_string()]);
        assert_eq!(
            rx.recv().await.unwrap(),
            Notice::Feedback {
                to: "CONSOLE".into(),
                text: "hello".into()
            }
        );
    }

    #[tokio::test]
    async fn test_player_feedback_is_direct() {
        let world = SimWorld::new();
        let session = session(&world).await;
        let (tx, _rx) = broadcast::channel(8);
        let notifier = Notifier::new(tx);

        notifier.feedback(Some(&session), &Sender::private("Alice"), "Moving");
        assert!(world.actions().contains(&SimAction::Direct {
            to: "Alice".into(),
            text: "Moving".into()
        }));
    }

    #[tokio::test]
    async fn test_broadcast_color_prefix() {
        let world = SimWorld::new();
        let session = session(&world).await;
        let (tx, _rx) = broadcast::channel(8);
        let notifier = Notifier::new(tx);

        notifier.broadcast(Some(&session), "plain");
        notifier.broadcast(Some(&session), "§e* colored");
        assert_eq!(
            world.chats(),
            vec!["§bplain".to_string(), "§e* colored".to_string()]
        );
    }
}
