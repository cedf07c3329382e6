//! 状态定义：会话记录与 BotStatus 投影
//!
//! 前端只持有轻量的 BotStatus（连接状态、身份、重连计数、当前任务、行为）；
//! 完整状态由编排器维护并在每次变化后投影出去。

use serde::Serialize;
use uuid::Uuid;

use crate::core::{BehaviorKind, TaskKind};
use crate::world::ServerAddress;

/// 会话连接状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    /// 正在连接，或已连接但尚未出生
    Connecting,
    Live,
    /// 主动结束中
    Ending,
}

/// 当前（或最近一次）会话
#[derive(Clone, Debug)]
pub struct Session {
    pub id: Uuid,
    pub address: ServerAddress,
    pub identity: String,
    pub state: ConnectionState,
    pub last_error: Option<String>,
    /// 最近一次进入世界的时间（RFC 3339）
    pub live_since: Option<String>,
}

impl Session {
    pub fn new(address: ServerAddress, identity: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            address,
            identity,
            state: ConnectionState::Connecting,
            last_error: None,
            live_since: None,
        }
    }

    pub fn mark_live(&mut self) {
        self.state = ConnectionState::Live;
        self.live_since = Some(chrono::Utc::now().to_rfc3339());
    }
}

/// 前端看到的「投影」状态
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BotStatus {
    pub connection: ConnectionState,
    pub session_id: Option<String>,
    pub identity: Option<String>,
    pub address: Option<String>,
    pub live_since: Option<String>,
    pub reconnect_failures: u32,
    pub last_error: Option<String>,
    pub active_task: Option<TaskKind>,
    pub behavior: Option<BehaviorKind>,
    pub behavior_detail: Option<String>,
    pub notifications: bool,
}

impl Default for BotStatus {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            session_id: None,
            identity: None,
            address: None,
            live_since: None,
            reconnect_failures: 0,
            last_error: None,
            active_task: None,
            behavior: None,
            behavior_detail: None,
            notifications: true,
        }
    }
}
