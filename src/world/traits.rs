//! 世界会话能力抽象
//!
//! 核心只依赖这里的窄接口：WorldConnector 建立会话，WorldSession 提供控制输入、寻路、攻击、
//! 采集、聊天等能力，事件（出生 / 断开 / 踢出 / 错误 / 聊天）经 mpsc 通道回传给编排器。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// 可按住 / 松开的控制输入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlInput {
    Forward,
    Back,
    Left,
    Right,
    Jump,
    Sneak,
    Sprint,
}

impl ControlInput {
    pub const ALL: [ControlInput; 7] = [
        ControlInput::Forward,
        ControlInput::Back,
        ControlInput::Left,
        ControlInput::Right,
        ControlInput::Jump,
        ControlInput::Sneak,
        ControlInput::Sprint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlInput::Forward => "forward",
            ControlInput::Back => "back",
            ControlInput::Left => "left",
            ControlInput::Right => "right",
            ControlInput::Jump => "jump",
            ControlInput::Sneak => "sneak",
            ControlInput::Sprint => "sprint",
        }
    }
}

impl fmt::Display for ControlInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 实体的连续坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// 向下取整得到所在方块坐标
    pub fn floored(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// 方块坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn center(&self) -> Position {
        Position::new(self.x as f64 + 0.5, self.y as f64, self.z as f64 + 0.5)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

/// 寻路目标：精确方块，或进入某点半径范围内
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Goal {
    Block(BlockPos),
    Near { pos: Position, radius: f64 },
}

impl Goal {
    pub fn is_reached_at(&self, pos: &Position) -> bool {
        match self {
            Goal::Block(target) => pos.floored() == *target,
            Goal::Near { pos: target, radius } => pos.distance_to(target) <= *radius,
        }
    }
}

/// 服务器地址：`host` 或 `host:port`，端口缺省 25565
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub const DEFAULT_PORT: u16 = 25565;

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for ServerAddress {
    type Err = WorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(WorldError::InvalidAddress("server address is required".into()));
        }
        match s.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| WorldError::InvalidAddress(s.to_string()))?;
                if host.is_empty() {
                    return Err(WorldError::InvalidAddress(s.to_string()));
                }
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(s, Self::DEFAULT_PORT)),
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 会话向编排器上报的事件
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    /// 已进入世界，可以接受指令
    Spawned,
    Disconnected(String),
    Kicked(String),
    Error(String),
    /// 公共聊天
    Chat { username: String, message: String },
    /// 私聊
    Whisper { username: String, message: String },
    /// 服务器系统消息（登录提示、验证提示等）
    SystemMessage(String),
    /// 服务器打开了容器窗口（如 `minecraft:generic_9x3`）
    WindowOpened { window_type: String },
}

/// 协作方（世界会话 / 查看器）返回的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorldError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    /// 端口被占用等「已在运行」类错误，重新武装时可忽略
    #[error("Address already in use: {0}")]
    AddrInUse(String),

    #[error("Unknown block type: {0}")]
    UnknownBlock(String),

    #[error("Cannot find player {0}")]
    PlayerNotFound(String),

    #[error("No path to goal: {0}")]
    NoPath(String),

    #[error("Could not find {0} in inventory")]
    ItemNotFound(String),

    #[error("No window open")]
    NoWindow,

    #[error("Could not find {0} in window")]
    WindowItemNotFound(String),

    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("{0}")]
    Other(String),
}

/// 单个已连接会话的能力集合
///
/// 同步方法是「发出即返回」的控制操作；异步方法对应需要等待远端完成的动作。
#[async_trait]
pub trait WorldSession: Send + Sync {
    /// 会话中的角色名
    fn username(&self) -> String;

    fn set_control(&self, input: ControlInput, pressed: bool);

    fn control_state(&self, input: ControlInput) -> bool;

    fn position(&self) -> Option<Position>;

    /// 可见玩家的位置；不可见时返回 None
    fn player_position(&self, name: &str) -> Option<Position>;

    fn players(&self) -> Vec<String>;

    /// 加载寻路移动配置（每次出生后调用，重复调用必须无副作用）
    fn arm_pathfinding(&self) -> Result<(), WorldError>;

    async fn pathfind_to(&self, goal: Goal) -> Result<(), WorldError>;

    fn stop_pathfinding(&self);

    async fn attack(&self, target: &str) -> Result<(), WorldError>;

    fn stop_attack(&self);

    fn find_nearest_block(
        &self,
        block_type: &str,
        max_distance: u32,
    ) -> Result<Option<BlockPos>, WorldError>;

    async fn collect_block(&self, pos: BlockPos) -> Result<(), WorldError>;

    fn stop_collecting(&self);

    /// 选择快捷栏（0-8）
    fn select_hotbar(&self, slot: u8) -> Result<(), WorldError>;

    /// 装备物品到主手，返回实际装备的物品名
    async fn equip(&self, item: &str) -> Result<String, WorldError>;

    fn send_chat(&self, text: &str) -> Result<(), WorldError>;

    fn send_direct(&self, recipient: &str, text: &str) -> Result<(), WorldError> {
        self.send_chat(&format!("/msg {recipient} {text}"))
    }

    /// 点击当前窗口中名字包含 item 的第一个槽位，返回槽位号
    async fn click_window_item(&self, item: &str) -> Result<u16, WorldError>;

    /// 主动退出；之后会话应上报 `Disconnected`
    fn disconnect(&self);
}

/// 建立会话；事件经 `events` 回传
#[async_trait]
pub trait WorldConnector: Send + Sync {
    async fn connect(
        &self,
        address: &ServerAddress,
        identity: &str,
        events: mpsc::UnboundedSender<WorldEvent>,
    ) -> Result<Arc<dyn WorldSession>, WorldError>;
}

/// 可选的实时视角（第一人称查看器）
pub trait LiveView: Send + Sync {
    /// 在端口上启动查看器；已在运行时返回 `WorldError::AddrInUse`
    fn start(&self, session: Arc<dyn WorldSession>, port: u16) -> Result<(), WorldError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_with_port() {
        let addr: ServerAddress = "localhost:60996".parse().unwrap();
        assert_eq!(addr, ServerAddress::new("localhost", 60996));
    }

    #[test]
    fn test_parse_address_default_port() {
        let addr: ServerAddress = "play.example.net".parse().unwrap();
        assert_eq!(addr.port, ServerAddress::DEFAULT_PORT);
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!("".parse::<ServerAddress>().is_err());
        assert!("host:notaport".parse::<ServerAddress>().is_err());
        assert!(":25565".parse::<ServerAddress>().is_err());
    }

    #[test]
    fn test_goal_reached() {
        let goal = Goal::Near {
            pos: Position::new(0.0, 64.0, 0.0),
            radius: 2.0,
        };
        assert!(goal.is_reached_at(&Position::new(1.0, 64.0, 1.0)));
        assert!(!goal.is_reached_at(&Position::new(5.0, 64.0, 0.0)));

        let exact = Goal::Block(BlockPos::new(10, 64, -3));
        assert!(exact.is_reached_at(&Position::new(10.4, 64.0, -2.5)));
    }
}
