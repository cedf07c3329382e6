//! 编排层错误类型与故障分类
//!
//! 与 RecoveryEngine 配合：根据 BotError 决定交给重连策略，还是只反馈给发送者。

use thiserror::Error;

use crate::core::task_slot::TaskFailure;
use crate::store::StoreError;
use crate::translator::TranslateError;
use crate::world::WorldError;

/// 处理指令与会话事件时可能出现的错误
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Please wait before using another command.")]
    CooldownActive { remaining_ms: u64 },

    #[error("{0}")]
    PermissionDenied(String),

    /// 参数缺失或格式错误；消息本身就是给发送者看的提示
    #[error("{0}")]
    Usage(String),

    #[error("Unknown command. Type \"help\" for available commands.")]
    UnknownCommand(String),

    #[error("Bot is not connected")]
    NotConnected,

    /// 编排任务已退出，句柄无法再投递指令
    #[error("Bot runtime has stopped")]
    Stopped,

    #[error(transparent)]
    World(#[from] WorldError),

    /// 已启动的任务执行失败
    #[error("{0}")]
    Task(TaskFailure),

    #[error("AI processing error: {0}")]
    Translate(#[from] TranslateError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// 故障类别：决定「重连 / 只反馈 / 反馈并清理任务槽」
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// 会话级瞬时故障，交给重连策略，绝不使进程崩溃
    TransientSession,
    /// 准入失败（冷却、权限、参数），只通知发送者，不改变任何状态
    Admission,
    /// 任务执行失败，通知发起者；任务槽已清空
    TaskExecution,
}
