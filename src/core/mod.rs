//! 核心编排层：指令、冷却、任务槽、行为、重连策略、主控循环

pub mod behavior;
pub mod builder;
pub mod command;
mod connection;
pub mod cooldown;
mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod notifier;
pub mod orchestrator;
pub mod recovery;
pub mod shutdown;
pub mod state;
pub mod task_slot;
mod tasks;

pub use behavior::{
    Behavior, BehaviorKind, BehaviorSupervisor, FollowTransition, Patrol, PatrolTransition,
};
pub use builder::{create_bot_builder, BotBuilder};
pub use command::{BotCommand, Channel, Coord, CoordTriple, GotoTarget, Sender, WhitelistOp, CONSOLE};
pub use cooldown::CooldownGate;
pub use error::{BotError, FaultClass};
pub use lifecycle::{ReconnectDecision, ReconnectPolicy};
pub use notifier::{Notice, Notifier};
pub use orchestrator::{create_bot, BotChannels, BotDeps, BotHandle, Command};
pub use recovery::RecoveryEngine;
pub use shutdown::{run_with_graceful_shutdown, ShutdownManager, ShutdownReason};
pub use state::{BotStatus, ConnectionState, Session};
pub use task_slot::{
    CancelHook, CancelledTask, Occupant, TaskFailure, TaskId, TaskKind, TaskOrigin, TaskReport,
    TaskResult, TaskSlot, TimedPlan, TimedStep,
};
