//! 错误恢复引擎
//!
//! 根据 BotError 类型返回 FaultClass，供编排器决定是走重连、只反馈给发送者，还是同时广播。

use crate::core::{BotError, FaultClass};
use crate::world::WorldError;

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, err: &BotError) -> FaultClass {
        match err {
            BotError::CooldownActive { .. }
            | BotError::PermissionDenied(_)
            | BotError::Usage(_)
            | BotError::UnknownCommand(_)
            | BotError::NotConnected
            | BotError::Stopped => FaultClass::Admission,
            BotError::World(w) => Self::classify_world(w),
            BotError::Task(failure) => match Self::classify_world(&failure.error) {
                FaultClass::TransientSession => FaultClass::TransientSession,
                _ => FaultClass::TaskExecution,
            },
            BotError::Translate(_) | BotError::Store(_) => FaultClass::TaskExecution,
        }
    }

    fn classify_world(err: &WorldError) -> FaultClass {
        match err {
            WorldError::ConnectionFailed(_) | WorldError::NotConnected => {
                FaultClass::TransientSession
            }
            WorldError::InvalidAddress(_) => FaultClass::Admission,
            _ => FaultClass::TaskExecution,
        }
    }

    /// 是否值得向全服广播（会话级故障才广播，避免刷屏）
    pub fn should_broadcast(&self, err: &BotError) -> bool {
        self.classify(err) == FaultClass::TransientSession
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task_slot::TaskFailure;
    use crate::translator::TranslateError;

    #[test]
    fn test_admission_faults() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.classify(&BotError::CooldownActive { remaining_ms: 500 }),
            FaultClass::Admission
        );
        assert_eq!(
            engine.classify(&BotError::Usage("Usage: mine <block_type>".into())),
            FaultClass::Admission
        );
        assert_eq!(
            engine.classify(&BotError::World(WorldError::InvalidAddress("x:y".into()))),
            FaultClass::Admission
        );
    }

    #[test]
    fn test_task_faults() {
        let engine = RecoveryEngine::new();
        let err = BotError::Task(TaskFailure::new(
            WorldError::NoPath("goal".into()),
            Some("Failed to reach coordinates".into()),
        ));
        assert_eq!(engine.classify(&err), FaultClass::TaskExecution);
        assert!(!engine.should_broadcast(&err));

        let err = BotError::Translate(TranslateError::Backend("timeout".into()));
        assert_eq!(engine.classify(&err), FaultClass::TaskExecution);
    }

    #[test]
    fn test_session_faults_broadcast() {
        let engine = RecoveryEngine::new();
        let err = BotError::World(WorldError::ConnectionFailed("refused".into()));
        assert_eq!(engine.classify(&err), FaultClass::TransientSession);
        assert!(engine.should_broadcast(&err));
    }

    #[test]
    fn test_messages_are_user_facing() {
        assert_eq!(
            BotError::CooldownActive { remaining_ms: 10 }.to_string(),
            "Please wait before using another command."
        );
        assert_eq!(
            BotError::World(WorldError::PlayerNotFound("Bob".into())).to_string(),
            "Cannot find player Bob"
        );
    }
}
