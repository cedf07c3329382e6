//! 重连策略：固定间隔、有上限、满额后冷却再重置
//!
//! 纯状态机，不做任何 IO；编排器根据返回的 ReconnectDecision 安排下一次连接。
//!
//! - 已进入世界的会话断开：retry_delay 后重连，计数不变
//! - 一次连接尝试失败：计数加一；未满 max_attempts 时 retry_delay 后重试，
//!   满额时计数清零，等待 retry_delay + cooldown
//! - 出生（Spawned）或显式启动会话：计数清零

use std::time::Duration;

use crate::config::ReconnectSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// 在 after 之后发起第 attempt 次尝试
    Retry { after: Duration, attempt: u32 },
    /// 已连续失败 max_attempts 次：计数已清零，等待更长时间
    Cooldown { after: Duration },
}

impl ReconnectDecision {
    pub fn delay(&self) -> Duration {
        match self {
            ReconnectDecision::Retry { after, .. } | ReconnectDecision::Cooldown { after } => {
                *after
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    retry_delay: Duration,
    cooldown: Duration,
    /// 连续失败的连接尝试次数
    failures: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration, cooldown: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            cooldown,
            failures: 0,
        }
    }

    pub fn from_config(cfg: &ReconnectSection) -> Self {
        Self::new(cfg.max_attempts, cfg.retry_delay(), cfg.cooldown())
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// 进入世界：清零
    pub fn on_spawn(&mut self) {
        self.reset();
    }

    /// 在线会话丢失（断开 / 踢出 / 错误）
    pub fn on_session_lost(&mut self) -> ReconnectDecision {
        ReconnectDecision::Retry {
            after: self.retry_delay,
            attempt: self.failures + 1,
        }
    }

    /// 一次连接尝试在进入世界前失败
    pub fn on_attempt_failed(&mut self) -> ReconnectDecision {
        self.failures += 1;
        if self.failures >= self.max_attempts {
            self.failures = 0;
            ReconnectDecision::Cooldown {
                after: self.retry_delay + self.cooldown,
            }
        } else {
            ReconnectDecision::Retry {
                after: self.retry_delay,
                attempt: self.failures + 1,
            }
        }
    }
}
