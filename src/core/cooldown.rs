//! 按发送者的冷却闸门
//!
//! 同一发送者两次被接纳的指令之间至少间隔 cooldown；控制台不受限制。
//! 时间使用 tokio::time::Instant，暂停时钟的测试可精确推进。

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::Sender;

#[derive(Debug)]
pub struct CooldownGate {
    cooldown: Duration,
    /// 发送者名 -> 上次被接纳的时间
    records: HashMap<String, Instant>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            records: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// 判断是否接纳；接纳时记录 now
    pub fn admit(&mut self, sender: &Sender, now: Instant) -> bool {
        if sender.is_console() {
            return true;
        }
        if self.remaining(sender, now).is_some() {
            return false;
        }
        self.records.insert(sender.name.clone(), now);
        true
    }

    /// 距离下次可被接纳还剩多久；None 表示现在即可
    pub fn remaining(&self, sender: &Sender, now: Instant) -> Option<Duration> {
        if sender.is_console() {
            return None;
        }
        let last = self.records.get(&sender.name)?;
        let elapsed = now.saturating_duration_since(*last);
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }

    /// 清理超过 max_age 未更新的记录，返回清理条数
    ///
    /// max_age 不小于 cooldown 时清理不会改变任何接纳结果。
    pub fn evict_stale(&mut self, now: Instant, max_age: Duration) -> usize {
        let max_age = max_age.max(self.cooldown);
        let before = self.records.len();
        self.records
            .retain(|_, last| now.saturating_duration_since(*last) < max_age);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> CooldownGate {
        CooldownGate::new(Duration::from_millis(2000))
    }

    #[test]
    fn test_second_command_within_cooldown_rejected() {
        let mut gate = gate();
        let alice = Sender::private("Alice");
        let t0 = Instant::now();
        assert!(gate.admit(&alice, t0));
        assert!(!gate.admit(&alice, t0 + Duration::from_millis(1999)));
        assert_eq!(
            gate.remaining(&alice, t0 + Duration::from_millis(1500)),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_spaced_commands_admitted() {
        let mut gate = gate();
        let alice = Sender::public("Alice");
        let t0 = Instant::now();
        assert!(gate.admit(&alice, t0));
        assert!(gate.admit(&alice, t0 + Duration::from_millis(2000)));
    }

    #[test]
    fn test_rejection_does_not_refresh_record() {
        let mut gate = gate();
        let alice = Sender::private("Alice");
        let t0 = Instant::now();
        assert!(gate.admit(&alice, t0));
        assert!(!gate.admit(&alice, t0 + Duration::from_millis(1000)));
        assert!(gate.admit(&alice, t0 + Duration::from_millis(2000)));
    }

    #[test]
    fn test_console_exempt_and_senders_independent() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.admit(&Sender::console(), t0));
        assert!(gate.admit(&Sender::console(), t0));
        assert!(gate.admit(&Sender::private("Alice"), t0));
        assert!(gate.admit(&Sender::private("Bob"), t0));
        assert_eq!(gate.len(), 2);
    }

    #[test]
    fn test_eviction_never_changes_admission() {
        let mut gate = gate();
        let alice = Sender::private("Alice");
        let bob = Sender::private("Bob");
        let t0 = Instant::now();
        gate.admit(&alice, t0);
        gate.admit(&bob, t0 + Duration::from_secs(59));

        // max_age 小于 cooldown 时按 cooldown 处理
        assert_eq!(gate.evict_stale(t0 + Duration::from_millis(500), Duration::ZERO), 0);

        let now = t0 + Duration::from_secs(60);
        assert_eq!(gate.evict_stale(now, Duration::from_secs(60)), 1);
        assert!(gate.admit(&alice, now));
        assert!(!gate.admit(&bob, now));
    }
}
