//! 前台任务槽：任意时刻至多一个可取消的物理动作
//!
//! 新任务安装前先取消旧任务（调用其取消钩子）；完成事件按 TaskId 比对，被取代的任务的结果会被丢弃。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::Sender;
use crate::world::{ControlInput, WorldError};

/// 任务类型
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize)]
pub enum TaskKind {
    /// 定时：按住方向键
    Move,
    /// 定时：按下 / 松开跳跃
    Jump,
    Attack,
    Mine,
    Goto,
    Equip,
    /// 行为驱动的寻路步
    FollowStep,
    PatrolStep,
}

/// 任务 ID
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskId {
    pub fn new() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 任务由谁发起：直接指令，或某一代行为
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TaskOrigin {
    Direct,
    Behavior(u64),
}

pub type CancelHook = Box<dyn FnOnce() + Send>;

/// 当前占用任务槽的任务
pub struct Occupant {
    pub id: TaskId,
    pub kind: TaskKind,
    pub sender: Sender,
    pub origin: TaskOrigin,
    token: CancellationToken,
    on_cancel: Option<CancelHook>,
}

impl Occupant {
    pub fn new(
        kind: TaskKind,
        sender: Sender,
        origin: TaskOrigin,
        token: CancellationToken,
        on_cancel: Option<CancelHook>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            sender,
            origin,
            token,
            on_cancel,
        }
    }

    fn cancel(mut self) -> CancelledTask {
        self.token.cancel();
        if let Some(hook) = self.on_cancel.take() {
            hook();
        }
        CancelledTask {
            id: self.id,
            kind: self.kind,
            origin: self.origin,
            sender: self.sender,
        }
    }
}

impl fmt::Debug for Occupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Occupant")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("sender", &self.sender)
            .field("origin", &self.origin)
            .finish()
    }
}

/// 被取消 / 取代的任务摘要
#[derive(Debug, Clone, PartialEq)]
pub struct CancelledTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub origin: TaskOrigin,
    pub sender: Sender,
}

#[derive(Debug, Default)]
pub struct TaskSlot {
    current: Option<Occupant>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 先取消旧任务再安装新任务，返回被取代的任务
    pub fn install(&mut self, occupant: Occupant) -> Option<CancelledTask> {
        let superseded = self.cancel_current();
        self.current = Some(occupant);
        superseded
    }

    /// 取消当前任务（调用取消钩子）并清空；槽为空时无操作
    pub fn cancel_current(&mut self) -> Option<CancelledTask> {
        self.current.take().map(Occupant::cancel)
    }

    /// 任务自然结束：仅当 id 仍是当前任务时取出（不调用钩子）
    pub fn finish(&mut self, id: TaskId) -> Option<Occupant> {
        if self.is_current(id) {
            self.current.take()
        } else {
            None
        }
    }

    pub fn is_current(&self, id: TaskId) -> bool {
        self.current.as_ref().map(|o| o.id) == Some(id)
    }

    pub fn current(&self) -> Option<&Occupant> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

/// 定时任务中的一步：在 at 时刻按下或松开某个输入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedStep {
    pub at: Duration,
    pub input: ControlInput,
    pub pressed: bool,
}

/// 定时任务计划：对单个输入的若干次按下 / 松开 + 总时长；到期或被取消时松开该输入
///
/// 步骤按序号现算，不预先展开，次数再大也只占常量内存。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedPlan {
    pub input: ControlInput,
    /// 相邻两次切换的间隔；None 表示开头按下后一直按住
    pulse: Option<Duration>,
    /// 输入切换的总次数
    toggles: u64,
    pub total: Duration,
}

impl TimedPlan {
    /// 按住 input 共 steps 个步长
    pub fn hold(input: ControlInput, steps: u32, step: Duration) -> Self {
        Self {
            input,
            pulse: None,
            toggles: 1,
            total: step.saturating_mul(steps),
        }
    }

    /// count 次脉冲：按下 pulse，松开 pulse
    pub fn pulses(input: ControlInput, count: u32, pulse: Duration) -> Self {
        let pulse = pulse.max(Duration::from_millis(1));
        Self {
            input,
            pulse: Some(pulse),
            toggles: 2 * u64::from(count),
            total: pulse.saturating_mul(count).saturating_mul(2),
        }
    }

    /// 第 k 次切换；超出计划时为 None
    pub fn step(&self, k: u64) -> Option<TimedStep> {
        if k >= self.toggles {
            return None;
        }
        let at = match self.pulse {
            None => Duration::ZERO,
            Some(pulse) => u32::try_from(k)
                .ok()
                .and_then(|k| pulse.checked_mul(k))
                .unwrap_or(Duration::MAX),
        };
        Some(TimedStep {
            at,
            input: self.input,
            pressed: k % 2 == 0,
        })
    }

    /// 零偏移的前导步骤数（立即生效，其余由计时器驱动）
    pub fn immediate_len(&self) -> u64 {
        (0..self.toggles)
            .take_while(|k| self.step(*k).map_or(false, |s| s.at.is_zero()))
            .count() as u64
    }
}

/// 任务成功后给发起者 / 全服的消息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub feedback: Option<String>,
    pub broadcast: Option<String>,
}

impl TaskReport {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn feedback(text: impl Into<String>) -> Self {
        Self {
            feedback: Some(text.into()),
            broadcast: None,
        }
    }

    pub fn with_broadcast(mut self, text: impl Into<String>) -> Self {
        self.broadcast = Some(text.into());
        self
    }
}

/// 任务执行失败：底层错误 + 面向发起者的前缀
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub error: WorldError,
    pub context: Option<String>,
}

impl TaskFailure {
    pub fn new(error: WorldError, context: Option<String>) -> Self {
        Self { error, context }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(f, "{ctx}: {}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

pub type TaskResult = Result<TaskReport, TaskFailure>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn occupant(kind: TaskKind, hook_calls: &Arc<AtomicUsize>) -> (Occupant, CancellationToken) {
        let token = CancellationToken::new();
        let calls = hook_calls.clone();
        let occ = Occupant::new(
            kind,
            Sender::console(),
            TaskOrigin::Direct,
            token.clone(),
            Some(Box::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })),
        );
        (occ, token)
    }

    #[test]
    fn test_install_supersedes_previous() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut slot = TaskSlot::new();
        let (first, first_token) = occupant(TaskKind::Move, &calls);
        let first_id = first.id;
        assert!(slot.install(first).is_none());

        let (second, _) = occupant(TaskKind::Goto, &calls);
        let second_id = second.id;
        let superseded = slot.install(second).unwrap();

        assert_eq!(superseded.id, first_id);
        assert!(first_token.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.is_current(second_id));
        assert!(!slot.is_current(first_id));
    }

    #[test]
    fn test_cancel_current_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut slot = TaskSlot::new();
        let (occ, _) = occupant(TaskKind::Attack, &calls);
        slot.install(occ);

        assert!(slot.cancel_current().is_some());
        assert!(slot.cancel_current().is_none());
        assert!(slot.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_finish_ignores_stale_id_and_skips_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut slot = TaskSlot::new();
        let (old, _) = occupant(TaskKind::Mine, &calls);
        let old_id = old.id;
        slot.install(old);
        let (new, _) = occupant(TaskKind::Mine, &calls);
        let new_id = new.id;
        slot.install(new);

        assert!(slot.finish(old_id).is_none());
        assert!(slot.finish(new_id).is_some());
        assert!(slot.is_empty());
        // 只有被取代的那次调用了钩子
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hold_plan() {
        let plan = TimedPlan::hold(ControlInput::Forward, 4, Duration::from_millis(250));
        assert_eq!(plan.total, Duration::from_millis(1000));
        assert_eq!(plan.immediate_len(), 1);
        assert!(plan.step(1).is_none());
    }

    #[test]
    fn test_pulse_plan() {
        let plan = TimedPlan::pulses(ControlInput::Jump, 2, Duration::from_millis(250));
        let timeline: Vec<(u64, bool)> = (0..)
            .map_while(|k| plan.step(k))
            .map(|s| (s.at.as_millis() as u64, s.pressed))
            .collect();
        assert_eq!(timeline, vec![(0, true), (250, false), (500, true), (750, false)]);
        assert_eq!(plan.total, Duration::from_millis(1000));
        assert_eq!(plan.immediate_len(), 1);
    }

    #[test]
    fn test_huge_pulse_count_stays_lazy() {
        let plan = TimedPlan::pulses(ControlInput::Jump, u32::MAX, Duration::from_millis(250));
        let last = plan.step(2 * u64::from(u32::MAX) - 1).unwrap();
        assert!(!last.pressed);
        assert_eq!(last.at, Duration::MAX);
        assert!(plan.step(2 * u64::from(u32::MAX)).is_none());
        assert_eq!(plan.total, Duration::from_millis(250) * u32::MAX * 2);
        assert_eq!(plan.immediate_len(), 1);
    }

    #[test]
    fn test_hold_total_saturates() {
        let plan = TimedPlan::hold(ControlInput::Back, u32::MAX, Duration::MAX);
        assert_eq!(plan.total, Duration::MAX);
    }

    #[test]
    fn test_failure_message() {
        let failure = TaskFailure::new(
            WorldError::NoPath("goal".into()),
            Some("Failed to reach coordinates".into()),
        );
        assert_eq!(failure.to_string(), "Failed to reach coordinates: No path to goal: goal");
    }
}
