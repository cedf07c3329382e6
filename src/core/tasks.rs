//! 任务执行：定时任务驱动、等待型任务、行为 tick
//!
//! 派生任务只负责等待并回报事件，所有状态变更都回到编排器里完成。

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::orchestrator::{Bot, Event};
use crate::core::{
    Behavior, BehaviorKind, BotError, CancelHook, CancelledTask, Occupant, Sender, TaskFailure,
    TaskId, TaskKind, TaskOrigin, TaskReport, TaskResult, TimedPlan,
};
use crate::world::{ControlInput, Goal};

/// 跟随时的到达半径
const FOLLOW_RADIUS: f64 = 2.0;

impl Bot {
    fn install(&mut self, occupant: Occupant) {
        tracing::debug!(task = %occupant.id, kind = ?occupant.kind, sender = %occupant.sender, "Task started");
        if let Some(superseded) = self.slot.install(occupant) {
            self.on_superseded(superseded);
        }
    }

    /// 启动定时任务：零偏移的步骤立即生效，其余由计时任务按绝对时刻回报
    pub(super) fn start_timed(
        &mut self,
        kind: TaskKind,
        sender: Sender,
        plan: TimedPlan,
        report: TaskReport,
    ) -> Result<TaskId, BotError> {
        let world = self.live_world()?;
        let token = CancellationToken::new();
        let hook: CancelHook = {
            let world = world.clone();
            let input = plan.input;
            Box::new(move || world.set_control(input, false))
        };
        let occupant = Occupant::new(kind, sender, TaskOrigin::Direct, token.clone(), Some(hook));
        let id = occupant.id;
        self.install(occupant);

        let immediate = plan.immediate_len();
        for step in (0..immediate).filter_map(|k| plan.step(k)) {
            world.set_control(step.input, step.pressed);
        }

        let events = self.events.clone();
        let start = Instant::now();
        tokio::spawn(async move {
            let mut next = immediate;
            while let Some(step) = plan.step(next) {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = sleep_until_offset(start, step.at) => {
                        let event = Event::TimedStep { id, input: step.input, pressed: step.pressed };
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                }
                next += 1;
            }
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep_until_offset(start, plan.total) => {
                    let _ = events.send(Event::TaskExpired { id, input: plan.input, report });
                }
            }
        });
        Ok(id)
    }

    /// 启动等待型任务；被取代后 future 随取消令牌一起丢弃
    pub(super) fn start_awaited<F>(
        &mut self,
        kind: TaskKind,
        sender: Sender,
        origin: TaskOrigin,
        on_cancel: Option<CancelHook>,
        work: F,
    ) -> TaskId
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        let token = CancellationToken::new();
        let occupant = Occupant::new(kind, sender, origin, token.clone(), on_cancel);
        let id = occupant.id;
        self.install(occupant);

        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = work => {
                    let _ = events.send(Event::TaskDone { id, result });
                }
            }
        });
        id
    }

    pub(super) fn on_timed_step(&mut self, id: TaskId, input: ControlInput, pressed: bool) {
        if !self.slot.is_current(id) {
            return;
        }
        if let Some(world) = self.live() {
            world.set_control(input, pressed);
        }
    }

    pub(super) fn on_task_expired(
        &mut self,
        id: TaskId,
        input: ControlInput,
        report: TaskReport,
    ) {
        let Some(occupant) = self.slot.finish(id) else {
            tracing::debug!(task = %id, "Ignoring expiry of superseded task");
            return;
        };
        if let Some(world) = self.live() {
            world.set_control(input, false);
        }
        tracing::debug!(task = %id, kind = ?occupant.kind, "Timed task finished");
        self.publish_report(&occupant.sender, report);
    }

    pub(super) fn on_task_done(&mut self, id: TaskId, result: TaskResult) {
        let Some(occupant) = self.slot.finish(id) else {
            tracing::debug!(task = %id, "Discarding stale task completion");
            return;
        };
        match occupant.origin {
            TaskOrigin::Direct => match result {
                Ok(report) => {
                    tracing::debug!(task = %id, kind = ?occupant.kind, "Task completed");
                    self.publish_report(&occupant.sender, report);
                }
                Err(failure) => self.report_fault(&occupant.sender, BotError::Task(failure)),
            },
            TaskOrigin::Behavior(generation) => self.on_behavior_step_done(generation, result),
        }
    }

    /// 被取代的巡逻步在延迟后重新调度，跟随则由自己的周期 tick 继续
    pub(super) fn on_superseded(&mut self, cancelled: CancelledTask) {
        if let TaskOrigin::Behavior(generation) = cancelled.origin {
            if self.behaviors.is_current(generation) && self.behaviors.is_patrolling() {
                self.schedule_behavior_tick(self.cfg.timing.patrol_step_delay());
            }
        }
    }

    pub(super) fn schedule_behavior_tick(&self, delay: Duration) {
        self.spawn_after(
            delay,
            Event::BehaviorTick {
                generation: self.behaviors.generation(),
            },
        );
    }

    pub(super) fn on_behavior_tick(&mut self, generation: u64) {
        if !self.behaviors.is_current(generation) {
            return;
        }
        match self.behaviors.kind() {
            Some(BehaviorKind::Follow) => self.follow_step(generation),
            Some(BehaviorKind::Patrol) => self.patrol_step(generation),
            None => {}
        }
    }

    /// 停止当前行为并通知其发起者
    fn stop_behavior(&mut self, reason: Option<String>) {
        if let Some(stopped) = self.behaviors.stop() {
            tracing::info!(behavior = %stopped.describe(), "Behavior stopped");
            let text = match reason {
                Some(reason) => reason,
                None => stopped.stop_message(),
            };
            self.feedback(stopped.sender(), text);
        }
    }

    fn follow_step(&mut self, generation: u64) {
        let Some(Behavior::Following { target, sender }) = self.behaviors.active().cloned() else {
            return;
        };
        let Ok(world) = self.live_world() else {
            self.stop_behavior(None);
            return;
        };
        let Some(pos) = world.player_position(&target) else {
            self.stop_behavior(Some(format!("Lost sight of {target}, stopped following")));
            return;
        };

        let hook_world = world.clone();
        self.start_awaited(
            TaskKind::FollowStep,
            sender,
            TaskOrigin::Behavior(generation),
            Some(Box::new(move || hook_world.stop_pathfinding())),
            async move {
                world
                    .pathfind_to(Goal::Near {
                        pos,
                        radius: FOLLOW_RADIUS,
                    })
                    .await
                    .map(|()| TaskReport::silent())
                    .map_err(|e| TaskFailure::new(e, None))
            },
        );
        self.schedule_behavior_tick(self.cfg.timing.follow_interval());
    }

    pub(super) fn patrol_step(&mut self, generation: u64) {
        let Some(Behavior::Patrolling(patrol)) = self.behaviors.active().cloned() else {
            return;
        };
        if patrol.is_complete() {
            self.stop_behavior(Some(format!(
                "Patrol completed after {} loops",
                patrol.current_loop
            )));
            return;
        }
        let Ok(world) = self.live_world() else {
            self.stop_behavior(None);
            return;
        };

        let waypoint = patrol.next_waypoint();
        tracing::debug!(%waypoint, loop_index = patrol.current_loop, "Patrol step");
        let hook_world = world.clone();
        self.start_awaited(
            TaskKind::PatrolStep,
            patrol.sender,
            TaskOrigin::Behavior(generation),
            Some(Box::new(move || hook_world.stop_pathfinding())),
            async move {
                world
                    .pathfind_to(Goal::Block(waypoint))
                    .await
                    .map(|()| TaskReport::silent())
                    .map_err(|e| TaskFailure::new(e, None))
            },
        );
    }

    fn on_behavior_step_done(&mut self, generation: u64, result: TaskResult) {
        if !self.behaviors.is_current(generation) {
            return;
        }
        match (self.behaviors.kind(), result) {
            (Some(BehaviorKind::Follow), Err(failure)) => {
                tracing::debug!("Follow step failed: {}", failure);
            }
            (Some(BehaviorKind::Patrol), Ok(_)) => {
                if let Some(Behavior::Patrolling(patrol)) = self.behaviors.active_mut() {
                    patrol.advance();
                }
                self.schedule_behavior_tick(self.cfg.timing.patrol_step_delay());
            }
            (Some(BehaviorKind::Patrol), Err(failure)) => {
                tracing::warn!("Patrol step failed: {}", failure);
                self.stop_behavior(Some(format!("Patrol error: {failure}")));
            }
            _ => {}
        }
    }
}

/// 睡到 start + offset；超出时钟范围则永不醒来（只能被取消）
async fn sleep_until_offset(start: Instant, offset: Duration) {
    match start.checked_add(offset) {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
