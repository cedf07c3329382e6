//! 后台行为监管：跟随 / 巡逻，至多一个
//!
//! 行为本身只是状态机；编排器按 generation 调度它的每一步，
//! 停止或替换行为都会递增 generation，已排队的旧 tick 随之失效。

use serde::Serialize;

use crate::core::Sender;
use crate::world::BlockPos;

/// 巡逻状态：两个路点来回走
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patrol {
    pub waypoints: [BlockPos; 2],
    /// None 表示无限循环
    pub loop_limit: Option<u32>,
    pub index: usize,
    pub current_loop: u32,
    pub sender: Sender,
}

impl Patrol {
    pub fn new(waypoints: [BlockPos; 2], loop_limit: Option<u32>, sender: Sender) -> Self {
        Self {
            waypoints,
            loop_limit,
            index: 0,
            current_loop: 0,
            sender,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.loop_limit
            .map_or(false, |limit| self.current_loop >= limit)
    }

    pub fn next_waypoint(&self) -> BlockPos {
        self.waypoints[self.index]
    }

    /// 到达当前路点后前进；回到起点时循环数加一
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.waypoints.len();
        if self.index == 0 {
            self.current_loop += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    Following { target: String, sender: Sender },
    Patrolling(Patrol),
}

impl Behavior {
    pub fn sender(&self) -> &Sender {
        match self {
            Behavior::Following { sender, .. } => sender,
            Behavior::Patrolling(p) => &p.sender,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Behavior::Following { target, .. } => format!("following {target}"),
            Behavior::Patrolling(p) => match p.loop_limit {
                Some(limit) => format!("patrolling (loop {}/{limit})", p.current_loop + 1),
                None => format!("patrolling (loop {})", p.current_loop + 1),
            },
        }
    }

    /// 停止时给行为发起者的消息
    pub fn stop_message(&self) -> String {
        match self {
            Behavior::Following { target, .. } => format!("Stopped following {target}"),
            Behavior::Patrolling(_) => "Stopped patrolling".to_string(),
        }
    }
}

/// 状态投影用的行为类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BehaviorKind {
    Follow,
    Patrol,
}

/// follow 指令的结果
#[derive(Debug, PartialEq, Eq)]
pub enum FollowTransition {
    /// 已在跟随同一目标：关闭
    ToggledOff(Behavior),
    /// 开始跟随；replaced 是被替换掉的旧行为
    Started {
        generation: u64,
        replaced: Option<Behavior>,
    },
}

/// patrol 指令的结果
#[derive(Debug, PartialEq, Eq)]
pub enum PatrolTransition {
    ToggledOff(Behavior),
    Started {
        generation: u64,
        replaced: Option<Behavior>,
    },
}

#[derive(Debug, Default)]
pub struct BehaviorSupervisor {
    active: Option<Behavior>,
    generation: u64,
}

impl BehaviorSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 该 generation 的行为是否仍在运行
    pub fn is_current(&self, generation: u64) -> bool {
        self.active.is_some() && self.generation == generation
    }

    pub fn active(&self) -> Option<&Behavior> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut Behavior> {
        self.active.as_mut()
    }

    pub fn kind(&self) -> Option<BehaviorKind> {
        self.active.as_ref().map(|b| match b {
            Behavior::Following { .. } => BehaviorKind::Follow,
            Behavior::Patrolling(_) => BehaviorKind::Patrol,
        })
    }

    pub fn is_patrolling(&self) -> bool {
        self.kind() == Some(BehaviorKind::Patrol)
    }

    fn start(&mut self, behavior: Behavior) -> (u64, Option<Behavior>) {
        let replaced = self.active.replace(behavior);
        self.generation += 1;
        (self.generation, replaced)
    }

    /// 停止当前行为；空闲时无操作
    pub fn stop(&mut self) -> Option<Behavior> {
        let stopped = self.active.take();
        if stopped.is_some() {
            self.generation += 1;
        }
        stopped
    }

    /// 跟随同一目标时关闭；否则开始（替换任何现有行为）
    pub fn toggle_follow(&mut self, target: &str, sender: Sender) -> FollowTransition {
        let same_target = matches!(
            &self.active,
            Some(Behavior::Following { target: current, .. }) if current == target
        );
        if same_target {
            if let Some(stopped) = self.stop() {
                return FollowTransition::ToggledOff(stopped);
            }
        }
        let (generation, replaced) = self.start(Behavior::Following {
            target: target.to_string(),
            sender,
        });
        FollowTransition::Started {
            generation,
            replaced,
        }
    }

    /// 巡逻中再次下达 patrol 时关闭；否则开始
    pub fn toggle_patrol(&mut self, patrol: Patrol) -> PatrolTransition {
        if self.is_patrolling() {
            if let Some(stopped) = self.stop() {
                return PatrolTransition::ToggledOff(stopped);
            }
        }
        let (generation, replaced) = self.start(Behavior::Patrolling(patrol));
        PatrolTransition::Started {
            generation,
            replaced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patrol(limit: Option<u32>) -> Patrol {
        Patrol::new(
            [BlockPos::new(0, 0, 0), BlockPos::new(10, 0, 10)],
            limit,
            Sender::console(),
        )
    }

    #[test]
    fn test_patrol_loop_counting() {
        let mut p = patrol(Some(2));
        let mut visited = Vec::new();
        while !p.is_complete() {
            visited.push(p.next_waypoint());
            p.advance();
        }
        assert_eq!(
            visited,
            vec![
                BlockPos::new(0, 0, 0),
                BlockPos::new(10, 0, 10),
                BlockPos::new(0, 0, 0),
                BlockPos::new(10, 0, 10),
            ]
        );
        assert_eq!(p.current_loop, 2);
    }

    #[test]
    fn test_unbounded_patrol_never_completes() {
        let mut p = patrol(None);
        for _ in 0..100 {
            p.advance();
        }
        assert!(!p.is_complete());
    }

    #[test]
    fn test_follow_toggle_and_switch() {
        let mut sup = BehaviorSupervisor::new();
        let alice = Sender::private("Alice");

        let FollowTransition::Started { generation: g1, replaced } =
            sup.toggle_follow("Alice", alice.clone())
        else {
            panic!("expected start");
        };
        assert!(replaced.is_none());
        assert!(sup.is_current(g1));

        let FollowTransition::Started { generation: g2, replaced } =
            sup.toggle_follow("Bob", alice.clone())
        else {
            panic!("expected switch");
        };
        assert!(matches!(replaced, Some(Behavior::Following { target, .. }) if target == "Alice"));
        assert!(!sup.is_current(g1));
        assert!(sup.is_current(g2));

        assert!(matches!(
            sup.toggle_follow("Bob", alice),
            FollowTransition::ToggledOff(_)
        ));
        assert!(sup.active().is_none());
        assert!(!sup.is_current(g2));
    }

    #[test]
    fn test_patrol_toggle_and_exclusion() {
        let mut sup = BehaviorSupervisor::new();
        sup.toggle_follow("Alice", Sender::console());

        let PatrolTransition::Started { replaced, .. } = sup.toggle_patrol(patrol(None)) else {
            panic!("expected start");
        };
        assert!(matches!(replaced, Some(Behavior::Following { .. })));
        assert!(sup.is_patrolling());

        assert!(matches!(
            sup.toggle_patrol(patrol(Some(1))),
            PatrolTransition::ToggledOff(Behavior::Patrolling(_))
        ));
        assert!(sup.active().is_none());
    }

    #[test]
    fn test_stop_when_idle_keeps_generation() {
        let mut sup = BehaviorSupervisor::new();
        let before = sup.generation();
        assert!(sup.stop().is_none());
        assert_eq!(sup.generation(), before);
    }
}
