//! 内存模拟世界（无需真实服务器）
//!
//! 用于离线运行与测试：SimWorld 保存位置 / 玩家 / 方块 / 背包与动作记录，
//! SimSession 实现 WorldSession，SimConnector 实现 WorldConnector 并支持脚本化的连接失败。
//! 所有耗时动作都用 tokio::time::sleep，配合 `start_paused` 的测试可以精确推进时间。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::traits::{
    BlockPos, ControlInput, Goal, LiveView, Position, ServerAddress, WorldConnector, WorldError,
    WorldEvent, WorldSession,
};

/// 模拟世界认识的方块类型
const KNOWN_BLOCKS: &[&str] = &[
    "stone",
    "dirt",
    "grass_block",
    "oak_log",
    "coal_ore",
    "iron_ore",
    "gold_ore",
    "diamond_ore",
    "sand",
    "gravel",
];

/// 模拟会话记录下来的每一个动作
#[derive(Debug, Clone, PartialEq)]
pub enum SimAction {
    Control { input: ControlInput, pressed: bool },
    ArmPathfinding,
    Pathfind(Goal),
    StopPathfinding,
    Attack(String),
    StopAttack,
    Collect(BlockPos),
    StopCollecting,
    Hotbar(u8),
    Equip(String),
    Chat(String),
    Direct { to: String, text: String },
    ClickWindow(u16),
    Disconnect,
}

#[derive(Debug)]
struct SimState {
    position: Position,
    players: HashMap<String, Position>,
    blocks: HashMap<String, Vec<BlockPos>>,
    inventory: Vec<String>,
    controls: HashSet<ControlInput>,
    unreachable: HashSet<BlockPos>,
    /// 当前打开的窗口：槽位号 -> 物品名
    window: Option<Vec<(u16, String)>>,
    path_epoch: u64,
    travel_time: Duration,
    action_time: Duration,
    actions: Vec<(Instant, SimAction)>,
}

/// 共享的模拟世界状态；跨重连保留
#[derive(Clone)]
pub struct SimWorld {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                position: Position::new(0.5, 64.0, 0.5),
                players: HashMap::new(),
                blocks: HashMap::new(),
                inventory: Vec::new(),
                controls: HashSet::new(),
                unreachable: HashSet::new(),
                window: None,
                path_epoch: 0,
                travel_time: Duration::from_millis(300),
                action_time: Duration::from_millis(300),
                actions: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // 模拟世界的锁从不跨 await 持有，中毒时直接沿用内部数据
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 寻路 / 攻击 / 采集耗时
    pub fn with_timings(self, travel_time: Duration, action_time: Duration) -> Self {
        {
            let mut st = self.lock();
            st.travel_time = travel_time;
            st.action_time = action_time;
        }
        self
    }

    pub fn set_position(&self, pos: Position) {
        self.lock().position = pos;
    }

    pub fn position(&self) -> Position {
        self.lock().position
    }

    pub fn add_player(&self, name: &str, pos: Position) {
        self.lock().players.insert(name.to_string(), pos);
    }

    pub fn remove_player(&self, name: &str) {
        self.lock().players.remove(name);
    }

    pub fn add_block(&self, block_type: &str, pos: BlockPos) {
        self.lock()
            .blocks
            .entry(block_type.to_string())
            .or_default()
            .push(pos);
    }

    pub fn give_item(&self, item: &str) {
        self.lock().inventory.push(item.to_string());
    }

    /// 之后所有到该方块的寻路都失败
    pub fn mark_unreachable(&self, pos: BlockPos) {
        self.lock().unreachable.insert(pos);
    }

    /// 打开一个窗口（不会自动上报 WindowOpened，测试自行 emit）
    pub fn open_window(&self, slots: &[(u16, &str)]) {
        self.lock().window = Some(
            slots
                .iter()
                .map(|(slot, item)| (*slot, item.to_string()))
                .collect(),
        );
    }

    pub fn is_pressed(&self, input: ControlInput) -> bool {
        self.lock().controls.contains(&input)
    }

    pub fn pressed_controls(&self) -> Vec<ControlInput> {
        let st = self.lock();
        ControlInput::ALL
            .into_iter()
            .filter(|c| st.controls.contains(c))
            .collect()
    }

    /// 动作记录（带时间戳）
    pub fn timeline(&self) -> Vec<(Instant, SimAction)> {
        self.lock().actions.clone()
    }

    pub fn actions(&self) -> Vec<SimAction> {
        self.lock().actions.iter().map(|(_, a)| a.clone()).collect()
    }

    pub fn pathfind_goals(&self) -> Vec<Goal> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                SimAction::Pathfind(goal) => Some(goal),
                _ => None,
            })
            .collect()
    }

    /// 发给某位玩家的私聊文本
    pub fn directs_to(&self, name: &str) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                SimAction::Direct { to, text } if to == name => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn chats(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                SimAction::Chat(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn clear_actions(&self) {
        self.lock().actions.clear();
    }

    fn record(&self, action: SimAction) {
        self.lock().actions.push((Instant::now(), action));
    }
}

/// 一次连接对应的会话句柄
pub struct SimSession {
    username: String,
    world: SimWorld,
    /// 退出时上报 Disconnected；None 表示服务器不确认
    events: Option<mpsc::UnboundedSender<WorldEvent>>,
}

#[async_trait]
impl WorldSession for SimSession {
    fn username(&self) -> String {
        self.username.clone()
    }

    fn set_control(&self, input: ControlInput, pressed: bool) {
        {
            let mut st = self.world.lock();
            if pressed {
                st.controls.insert(input);
            } else {
                st.controls.remove(&input);
            }
        }
        self.world.record(SimAction::Control { input, pressed });
    }

    fn control_state(&self, input: ControlInput) -> bool {
        self.world.is_pressed(input)
    }

    fn position(&self) -> Option<Position> {
        Some(self.world.position())
    }

    fn player_position(&self, name: &str) -> Option<Position> {
        self.world.lock().players.get(name).copied()
    }

    fn players(&self) -> Vec<String> {
        let mut names: Vec<String> = self.world.lock().players.keys().cloned().collect();
        names.push(self.username.clone());
        names
    }

    fn arm_pathfinding(&self) -> Result<(), WorldError> {
        self.world.record(SimAction::ArmPathfinding);
        Ok(())
    }

    async fn pathfind_to(&self, goal: Goal) -> Result<(), WorldError> {
        self.world.record(SimAction::Pathfind(goal));
        let (epoch, travel, blocked) = {
            let st = self.world.lock();
            let blocked = matches!(goal, Goal::Block(pos) if st.unreachable.contains(&pos));
            (st.path_epoch, st.travel_time, blocked)
        };
        tokio::time::sleep(travel).await;
        if blocked {
            return Err(WorldError::NoPath(format!("{goal:?}")));
        }
        let mut st = self.world.lock();
        if st.path_epoch != epoch {
            return Err(WorldError::Other("Path was stopped before it could be completed".into()));
        }
        st.position = match goal {
            Goal::Block(pos) => pos.center(),
            Goal::Near { pos, .. } => pos,
        };
        Ok(())
    }

    fn stop_pathfinding(&self) {
        self.world.lock().path_epoch += 1;
        self.world.record(SimAction::StopPathfinding);
    }

    async fn attack(&self, target: &str) -> Result<(), WorldError> {
        self.world.record(SimAction::Attack(target.to_string()));
        let wait = self.world.lock().action_time;
        tokio::time::sleep(wait).await;
        if self.player_position(target).is_none() {
            return Err(WorldError::PlayerNotFound(target.to_string()));
        }
        Ok(())
    }

    fn stop_attack(&self) {
        self.world.record(SimAction::StopAttack);
    }

    fn find_nearest_block(
        &self,
        block_type: &str,
        max_distance: u32,
    ) -> Result<Option<BlockPos>, WorldError> {
        let st = self.world.lock();
        if !KNOWN_BLOCKS.contains(&block_type) && !st.blocks.contains_key(block_type) {
            return Err(WorldError::UnknownBlock(block_type.to_string()));
        }
        let here = st.position;
        let nearest = st
            .blocks
            .get(block_type)
            .into_iter()
            .flatten()
            .map(|b| (here.distance_to(&b.center()), *b))
            .filter(|(d, _)| *d <= max_distance as f64)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, b)| b);
        Ok(nearest)
    }

    async fn collect_block(&self, pos: BlockPos) -> Result<(), WorldError> {
        self.world.record(SimAction::Collect(pos));
        let wait = self.world.lock().action_time;
        tokio::time::sleep(wait).await;
        let mut st = self.world.lock();
        for positions in st.blocks.values_mut() {
            positions.retain(|p| *p != pos);
        }
        Ok(())
    }

    fn stop_collecting(&self) {
        self.world.record(SimAction::StopCollecting);
    }

    fn select_hotbar(&self, slot: u8) -> Result<(), WorldError> {
        if slot > 8 {
            return Err(WorldError::Other(format!("Invalid hotbar slot {slot}")));
        }
        self.world.record(SimAction::Hotbar(slot));
        Ok(())
    }

    async fn equip(&self, item: &str) -> Result<String, WorldError> {
        let found = self
            .world
            .lock()
            .inventory
            .iter()
            .find(|name| name.contains(item))
            .cloned();
        match found {
            Some(name) => {
                self.world.record(SimAction::Equip(name.clone()));
                Ok(name)
            }
            None => Err(WorldError::ItemNotFound(item.to_string())),
        }
    }

    fn send_chat(&self, text: &str) -> Result<(), WorldError> {
        self.world.record(SimAction::Chat(text.to_string()));
        Ok(())
    }

    fn send_direct(&self, recipient: &str, text: &str) -> Result<(), WorldError> {
        self.world.record(SimAction::Direct {
            to: recipient.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn click_window_item(&self, item: &str) -> Result<u16, WorldError> {
        let slot = {
            let mut st = self.world.lock();
            let window = st.window.as_ref().ok_or(WorldError::NoWindow)?;
            let slot = window
                .iter()
                .find(|(_, name)| name.to_lowercase().contains(item))
                .map(|(slot, _)| *slot)
                .ok_or_else(|| WorldError::WindowItemNotFound(item.to_string()))?;
            st.window = None;
            slot
        };
        self.world.record(SimAction::ClickWindow(slot));
        Ok(slot)
    }

    fn disconnect(&self) {
        self.world.record(SimAction::Disconnect);
        if let Some(events) = &self.events {
            let _ = events.send(WorldEvent::Disconnected("disconnect.quitting".into()));
        }
    }
}

/// 模拟连接器：按脚本返回连接结果，成功时立即上报 Spawned
pub struct SimConnector {
    world: SimWorld,
    script: Mutex<VecDeque<WorldError>>,
    attempts: Mutex<Vec<Instant>>,
    current: Mutex<Option<mpsc::UnboundedSender<WorldEvent>>>,
    spawn_on_connect: bool,
    end_on_quit: bool,
}

impl SimConnector {
    pub fn new(world: SimWorld) -> Self {
        Self {
            world,
            script: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            spawn_on_connect: true,
            end_on_quit: true,
        }
    }

    /// 主动退出后服务器不回 Disconnected（模拟卡住的连接）
    pub fn without_end_on_quit(mut self) -> Self {
        self.end_on_quit = false;
        self
    }

    /// 连接成功后不自动出生（测试手动 emit Spawned）
    pub fn without_auto_spawn(mut self) -> Self {
        self.spawn_on_connect = false;
        self
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    /// 接下来 n 次连接以给定错误失败
    pub fn fail_next(&self, n: usize, err: WorldError) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..n {
            script.push_back(err.clone());
        }
    }

    /// 每次连接尝试的时间
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 向当前会话注入一个事件（断线、踢出、聊天等）
    pub fn emit(&self, event: WorldEvent) -> bool {
        match self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl WorldConnector for SimConnector {
    async fn connect(
        &self,
        address: &ServerAddress,
        identity: &str,
        events: mpsc::UnboundedSender<WorldEvent>,
    ) -> Result<Arc<dyn WorldSession>, WorldError> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Instant::now());
        tracing::debug!(%address, identity, "sim connect");

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }

        if self.spawn_on_connect {
            let _ = events.send(WorldEvent::Spawned);
        }
        let quit_events = self.end_on_quit.then(|| events.clone());
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(events);

        Ok(Arc::new(SimSession {
            username: identity.to_string(),
            world: self.world.clone(),
            events: quit_events,
        }))
    }
}

/// 模拟查看器：第一次启动成功，之后返回 AddrInUse（模拟端口已被占用）
#[derive(Default)]
pub struct SimLiveView {
    started: Mutex<u32>,
}

impl SimLiveView {
    pub fn start_count(&self) -> u32 {
        *self.started.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LiveView for SimLiveView {
    fn start(&self, _session: Arc<dyn WorldSession>, port: u16) -> Result<(), WorldError> {
        let mut started = self.started.lock().unwrap_or_else(|e| e.into_inner());
        *started += 1;
        if *started > 1 {
            return Err(WorldError::AddrInUse(format!("port {port}")));
        }
        Ok(())
    }
}
