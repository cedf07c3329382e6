//! 编排器：单一所有者的主控循环
//!
//! 所有状态只在一个 tokio 任务里修改：它同时消费公开命令通道与内部事件通道。
//! 计时器、等待型世界操作与翻译调用都在派生任务里执行，带着代号
//! （TaskId / 行为 generation / 连接 epoch）回报，过期的结果直接丢弃。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::AppConfig;
use crate::core::{
    Behavior, BehaviorSupervisor, BotError, BotStatus, ConnectionState, CooldownGate, FaultClass,
    Notice, Notifier, ReconnectPolicy, RecoveryEngine, Sender, Session, TaskId, TaskReport,
    TaskResult, TaskSlot,
};
use crate::store::{SettingsStore, Storage};
use crate::translator::{TranslateError, Translator};
use crate::world::{
    ControlInput, LiveView, ServerAddress, WorldConnector, WorldError, WorldEvent, WorldSession,
};

/// 存储与配置都未给出冷却时间时的默认值
const DEFAULT_COOLDOWN_MS: u64 = 2000;

/// 从前端发往编排器的命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 路由一行指令
    Route { text: String, sender: Sender },
    StartSession {
        address: ServerAddress,
        identity: String,
    },
    /// 结束会话且不重连
    StopSession,
    /// 等同 neutral，但不回复任何人
    GlobalStop,
    Quit,
}

/// 派生任务回报给编排器的内部事件
pub(crate) enum Event {
    Connected {
        epoch: u64,
        session: Arc<dyn WorldSession>,
    },
    ConnectFailed {
        epoch: u64,
        error: WorldError,
    },
    World {
        epoch: u64,
        event: WorldEvent,
    },
    ReconnectDue {
        epoch: u64,
    },
    LoginDue {
        epoch: u64,
    },
    /// 主动退出后服务器迟迟不确认断开
    EndTimeout {
        epoch: u64,
    },
    RobotCheckDone {
        epoch: u64,
        result: Result<u16, WorldError>,
    },
    TimedStep {
        id: TaskId,
        input: ControlInput,
        pressed: bool,
    },
    TaskExpired {
        id: TaskId,
        input: ControlInput,
        report: TaskReport,
    },
    TaskDone {
        id: TaskId,
        result: TaskResult,
    },
    BehaviorTick {
        generation: u64,
    },
    Translated {
        epoch: u64,
        sender: Sender,
        explicit: bool,
        result: Result<Vec<String>, TranslateError>,
    },
    TranslatedLine {
        epoch: u64,
        sender: Sender,
        line: String,
    },
}

/// 编排器的公开入口；可随意克隆
#[derive(Clone)]
pub struct BotHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl BotHandle {
    pub fn route_command(&self, text: impl Into<String>, sender: Sender) -> Result<(), BotError> {
        self.send(Command::Route {
            text: text.into(),
            sender,
        })
    }

    pub fn start_session(
        &self,
        address: ServerAddress,
        identity: impl Into<String>,
    ) -> Result<(), BotError> {
        self.send(Command::StartSession {
            address,
            identity: identity.into(),
        })
    }

    pub fn stop_session(&self) -> Result<(), BotError> {
        self.send(Command::StopSession)
    }

    pub fn global_stop(&self) -> Result<(), BotError> {
        self.send(Command::GlobalStop)
    }

    pub fn quit(&self) -> Result<(), BotError> {
        self.send(Command::Quit)
    }

    fn send(&self, cmd: Command) -> Result<(), BotError> {
        self.tx.send(cmd).map_err(|_| BotError::Stopped)
    }
}

/// 编排器依赖的协作方
pub struct BotDeps {
    pub config: AppConfig,
    pub connector: Arc<dyn WorldConnector>,
    pub store: Arc<dyn SettingsStore>,
    pub translator: Arc<dyn Translator>,
    pub live_view: Option<Arc<dyn LiveView>>,
}

/// 命令发送端、状态接收端、通知接收端
pub type BotChannels = (
    BotHandle,
    watch::Receiver<BotStatus>,
    broadcast::Receiver<Notice>,
);

/// 创建编排器并在后台任务中运行；必须在 tokio 运行时内调用
pub fn create_bot(deps: BotDeps) -> Result<BotChannels, BotError> {
    let storage = deps.store.load()?;
    let cooldown_ms = deps
        .config
        .timing
        .command_cooldown_ms
        .or(storage.settings.command_cooldown)
        .unwrap_or(DEFAULT_COOLDOWN_MS);

    // 两通道入：前端命令 / 内部事件；两通道出：状态快照 / 通知
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();
    let (status_tx, status_rx) = watch::channel(BotStatus::default());
    let (notice_tx, notice_rx) = broadcast::channel::<Notice>(64);

    tracing::info!(
        cooldown_ms,
        whitelisted = ?storage.whitelisted_players,
        translator = deps.translator.name(),
        "Bot orchestrator starting"
    );

    let bot = Bot {
        policy: ReconnectPolicy::from_config(&deps.config.reconnect),
        gate: CooldownGate::new(Duration::from_millis(cooldown_ms)),
        cfg: deps.config,
        connector: deps.connector,
        store: deps.store,
        translator: deps.translator,
        live_view: deps.live_view,
        storage,
        slot: TaskSlot::new(),
        behaviors: BehaviorSupervisor::new(),
        notifier: Notifier::new(notice_tx),
        recovery: RecoveryEngine::new(),
        session: None,
        world: None,
        epoch: 0,
        connect_task: None,
        login_attempted: false,
        viewer_started: false,
        translation_epoch: 0,
        events: event_tx,
        status: status_tx,
    };
    let actor = tokio::spawn(bot.run(cmd_rx, event_rx));
    tokio::spawn(supervise(actor));

    Ok((BotHandle { tx: cmd_tx }, status_rx, notice_rx))
}

/// 等待主控任务结束；异常终止时记录错误并返回 false
///
/// 主控任务退出后状态发送端随之丢弃，前端据此感知并关闭。
async fn supervise(actor: JoinHandle<()>) -> bool {
    match actor.await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(
                panicked = e.is_panic(),
                "Bot orchestrator terminated unexpectedly: {}",
                e
            );
            false
        }
    }
}

pub(crate) struct Bot {
    pub(super) cfg: AppConfig,
    pub(super) connector: Arc<dyn WorldConnector>,
    pub(super) store: Arc<dyn SettingsStore>,
    pub(super) translator: Arc<dyn Translator>,
    pub(super) live_view: Option<Arc<dyn LiveView>>,
    pub(super) storage: Storage,
    pub(super) gate: CooldownGate,
    pub(super) slot: TaskSlot,
    pub(super) behaviors: BehaviorSupervisor,
    pub(super) notifier: Notifier,
    pub(super) recovery: RecoveryEngine,
    pub(super) policy: ReconnectPolicy,
    /// 当前（或最近一次）会话记录；None 表示从未启动
    pub(super) session: Option<Session>,
    /// 已连接的会话句柄（出生前也可能存在）
    pub(super) world: Option<Arc<dyn WorldSession>>,
    /// 连接代号：每次发起连接、会话结束、主动停止都会递增
    pub(super) epoch: u64,
    pub(super) connect_task: Option<JoinHandle<()>>,
    pub(super) login_attempted: bool,
    pub(super) viewer_started: bool,
    /// 翻译序列代号：neutral 与会话结束会让排队中的翻译指令失效
    pub(super) translation_epoch: u64,
    pub(super) events: mpsc::UnboundedSender<Event>,
    pub(super) status: watch::Sender<BotStatus>,
}

impl Bot {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        let mut sweep = tokio::time::interval(self.cfg.timing.cooldown_sweep());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep.tick().await;

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Quit) | None => {
                        self.finish_session();
                        self.publish_status();
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(event) = events.recv() => self.handle_event(event),
                _ = sweep.tick() => self.sweep_cooldowns(),
            }
            self.publish_status();
        }
        tracing::info!("Bot orchestrator stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Route { text, sender } => self.route(&text, sender, true),
            Command::StartSession { address, identity } => self.start_session(address, identity),
            Command::StopSession => self.stop_session(),
            Command::GlobalStop => self.global_stop(),
            Command::Quit => {}
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connected { epoch, session } => self.on_connected(epoch, session),
            Event::ConnectFailed { epoch, error } => self.on_connect_failed(epoch, error),
            Event::World { epoch, event } => self.on_world_event(epoch, event),
            Event::ReconnectDue { epoch } => self.on_reconnect_due(epoch),
            Event::LoginDue { epoch } => self.on_login_due(epoch),
            Event::EndTimeout { epoch } => self.on_end_timeout(epoch),
            Event::RobotCheckDone { epoch, result } => self.on_robot_check_done(epoch, result),
            Event::TimedStep { id, input, pressed } => self.on_timed_step(id, input, pressed),
            Event::TaskExpired { id, input, report } => self.on_task_expired(id, input, report),
            Event::TaskDone { id, result } => self.on_task_done(id, result),
            Event::BehaviorTick { generation } => self.on_behavior_tick(generation),
            Event::Translated {
                epoch,
                sender,
                explicit,
                result,
            } => self.on_translated(epoch, sender, explicit, result),
            Event::TranslatedLine {
                epoch,
                sender,
                line,
            } => self.on_translated_line(epoch, sender, line),
        }
    }

    /// 已进入世界时的会话句柄
    pub(super) fn live(&self) -> Option<&Arc<dyn WorldSession>> {
        match &self.session {
            Some(s) if s.state == ConnectionState::Live => self.world.as_ref(),
            _ => None,
        }
    }

    pub(super) fn live_world(&self) -> Result<Arc<dyn WorldSession>, BotError> {
        self.live().cloned().ok_or(BotError::NotConnected)
    }

    pub(super) fn feedback(&self, to: &Sender, text: impl AsRef<str>) {
        self.notifier.feedback(self.live(), to, text.as_ref());
    }

    pub(super) fn broadcast(&self, text: impl AsRef<str>) {
        self.notifier.broadcast(self.live(), text.as_ref());
    }

    /// 处理器边界：把错误按类别记录并反馈给发送者
    pub(super) fn report_fault(&self, to: &Sender, err: BotError) {
        match self.recovery.classify(&err) {
            FaultClass::Admission => tracing::info!(sender = %to, "Command rejected: {}", err),
            FaultClass::TaskExecution => tracing::warn!(sender = %to, "Task failed: {}", err),
            FaultClass::TransientSession => {
                tracing::warn!(sender = %to, "Session fault: {}", err)
            }
        }
        if self.recovery.should_broadcast(&err) {
            self.broadcast(format!("§c* Bot error: {err}"));
        }
        self.feedback(to, err.to_string());
    }

    pub(super) fn publish_report(&self, to: &Sender, report: TaskReport) {
        if let Some(text) = report.broadcast {
            self.broadcast(text);
        }
        if let Some(text) = report.feedback {
            self.feedback(to, text);
        }
    }

    /// delay 之后把事件投回编排器
    pub(super) fn spawn_after(&self, delay: Duration, event: Event) {
        let tx = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }

    fn sweep_cooldowns(&mut self) {
        let max_age = self.gate.cooldown() * self.cfg.timing.cooldown_eviction_factor;
        let evicted = self.gate.evict_stale(Instant::now(), max_age);
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.gate.len(), "Evicted stale cooldown records");
        }
    }

    fn project_status(&self) -> BotStatus {
        let record = self.session.as_ref();
        BotStatus {
            connection: record.map_or(ConnectionState::Disconnected, |s| s.state),
            session_id: record.map(|s| s.id.to_string()),
            identity: record.map(|s| s.identity.clone()),
            address: record.map(|s| s.address.to_string()),
            live_since: record.and_then(|s| s.live_since.clone()),
            reconnect_failures: self.policy.failures(),
            last_error: record.and_then(|s| s.last_error.clone()),
            active_task: self.slot.current().map(|o| o.kind),
            behavior: self.behaviors.kind(),
            behavior_detail: self.behaviors.active().map(Behavior::describe),
            notifications: self.notifier.enabled(),
        }
    }

    fn publish_status(&self) {
        let next = self.project_status();
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_supervise_reports_clean_exit() {
        assert!(supervise(tokio::spawn(async {})).await);
    }

    #[tokio::test]
    async fn test_supervise_catches_panicking_orchestrator() {
        let actor = tokio::spawn(async { panic!("orchestrator fault") });
        assert!(!supervise(actor).await);
    }
}
