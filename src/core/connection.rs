//! 会话生命周期：连接、出生、断线重连、主动结束
//!
//! 连接在派生任务里进行，成功后该任务继续转发世界事件；
//! 每个事件都带着发起时的 epoch，epoch 落后即视为旧会话的残留。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::orchestrator::{Bot, Event};
use crate::core::{ConnectionState, ReconnectDecision, Session};
use crate::world::{ServerAddress, WorldError, WorldEvent, WorldSession};

/// 主动退出后等待服务器确认断开的时长
const END_GRACE: Duration = Duration::from_secs(5);

impl Bot {
    /// 显式启动会话：重连计数清零
    pub(super) fn start_session(&mut self, address: ServerAddress, identity: String) {
        tracing::info!(%address, %identity, "Starting bot session");
        self.policy.reset();
        self.session = Some(Session::new(address, identity));
        self.begin_connect();
    }

    /// 针对当前会话记录发起一次连接
    pub(super) fn begin_connect(&mut self) {
        self.teardown_connection();
        let Some(record) = self.session.as_mut() else {
            return;
        };
        record.id = uuid::Uuid::new_v4();
        record.state = ConnectionState::Connecting;
        record.live_since = None;
        self.epoch += 1;

        let epoch = self.epoch;
        let address = record.address.clone();
        let identity = record.identity.clone();
        let connector = self.connector.clone();
        let events = self.events.clone();
        tracing::info!(epoch, session_id = %record.id, %address, "Connecting");

        self.connect_task = Some(tokio::spawn(async move {
            let (world_tx, mut world_rx) = mpsc::unbounded_channel::<WorldEvent>();
            match connector.connect(&address, &identity, world_tx).await {
                Ok(session) => {
                    if events.send(Event::Connected { epoch, session }).is_err() {
                        return;
                    }
                    while let Some(event) = world_rx.recv().await {
                        if events.send(Event::World { epoch, event }).is_err() {
                            break;
                        }
                    }
                }
                Err(error) => {
                    let _ = events.send(Event::ConnectFailed { epoch, error });
                }
            }
        }));
    }

    /// 断开当前连接：停止转发、清空任务与行为、断开会话
    pub(super) fn teardown_connection(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.halt_activity();
        if let Some(world) = self.world.take() {
            world.disconnect();
        }
        self.login_attempted = false;
        self.viewer_started = false;
    }

    /// 取消任务槽、停止行为、作废排队中的翻译指令
    pub(super) fn halt_activity(&mut self) {
        if let Some(cancelled) = self.slot.cancel_current() {
            tracing::debug!(task = %cancelled.id, kind = ?cancelled.kind, "Cancelled active task");
        }
        if let Some(stopped) = self.behaviors.stop() {
            tracing::debug!(behavior = %stopped.describe(), "Stopped behavior");
        }
        self.translation_epoch += 1;
    }

    pub(super) fn on_connected(&mut self, epoch: u64, session: Arc<dyn WorldSession>) {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "Dropping stale connection");
            session.disconnect();
            return;
        }
        tracing::info!(epoch, username = %session.username(), "Connected, waiting for spawn");
        self.world = Some(session);
    }

    pub(super) fn on_connect_failed(&mut self, epoch: u64, error: WorldError) {
        if epoch != self.epoch {
            return;
        }
        tracing::warn!(epoch, "Connection attempt failed: {}", error);
        self.connect_task = None;
        if let Some(record) = self.session.as_mut() {
            record.state = ConnectionState::Disconnected;
            record.last_error = Some(error.to_string());
        }
        let decision = self.policy.on_attempt_failed();
        self.schedule_reconnect(decision);
    }

    pub(super) fn on_world_event(&mut self, epoch: u64, event: WorldEvent) {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, ?event, "Ignoring event from old session");
            return;
        }
        if self.is_ending() {
            match event {
                WorldEvent::Disconnected(_) | WorldEvent::Kicked(_) | WorldEvent::Error(_) => {
                    self.finish_session()
                }
                event => tracing::debug!(?event, "Ignoring event while ending session"),
            }
            return;
        }
        match event {
            WorldEvent::Spawned => self.on_spawned(),
            WorldEvent::Disconnected(reason) => {
                tracing::warn!("Bot disconnected: {}", reason);
                self.on_session_end(reason);
            }
            WorldEvent::Kicked(reason) => {
                tracing::warn!("Bot was kicked: {}", reason);
                self.on_session_end(format!("kicked: {reason}"));
            }
            WorldEvent::Error(message) => {
                tracing::error!("Bot error: {}", message);
                self.on_session_end(message);
            }
            WorldEvent::Chat { username, message } => self.on_chat(username, message),
            WorldEvent::Whisper { username, message } => self.on_whisper(username, message),
            WorldEvent::SystemMessage(text) => self.on_system_message(text),
            WorldEvent::WindowOpened { window_type } => self.on_window_opened(window_type),
        }
    }

    fn on_spawned(&mut self) {
        let Some(record) = self.session.as_mut() else {
            return;
        };
        record.mark_live();
        record.last_error = None;
        tracing::info!(session_id = %record.id, identity = %record.identity, "Bot spawned in world");
        self.policy.on_spawn();
        self.login_attempted = false;

        let Some(world) = self.world.clone() else {
            return;
        };
        if let Err(e) = world.arm_pathfinding() {
            tracing::warn!("Failed to load pathfinding movements: {}", e);
            self.broadcast(format!("§c* Error loading plugins: {e}"));
        }
        self.start_viewer(&world);
    }

    /// 出生后启动实时视角；端口已被占用视为已在运行
    fn start_viewer(&mut self, world: &Arc<dyn WorldSession>) {
        if self.viewer_started {
            return;
        }
        let Some(view) = self.live_view.clone() else {
            return;
        };
        let port = self.cfg.bot.viewer_port;
        match view.start(world.clone(), port) {
            Ok(()) => {
                self.viewer_started = true;
                tracing::info!("POV viewer initialized at http://localhost:{}", port);
            }
            Err(WorldError::AddrInUse(_)) => {
                self.viewer_started = true;
                tracing::warn!(port, "POV viewer port already in use, assuming it is running");
            }
            Err(e) => tracing::warn!("Failed to initialize POV viewer: {}", e),
        }
    }

    /// 会话结束（断开 / 踢出 / 错误）：清理并安排重连
    fn on_session_end(&mut self, reason: String) {
        let was_live = self.live().is_some();
        self.teardown_connection();
        self.epoch += 1;
        if let Some(record) = self.session.as_mut() {
            record.state = ConnectionState::Disconnected;
            record.live_since = None;
            record.last_error = Some(reason);
        }
        let decision = if was_live {
            self.policy.on_session_lost()
        } else {
            self.policy.on_attempt_failed()
        };
        self.schedule_reconnect(decision);
    }

    fn schedule_reconnect(&mut self, decision: ReconnectDecision) {
        match decision {
            ReconnectDecision::Retry { after, attempt } => tracing::info!(
                attempt,
                delay_secs = after.as_secs(),
                "Attempting to reconnect"
            ),
            ReconnectDecision::Cooldown { after } => tracing::warn!(
                delay_secs = after.as_secs(),
                "Max reconnect attempts reached, cooling down"
            ),
        }
        self.spawn_after(decision.delay(), Event::ReconnectDue { epoch: self.epoch });
    }

    pub(super) fn on_reconnect_due(&mut self, epoch: u64) {
        let disconnected = self
            .session
            .as_ref()
            .map_or(false, |s| s.state == ConnectionState::Disconnected);
        if epoch != self.epoch || !disconnected {
            return;
        }
        self.begin_connect();
    }

    /// 主动结束会话，不再重连
    ///
    /// 已有会话句柄时先进入 Ending，等服务器确认断开（或超时）后再转为 Disconnected。
    pub(super) fn stop_session(&mut self) {
        let Some(record) = self.session.as_mut() else {
            return;
        };
        match record.state {
            ConnectionState::Ending => return,
            ConnectionState::Disconnected if self.connect_task.is_none() => {
                // 作废排队中的重连
                self.epoch += 1;
                return;
            }
            _ => {}
        }
        let Some(world) = self.world.take() else {
            self.finish_session();
            return;
        };
        record.state = ConnectionState::Ending;
        record.live_since = None;
        tracing::info!(session_id = %record.id, "Ending bot session");
        self.halt_activity();
        world.disconnect();
        self.spawn_after(END_GRACE, Event::EndTimeout { epoch: self.epoch });
    }

    /// 立即结束会话：不等服务器确认，不重连
    pub(super) fn finish_session(&mut self) {
        self.epoch += 1;
        self.teardown_connection();
        if let Some(record) = self.session.as_mut() {
            if record.state != ConnectionState::Disconnected {
                tracing::info!(session_id = %record.id, "Bot session ended");
            }
            record.state = ConnectionState::Disconnected;
            record.live_since = None;
        }
    }

    pub(super) fn on_end_timeout(&mut self, epoch: u64) {
        if epoch != self.epoch || !self.is_ending() {
            return;
        }
        tracing::warn!(
            grace_secs = END_GRACE.as_secs(),
            "Server did not acknowledge disconnect, closing session"
        );
        self.finish_session();
    }

    fn is_ending(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| s.state == ConnectionState::Ending)
    }

    /// 系统消息里出现注册 / 登录提示时自动登录（每次会话只尝试一次）
    pub(super) fn on_login_prompt(&mut self) {
        if self.login_attempted {
            return;
        }
        let (Some(password), Some(world)) = (self.cfg.bot.password.clone(), self.world.clone())
        else {
            return;
        };
        self.login_attempted = true;
        tracing::info!("Server requested authentication, registering");
        if let Err(e) = world.send_chat(&format!("/register {password} {password}")) {
            tracing::warn!("Failed to send register command: {}", e);
        }
        self.spawn_after(
            self.cfg.timing.login_delay(),
            Event::LoginDue { epoch: self.epoch },
        );
    }

    pub(super) fn on_login_due(&mut self, epoch: u64) {
        if epoch != self.epoch {
            return;
        }
        let (Some(password), Some(world)) = (self.cfg.bot.password.as_deref(), self.world.as_ref())
        else {
            return;
        };
        if let Err(e) = world.send_chat(&format!("/login {password}")) {
            tracing::warn!("Failed to send login command: {}", e);
        }
    }
}
