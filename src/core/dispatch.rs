//! 指令路由：准入、抢占、分发，以及聊天入口与自然语言翻译
//!
//! 顺序固定为：解析 → 冷却 → 取消当前任务 → neutral / 分发。

use std::time::Duration;

use tokio::time::Instant;

use crate::core::command::{BotCommand, GotoTarget, WhitelistOp, HELP_TEXT};
use crate::core::orchestrator::{Bot, Event};
use crate::core::{
    Behavior, BotError, FollowTransition, Patrol, PatrolTransition, Sender, TaskFailure, TaskKind,
    TaskOrigin, TaskReport, TimedPlan,
};
use crate::translator::{TranslateContext, TranslateError};
use crate::world::{ControlInput, Goal, ServerAddress, WorldError};

/// 查找方块的最大距离
const SEARCH_RADIUS: u32 = 64;
/// 走向玩家时的到达半径
const NEAR_RADIUS: f64 = 2.0;
/// 机器人验证用的箱子窗口
const VERIFICATION_WINDOWS: [&str; 2] = ["minecraft:generic_9x3", "minecraft:generic_9x6"];
const VERIFICATION_ITEM: &str = "iron_ingot";
/// 窗口打开后等待物品加载
const VERIFICATION_DELAY: Duration = Duration::from_secs(1);

impl Bot {
    /// 路由一行指令；gated 为 false 时跳过冷却（翻译出的后续指令）
    pub(super) fn route(&mut self, raw: &str, sender: Sender, gated: bool) {
        let Some(parsed) = BotCommand::parse(raw) else {
            return;
        };
        tracing::info!("[COMMAND] {}: {}", sender, raw.trim());

        if gated && !sender.is_console() {
            let now = Instant::now();
            if !self.gate.admit(&sender, now) {
                let remaining_ms = self
                    .gate
                    .remaining(&sender, now)
                    .map_or(0, |d| d.as_millis() as u64);
                self.report_fault(&sender, BotError::CooldownActive { remaining_ms });
                return;
            }
        }

        self.cancel_current_task();

        let cmd = match parsed {
            Ok(cmd) => cmd,
            Err(err) => {
                self.report_fault(&sender, err);
                return;
            }
        };
        if cmd == BotCommand::Neutral {
            self.global_stop();
            self.feedback(&sender, "Stopped all actions and returned to neutral state.");
            return;
        }
        if let Err(err) = self.dispatch(cmd, &sender) {
            self.report_fault(&sender, err);
        }
    }

    fn cancel_current_task(&mut self) {
        if let Some(cancelled) = self.slot.cancel_current() {
            tracing::debug!(task = %cancelled.id, kind = ?cancelled.kind, "Preempted current task");
            self.on_superseded(cancelled);
        }
    }

    /// 松开所有输入，停止寻路、战斗、采集与行为，清空任务槽
    pub(super) fn global_stop(&mut self) {
        if let Some(world) = self.world.clone() {
            for input in ControlInput::ALL {
                world.set_control(input, false);
            }
            world.stop_pathfinding();
            world.stop_attack();
            world.stop_collecting();
        }
        self.halt_activity();
        tracing::info!("Global stop: returned to neutral state");
    }

    fn dispatch(&mut self, cmd: BotCommand, sender: &Sender) -> Result<(), BotError> {
        if cmd.is_privileged() && !self.is_owner_or_console(sender) {
            let action = match cmd {
                BotCommand::Whitelist(_) => "manage the whitelist",
                BotCommand::SetServer(_) => "change server IP",
                _ => "change bot name",
            };
            return Err(BotError::PermissionDenied(format!(
                "Only {} can {action}.",
                self.cfg.bot.owner
            )));
        }
        if cmd.requires_session() {
            self.live_world()?;
        }

        match cmd {
            BotCommand::Move { input, steps } => {
                let plan = TimedPlan::hold(input, steps, self.cfg.timing.step());
                let report = TaskReport::feedback(format!("Finished moving {input}"))
                    .with_broadcast(format!("§e* Bot finished moving {input}"));
                self.start_timed(TaskKind::Move, sender.clone(), plan, report)?;
                self.broadcast(format!("§e* Bot is moving {input} for {steps} steps"));
                self.feedback(sender, format!("Moving {input} for {steps} steps"));
            }
            BotCommand::Jump { times } => {
                let plan = TimedPlan::pulses(ControlInput::Jump, times, self.cfg.timing.jump_pulse());
                self.start_timed(
                    TaskKind::Jump,
                    sender.clone(),
                    plan,
                    TaskReport::feedback("Finished jumping"),
                )?;
                self.feedback(sender, format!("Performing {times} jumps"));
            }
            BotCommand::Sneak => {
                let world = self.live_world()?;
                let sneaking = !world.control_state(ControlInput::Sneak);
                world.set_control(ControlInput::Sneak, sneaking);
                self.feedback(
                    sender,
                    if sneaking { "Sneak enabled" } else { "Sneak disabled" },
                );
            }
            BotCommand::Kill { target } => self.attack(target, sender)?,
            BotCommand::Mine { block } => self.mine(block, sender)?,
            BotCommand::StopCollecting => {
                self.live_world()?.stop_collecting();
                self.feedback(sender, "Stopped current mining operation");
            }
            BotCommand::FindBlock { block } => {
                let found = self.live_world()?.find_nearest_block(&block, SEARCH_RADIUS)?;
                match found {
                    Some(pos) => self.feedback(sender, format!("Found {block} at {pos}")),
                    None => self.feedback(
                        sender,
                        format!("Could not find {block} within {SEARCH_RADIUS} blocks"),
                    ),
                }
            }
            BotCommand::Say { text } => {
                self.live_world()?.send_chat(&text)?;
                self.feedback(sender, format!("Message sent: {text}"));
            }
            BotCommand::Goto(GotoTarget::Coords(coords)) => {
                let world = self.live_world()?;
                let here = world.position().ok_or(BotError::NotConnected)?;
                let pos = coords.resolve(here)?;
                self.start_awaited(
                    TaskKind::Goto,
                    sender.clone(),
                    TaskOrigin::Direct,
                    Some(Box::new({
                        let world = world.clone();
                        move || world.stop_pathfinding()
                    })),
                    async move {
                        world
                            .pathfind_to(Goal::Block(pos))
                            .await
                            .map(|()| {
                                TaskReport::feedback("Reached destination!")
                                    .with_broadcast("§e* Bot reached its destination")
                            })
                            .map_err(|e| {
                                TaskFailure::new(e, Some("Failed to reach coordinates".into()))
                            })
                    },
                );
                self.feedback(sender, format!("Moving to coordinates: {pos}"));
            }
            BotCommand::Goto(GotoTarget::Player(name)) => self.goto_player(name, sender)?,
            BotCommand::Come => {
                if self.live_world()?.player_position(&sender.name).is_none() {
                    return Err(BotError::Usage("Cannot find your position.".into()));
                }
                self.goto_player(sender.name.clone(), sender)?;
            }
            BotCommand::Pos => {
                let pos = self
                    .live_world()?
                    .position()
                    .ok_or(BotError::NotConnected)?
                    .floored();
                self.feedback(
                    sender,
                    format!("Current position: x={}, y={}, z={}", pos.x, pos.y, pos.z),
                );
            }
            BotCommand::Slot(slot) => {
                self.live_world()?.select_hotbar(slot - 1)?;
                self.feedback(sender, format!("Selected hotbar slot {slot}"));
            }
            BotCommand::Equip { item } => {
                let world = self.live_world()?;
                self.start_awaited(TaskKind::Equip, sender.clone(), TaskOrigin::Direct, None, async move {
                    world
                        .equip(&item)
                        .await
                        .map(|name| TaskReport::feedback(format!("Equipped {name}")))
                        .map_err(|e| TaskFailure::new(e, Some(format!("Failed to equip {item}"))))
                });
            }
            BotCommand::Follow { target } => self.follow(target, sender)?,
            BotCommand::Patrol { from, to, loops } => {
                let here = self
                    .live_world()?
                    .position()
                    .ok_or(BotError::NotConnected)?;
                let patrol = Patrol::new(
                    [from.resolve(here)?, to.resolve(here)?],
                    loops,
                    sender.clone(),
                );
                self.patrol(patrol, sender);
            }
            BotCommand::Pov => self.pov(sender)?,
            BotCommand::Notify(enabled) => {
                self.notifier.set_enabled(enabled);
                self.feedback(
                    sender,
                    if enabled {
                        "Notifications enabled"
                    } else {
                        "Notifications disabled"
                    },
                );
            }
            BotCommand::Ai { text } => {
                self.feedback(sender, format!("Processing: {text}"));
                self.request_translation(text, sender.clone(), true);
            }
            BotCommand::Help => self.feedback(sender, HELP_TEXT),
            BotCommand::Neutral => self.global_stop(),
            BotCommand::Whitelist(op) => self.manage_whitelist(op, sender)?,
            BotCommand::SetServer(ip) => {
                ip.parse::<ServerAddress>()?;
                self.storage.settings.default_server_ip = ip.clone();
                self.store.save(&self.storage)?;
                self.feedback(sender, format!("Server IP updated to: {ip}"));
            }
            BotCommand::SetName(name) => {
                self.storage.settings.default_bot_name = name.clone();
                self.store.save(&self.storage)?;
                self.feedback(
                    sender,
                    format!("Bot name updated to: {name} (Will take effect on next bot start)"),
                );
            }
        }
        Ok(())
    }

    fn is_owner_or_console(&self, sender: &Sender) -> bool {
        sender.is_console() || sender.name == self.cfg.bot.owner
    }

    fn attack(&mut self, target: String, sender: &Sender) -> Result<(), BotError> {
        let world = self.live_world()?;
        if world.player_position(&target).is_none() {
            return Err(WorldError::PlayerNotFound(target).into());
        }
        self.broadcast(format!("§c* Bot is attacking {target}"));
        self.feedback(sender, format!("Attacking {target}"));
        let hook_world = world.clone();
        self.start_awaited(
            TaskKind::Attack,
            sender.clone(),
            TaskOrigin::Direct,
            Some(Box::new(move || hook_world.stop_attack())),
            async move {
                world
                    .attack(&target)
                    .await
                    .map(|()| TaskReport::silent())
                    .map_err(|e| TaskFailure::new(e, Some(format!("Failed to attack {target}"))))
            },
        );
        Ok(())
    }

    fn mine(&mut self, block: String, sender: &Sender) -> Result<(), BotError> {
        let world = self.live_world()?;
        self.feedback(sender, format!("Searching for {block}"));
        let Some(pos) = world.find_nearest_block(&block, SEARCH_RADIUS)? else {
            self.feedback(
                sender,
                format!("Cannot find {block} within {SEARCH_RADIUS} blocks"),
            );
            return Ok(());
        };
        self.broadcast(format!("§e* Bot found {block} at {pos}"));
        let hook_world = world.clone();
        self.start_awaited(
            TaskKind::Mine,
            sender.clone(),
            TaskOrigin::Direct,
            Some(Box::new(move || hook_world.stop_collecting())),
            async move {
                world
                    .collect_block(pos)
                    .await
                    .map(|()| TaskReport::feedback(format!("Successfully mined {block}")))
                    .map_err(|e| TaskFailure::new(e, Some(format!("Failed to mine {block}"))))
            },
        );
        Ok(())
    }

    fn goto_player(&mut self, name: String, sender: &Sender) -> Result<(), BotError> {
        let world = self.live_world()?;
        let pos = world
            .player_position(&name)
            .ok_or_else(|| WorldError::PlayerNotFound(name.clone()))?;
        self.feedback(sender, format!("Moving to {name}'s location"));
        let hook_world = world.clone();
        self.start_awaited(
            TaskKind::Goto,
            sender.clone(),
            TaskOrigin::Direct,
            Some(Box::new(move || hook_world.stop_pathfinding())),
            async move {
                world
                    .pathfind_to(Goal::Near {
                        pos,
                        radius: NEAR_RADIUS,
                    })
                    .await
                    .map(|()| TaskReport::feedback(format!("Reached {name}!")))
                    .map_err(|e| TaskFailure::new(e, Some(format!("Failed to reach {name}"))))
            },
        );
        Ok(())
    }

    fn follow(&mut self, target: String, sender: &Sender) -> Result<(), BotError> {
        let toggling_off = matches!(
            self.behaviors.active(),
            Some(Behavior::Following { target: current, .. }) if *current == target
        );
        if !toggling_off && self.live_world()?.player_position(&target).is_none() {
            return Err(WorldError::PlayerNotFound(target).into());
        }

        match self.behaviors.toggle_follow(&target, sender.clone()) {
            FollowTransition::ToggledOff(stopped) => {
                self.feedback(sender, stopped.stop_message());
            }
            FollowTransition::Started { replaced, .. } => {
                if let Some(old @ Behavior::Patrolling(_)) = replaced {
                    self.feedback(old.sender(), old.stop_message());
                }
                self.broadcast(format!("§e* Bot is now following {target}"));
                self.feedback(sender, format!("Now following {target}"));
                self.schedule_behavior_tick(self.cfg.timing.follow_interval());
            }
        }
        Ok(())
    }

    fn patrol(&mut self, patrol: Patrol, sender: &Sender) {
        let loops = patrol
            .loop_limit
            .map_or_else(|| "infinite".to_string(), |n| n.to_string());
        match self.behaviors.toggle_patrol(patrol) {
            PatrolTransition::ToggledOff(stopped) => {
                self.feedback(sender, stopped.stop_message());
            }
            PatrolTransition::Started {
                generation,
                replaced,
            } => {
                if let Some(old @ Behavior::Following { .. }) = replaced {
                    self.feedback(old.sender(), old.stop_message());
                }
                self.feedback(
                    sender,
                    format!("Starting patrol between points for {loops} loops"),
                );
                self.patrol_step(generation);
            }
        }
    }

    fn pov(&mut self, sender: &Sender) -> Result<(), BotError> {
        let port = self.cfg.bot.viewer_port;
        let url = format!("http://localhost:{port}");
        let Some(view) = self.live_view.clone() else {
            self.feedback(sender, "POV viewer is not available");
            return Ok(());
        };
        if self.viewer_started {
            self.feedback(sender, format!("POV viewer is already running at {url}"));
            return Ok(());
        }
        match view.start(self.live_world()?, port) {
            Ok(()) => {
                self.viewer_started = true;
                self.feedback(sender, format!("View your POV at {url}"));
            }
            Err(WorldError::AddrInUse(_)) => {
                self.viewer_started = true;
                self.feedback(sender, format!("POV viewer is already running at {url}"));
            }
            Err(e) => self.feedback(sender, format!("Failed to initialize POV viewer: {e}")),
        }
        Ok(())
    }

    fn manage_whitelist(&mut self, op: WhitelistOp, sender: &Sender) -> Result<(), BotError> {
        let reply = match op {
            WhitelistOp::Add(player) => {
                if self.storage.add_player(&player) {
                    self.store.save(&self.storage)?;
                    format!("Added {player} to whitelist.")
                } else {
                    format!("{player} is already whitelisted.")
                }
            }
            WhitelistOp::Remove(player) => {
                if player == self.cfg.bot.owner {
                    format!("Cannot remove {player} from whitelist.")
                } else if self.storage.remove_player(&player) {
                    self.store.save(&self.storage)?;
                    format!("Removed {player} from whitelist.")
                } else {
                    format!("{player} is not whitelisted.")
                }
            }
            WhitelistOp::List => format!(
                "Whitelisted players: {}",
                self.storage.whitelisted_players.join(", ")
            ),
        };
        self.feedback(sender, reply);
        Ok(())
    }

    /// 公共聊天：私信转发、前缀指令、主人的自然语言
    pub(super) fn on_chat(&mut self, username: String, message: String) {
        if self
            .world
            .as_ref()
            .map_or(false, |w| w.username() == username)
        {
            return;
        }

        if let Some((head, command)) = message.split_once("-> me:") {
            let name = head.trim().trim_start_matches('✉').trim();
            let name = if name.is_empty() { username.as_str() } else { name };
            self.route(command.trim(), Sender::private(name), true);
            return;
        }

        let prefix = self.cfg.bot.chat_prefix.clone();
        if let Some(command) = message.strip_prefix(prefix.as_str()).filter(|_| !prefix.is_empty()) {
            if self.storage.is_whitelisted(&username) {
                self.route(command.trim(), Sender::public(username), true);
            } else {
                tracing::warn!(player = %username, "Rejected command from non-whitelisted player");
                self.feedback(
                    &Sender::private(username),
                    "You are not whitelisted to use bot commands.",
                );
            }
            return;
        }

        if username == self.cfg.bot.owner {
            self.request_translation(message, Sender::public(username), false);
        }
    }

    pub(super) fn on_whisper(&mut self, username: String, message: String) {
        self.route(&message, Sender::private(username), true);
    }

    pub(super) fn on_system_message(&mut self, text: String) {
        let lower = text.to_lowercase();
        if ["verify", "robot", "click the iron"]
            .iter()
            .any(|k| lower.contains(k))
        {
            tracing::warn!("Robot verification requested: {}", text);
            self.broadcast("§e* Robot verification requested");
        }
        if ["register", "login", "password"]
            .iter()
            .any(|k| lower.contains(k))
        {
            self.on_login_prompt();
        }
    }

    /// 验证箱子打开后稍等片刻，再点击其中的铁锭
    pub(super) fn on_window_opened(&mut self, window_type: String) {
        tracing::info!(%window_type, "Window opened");
        if !VERIFICATION_WINDOWS.contains(&window_type.as_str()) {
            return;
        }
        let Some(world) = self.world.clone() else {
            return;
        };
        let epoch = self.epoch;
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(VERIFICATION_DELAY).await;
            let result = world.click_window_item(VERIFICATION_ITEM).await;
            let _ = events.send(Event::RobotCheckDone { epoch, result });
        });
    }

    pub(super) fn on_robot_check_done(&mut self, epoch: u64, result: Result<u16, WorldError>) {
        if epoch != self.epoch {
            return;
        }
        match result {
            Ok(slot) => {
                tracing::info!(slot, "Clicked iron ingot for robot verification");
                self.broadcast("§a* Completed robot verification");
            }
            Err(WorldError::NoWindow) => tracing::warn!("No window open for robot check"),
            Err(WorldError::WindowItemNotFound(_)) => {
                tracing::warn!("Could not find iron ingot in chest")
            }
            Err(e) => {
                tracing::error!("Robot check failed: {}", e);
                self.broadcast(format!("§c* Failed robot verification: {e}"));
            }
        }
    }

    /// 在后台翻译自由文本；explicit 表示来自 ai 指令（无法理解时要回复）
    fn request_translation(&mut self, text: String, sender: Sender, explicit: bool) {
        let ctx = TranslateContext {
            players: self.live().map(|w| w.players()).unwrap_or_default(),
            requester: sender.name.clone(),
        };
        let translator = self.translator.clone();
        let events = self.events.clone();
        let epoch = self.translation_epoch;
        tokio::spawn(async move {
            let result = translator.translate(&text, &ctx).await;
            let _ = events.send(Event::Translated {
                epoch,
                sender,
                explicit,
                result,
            });
        });
    }

    pub(super) fn on_translated(
        &mut self,
        epoch: u64,
        sender: Sender,
        explicit: bool,
        result: Result<Vec<String>, TranslateError>,
    ) {
        if epoch != self.translation_epoch {
            tracing::debug!(epoch, "Dropping stale translation");
            return;
        }
        let lines = match result {
            Ok(lines) if !lines.is_empty() => lines,
            Ok(_) | Err(TranslateError::NoMatch(_)) if !explicit => {
                tracing::debug!(sender = %sender, "No command recognized in chat");
                return;
            }
            Ok(_) => {
                self.report_fault(&sender, TranslateError::NoMatch("empty plan".into()).into());
                return;
            }
            Err(e) => {
                self.report_fault(&sender, e.into());
                return;
            }
        };

        // 自由聊天在翻译出指令后才占用冷却
        if !explicit && !sender.is_console() {
            let now = Instant::now();
            if !self.gate.admit(&sender, now) {
                let remaining_ms = self
                    .gate
                    .remaining(&sender, now)
                    .map_or(0, |d| d.as_millis() as u64);
                self.report_fault(&sender, BotError::CooldownActive { remaining_ms });
                return;
            }
        }

        tracing::info!(sender = %sender, ?lines, "Translated natural language request");
        self.broadcast(format!("§d* Planning to execute: {}", lines.join(" | ")));

        let gap = self.cfg.timing.translated_command_gap();
        let events = self.events.clone();
        tokio::spawn(async move {
            for (i, line) in lines.into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(gap).await;
                }
                let event = Event::TranslatedLine {
                    epoch,
                    sender: sender.clone(),
                    line,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        });
    }

    pub(super) fn on_translated_line(&mut self, epoch: u64, sender: Sender, line: String) {
        if epoch != self.translation_epoch {
            tracing::debug!(%line, "Skipping cancelled translated command");
            return;
        }
        self.feedback(&sender, format!("Executing: {line}"));
        self.route(&line, sender, false);
    }
}
