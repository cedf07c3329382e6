//! 指令来源与解析
//!
//! 原始文本按空白切分，首词小写即指令名；解析成 BotCommand 后交给编排器分发。

use std::fmt;

use serde::Serialize;

use crate::core::BotError;
use crate::world::{BlockPos, ControlInput, Position};

/// 控制台发送者的固定名字
pub const CONSOLE: &str = "CONSOLE";

/// 指令来源通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Console,
    Private,
    Public,
}

/// 指令发送者：名字 + 通道
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Sender {
    pub name: String,
    pub channel: Channel,
}

impl Sender {
    pub fn console() -> Self {
        Self {
            name: CONSOLE.to_string(),
            channel: Channel::Console,
        }
    }

    pub fn private(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: Channel::Private,
        }
    }

    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: Channel::Public,
        }
    }

    pub fn is_console(&self) -> bool {
        self.channel == Channel::Console
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Channel::Console => f.write_str(CONSOLE),
            Channel::Private => write!(f, "{} (private)", self.name),
            Channel::Public => write!(f, "{} (public)", self.name),
        }
    }
}

/// 单个坐标分量：绝对值，或 `~` / `~n` 相对当前位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coord {
    Absolute(i32),
    Relative(i32),
}

impl Coord {
    pub fn parse(s: &str) -> Option<Coord> {
        if let Some(offset) = s.strip_prefix('~') {
            if offset.is_empty() {
                return Some(Coord::Relative(0));
            }
            return offset.parse::<i32>().ok().map(Coord::Relative);
        }
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| Coord::Absolute(v.floor() as i32))
    }

    /// 相对偏移越界时为 None
    pub fn resolve(self, base: f64) -> Option<i32> {
        match self {
            Coord::Absolute(v) => Some(v),
            Coord::Relative(offset) => (base.floor() as i32).checked_add(offset),
        }
    }
}

/// 三个坐标分量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordTriple(pub [Coord; 3]);

impl CoordTriple {
    fn parse(args: &[&str]) -> Option<CoordTriple> {
        match args {
            [x, y, z, ..] => Some(CoordTriple([
                Coord::parse(x)?,
                Coord::parse(y)?,
                Coord::parse(z)?,
            ])),
            _ => None,
        }
    }

    pub fn resolve(&self, here: Position) -> Result<BlockPos, BotError> {
        let [x, y, z] = self.0;
        match (x.resolve(here.x), y.resolve(here.y), z.resolve(here.z)) {
            (Some(x), Some(y), Some(z)) => Ok(BlockPos::new(x, y, z)),
            _ => Err(BotError::Usage(INVALID_COORDS.into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GotoTarget {
    Coords(CoordTriple),
    Player(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhitelistOp {
    Add(String),
    Remove(String),
    List,
}

/// 解析后的指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Move { input: ControlInput, steps: u32 },
    Jump { times: u32 },
    Sneak,
    Kill { target: String },
    Mine { block: String },
    StopCollecting,
    FindBlock { block: String },
    Say { text: String },
    Goto(GotoTarget),
    Come,
    Pos,
    Slot(u8),
    Equip { item: String },
    Follow { target: String },
    Patrol {
        from: CoordTriple,
        to: CoordTriple,
        loops: Option<u32>,
    },
    Pov,
    Notify(bool),
    Ai { text: String },
    Help,
    Neutral,
    Whitelist(WhitelistOp),
    SetServer(String),
    SetName(String),
}

const INVALID_COORDS: &str = "Invalid coordinates. Use numbers or ~ for relative coordinates.";

impl BotCommand {
    /// 解析一行指令；空行返回 None
    pub fn parse(raw: &str) -> Option<Result<BotCommand, BotError>> {
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        let (name, args) = tokens.split_first()?;
        Some(Self::from_tokens(&name.to_lowercase(), args))
    }

    fn from_tokens(name: &str, args: &[&str]) -> Result<BotCommand, BotError> {
        let first = args.first().copied();
        let rest = || args.join(" ");
        let required = |usage: &str| {
            first
                .map(String::from)
                .ok_or_else(|| BotError::Usage(usage.to_string()))
        };

        let cmd = match name {
            "up" | "forward" => Self::movement(ControlInput::Forward, first),
            "down" | "back" => Self::movement(ControlInput::Back, first),
            "left" => Self::movement(ControlInput::Left, first),
            "right" => Self::movement(ControlInput::Right, first),
            "jump" => BotCommand::Jump {
                times: count_or_one(first),
            },
            "sneak" => BotCommand::Sneak,
            "kill" => BotCommand::Kill {
                target: required("Usage: kill <player>")?,
            },
            "mine" => BotCommand::Mine {
                block: required("Usage: mine <block_type>")?,
            },
            "stop" => BotCommand::StopCollecting,
            "findblock" => BotCommand::FindBlock {
                block: required("Usage: findblock <block_type>")?,
            },
            "say" => {
                if args.is_empty() {
                    return Err(BotError::Usage("Usage: say <message>".into()));
                }
                BotCommand::Say { text: rest() }
            }
            "goto" | "g" => match args.len() {
                0 => {
                    return Err(BotError::Usage(
                        "Usage: goto <x> <y> <z> OR goto <player>".into(),
                    ))
                }
                1 => BotCommand::Goto(GotoTarget::Player(args[0].to_string())),
                _ => BotCommand::Goto(GotoTarget::Coords(
                    CoordTriple::parse(args).ok_or_else(|| BotError::Usage(INVALID_COORDS.into()))?,
                )),
            },
            "come" => BotCommand::Come,
            "pos" | "position" => BotCommand::Pos,
            "ss" | "slot" => {
                let slot = first
                    .and_then(|s| s.parse::<u8>().ok())
                    .filter(|n| (1..=9).contains(n))
                    .ok_or_else(|| {
                        BotError::Usage("Please specify a valid slot number (1-9)".into())
                    })?;
                BotCommand::Slot(slot)
            }
            "equip" => BotCommand::Equip {
                item: required("Usage: equip <item>")?,
            },
            "follow" => BotCommand::Follow {
                target: required("Usage: follow <player>")?,
            },
            "patrol" => {
                if args.len() < 6 {
                    return Err(BotError::Usage(
                        "Usage: patrol <x1> <y1> <z1> <x2> <y2> <z2> [loops]".into(),
                    ));
                }
                let invalid = || BotError::Usage(INVALID_COORDS.into());
                BotCommand::Patrol {
                    from: CoordTriple::parse(&args[0..3]).ok_or_else(invalid)?,
                    to: CoordTriple::parse(&args[3..6]).ok_or_else(invalid)?,
                    // 缺省、非数字或 0 都表示无限循环
                    loops: args
                        .get(6)
                        .and_then(|s| s.parse::<u32>().ok())
                        .filter(|n| *n > 0),
                }
            }
            "pov" => BotCommand::Pov,
            "notify" => match first.map(str::to_lowercase).as_deref() {
                Some("on") => BotCommand::Notify(true),
                Some("off") => BotCommand::Notify(false),
                _ => return Err(BotError::Usage("Usage: notify <on|off>".into())),
            },
            "ai" => {
                if args.is_empty() {
                    return Err(BotError::Usage(
                        "Usage: ai <natural language command>".into(),
                    ));
                }
                BotCommand::Ai { text: rest() }
            }
            "help" => BotCommand::Help,
            "neutral" => BotCommand::Neutral,
            "pw" => {
                let player = args.get(1).map(|s| s.to_string());
                match first.map(str::to_lowercase).as_deref() {
                    Some("add") => BotCommand::Whitelist(WhitelistOp::Add(
                        player.ok_or_else(|| BotError::Usage("Usage: pw add <player>".into()))?,
                    )),
                    Some("remove") => BotCommand::Whitelist(WhitelistOp::Remove(
                        player
                            .ok_or_else(|| BotError::Usage("Usage: pw remove <player>".into()))?,
                    )),
                    Some("list") => BotCommand::Whitelist(WhitelistOp::List),
                    _ => {
                        return Err(BotError::Usage(
                            "Usage: pw <add|remove|list> [player]".into(),
                        ))
                    }
                }
            }
            "si" => BotCommand::SetServer(required("Usage: si <new-ip>")?),
            "bn" => BotCommand::SetName(required("Usage: bn <new-name>")?),
            other => return Err(BotError::UnknownCommand(other.to_string())),
        };
        Ok(cmd)
    }

    fn movement(input: ControlInput, arg: Option<&str>) -> BotCommand {
        BotCommand::Move {
            input,
            steps: count_or_one(arg),
        }
    }

    /// 白名单 / 服务器 / 名字的修改只允许控制台或主人
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            BotCommand::Whitelist(_) | BotCommand::SetServer(_) | BotCommand::SetName(_)
        )
    }

    /// 需要已进入世界的会话才能执行
    pub fn requires_session(&self) -> bool {
        !matches!(
            self,
            BotCommand::Help
                | BotCommand::Neutral
                | BotCommand::Notify(_)
                | BotCommand::Whitelist(_)
                | BotCommand::SetServer(_)
                | BotCommand::SetName(_)
        )
    }
}

/// 步数 / 次数参数：缺省、非数字或 0 时为 1
fn count_or_one(arg: Option<&str>) -> u32 {
    arg.and_then(|s| s.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

pub const HELP_TEXT: &str = "Movement: up|down|left|right <steps>, jump <count>, sneak | \
Combat & Mining: kill <player>, mine <block>, findblock <block>, stop | \
Navigation: goto <x> <y> <z>, goto <player>, come, follow <player>, \
patrol <x1> <y1> <z1> <x2> <y2> <z2> [loops], pos | \
Inventory: ss <1-9>, equip <item> | \
Other: say <message>, ai <text>, pov, notify <on|off>, neutral, help | \
Admin: pw add|remove|list [player], si <ip>, bn <name>";

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<BotCommand, BotError> {
        BotCommand::parse(raw).expect("non-empty")
    }

    #[test]
    fn test_empty_line() {
        assert!(BotCommand::parse("   ").is_none());
    }

    #[test]
    fn test_movement_defaults_to_one_step() {
        assert_eq!(
            parse("UP 4").unwrap(),
            BotCommand::Move {
                input: ControlInput::Forward,
                steps: 4
            }
        );
        assert_eq!(
            parse("back lots").unwrap(),
            BotCommand::Move {
                input: ControlInput::Back,
                steps: 1
            }
        );
        assert_eq!(parse("jump").unwrap(), BotCommand::Jump { times: 1 });
    }

    #[test]
    fn test_goto_forms() {
        assert_eq!(
            parse("g Alice").unwrap(),
            BotCommand::Goto(GotoTarget::Player("Alice".into()))
        );
        let cmd = parse("goto ~ 70 ~-3").unwrap();
        let BotCommand::Goto(GotoTarget::Coords(triple)) = cmd else {
            panic!("expected coordinates");
        };
        let here = Position::new(10.7, 64.0, -2.2);
        assert_eq!(triple.resolve(here).unwrap(), BlockPos::new(10, 70, -6));

        assert!(matches!(parse("goto 1 2"), Err(BotError::Usage(_))));
        assert!(matches!(parse("goto 1 x 3"), Err(BotError::Usage(_))));
    }

    #[test]
    fn test_relative_overflow_is_invalid() {
        let cmd = parse("goto ~ ~2147483647 ~").unwrap();
        let BotCommand::Goto(GotoTarget::Coords(triple)) = cmd else {
            panic!("expected coordinates");
        };
        let here = Position::new(0.0, 64.0, 0.0);
        assert!(matches!(triple.resolve(here), Err(BotError::Usage(_))));
        assert_eq!(Coord::Relative(i32::MIN).resolve(-1.0), None);
        assert_eq!(Coord::Relative(-5).resolve(-1.5), Some(-7));
    }

    #[test]
    fn test_patrol_loops() {
        let cmd = parse("patrol 0 0 0 10 0 10 2").unwrap();
        assert!(matches!(cmd, BotCommand::Patrol { loops: Some(2), .. }));
        let cmd = parse("patrol 0 0 0 10 0 10 forever").unwrap();
        assert!(matches!(cmd, BotCommand::Patrol { loops: None, .. }));
        assert!(matches!(parse("patrol 0 0 0"), Err(BotError::Usage(_))));
    }

    #[test]
    fn test_slot_range() {
        assert_eq!(parse("ss 9").unwrap(), BotCommand::Slot(9));
        assert!(parse("slot 0").is_err());
        assert!(parse("slot 10").is_err());
    }

    #[test]
    fn test_admin_commands() {
        let cmd = parse("pw add Bob").unwrap();
        assert!(cmd.is_privileged());
        assert!(!cmd.requires_session());
        assert!(matches!(parse("pw add"), Err(BotError::Usage(_))));
        assert!(matches!(parse("pw frobnicate"), Err(BotError::Usage(_))));
        assert_eq!(parse("bn Steve").unwrap(), BotCommand::SetName("Steve".into()));
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            parse("dance now"),
            Err(BotError::UnknownCommand(name)) if name == "dance"
        ));
    }

    #[test]
    fn test_say_keeps_full_text() {
        assert_eq!(
            parse("say hello   there world").unwrap(),
            BotCommand::Say {
                text: "hello there world".into()
            }
        );
    }
}
