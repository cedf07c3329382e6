//! 规则翻译器（不调用 LLM）
//!
//! 关键词匹配：移动、攻击、挖矿、装备、快捷栏、导航、跟随、巡逻、位置、过来。
//! 每段文本最多产出一条指令；匹配不到时返回 NoMatch。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use super::traits::{TranslateContext, TranslateError, Translator};

/// 未给出步数时的默认移动步数
const DEFAULT_STEPS: u32 = 5;

/// 常见说法到方块名
const BLOCK_PHRASES: &[(&str, &str)] = &[
    ("diamond ore", "diamond_ore"),
    ("diamonds", "diamond_ore"),
    ("iron ore", "iron_ore"),
    ("gold ore", "gold_ore"),
    ("coal ore", "coal_ore"),
    ("coal", "coal_ore"),
    ("stone", "stone"),
    ("dirt", "dirt"),
    ("sand", "sand"),
    ("gravel", "gravel"),
    ("wood", "oak_log"),
    ("log", "oak_log"),
];

/// 常见说法到物品名
const ITEM_PHRASES: &[(&str, &str)] = &[
    ("diamond sword", "diamond_sword"),
    ("iron sword", "iron_sword"),
    ("wooden sword", "wooden_sword"),
    ("sword", "sword"),
    ("pickaxe", "pickaxe"),
    ("shovel", "shovel"),
    ("shield", "shield"),
    ("bow", "bow"),
    ("axe", "axe"),
];

static COORDS_RE: OnceLock<Regex> = OnceLock::new();
static NUMBER_RE: OnceLock<Regex> = OnceLock::new();

fn coords_re() -> &'static Regex {
    COORDS_RE.get_or_init(|| {
        Regex::new(r"(~-?\d*|-?\d+)\s+(~-?\d*|-?\d+)\s+(~-?\d*|-?\d+)").unwrap()
    })
}

fn number_re() -> &'static Regex {
    NUMBER_RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

#[derive(Debug, Default)]
pub struct RuleTranslator;

impl RuleTranslator {
    pub fn new() -> Self {
        Self
    }

    /// 规则匹配；None 表示无法理解
    pub fn fast_match(&self, text: &str, ctx: &TranslateContext) -> Option<String> {
        let msg = text.to_lowercase();

        if msg.contains("goto") || msg.contains("go to") {
            if let Some(player) = find_player(&msg, ctx) {
                return Some(format!("goto {player}"));
            }
            return all_coordinates(&msg)
                .into_iter()
                .next()
                .map(|c| format!("goto {c}"));
        }

        if msg.contains("follow") {
            return find_player(&msg, ctx).map(|p| format!("follow {p}"));
        }

        if msg.contains("patrol") {
            let coords = all_coordinates(&msg);
            if coords.len() >= 2 {
                return Some(format!("patrol {} {}", coords[0], coords[1]));
            }
            return None;
        }

        if contains_word(&msg, &["go", "move", "walk"]) {
            let steps = first_number(&msg).unwrap_or(DEFAULT_STEPS);
            let direction = if msg.contains("forward") || msg.contains("ahead") {
                "up"
            } else if msg.contains("back") {
                "down"
            } else if msg.contains("left") {
                "left"
            } else if msg.contains("right") {
                "right"
            } else {
                return None;
            };
            return Some(format!("{direction} {steps}"));
        }

        if msg.contains("attack") || msg.contains("fight") || msg.contains("kill") {
            return find_player(&msg, ctx).map(|p| format!("kill {p}"));
        }

        if msg.contains("mine") || msg.contains("dig") {
            return lookup_phrase(&msg, BLOCK_PHRASES).map(|b| format!("mine {b}"));
        }

        if msg.contains("equip") || msg.contains("hold") || contains_word(&msg, &["use"]) {
            return lookup_phrase(&msg, ITEM_PHRASES).map(|i| format!("equip {i}"));
        }

        if msg.contains("slot") || msg.contains("select") {
            return first_number(&msg).map(|n| format!("ss {n}"));
        }

        if msg.contains("position") || msg.contains("where") || msg.contains("coords") {
            return Some("pos".to_string());
        }

        if contains_word(&msg, &["come"]) {
            return Some("come".to_string());
        }

        None
    }
}

#[async_trait]
impl Translator for RuleTranslator {
    fn name(&self) -> &str {
        "rules"
    }

    async fn translate(
        &self,
        text: &str,
        ctx: &TranslateContext,
    ) -> Result<Vec<String>, TranslateError> {
        self.fast_match(text, ctx)
            .map(|line| vec![line])
            .ok_or_else(|| TranslateError::NoMatch(text.to_string()))
    }
}

fn contains_word(msg: &str, words: &[&str]) -> bool {
    msg.split(|c: char| !c.is_alphanumeric())
        .any(|w| words.contains(&w))
}

fn first_number(msg: &str) -> Option<u32> {
    number_re()
        .find(msg)
        .and_then(|m| m.as_str().parse().ok())
}

/// 文本中出现的玩家名（忽略大小写，返回原始大小写）；「me」指发出者
fn find_player(msg: &str, ctx: &TranslateContext) -> Option<String> {
    for word in msg.split(|c: char| c.is_whitespace() || c == ',' || c == '.' || c == '!') {
        if word.is_empty() {
            continue;
        }
        if word == "me" && !ctx.requester.is_empty() {
            return Some(ctx.requester.clone());
        }
        if let Some(name) = ctx.players.iter().find(|p| p.to_lowercase() == word) {
            return Some(name.clone());
        }
    }
    None
}

fn lookup_phrase(msg: &str, table: &[(&str, &'static str)]) -> Option<&'static str> {
    table
        .iter()
        .find(|(phrase, _)| msg.contains(phrase))
        .map(|(_, name)| *name)
}

/// 所有坐标三元组，保持原样（`~` 相对坐标交给路由解析）
fn all_coordinates(msg: &str) -> Vec<String> {
    coords_re()
        .captures_iter(msg)
        .map(|c| format!("{} {} {}", &c[1], &c[2], &c[3]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TranslateContext {
        TranslateContext {
            players: vec!["Alice".into(), "SupremeYT".into()],
            requester: "SupremeYT".into(),
        }
    }

    fn m(text: &str) -> Option<String> {
        RuleTranslator::new().fast_match(text, &ctx())
    }

    #[test]
    fn test_movement_with_default_steps() {
        assert_eq!(m("walk forward please").as_deref(), Some("up 5"));
        assert_eq!(m("move back 3 blocks").as_deref(), Some("down 3"));
        assert_eq!(m("go left"), Some("left 5".to_string()));
    }

    #[test]
    fn test_goto_player_and_coordinates() {
        assert_eq!(m("go to alice").as_deref(), Some("goto Alice"));
        assert_eq!(m("goto 10 64 -20").as_deref(), Some("goto 10 64 -20"));
        assert_eq!(m("go to ~ ~ ~5").as_deref(), Some("goto ~ ~ ~5"));
    }

    #[test]
    fn test_patrol_needs_two_points() {
        assert_eq!(
            m("patrol between 0 64 0 and 10 64 10").as_deref(),
            Some("patrol 0 64 0 10 64 10")
        );
        assert_eq!(m("patrol 0 64 0"), None);
    }

    #[test]
    fn test_combat_mining_equipment() {
        assert_eq!(m("attack Alice now").as_deref(), Some("kill Alice"));
        assert_eq!(m("dig some iron ore").as_deref(), Some("mine iron_ore"));
        assert_eq!(m("hold your diamond sword").as_deref(), Some("equip diamond_sword"));
        assert_eq!(m("select slot 4").as_deref(), Some("ss 4"));
    }

    #[test]
    fn test_follow_me_resolves_requester() {
        assert_eq!(m("follow me").as_deref(), Some("follow SupremeYT"));
    }

    #[test]
    fn test_misc() {
        assert_eq!(m("where are you?").as_deref(), Some("pos"));
        assert_eq!(m("come here").as_deref(), Some("come"));
        assert_eq!(m("nice weather today"), None);
    }

    #[tokio::test]
    async fn test_translate_no_match_is_error() {
        let err = RuleTranslator::new().translate("hello there", &ctx()).await;
        assert!(matches!(err, Err(TranslateError::NoMatch(_))));
    }
}
