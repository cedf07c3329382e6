//! 自然语言翻译抽象
//!
//! 把自由文本翻译成一行或多行规范指令（如 `up 5`、`mine iron_ore`）；编排器逐行路由。

use async_trait::async_trait;
use thiserror::Error;

/// 翻译时可用的上下文
#[derive(Debug, Clone, Default)]
pub struct TranslateContext {
    /// 当前可见的玩家名（用于识别文本里的玩家）
    pub players: Vec<String>,
    /// 发出这段文本的玩家
    pub requester: String,
}

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Translator backend error: {0}")]
    Backend(String),

    #[error("Could not understand: {0}")]
    NoMatch(String),
}

#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(
        &self,
        text: &str,
        ctx: &TranslateContext,
    ) -> Result<Vec<String>, TranslateError>;
}
