//! OpenAI 兼容翻译器
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点，把自由文本转换为每行一条的规范指令。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use super::traits::{TranslateContext, TranslateError, Translator};

const SYSTEM_PROMPT: &str = r#"You control a Minecraft bot. Convert the user's request into one or more of these commands:
- Movement: up/forward <n>, down/back <n>, left <n>, right <n>, jump <n>, sneak
- Combat: kill <player>
- Mining: mine <block>
- Chat: say <message>
- Navigation: goto <x> <y> <z>, goto <player>, follow <player>, pos, come
- Patrol: patrol <x1> <y1> <z1> <x2> <y2> <z2> [loops]
- Inventory: ss <1-9>, equip <item>

Return ONLY the commands to execute, one per line. No explanations.
Example input: find diamonds and mine them
Example output:
mine diamond_ore"#;

pub struct OpenAiTranslator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTranslator {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    fn build_messages(
        &self,
        text: &str,
        ctx: &TranslateContext,
    ) -> Result<Vec<ChatCompletionRequestMessage>, TranslateError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()
            .map_err(|e| TranslateError::Backend(e.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(format!(
                "Visible players: {}\nRequested by: {}\nRequest: {}",
                ctx.players.join(", "),
                ctx.requester,
                text
            ))
            .build()
            .map_err(|e| TranslateError::Backend(e.to_string()))?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn translate(
        &self,
        text: &str,
        ctx: &TranslateContext,
    ) -> Result<Vec<String>, TranslateError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.build_messages(text, ctx)?)
            .build()
            .map_err(|e| TranslateError::Backend(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| TranslateError::Backend(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        let lines = parse_command_lines(&content);
        if lines.is_empty() {
            return Err(TranslateError::NoMatch(text.to_string()));
        }
        Ok(lines)
    }
}

/// 每行一条指令；去掉空行、代码围栏与列表符号
pub(crate) fn parse_command_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|l| l.trim().trim_start_matches(['-', '*']).trim())
        .filter(|l| !l.is_empty() && !l.starts_with("```"))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_lines() {
        let content = "```\nmine diamond_ore\n\n- goto 1 2 3\n  say done  \n```";
        assert_eq!(
            parse_command_lines(content),
            vec!["mine diamond_ore", "goto 1 2 3", "say done"]
        );
    }
}
