//! 翻译层：自由文本 → 规范指令（规则实现 / OpenAI 兼容实现）

pub mod openai;
pub mod rules;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use openai::OpenAiTranslator;
pub use rules::RuleTranslator;
pub use traits::{TranslateContext, TranslateError, Translator};

/// 根据配置选择翻译器；openai 需要 API Key，缺失时回退到规则翻译
pub fn create_translator_from_config(cfg: &AppConfig) -> Arc<dyn Translator> {
    let provider = cfg.translator.provider.to_lowercase();
    if provider == "openai" {
        if std::env::var("OPENAI_API_KEY").is_ok() {
            tracing::info!("Using OpenAI translator ({})", cfg.translator.model);
            return Arc::new(OpenAiTranslator::new(
                cfg.translator.base_url.as_deref(),
                &cfg.translator.model,
                None,
            ));
        }
        tracing::warn!("OPENAI_API_KEY not set, falling back to rule translator");
    }
    Arc::new(RuleTranslator::new())
}
