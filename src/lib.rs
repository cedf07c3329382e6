//! MineBot - 游戏世界远程智能体的会话与任务编排核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 指令路由、冷却、任务槽、行为监管、重连策略与主控循环
//! - **observability**: 日志初始化
//! - **store**: 白名单与默认设置持久化
//! - **translator**: 自然语言到指令的翻译（规则 / OpenAI 兼容）
//! - **world**: 世界会话能力抽象与内存模拟实现

pub mod config;
pub mod core;
pub mod observability;
pub mod store;
pub mod translator;
pub mod world;
