//! 世界层：会话能力抽象与内存模拟实现

pub mod sim;
pub mod traits;

pub use sim::{SimAction, SimConnector, SimLiveView, SimSession, SimWorld};
pub use traits::{
    BlockPos, ControlInput, Goal, LiveView, Position, ServerAddress, WorldConnector, WorldError,
    WorldEvent, WorldSession,
};
