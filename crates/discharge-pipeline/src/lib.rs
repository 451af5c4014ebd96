//! # 出院流水线模块
//!
//! 影像出院协调的消息消费状态机：
//! - 消息状态机：管理单条消息从接收到确认或拒绝的生命周期
//! - 入站模式：影像、诊断报告和出院候选的解码与校验
//! - 阶段定义：影像接收、诊断接收、延迟确认、最终出院
//! - 阶段工作器：驱动完成度跟踪器并决定出站动作

pub mod schema;
pub mod stage;
pub mod state_machine;
pub mod worker;

// 重新导出主要类型
pub use schema::{InboundMessage, InboundSchema};
pub use stage::{OutboundRoute, StageKind, UntrackedDiagnosis};
pub use state_machine::{MessageEvent, MessageState, MessageStateMachine};
pub use worker::{StageEffect, StageWorker};
