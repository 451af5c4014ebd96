//! 消息状态机
//!
//! 管理单条入站消息从接收到确认或拒绝的生命周期

use discharge_broker::Disposition;
use discharge_core::{DischargeError, Result};
use std::collections::HashMap;

/// 消息状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageState {
    Received,  // 已接收
    Validated, // 已通过模式校验
    Processed, // 下游动作全部完成
    Acked,     // 已确认
    Rejected,  // 已拒绝，不重新入队
    Requeued,  // 已拒绝，重新入队
}

/// 消息状态转换事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageEvent {
    ValidationPassed,
    ValidationFailed,
    ProcessingSucceeded,
    ProcessingFailed,
    Acknowledged,
}

/// 消息状态机
#[derive(Debug)]
pub struct MessageStateMachine {
    transitions: HashMap<(MessageState, MessageEvent), MessageState>,
}

impl MessageStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((MessageState::Received, MessageEvent::ValidationPassed), MessageState::Validated);
        transitions.insert((MessageState::Received, MessageEvent::ValidationFailed), MessageState::Rejected);
        transitions.insert((MessageState::Validated, MessageEvent::ValidationFailed), MessageState::Rejected);
        transitions.insert((MessageState::Validated, MessageEvent::ProcessingSucceeded), MessageState::Processed);
        transitions.insert((MessageState::Validated, MessageEvent::ProcessingFailed), MessageState::Requeued);
        transitions.insert((MessageState::Processed, MessageEvent::Acknowledged), MessageState::Acked);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: MessageState, event: MessageEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: MessageState, event: MessageEvent) -> Result<MessageState> {
        self.transitions
            .get(&(from, event))
            .copied()
            .ok_or_else(|| DischargeError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            })
    }

    /// 终止状态对应的投递结论
    pub fn disposition(state: MessageState) -> Option<Disposition> {
        match state {
            MessageState::Acked => Some(Disposition::Ack),
            MessageState::Rejected => Some(Disposition::Reject { requeue: false }),
            MessageState::Requeued => Some(Disposition::Reject { requeue: true }),
            MessageState::Received | MessageState::Validated | MessageState::Processed => None,
        }
    }

    pub fn is_terminal(state: MessageState) -> bool {
        Self::disposition(state).is_some()
    }
}

impl Default for MessageStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let sm = MessageStateMachine::new();

        let state = sm.transition(MessageState::Received, MessageEvent::ValidationPassed).unwrap();
        let state = sm.transition(state, MessageEvent::ProcessingSucceeded).unwrap();
        let state = sm.transition(state, MessageEvent::Acknowledged).unwrap();
        assert_eq!(state, MessageState::Acked);
        assert_eq!(MessageStateMachine::disposition(state), Some(Disposition::Ack));
    }

    #[test]
    fn test_failures_map_to_rejections() {
        let sm = MessageStateMachine::new();

        let rejected = sm.transition(MessageState::Received, MessageEvent::ValidationFailed).unwrap();
        assert_eq!(
            MessageStateMachine::disposition(rejected),
            Some(Disposition::Reject { requeue: false })
        );

        let requeued = sm.transition(MessageState::Validated, MessageEvent::ProcessingFailed).unwrap();
        assert_eq!(
            MessageStateMachine::disposition(requeued),
            Some(Disposition::Reject { requeue: true })
        );
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = MessageStateMachine::new();

        // 未校验的消息不能直接处理或确认
        assert!(!sm.can_transition(MessageState::Received, MessageEvent::ProcessingSucceeded));
        assert!(!sm.can_transition(MessageState::Received, MessageEvent::Acknowledged));
        assert!(!sm.can_transition(MessageState::Acked, MessageEvent::ProcessingFailed));
        assert!(sm.transition(MessageState::Requeued, MessageEvent::Acknowledged).is_err());
        assert!(!MessageStateMachine::is_terminal(MessageState::Processed));
    }
}
