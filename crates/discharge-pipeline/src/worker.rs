//! 阶段工作器
//!
//! 一个由（入站模式、处理逻辑、出站路由）参数化的通用工作器。
//! 每条消息依次经过：接收 → 校验 → 处理 → 确认或拒绝。
//!
//! 结论规则：
//! - 校验失败：拒绝且不重新入队
//! - 校验通过后任何存储或发布失败：拒绝并重新入队
//! - 先发布出站事件，再确认入站消息

use crate::schema::InboundMessage;
use crate::stage::{OutboundRoute, StageKind, UntrackedDiagnosis};
use crate::state_machine::{MessageEvent, MessageState, MessageStateMachine};
use discharge_broker::{DeliveryHandler, Disposition, InboundDelivery, PublishOptions, Publisher};
use discharge_core::{DischargeError, DischargeRecord, Result};
use discharge_tracker::CompletionTracker;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 处理逻辑的输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEffect {
    /// 已发布出站事件
    Published,
    /// 未发布，仅确认
    Held,
}

/// 阶段工作器
pub struct StageWorker {
    kind: StageKind,
    tracker: CompletionTracker,
    publisher: Arc<dyn Publisher>,
    route: OutboundRoute,
    untracked: UntrackedDiagnosis,
    state_machine: MessageStateMachine,
}

impl StageWorker {
    /// 创建新的阶段工作器
    pub fn new(
        kind: StageKind,
        tracker: CompletionTracker,
        publisher: Arc<dyn Publisher>,
        route: OutboundRoute,
    ) -> Self {
        Self {
            kind,
            tracker,
            publisher,
            route,
            untracked: UntrackedDiagnosis::default(),
            state_machine: MessageStateMachine::new(),
        }
    }

    pub fn with_untracked_diagnosis(mut self, policy: UntrackedDiagnosis) -> Self {
        self.untracked = policy;
        self
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// 处理一次投递，返回确认或拒绝结论
    pub async fn handle(&self, delivery: &InboundDelivery) -> Disposition {
        let schema = self.kind.schema();
        let state = MessageState::Received;

        let message = match schema.decode(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    stage = %self.kind,
                    requeue = false,
                    "Rejected malformed {} message from {}: {}",
                    schema.as_str(),
                    delivery.routing_key,
                    e
                );
                let state = self.advance(state, MessageEvent::ValidationFailed);
                return self.settle(state);
            }
        };
        let state = self.advance(state, MessageEvent::ValidationPassed);

        let imaging_id = message.imaging_id();
        info!("Consumed {} message of imaging {}", message.kind(), imaging_id);

        let state = match self.process(&message, &delivery.routing_key).await {
            Ok(effect) => {
                let state = self.advance(state, MessageEvent::ProcessingSucceeded);
                info!(
                    "Processed {} message of imaging {} ({:?})",
                    message.kind(),
                    imaging_id,
                    effect
                );
                self.advance(state, MessageEvent::Acknowledged)
            }
            Err(e) => {
                let requeue = e.requeue();
                error!(
                    stage = %self.kind,
                    imaging_id,
                    kind = message.kind(),
                    requeue,
                    "Rejected {} message of imaging {}: {}",
                    message.kind(),
                    imaging_id,
                    e
                );
                let event = if requeue {
                    MessageEvent::ProcessingFailed
                } else {
                    MessageEvent::ValidationFailed
                };
                self.advance(state, event)
            }
        };

        self.settle(state)
    }

    /// 执行阶段逻辑
    async fn process(&self, message: &InboundMessage, routing_key: &str) -> Result<StageEffect> {
        match (self.kind, message) {
            (StageKind::ImagingIntake, InboundMessage::Imaging(imaging)) => {
                self.tracker
                    .seed(&imaging.id, &imaging.imaging_type)
                    .await?;
                // 无条件发布延迟候选，就绪检查交给延迟确认阶段
                self.emit(&imaging.id, routing_key).await?;
                Ok(StageEffect::Published)
            }
            (StageKind::DiagnosisIntake, InboundMessage::Diagnosis(report)) => {
                let observation = self
                    .tracker
                    .observe(&report.imaging_id, &report.diagnosis)
                    .await?;

                let ready = if observation.tracked {
                    observation.remaining.is_empty()
                } else {
                    warn!(
                        "Received {} diagnosis of untracked imaging {} (policy: {:?})",
                        report.diagnosis, report.imaging_id, self.untracked
                    );
                    self.untracked == UntrackedDiagnosis::TreatAsComplete
                };

                if !ready {
                    return Ok(StageEffect::Held);
                }
                self.emit(&report.imaging_id, routing_key).await?;
                Ok(StageEffect::Published)
            }
            (StageKind::DelayConfirm, InboundMessage::Discharge(record)) => {
                if !self.is_ready(&record.imaging_id).await? {
                    return Ok(StageEffect::Held);
                }
                self.emit(&record.imaging_id, routing_key).await?;
                Ok(StageEffect::Published)
            }
            (StageKind::DischargeFinal, InboundMessage::Discharge(record)) => {
                if !self.is_ready(&record.imaging_id).await? {
                    return Ok(StageEffect::Held);
                }
                self.emit(&record.imaging_id, routing_key).await?;

                // 清除失败只留下一个空键，不影响确认
                if let Err(e) = self.tracker.clear(&record.imaging_id).await {
                    warn!(
                        "Failed to empty pending diagnoses of imaging {}: {}",
                        record.imaging_id, e
                    );
                }
                Ok(StageEffect::Published)
            }
            (kind, message) => Err(DischargeError::Validation(format!(
                "{} stage cannot process {} messages",
                kind,
                message.kind()
            ))),
        }
    }

    /// 跟踪中且待定集合为空时就绪
    ///
    /// 集合非空说明期间有新的初始化；未跟踪说明已经出院或从未初始化，本次候选均作废。
    async fn is_ready(&self, imaging_id: &str) -> Result<bool> {
        match self.tracker.peek(imaging_id).await? {
            Some(pending) if pending.is_empty() => Ok(true),
            Some(pending) => {
                info!(
                    "Imaging {} is not ready for discharge, still pending: {:?}",
                    imaging_id, pending
                );
                Ok(false)
            }
            None => {
                warn!(
                    "Imaging {} is not tracked, already discharged or never seeded (policy: {:?})",
                    imaging_id, self.untracked
                );
                Ok(self.untracked == UntrackedDiagnosis::TreatAsComplete)
            }
        }
    }

    /// 发布出院记录
    async fn emit(&self, imaging_id: &str, inbound_routing_key: &str) -> Result<()> {
        let payload = encode_outbound(&DischargeRecord::new(imaging_id))?;
        let routing_key = self.route.routing_key(inbound_routing_key);
        let options = PublishOptions::default().with_delay(self.route.delay_ms);

        self.publisher
            .publish(&self.route.exchange, routing_key, &payload, &options)
            .await?;

        info!(
            "Published discharge of imaging {} to {} exchange",
            imaging_id, self.route.exchange
        );
        Ok(())
    }

    fn advance(&self, from: MessageState, event: MessageEvent) -> MessageState {
        match self.state_machine.transition(from, event) {
            Ok(to) => to,
            Err(e) => {
                error!(stage = %self.kind, "{}", e);
                MessageState::Requeued
            }
        }
    }

    fn settle(&self, state: MessageState) -> Disposition {
        MessageStateMachine::disposition(state).unwrap_or(Disposition::Reject { requeue: true })
    }
}

/// 编码出站负载；此时存储可能已被修改，编码失败按发布失败处理以便重新入队
fn encode_outbound<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| DischargeError::Publish(format!("failed to encode outbound payload: {}", e)))
}

#[async_trait::async_trait]
impl DeliveryHandler for StageWorker {
    async fn handle_delivery(&self, delivery: &InboundDelivery) -> Disposition {
        self.handle(delivery).await
    }

    fn name(&self) -> &str {
        self.kind.as_str()
    }
}
