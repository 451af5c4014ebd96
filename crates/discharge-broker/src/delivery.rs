//! 投递与发布接口
//!
//! 流水线只依赖这里的类型和 trait，不直接接触 AMQP 通道，便于替换为测试替身。

use discharge_core::Result;

/// 一次入站投递
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDelivery {
    pub delivery_tag: u64,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub redelivered: bool,
}

impl InboundDelivery {
    pub fn new(routing_key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_tag: 0,
            routing_key: routing_key.into(),
            payload: payload.into(),
            redelivered: false,
        }
    }
}

/// 投递处理结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 确认消息
    Ack,
    /// 拒绝消息；`requeue` 为 false 时进入死信路径
    Reject { requeue: bool },
}

impl Disposition {
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }
}

/// 投递处理器接口
#[async_trait::async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// 处理一次投递并给出确认或拒绝结论
    async fn handle_delivery(&self, delivery: &InboundDelivery) -> Disposition;

    /// 获取处理器名称
    fn name(&self) -> &str;
}

/// 发布选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// 持久化消息（delivery mode 2）
    pub persistent: bool,
    /// 延迟投递毫秒数，由延迟交换器的 `x-delay` 头解释
    pub delay_ms: Option<u64>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            persistent: true,
            delay_ms: None,
        }
    }
}

impl PublishOptions {
    pub fn with_delay(mut self, delay_ms: Option<u64>) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// 消息发布器接口
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// 发布已序列化的负载
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        options: &PublishOptions,
    ) -> Result<()>;
}
