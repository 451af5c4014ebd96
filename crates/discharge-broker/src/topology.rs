//! 交换器与队列拓扑配置

use lapin::types::{AMQPValue, FieldTable};
use lapin::ExchangeKind;

/// 延迟消息插件的交换器类型
pub const DELAYED_MESSAGE_EXCHANGE: &str = "x-delayed-message";

/// 交换器配置
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub name: String,
    pub kind: String,
    pub arguments: FieldTable,
}

impl ExchangeConfig {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            arguments: FieldTable::default(),
        }
    }

    /// 设置延迟交换器的底层路由类型
    pub fn with_delayed_type(mut self, delayed_type: &str) -> Self {
        self.arguments.insert(
            "x-delayed-type".into(),
            AMQPValue::LongString(delayed_type.into()),
        );
        self
    }

    /// 转换为 lapin 交换器类型
    pub fn exchange_kind(&self) -> ExchangeKind {
        match self.kind.to_ascii_lowercase().as_str() {
            "direct" => ExchangeKind::Direct,
            "fanout" => ExchangeKind::Fanout,
            "topic" => ExchangeKind::Topic,
            "headers" => ExchangeKind::Headers,
            _ => ExchangeKind::Custom(self.kind.clone()),
        }
    }
}

/// 队列配置
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub arguments: FieldTable,
}

impl QueueConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            durable: true,
            exclusive: false,
            auto_delete: false,
            arguments: FieldTable::default(),
        }
    }

    /// 设置死信交换器，不重新入队的拒绝消息将转投到这里
    pub fn with_dead_letter_exchange(mut self, exchange: &str, routing_key: Option<&str>) -> Self {
        self.arguments.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(exchange.into()),
        );
        if let Some(key) = routing_key {
            self.arguments.insert(
                "x-dead-letter-routing-key".into(),
                AMQPValue::LongString(key.into()),
            );
        }
        self
    }
}

/// 一组交换器、队列和绑定
#[derive(Debug, Clone)]
pub struct Topology {
    pub exchange: ExchangeConfig,
    pub queue: QueueConfig,
    pub patterns: Vec<String>,
}

impl Topology {
    pub fn new(exchange: ExchangeConfig, queue: QueueConfig, patterns: Vec<String>) -> Self {
        Self {
            exchange,
            queue,
            patterns,
        }
    }
}
