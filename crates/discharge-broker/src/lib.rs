//! # 投递网关模块
//!
//! 基于 RabbitMQ 的消息传递：
//! - 交换器、队列和绑定的幂等声明
//! - 手动确认的消费循环
//! - 持久化发布与延迟投递
//! - 死信队列配置

pub mod delivery;
pub mod gateway;
pub mod topology;

pub use delivery::{DeliveryHandler, Disposition, InboundDelivery, PublishOptions, Publisher};
pub use gateway::{BrokerConfig, DeliveryGateway};
pub use topology::{ExchangeConfig, QueueConfig, Topology, DELAYED_MESSAGE_EXCHANGE};
