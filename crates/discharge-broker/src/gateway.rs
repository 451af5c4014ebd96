//! 投递网关
//!
//! 封装 AMQP 通道，提供：
//! - 拓扑声明（交换器、队列、绑定）
//! - 手动确认的消费循环
//! - 持久化发布，可附加延迟头

use crate::delivery::{DeliveryHandler, Disposition, InboundDelivery, PublishOptions, Publisher};
use crate::topology::Topology;
use discharge_core::{DischargeError, Result};
use futures::StreamExt;
use lapin::{
    message::Delivery, options::*, publisher_confirm::Confirmation, types::AMQPValue,
    types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// 消息代理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub uri: String,
    pub prefetch_count: u16,
    pub consumer_tag: String, // 消费者标签前缀
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            uri: "amqp://localhost:5672".to_string(),
            prefetch_count: 1,
            consumer_tag: "discharge".to_string(),
        }
    }
}

fn broker_error(operation: &'static str) -> impl Fn(lapin::Error) -> DischargeError {
    move |e| DischargeError::Broker(format!("{} failed: {}", operation, e))
}

fn publish_error(e: lapin::Error) -> DischargeError {
    DischargeError::Publish(e.to_string())
}

/// 投递网关
pub struct DeliveryGateway {
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
    config: BrokerConfig,
    consumer_tag: String,
}

impl DeliveryGateway {
    /// 创建新的投递网关
    pub fn new(config: BrokerConfig) -> Self {
        let consumer_tag = format!("{}-{}", config.consumer_tag, uuid::Uuid::new_v4().simple());
        Self {
            connection: RwLock::new(None),
            channel: RwLock::new(None),
            config,
            consumer_tag,
        }
    }

    /// 连接到消息代理
    pub async fn connect(&self) -> Result<()> {
        let conn = Connection::connect(&self.config.uri, ConnectionProperties::default())
            .await
            .map_err(broker_error("connect"))?;
        let channel = conn
            .create_channel()
            .await
            .map_err(broker_error("create channel"))?;

        // 设置QoS
        channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(broker_error("basic.qos"))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(broker_error("confirm.select"))?;

        *self.channel.write().await = Some(channel);
        *self.connection.write().await = Some(conn);

        info!("Connected to message queue: {}", self.config.uri);
        Ok(())
    }

    async fn channel(&self) -> Result<Channel> {
        self.channel
            .read()
            .await
            .clone()
            .ok_or_else(|| DischargeError::Broker("Not connected to message queue".to_string()))
    }

    /// 声明持久化交换器、队列并按每个模式绑定，可重复调用
    pub async fn declare_topology(&self, topology: &Topology) -> Result<()> {
        let channel = self.channel().await?;
        let exchange = &topology.exchange;
        let queue = &topology.queue;

        channel
            .exchange_declare(
                &exchange.name,
                exchange.exchange_kind(),
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                exchange.arguments.clone(),
            )
            .await
            .map_err(broker_error("exchange.declare"))?;
        info!("Exchange declared: {} ({})", exchange.name, exchange.kind);

        channel
            .queue_declare(
                &queue.name,
                QueueDeclareOptions {
                    durable: queue.durable,
                    exclusive: queue.exclusive,
                    auto_delete: queue.auto_delete,
                    ..QueueDeclareOptions::default()
                },
                queue.arguments.clone(),
            )
            .await
            .map_err(broker_error("queue.declare"))?;
        info!("Queue declared: {}", queue.name);

        for pattern in &topology.patterns {
            channel
                .queue_bind(
                    &queue.name,
                    &exchange.name,
                    pattern,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(broker_error("queue.bind"))?;
            debug!(
                "Queue {} bound to {} with routing key {}",
                queue.name, exchange.name, pattern
            );
        }

        Ok(())
    }

    /// 以手动确认方式消费队列，直到取消令牌触发
    ///
    /// 投递逐条交给处理器；取消时正在处理的投递会先完成并确认，
    /// 已预取但未处理的投递在通道关闭后由代理重新投递。
    pub async fn consume(
        &self,
        queue: &str,
        handler: &dyn DeliveryHandler,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let channel = self.channel().await?;
        let mut consumer = channel
            .basic_consume(
                queue,
                &self.consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(broker_error("basic.consume"))?;

        info!(
            "Started consuming messages from queue {} with handler {}",
            queue,
            handler.name()
        );

        let outcome = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Stopping consumption from queue {}", queue);
                    break Ok(());
                }
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => Self::dispatch(handler, delivery).await,
                    Some(Err(e)) => {
                        error!("Consumer on queue {} failed: {}", queue, e);
                        break Err(DischargeError::Broker(format!("consume failed: {}", e)));
                    }
                    None => {
                        warn!("Consumer on queue {} was closed by the broker", queue);
                        break Ok(());
                    }
                },
            }
        };

        if let Err(e) = channel
            .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
            .await
        {
            warn!("Failed to cancel consumer {}: {}", self.consumer_tag, e);
        }

        outcome
    }

    /// 处理一次投递并执行确认或拒绝
    async fn dispatch(handler: &dyn DeliveryHandler, delivery: Delivery) {
        let inbound = InboundDelivery {
            delivery_tag: delivery.delivery_tag,
            routing_key: delivery.routing_key.as_str().to_string(),
            payload: delivery.data.clone(),
            redelivered: delivery.redelivered,
        };
        let span = tracing::info_span!(
            "delivery",
            stage = handler.name(),
            routing_key = %inbound.routing_key,
            delivery_tag = inbound.delivery_tag,
            redelivered = inbound.redelivered,
        );

        async {
            let disposition = handler.handle_delivery(&inbound).await;
            let settled = match disposition {
                Disposition::Ack => delivery.acker.ack(BasicAckOptions::default()).await,
                Disposition::Reject { requeue } => {
                    delivery
                        .acker
                        .reject(BasicRejectOptions { requeue })
                        .await
                }
            };
            match settled {
                Ok(_) => debug!("Settled delivery {} with {:?}", inbound.delivery_tag, disposition),
                // 通道异常时代理会重新投递该消息
                Err(e) => error!("Failed to settle delivery {}: {}", inbound.delivery_tag, e),
            }
        }
        .instrument(span)
        .await
    }

    /// 关闭通道和连接
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(channel) = self.channel.write().await.take() {
            if let Err(e) = channel.close(200, "shutting down").await {
                warn!("Failed to close channel: {}", e);
            }
        }
        if let Some(connection) = self.connection.write().await.take() {
            if let Err(e) = connection.close(200, "shutting down").await {
                warn!("Failed to close connection: {}", e);
            }
        }
        info!("Disconnected from message queue: {}", self.config.uri);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Publisher for DeliveryGateway {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        options: &PublishOptions,
    ) -> Result<()> {
        let channel = self.channel().await?;

        let mut headers = FieldTable::default();
        if let Some(delay_ms) = options.delay_ms {
            headers.insert(
                "x-delay".into(),
                AMQPValue::LongLongInt(i64::try_from(delay_ms).unwrap_or(i64::MAX)),
            );
        }
        let mut properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_headers(headers);
        if options.persistent {
            properties = properties.with_delivery_mode(2);
        }

        let confirm = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;

        match confirm {
            Confirmation::Nack(_) => {
                error!("Message publish to {} rejected by broker", exchange);
                Err(DischargeError::Publish(format!(
                    "broker nacked publish to {} with routing key {}",
                    exchange, routing_key
                )))
            }
            Confirmation::Ack(_) | Confirmation::NotRequested => {
                debug!("Message published to {} with routing key {}", exchange, routing_key);
                Ok(())
            }
        }
    }
}
