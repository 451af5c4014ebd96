//! 出院流水线演示程序
//!
//! 在单进程内串联四个阶段：内存存储代替 Redis，回环发布器代替 RabbitMQ

use discharge::broker::{InboundDelivery, PublishOptions, Publisher};
use discharge::domain::{DiagnosisCatalog, Result};
use discharge::pipeline::{OutboundRoute, StageKind, StageWorker};
use discharge::tracker::{CompletionTracker, InMemoryPendingStore};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// 把发布的消息放回本地队列
#[derive(Default)]
struct LoopbackPublisher {
    queue: Mutex<VecDeque<(String, InboundDelivery)>>,
}

#[async_trait::async_trait]
impl Publisher for LoopbackPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        options: &PublishOptions,
    ) -> Result<()> {
        if let Some(delay_ms) = options.delay_ms {
            println!("   ⏳ {} 延迟 {} ms（演示中立即投递）", exchange, delay_ms);
        }
        self.queue
            .lock()
            .await
            .push_back((exchange.to_string(), InboundDelivery::new(routing_key, payload)));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt().with_env_filter("warn").init();

    println!("🚀 影像出院流水线演示\n");

    let catalog = Arc::new(DiagnosisCatalog::from_map(vec![(
        "MRI".to_string(),
        vec!["fracture".to_string(), "tumor".to_string()],
    )])?);
    let store = Arc::new(InMemoryPendingStore::new());
    let tracker = CompletionTracker::new(store, catalog, "pending:");
    let broker = Arc::new(LoopbackPublisher::default());

    let worker = |kind: StageKind, route: OutboundRoute| {
        StageWorker::new(kind, tracker.clone(), broker.clone(), route)
    };
    let imaging_intake = worker(
        StageKind::ImagingIntake,
        OutboundRoute::new("discharge-candidates").with_delay(60_000),
    );
    let diagnosis_intake = worker(
        StageKind::DiagnosisIntake,
        OutboundRoute::new("discharge-candidates"),
    );
    let delay_confirm = worker(StageKind::DelayConfirm, OutboundRoute::new("discharge-confirmed"));
    let discharge_final = worker(StageKind::DischargeFinal, OutboundRoute::new("discharges"));

    let imaging = r#"{
        "id": "M31", "type": "MRI", "bodyPart": "chest",
        "metadata": { "age": 57, "sex": "F" }, "path": "imagingPath"
    }"#;
    let mut inbound = vec![("imagings".to_string(), InboundDelivery::new("mri", imaging))];
    for label in ["fracture", "tumor"] {
        let report = format!(
            r#"{{"imagingId":"M31","imagingType":"MRI","diagnosis":"{}"}}"#,
            label
        );
        inbound.push(("diagnoses".to_string(), InboundDelivery::new(label, report)));
    }

    for (exchange, delivery) in inbound {
        broker.queue.lock().await.push_back((exchange, delivery));

        loop {
            let next = broker.queue.lock().await.pop_front();
            let Some((exchange, delivery)) = next else {
                break;
            };
            let stage = match exchange.as_str() {
                "imagings" => &imaging_intake,
                "diagnoses" => &diagnosis_intake,
                "discharge-candidates" => &delay_confirm,
                "discharge-confirmed" => &discharge_final,
                _ => {
                    println!(
                        "🏁 出院事件: {}",
                        String::from_utf8_lossy(&delivery.payload)
                    );
                    continue;
                }
            };

            let disposition = stage.handle(&delivery).await;
            let pending = tracker.peek("M31").await?.unwrap_or_default();
            println!(
                "📋 {} ← {}: {:?}，待定诊断 {:?}",
                stage.kind(),
                String::from_utf8_lossy(&delivery.payload),
                disposition,
                pending
            );
        }
    }

    println!("\n✅ 演示完成");
    Ok(())
}
