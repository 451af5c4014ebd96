//! 出院协调工作器主程序

mod settings;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use discharge_broker::DeliveryGateway;
use discharge_core::DiagnosisCatalog;
use discharge_pipeline::{StageKind, StageWorker};
use discharge_tracker::{CompletionTracker, RedisPendingStore};
use settings::Settings;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 工作器命令行参数
#[derive(Parser, Debug)]
#[command(name = "discharge-worker")]
#[command(about = "影像出院协调流水线阶段工作器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 运行的阶段 (imaging-intake, diagnosis-intake, delay-confirm, discharge-final)
    #[arg(short, long)]
    stage: Option<StageKind>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(stage) = args.stage {
        settings.stage = stage;
    }
    if let Some(level) = args.log_level {
        settings.logging.level = level;
    }

    // 初始化日志
    telemetry::init(&settings.logging)?;

    info!("Starting {} worker", settings.stage);

    let catalog = Arc::new(settings.catalog()?);
    info!("Loaded diagnosis catalog with {} imaging types", catalog.len());

    let store = Arc::new(RedisPendingStore::new(settings.redis_config()));
    store
        .connect()
        .await
        .context("Failed to connect to redis")?;

    let gateway = Arc::new(DeliveryGateway::new(settings.amqp.clone()));
    if let Err(e) = start_broker(&gateway, &settings, &catalog).await {
        error!("Worker startup failed: {:#}", e);
        gateway.disconnect().await?;
        store.disconnect().await?;
        return Err(e);
    }

    let tracker = CompletionTracker::new(
        store.clone(),
        catalog.clone(),
        settings.redis.key_prefix.clone(),
    );
    let worker = StageWorker::new(
        settings.stage,
        tracker,
        gateway.clone(),
        settings.outbound_route(),
    )
    .with_untracked_diagnosis(settings.untracked_diagnosis);

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    info!(
        "{} worker consuming from {} exchange through {} queue",
        settings.stage, settings.inbound.exchange, settings.inbound.queue
    );
    let outcome = gateway
        .consume(&settings.inbound.queue, &worker, shutdown)
        .await;

    // 先停止消费，再依次关闭代理和存储连接
    gateway.disconnect().await?;
    store.disconnect().await?;
    info!("{} worker shut down", settings.stage);

    outcome.map_err(Into::into)
}

/// 连接消息代理并声明入站、出站拓扑
async fn start_broker(
    gateway: &DeliveryGateway,
    settings: &Settings,
    catalog: &DiagnosisCatalog,
) -> Result<()> {
    gateway
        .connect()
        .await
        .context("Failed to connect to rabbitmq")?;

    let inbound = settings.inbound_topology(catalog);
    gateway
        .declare_topology(&inbound)
        .await
        .context("Failed to declare inbound topology")?;
    info!(
        "Inbound queue {} bound to {} with patterns {:?}",
        inbound.queue.name, inbound.exchange.name, inbound.patterns
    );

    gateway
        .declare_topology(&settings.outbound_topology())
        .await
        .context("Failed to declare outbound topology")?;
    Ok(())
}

/// 等待 SIGINT 或 SIGTERM 并触发停机
async fn wait_for_signal(shutdown: CancellationToken) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
