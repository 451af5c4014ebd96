//! 日志初始化

use crate::settings::{LogFormat, LoggingSettings};
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// 安装全局日志订阅器；`RUST_LOG` 优先于配置中的级别
pub fn init(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&settings.level))?;

    let installed = match settings.format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}
