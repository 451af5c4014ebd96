//! 配置管理
//!
//! 分层加载：内置默认值 → 可选 TOML 文件 → `DISCHARGE_` 前缀环境变量 → 命令行参数

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use discharge_broker::{BrokerConfig, ExchangeConfig, QueueConfig, Topology};
use discharge_core::DiagnosisCatalog;
use discharge_pipeline::{OutboundRoute, StageKind, UntrackedDiagnosis};
use discharge_tracker::RedisStoreConfig;
use serde::Deserialize;
use std::collections::HashMap;

/// 工作器完整配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 运行的阶段
    pub stage: StageKind,
    pub logging: LoggingSettings,
    pub redis: RedisSettings,
    pub amqp: BrokerConfig,
    pub inbound: InboundSettings,
    pub outbound: OutboundSettings,
    /// 未跟踪影像的诊断处理策略
    pub untracked_diagnosis: UntrackedDiagnosis,
    /// 诊断目录：影像类型 → 期望诊断
    pub diagnoses: HashMap<String, Vec<String>>,
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub uri: String,
    pub index: u16,
    /// 待定集合键前缀
    pub key_prefix: String,
}

/// 入站拓扑配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InboundSettings {
    pub exchange: String,
    pub exchange_type: String,
    pub queue: String,
    /// 绑定模式；为空时使用诊断目录中的全部标签
    pub patterns: Vec<String>,
    /// 延迟交换器的底层类型（`x-delayed-type`）
    pub delayed_type: Option<String>,
    pub dead_letter_exchange: Option<String>,
}

/// 出站拓扑与发布配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboundSettings {
    pub exchange: String,
    pub exchange_type: String,
    pub queue: String,
    pub patterns: Vec<String>,
    /// 延迟交换器的底层类型（`x-delayed-type`）
    pub delayed_type: Option<String>,
    pub delay_ms: Option<u64>,
    /// 固定出站路由键；为空时沿用入站路由键
    pub routing_key: Option<String>,
}

impl Settings {
    /// 加载配置
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("DISCHARGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("inbound.patterns")
                .with_list_parse_key("outbound.patterns"),
        );

        let settings: Settings = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("inbound.exchange", &self.inbound.exchange),
            ("inbound.queue", &self.inbound.queue),
            ("outbound.exchange", &self.outbound.exchange),
            ("outbound.queue", &self.outbound.queue),
            ("redis.uri", &self.redis.uri),
            ("amqp.uri", &self.amqp.uri),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("Configuration field {} must not be empty", field);
            }
        }
        if self.amqp.prefetch_count == 0 {
            anyhow::bail!("amqp.prefetch_count cannot be 0");
        }
        self.catalog()?;
        Ok(())
    }

    /// 构建诊断目录
    pub fn catalog(&self) -> Result<DiagnosisCatalog> {
        DiagnosisCatalog::from_map(self.diagnoses.clone())
            .context("Invalid diagnosis catalog (diagnoses.<imaging type>)")
    }

    pub fn redis_config(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            uri: self.redis.uri.clone(),
            index: self.redis.index,
        }
    }

    pub fn inbound_topology(&self, catalog: &DiagnosisCatalog) -> Topology {
        let mut queue = QueueConfig::new(&self.inbound.queue);
        if let Some(dead_letter) = &self.inbound.dead_letter_exchange {
            queue = queue.with_dead_letter_exchange(dead_letter, None);
        }
        let patterns = if self.inbound.patterns.is_empty() {
            catalog.all_labels().into_iter().collect()
        } else {
            self.inbound.patterns.clone()
        };

        let mut exchange = ExchangeConfig::new(&self.inbound.exchange, &self.inbound.exchange_type);
        if let Some(delayed_type) = &self.inbound.delayed_type {
            exchange = exchange.with_delayed_type(delayed_type);
        }

        Topology::new(exchange, queue, patterns)
    }

    pub fn outbound_topology(&self) -> Topology {
        let mut exchange = ExchangeConfig::new(&self.outbound.exchange, &self.outbound.exchange_type);
        if let Some(delayed_type) = &self.outbound.delayed_type {
            exchange = exchange.with_delayed_type(delayed_type);
        }

        Topology::new(
            exchange,
            QueueConfig::new(&self.outbound.queue),
            self.outbound.patterns.clone(),
        )
    }

    pub fn outbound_route(&self) -> OutboundRoute {
        let mut route = OutboundRoute::new(&self.outbound.exchange);
        if let Some(routing_key) = &self.outbound.routing_key {
            route = route.with_routing_key(routing_key);
        }
        if let Some(delay_ms) = self.outbound.delay_ms {
            route = route.with_delay(delay_ms);
        }
        route
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stage: StageKind::DiagnosisIntake,
            logging: LoggingSettings::default(),
            redis: RedisSettings::default(),
            amqp: BrokerConfig::default(),
            inbound: InboundSettings::default(),
            outbound: OutboundSettings::default(),
            untracked_diagnosis: UntrackedDiagnosis::default(),
            diagnoses: HashMap::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        let store = RedisStoreConfig::default();
        Self {
            uri: store.uri,
            index: store.index,
            key_prefix: "pending:".to_string(),
        }
    }
}

impl Default for InboundSettings {
    fn default() -> Self {
        Self {
            exchange: "diagnoses".to_string(),
            exchange_type: "direct".to_string(),
            queue: "diagnoses-critical".to_string(),
            patterns: Vec::new(),
            delayed_type: None,
            dead_letter_exchange: None,
        }
    }
}

impl Default for OutboundSettings {
    fn default() -> Self {
        Self {
            exchange: "discharges".to_string(),
            exchange_type: "fanout".to_string(),
            queue: "discharges".to_string(),
            patterns: vec![String::new()],
            delayed_type: None,
            delay_ms: None,
            routing_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_catalog() -> Settings {
        let mut settings = Settings::default();
        settings.diagnoses.insert(
            "MRI".to_string(),
            vec!["fracture".to_string(), "tumor".to_string()],
        );
        settings
    }

    #[test]
    fn test_empty_catalog_is_rejected() {
        assert!(Settings::default().validate().is_err());
        assert!(settings_with_catalog().validate().is_ok());
    }

    #[test]
    fn test_inbound_patterns_default_to_catalog_labels() {
        let settings = settings_with_catalog();
        let catalog = settings.catalog().unwrap();
        let topology = settings.inbound_topology(&catalog);
        assert_eq!(topology.patterns, vec!["fracture", "tumor"]);
        assert_eq!(topology.queue.name, "diagnoses-critical");
    }

    #[test]
    fn test_outbound_route_from_settings() {
        let mut settings = settings_with_catalog();
        settings.outbound.delay_ms = Some(30_000);
        settings.outbound.routing_key = Some("discharge".to_string());

        let route = settings.outbound_route();
        assert_eq!(route.exchange, "discharges");
        assert_eq!(route.delay_ms, Some(30_000));
        assert_eq!(route.routing_key("tumor"), "discharge");
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!("discharge-settings-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
stage = "delay-confirm"

[outbound]
exchange = "discharges.delayed"
exchange_type = "x-delayed-message"
delayed_type = "fanout"
delay_ms = 60000

[diagnoses]
MRI = ["fracture", "tumor"]
"#,
        )
        .unwrap();

        let settings = Settings::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.stage, StageKind::DelayConfirm);
        assert_eq!(settings.outbound.delay_ms, Some(60_000));
        assert_eq!(settings.inbound.queue, "diagnoses-critical");
        assert_eq!(settings.catalog().unwrap().expected("mri").unwrap().len(), 2);
    }
}
