//! 流水线阶段定义
//!
//! 四个阶段共用同一个工作器，差别只在入站模式和处理逻辑：
//! - 影像接收：初始化待定诊断，发布延迟出院候选
//! - 诊断接收：移除已收到的诊断，集合清空时发布出院候选
//! - 延迟确认：延迟后再次检查集合，仍为空时发布最终出院
//! - 最终出院：第三次检查，发布出院事件并清除集合

use crate::schema::InboundSchema;
use discharge_core::DischargeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 阶段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    ImagingIntake,
    DiagnosisIntake,
    DelayConfirm,
    DischargeFinal,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImagingIntake => "imaging-intake",
            Self::DiagnosisIntake => "diagnosis-intake",
            Self::DelayConfirm => "delay-confirm",
            Self::DischargeFinal => "discharge-final",
        }
    }

    /// 阶段的入站消息模式
    pub fn schema(&self) -> InboundSchema {
        match self {
            Self::ImagingIntake => InboundSchema::Imaging,
            Self::DiagnosisIntake => InboundSchema::Diagnosis,
            Self::DelayConfirm | Self::DischargeFinal => InboundSchema::Discharge,
        }
    }

    pub fn all() -> [StageKind; 4] {
        [
            Self::ImagingIntake,
            Self::DiagnosisIntake,
            Self::DelayConfirm,
            Self::DischargeFinal,
        ]
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = DischargeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
            .ok_or_else(|| DischargeError::Config(format!("unknown stage: {}", value)))
    }
}

/// 未跟踪影像的处理策略
///
/// 同时作用于诊断接收（诊断到达时影像未初始化）和两个复核阶段（候选到达时影像已出院或未初始化）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UntrackedDiagnosis {
    /// 确认并忽略，不发布
    #[default]
    Ignore,
    /// 视为全部诊断已收到，继续发布
    TreatAsComplete,
}

/// 出站路由
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRoute {
    pub exchange: String,
    /// 固定路由键；为空时沿用入站路由键
    pub routing_key: Option<String>,
    pub delay_ms: Option<u64>,
}

impl OutboundRoute {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: None,
            delay_ms: None,
        }
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    /// 计算出站路由键
    pub fn routing_key<'a>(&'a self, inbound: &'a str) -> &'a str {
        self.routing_key.as_deref().unwrap_or(inbound)
    }
}
