//! 入站消息模式
//!
//! 解码 JSON 负载并校验必填字段。任何失败都是不可恢复的校验错误。

use discharge_core::{DiagnosisReport, DischargeError, DischargeRecord, Imaging, Result};
use serde::de::DeserializeOwned;

/// 入站消息模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundSchema {
    Imaging,
    Diagnosis,
    Discharge,
}

/// 已校验的入站消息
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Imaging(Imaging),
    Diagnosis(DiagnosisReport),
    Discharge(DischargeRecord),
}

impl InboundMessage {
    pub fn imaging_id(&self) -> &str {
        match self {
            Self::Imaging(imaging) => &imaging.id,
            Self::Diagnosis(report) => &report.imaging_id,
            Self::Discharge(record) => &record.imaging_id,
        }
    }

    /// 消息种类，用于日志
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Imaging(_) => "imaging",
            Self::Diagnosis(_) => "diagnosis",
            Self::Discharge(_) => "discharge",
        }
    }
}

impl InboundSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imaging => "imaging",
            Self::Diagnosis => "diagnosis",
            Self::Discharge => "discharge",
        }
    }

    /// 解码并校验负载
    pub fn decode(&self, payload: &[u8]) -> Result<InboundMessage> {
        match self {
            Self::Imaging => {
                let imaging: Imaging = parse(payload)?;
                imaging.validate()?;
                Ok(InboundMessage::Imaging(imaging))
            }
            Self::Diagnosis => {
                let report: DiagnosisReport = parse(payload)?;
                report.validate()?;
                Ok(InboundMessage::Diagnosis(report))
            }
            Self::Discharge => {
                let record: DischargeRecord = parse(payload)?;
                record.validate()?;
                Ok(InboundMessage::Discharge(record))
            }
        }
    }
}

fn parse<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| DischargeError::Validation(e.to_string()))
}
