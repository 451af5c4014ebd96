//! 核心数据模型定义

use crate::{DischargeError, Result};
use serde::{Deserialize, Serialize};

/// 影像检查
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Imaging {
    #[serde(rename = "id", alias = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub imaging_type: String, // 检查类型 (MRI, CT 等)，用于查找期望诊断
    #[serde(rename = "bodyPart")]
    pub body_part: String,
    pub metadata: ImagingMetadata,
    pub path: String, // 影像文件路径
}

/// 影像元数据，允许携带额外字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingMetadata {
    pub age: f64,
    pub sex: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Imaging {
    /// 检查必填字段
    pub fn validate(&self) -> Result<()> {
        require_non_empty("id", &self.id)?;
        require_non_empty("type", &self.imaging_type)?;
        require_non_empty("bodyPart", &self.body_part)?;
        require_non_empty("metadata.sex", &self.metadata.sex)?;
        require_non_empty("path", &self.path)?;
        if !self.metadata.age.is_finite() {
            return Err(DischargeError::Validation(
                "metadata.age must be a finite number".to_string(),
            ));
        }
        Ok(())
    }
}

/// 诊断报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DiagnosisReport {
    pub imaging_id: String,
    pub imaging_type: String,
    pub diagnosis: String,
}

impl DiagnosisReport {
    /// 检查必填字段
    pub fn validate(&self) -> Result<()> {
        require_non_empty("imagingId", &self.imaging_id)?;
        require_non_empty("imagingType", &self.imaging_type)?;
        require_non_empty("diagnosis", &self.diagnosis)
    }
}

/// 出院记录
///
/// 不落库，在线路上仅以影像ID的JSON字符串形式传递。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DischargeRecord {
    pub imaging_id: String,
}

impl DischargeRecord {
    pub fn new(imaging_id: impl Into<String>) -> Self {
        Self {
            imaging_id: imaging_id.into(),
        }
    }

    /// 检查必填字段
    pub fn validate(&self) -> Result<()> {
        require_non_empty("imaging id", &self.imaging_id)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(DischargeError::Validation(format!(
            "\"{}\" is required and must not be empty",
            field
        )))
    } else {
        Ok(())
    }
}
