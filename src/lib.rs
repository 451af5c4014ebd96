//! # Discharge
//!
//! 影像出院协调流水线的统一入口，重新导出各子模块。

pub use discharge_broker as broker;
pub use discharge_core as domain;
pub use discharge_pipeline as pipeline;
pub use discharge_tracker as tracker;
