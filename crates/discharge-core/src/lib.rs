//! # Discharge Core
//!
//! 出院协调系统的核心模块，提供基础数据结构、诊断目录和错误定义。

pub mod catalog;
pub mod error;
pub mod models;

pub use catalog::DiagnosisCatalog;
pub use error::{DischargeError, ErrorClass, Result};
pub use models::*;
