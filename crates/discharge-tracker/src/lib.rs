//! # 完成度跟踪模块
//!
//! 在共享键值存储上实现“所有期望诊断均已收到”的分布式屏障：
//! - 待定诊断集合的初始化、观察、查看和清除
//! - Redis 存储实现
//! - 内存存储实现

pub mod memory;
pub mod redis_store;
pub mod store;
pub mod tracker;

pub use memory::InMemoryPendingStore;
pub use redis_store::{marker_key, RedisPendingStore, RedisStoreConfig};
pub use store::{PendingStore, Removal};
pub use tracker::{CompletionTracker, Observation};
