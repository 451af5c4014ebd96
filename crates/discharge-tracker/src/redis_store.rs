//! Redis 待定诊断集合存储
//!
//! 每个影像ID对应一个 Redis Set，成员为仍在等待的诊断标签，
//! 另有一个 `tracked:` 前缀的字符串键标记该影像处于跟踪中。
//! 多个副本并发访问同一键时依赖 Redis 单键操作的原子性，不使用分布式锁。

use crate::store::{PendingStore, Removal};
use discharge_core::{DischargeError, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::BTreeSet;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Redis 连接配置
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub uri: String,
    pub index: u16, // 逻辑数据库编号
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            uri: "redis://localhost:6379".to_string(),
            index: 0,
        }
    }
}

impl RedisStoreConfig {
    /// 拼接带数据库编号的连接地址
    pub fn connection_url(&self) -> String {
        format!("{}/{}", self.uri.trim_end_matches('/'), self.index)
    }
}

/// 基于 Redis 的集合存储
pub struct RedisPendingStore {
    connection: RwLock<Option<ConnectionManager>>,
    config: RedisStoreConfig,
}

impl RedisPendingStore {
    /// 创建未连接的存储
    pub fn new(config: RedisStoreConfig) -> Self {
        Self {
            connection: RwLock::new(None),
            config,
        }
    }

    /// 连接到 Redis
    pub async fn connect(&self) -> Result<()> {
        let url = self.config.connection_url();
        let client = Client::open(url.as_str()).map_err(|e| {
            DischargeError::StoreUnavailable(format!("invalid redis url {}: {}", url, e))
        })?;
        let manager = ConnectionManager::new(client).await.map_err(|e| {
            DischargeError::StoreUnavailable(format!("failed to connect to {}: {}", url, e))
        })?;

        let mut connection = self.connection.write().await;
        *connection = Some(manager);

        info!("Connected to redis at {}", url);
        Ok(())
    }

    /// 断开连接
    pub async fn disconnect(&self) -> Result<()> {
        let mut connection = self.connection.write().await;
        *connection = None;
        info!("Disconnected from redis at {}", self.config.connection_url());
        Ok(())
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| DischargeError::StoreUnavailable("not connected to redis".to_string()))
    }
}

fn store_error(operation: &str, key: &str, error: redis::RedisError) -> DischargeError {
    DischargeError::StoreUnavailable(format!("{} on {} failed: {}", operation, key, error))
}

/// 跟踪标记键前缀
pub const TRACKED_MARKER_PREFIX: &str = "tracked:";

/// 集合键对应的跟踪标记键
pub fn marker_key(key: &str) -> String {
    format!("{}{}", TRACKED_MARKER_PREFIX, key)
}

#[async_trait::async_trait]
impl PendingStore for RedisPendingStore {
    async fn replace(&self, key: &str, members: &BTreeSet<String>) -> Result<()> {
        let mut conn = self.connection().await?;
        let marker = marker_key(key);

        // DEL、SADD 与标记写入在同一事务内执行，旧集合不会与新成员合并
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !members.is_empty() {
            let members: Vec<&str> = members.iter().map(String::as_str).collect();
            pipe.sadd(key, members).ignore();
        }
        pipe.set(&marker, 1).ignore();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error("replace", key, e))?;

        debug!("Replaced pending set {} with {} members", key, members.len());
        Ok(())
    }

    async fn remove(&self, key: &str, member: &str) -> Result<Removal> {
        let mut conn = self.connection().await?;

        // Redis 会在最后一个成员被移除时删除集合键，跟踪状态只看标记
        let (existed, remaining): (bool, Vec<String>) = redis::pipe()
            .atomic()
            .exists(marker_key(key))
            .srem(key, member)
            .ignore()
            .smembers(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error("remove", key, e))?;

        Ok(Removal {
            existed,
            remaining: remaining.into_iter().collect(),
        })
    }

    async fn members(&self, key: &str) -> Result<Option<BTreeSet<String>>> {
        let mut conn = self.connection().await?;
        let (tracked, members): (bool, Vec<String>) = redis::pipe()
            .atomic()
            .exists(marker_key(key))
            .smembers(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error("read", key, e))?;

        Ok(tracked.then(|| members.into_iter().collect()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .del(vec![key.to_string(), marker_key(key)])
            .await
            .map_err(|e| store_error("delete", key, e))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}
