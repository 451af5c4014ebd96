//! 内存集合存储
//!
//! 键在初始化后一直保留，即使集合已被取空，直到显式删除。用于测试和演示。

use crate::store::{PendingStore, Removal};
use discharge_core::Result;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct InMemoryPendingStore {
    sets: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl InMemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 键是否处于跟踪中
    pub async fn is_tracked(&self, key: &str) -> bool {
        self.sets.lock().await.contains_key(key)
    }
}

#[async_trait::async_trait]
impl PendingStore for InMemoryPendingStore {
    async fn replace(&self, key: &str, members: &BTreeSet<String>) -> Result<()> {
        self.sets
            .lock()
            .await
            .insert(key.to_string(), members.clone());
        Ok(())
    }

    async fn remove(&self, key: &str, member: &str) -> Result<Removal> {
        let mut sets = self.sets.lock().await;
        let Some(set) = sets.get_mut(key) else {
            return Ok(Removal {
                existed: false,
                remaining: BTreeSet::new(),
            });
        };

        set.remove(member);
        Ok(Removal {
            existed: true,
            remaining: set.clone(),
        })
    }

    async fn members(&self, key: &str) -> Result<Option<BTreeSet<String>>> {
        Ok(self.sets.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.sets.lock().await.remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
