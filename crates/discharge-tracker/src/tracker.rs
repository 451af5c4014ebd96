//! 完成度跟踪器
//!
//! 维护每个影像的待定诊断集合。跟踪中且集合为空是唯一的出院就绪信号；
//! 出院事件发出后集合连同跟踪标记被删除，迟到的重复诊断或过期的出院候选不会再次触发出院。

use crate::store::PendingStore;
use discharge_core::{DiagnosisCatalog, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info};

/// 一次诊断观察的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// 观察时影像是否处于跟踪中（待定集合存在）
    pub tracked: bool,
    /// 删除该诊断后的待定集合
    pub remaining: BTreeSet<String>,
}

impl Observation {
    /// 所有期望诊断均已收到
    pub fn is_complete(&self) -> bool {
        self.tracked && self.remaining.is_empty()
    }
}

/// 完成度跟踪器
///
/// 唯一直接读写存储的组件。
#[derive(Clone)]
pub struct CompletionTracker {
    store: Arc<dyn PendingStore>,
    catalog: Arc<DiagnosisCatalog>,
    key_prefix: String,
}

impl CompletionTracker {
    pub fn new(
        store: Arc<dyn PendingStore>,
        catalog: Arc<DiagnosisCatalog>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            catalog,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn catalog(&self) -> &DiagnosisCatalog {
        &self.catalog
    }

    /// 按影像类型初始化待定集合，覆盖已有内容
    pub async fn seed(&self, imaging_id: &str, imaging_type: &str) -> Result<BTreeSet<String>> {
        let expected = self.catalog.expected(imaging_type)?;
        let key = self.key(imaging_id);

        if let Err(e) = self.store.replace(&key, expected).await {
            error!("Failed to seed pending diagnoses of imaging {}: {}", imaging_id, e);
            return Err(e);
        }

        info!(
            "Seeded pending diagnoses of imaging {} ({}): {:?}",
            imaging_id, imaging_type, expected
        );
        Ok(expected.clone())
    }

    /// 移除一个已收到的诊断并返回剩余集合
    pub async fn observe(&self, imaging_id: &str, diagnosis: &str) -> Result<Observation> {
        let removal = match self.store.remove(&self.key(imaging_id), diagnosis).await {
            Ok(removal) => removal,
            Err(e) => {
                error!(
                    "Failed to observe {} diagnosis of imaging {}: {}",
                    diagnosis, imaging_id, e
                );
                return Err(e);
            }
        };

        info!(
            "Current pending diagnoses of imaging {} are: {:?}",
            imaging_id, removal.remaining
        );
        Ok(Observation {
            tracked: removal.existed,
            remaining: removal.remaining,
        })
    }

    /// 只读查看待定集合；影像未初始化或已出院时返回 `None`
    pub async fn peek(&self, imaging_id: &str) -> Result<Option<BTreeSet<String>>> {
        match self.store.members(&self.key(imaging_id)).await {
            Ok(pending) => {
                info!(
                    "Current pending diagnoses of imaging {} are: {:?}",
                    imaging_id, pending
                );
                Ok(pending)
            }
            Err(e) => {
                error!("Failed to read pending diagnoses of imaging {}: {}", imaging_id, e);
                Err(e)
            }
        }
    }

    /// 删除待定集合，之后该影像不再处于跟踪中
    pub async fn clear(&self, imaging_id: &str) -> Result<()> {
        self.store.delete(&self.key(imaging_id)).await?;
        info!("Emptied pending diagnoses of imaging {}", imaging_id);
        Ok(())
    }

    fn key(&self, imaging_id: &str) -> String {
        format!("{}{}", self.key_prefix, imaging_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPendingStore;
    use discharge_core::DischargeError;

    fn catalog() -> Arc<DiagnosisCatalog> {
        Arc::new(
            DiagnosisCatalog::from_map(vec![
                ("MRI".to_string(), vec!["fracture".to_string(), "tumor".to_string()]),
                (
                    "CT".to_string(),
                    vec!["stroke".to_string(), "tumor".to_string(), "infection".to_string()],
                ),
            ])
            .unwrap(),
        )
    }

    fn tracker() -> (CompletionTracker, Arc<InMemoryPendingStore>) {
        let store = Arc::new(InMemoryPendingStore::new());
        (CompletionTracker::new(store.clone(), catalog(), "pending:"), store)
    }

    #[tokio::test]
    async fn test_observing_every_expected_label_empties_set() {
        let (tracker, _) = tracker();

        for imaging_type in ["MRI", "CT"] {
            let imaging_id = format!("{}-1", imaging_type);
            let expected = tracker.seed(&imaging_id, imaging_type).await.unwrap();
            let labels: Vec<String> = expected.iter().cloned().collect();

            for (index, label) in labels.iter().enumerate() {
                let observation = tracker.observe(&imaging_id, label).await.unwrap();
                assert!(observation.tracked);
                if index + 1 == labels.len() {
                    assert!(observation.is_complete());
                } else {
                    assert!(!observation.is_complete());
                    assert_eq!(observation.remaining.len(), labels.len() - index - 1);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_observing_absent_label_is_harmless() {
        let (tracker, _) = tracker();
        tracker.seed("M31", "MRI").await.unwrap();

        let first = tracker.observe("M31", "pneumonia").await.unwrap();
        let second = tracker.observe("M31", "pneumonia").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_reseeding_discards_prior_state() {
        let (tracker, _) = tracker();
        tracker.seed("M31", "MRI").await.unwrap();
        tracker.observe("M31", "fracture").await.unwrap();

        tracker.seed("M31", "MRI").await.unwrap();
        let pending = tracker.peek("M31").await.unwrap().unwrap();
        assert!(pending.contains("fracture"));
        assert!(pending.contains("tumor"));
    }

    #[tokio::test]
    async fn test_untracked_imaging_is_not_complete() {
        let (tracker, _) = tracker();
        let observation = tracker.observe("unknown", "tumor").await.unwrap();
        assert!(!observation.tracked);
        assert!(observation.remaining.is_empty());
        assert!(!observation.is_complete());
    }

    #[tokio::test]
    async fn test_clear_deletes_key() {
        let (tracker, store) = tracker();
        tracker.seed("M31", "MRI").await.unwrap();
        assert!(store.is_tracked("pending:M31").await);

        tracker.clear("M31").await.unwrap();
        assert!(!store.is_tracked("pending:M31").await);
        assert_eq!(tracker.peek("M31").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_completed_imaging_stays_distinguishable_from_cleared() {
        let (tracker, _) = tracker();
        tracker.seed("M31", "MRI").await.unwrap();
        tracker.observe("M31", "fracture").await.unwrap();
        assert!(tracker.observe("M31", "tumor").await.unwrap().is_complete());

        // 重新投递的最后一个诊断仍然看到完成状态
        let again = tracker.observe("M31", "tumor").await.unwrap();
        assert!(again.is_complete());
        assert_eq!(tracker.peek("M31").await.unwrap(), Some(BTreeSet::new()));

        tracker.clear("M31").await.unwrap();
        assert!(!tracker.observe("M31", "tumor").await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_seed_unknown_type_writes_nothing() {
        let (tracker, store) = tracker();
        let result = tracker.seed("P1", "PET").await;
        assert!(matches!(result, Err(DischargeError::UnknownImagingType(_))));
        assert!(!store.is_tracked("pending:P1").await);
    }
}
