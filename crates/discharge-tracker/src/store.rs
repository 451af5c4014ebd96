//! 待定诊断集合存储接口
//!
//! 任何提供单键原子集合操作（添加、删除、读取）的键值存储都可以实现该接口。
//!
//! 每个键除了集合本身还带一个跟踪标记：初始化时写入，删除时一并清除。
//! 集合被取空后标记仍在，因此“全部诊断已收到”与“从未初始化或已出院”可以区分。

use discharge_core::Result;
use std::collections::BTreeSet;

/// 一次成员删除的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// 删除执行时键是否处于跟踪中
    pub existed: bool,
    /// 删除之后的集合内容
    pub remaining: BTreeSet<String>,
}

/// 按键寻址的原子集合存储
#[async_trait::async_trait]
pub trait PendingStore: Send + Sync {
    /// 用给定成员整体替换集合，并标记为跟踪中
    async fn replace(&self, key: &str, members: &BTreeSet<String>) -> Result<()>;

    /// 删除一个成员并读回剩余集合，两步在同一次原子操作内完成
    async fn remove(&self, key: &str, member: &str) -> Result<Removal>;

    /// 读取集合；键未被跟踪时返回 `None`
    async fn members(&self, key: &str) -> Result<Option<BTreeSet<String>>>;

    /// 删除集合及其跟踪标记
    async fn delete(&self, key: &str) -> Result<()>;

    /// 存储后端名称
    fn name(&self) -> &str;
}
