//! 生命周期缓存
//!
//! 单例与每线程实例使用 `tokio::sync::OnceCell`：并发的首次解析只会有一个真正调用工厂，
//! 其余等待同一次构造的结果；构造失败或被取消时槽位保持为空。

use crate::pool::ComponentPool;
use crate::scope::Releasable;
use closure_abstractions::{Instance, PoolSize, Releaser};
use closure_common::ComponentKey;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::ThreadId;
use tokio::sync::OnceCell;
use tracing::debug;

pub(crate) type Slot = Arc<OnceCell<Instance>>;

/// 容器级缓存：单例、每线程与组件池
#[derive(Default)]
pub(crate) struct LifestyleCaches {
    singletons: DashMap<ComponentKey, Slot>,
    per_thread: DashMap<(ComponentKey, ThreadId), Slot>,
    pools: DashMap<ComponentKey, Arc<ComponentPool>>,
    /// 被覆盖注册淘汰的组件池，关闭容器时统一释放
    retired_pools: Mutex<Vec<Arc<ComponentPool>>>,
}

impl LifestyleCaches {
    pub(crate) fn singleton(&self, key: ComponentKey) -> Slot {
        self.singletons.entry(key).or_default().value().clone()
    }

    pub(crate) fn per_thread(&self, key: ComponentKey, thread: ThreadId) -> Slot {
        self.per_thread.entry((key, thread)).or_default().value().clone()
    }

    pub(crate) fn pool(&self, key: ComponentKey, size: PoolSize, releaser: Option<Releaser>) -> Arc<ComponentPool> {
        self.pools
            .entry(key)
            .or_insert_with(|| Arc::new(ComponentPool::new(key, size, releaser)))
            .value()
            .clone()
    }

    /// 当前组件池的实例总数与空闲数
    pub(crate) fn pool_usage(&self) -> (usize, usize) {
        self.pools.iter().fold((0, 0), |(live, idle), pool| {
            (live + pool.live(), idle + pool.idle())
        })
    }

    /// 淘汰某个组件的全部缓存实例
    pub(crate) fn evict(&self, key: &ComponentKey) {
        let singleton = self.singletons.remove(key).is_some();
        let before = self.per_thread.len();
        self.per_thread.retain(|(component, _), _| component != key);
        let per_thread = before - self.per_thread.len();

        if let Some((_, pool)) = self.pools.remove(key) {
            self.retired_pools.lock().push(pool);
        }

        if singleton || per_thread > 0 {
            debug!("淘汰组件缓存: {}, 单例 {}, 每线程 {}", key, singleton, per_thread);
        }
    }

    /// 清空全部缓存，返回组件池中的实例数与待释放的池实例
    pub(crate) fn clear(&self) -> (usize, Vec<Releasable>) {
        let mut pools: Vec<_> = std::mem::take(&mut *self.retired_pools.lock());
        pools.extend(self.pools.iter().map(|pool| pool.value().clone()));
        self.pools.clear();

        let mut count = 0;
        let mut entries = Vec::new();
        for pool in pools {
            let (live, drained) = pool.drain();
            count += live;
            entries.extend(drained);
        }

        self.singletons.clear();
        self.per_thread.clear();
        (count, entries)
    }
}
