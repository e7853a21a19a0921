//! 作用域
//!
//! 作用域是显式传递的句柄，不存在隐式的"当前作用域"。
//! 通过 [`ScopeGuard`] 解析组件时，该作用域就是解析的活动作用域；
//! 守卫退出（显式调用 `exit` 或被丢弃）时按创建的逆序释放它拥有的实例。

use crate::container::Container;
use async_trait::async_trait;
use closure_abstractions::{downcast_instance, ComponentResolver, Instance, Releaser};
use closure_common::{ComponentKey, DependencyError, DependencyResult, ScopeInfo, ScopeKind};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// 作用域状态
pub(crate) struct ScopeState {
    info: ScopeInfo,
    parent: Option<Arc<ScopeState>>,
    slots: DashMap<ComponentKey, Arc<OnceCell<Instance>>>,
    owned: Mutex<Vec<Releasable>>,
    closed: AtomicBool,
}

impl ScopeState {
    pub(crate) fn new(info: ScopeInfo, parent: Option<Arc<ScopeState>>) -> Arc<Self> {
        Arc::new(Self {
            info,
            parent,
            slots: DashMap::new(),
            owned: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn info(&self) -> &ScopeInfo {
        &self.info
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> DependencyResult<()> {
        if self.is_closed() {
            return Err(DependencyError::ScopeClosed {
                scope: self.info.name.clone(),
            });
        }
        Ok(())
    }

    /// 组件在该作用域内的实例槽
    pub(crate) fn slot(&self, key: ComponentKey) -> Arc<OnceCell<Instance>> {
        self.slots.entry(key).or_default().value().clone()
    }

    /// 作用域接管实例的释放
    ///
    /// 作用域已关闭时立即释放。
    pub(crate) fn own(&self, entries: Vec<Releasable>) {
        if entries.is_empty() {
            return;
        }
        if self.is_closed() {
            warn!("作用域 {} 已关闭，立即释放 {} 个实例", self.info.name, entries.len());
            release_in_reverse(entries);
            return;
        }
        self.owned.lock().extend(entries);
    }

    /// 由内向外遍历作用域链
    pub(crate) fn lineage(self: &Arc<Self>) -> impl Iterator<Item = &Arc<ScopeState>> {
        std::iter::successors(Some(self), |scope| scope.parent.as_ref())
    }

    /// 关闭作用域并释放拥有的实例，重复调用无副作用
    pub(crate) fn close(&self) -> usize {
        let owned = self.detach();
        let count = owned.len();
        release_in_reverse(owned);
        if count > 0 {
            debug!("退出作用域: {}, 释放 {} 个实例", self.info, count);
        }
        count
    }

    /// 关闭作用域，把拥有的实例交给调用方释放
    ///
    /// 已关闭时返回空列表。
    pub(crate) fn detach(&self) -> Vec<Releasable> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }
        self.slots.clear();
        std::mem::take(&mut *self.owned.lock())
    }
}

static CREATION_SEQ: AtomicU64 = AtomicU64::new(0);

/// 下一个实例创建序号，进程内单调递增
pub(crate) fn next_creation_seq() -> u64 {
    CREATION_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// 等待释放的实例
///
/// `seq` 记录实例的创建顺序。不同归属方（容器、作用域、组件池）的实例合并释放时，
/// 仍能按创建的逆序进行。
pub(crate) struct Releasable {
    seq: u64,
    releaser: Releaser,
    instance: Instance,
}

impl Releasable {
    pub(crate) fn new(releaser: Releaser, instance: Instance) -> Self {
        Self::with_seq(next_creation_seq(), releaser, instance)
    }

    pub(crate) fn with_seq(seq: u64, releaser: Releaser, instance: Instance) -> Self {
        Self {
            seq,
            releaser,
            instance,
        }
    }
}

/// 按创建的逆序释放
pub(crate) fn release_in_reverse(mut entries: Vec<Releasable>) {
    entries.sort_unstable_by_key(|entry| std::cmp::Reverse(entry.seq));
    for entry in entries {
        (entry.releaser)(&entry.instance);
    }
}

/// 作用域守卫
///
/// ```ignore
/// let scope = container.enter_scope();
/// let session = scope.resolve::<Session>().await?;
/// scope.exit();
/// ```
pub struct ScopeGuard {
    container: Container,
    state: Arc<ScopeState>,
}

impl ScopeGuard {
    pub(crate) fn new(container: Container, state: Arc<ScopeState>) -> Self {
        container.scope_entered(state.info());
        Self { container, state }
    }

    /// 作用域描述
    pub fn info(&self) -> &ScopeInfo {
        self.state.info()
    }

    /// 是否已退出
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// 在该作用域内解析组件
    pub async fn resolve<T>(&self) -> DependencyResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let instance = self.resolve_key(ComponentKey::of::<T>()).await?;
        downcast_instance(instance)
    }

    /// 在该作用域内按组件类型解析
    pub async fn resolve_key(&self, key: ComponentKey) -> DependencyResult<Instance> {
        self.container.resolve_root(key, Some(self.state.clone())).await
    }

    /// 进入子作用域
    pub fn enter_scope(&self) -> ScopeGuard {
        self.child("scope", ScopeKind::Standard)
    }

    /// 进入具名子作用域
    pub fn enter_named_scope(&self, name: impl Into<String>) -> ScopeGuard {
        self.child(name, ScopeKind::Standard)
    }

    /// 进入逻辑请求子作用域
    pub fn enter_request_scope(&self) -> ScopeGuard {
        self.child("request", ScopeKind::Request)
    }

    fn child(&self, name: impl Into<String>, kind: ScopeKind) -> ScopeGuard {
        let info = self.state.info().child(name, kind);
        ScopeGuard::new(self.container.clone(), ScopeState::new(info, Some(self.state.clone())))
    }

    /// 显式退出作用域
    pub fn exit(self) {
        // 释放逻辑在 Drop 中
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if !self.state.is_closed() {
            self.state.close();
            self.container.scope_exited();
        }
    }
}

impl std::fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("info", self.state.info())
            .field("closed", &self.state.is_closed())
            .finish()
    }
}

#[async_trait]
impl ComponentResolver for ScopeGuard {
    async fn resolve_key(&self, key: ComponentKey) -> Result<Instance, DependencyError> {
        ScopeGuard::resolve_key(self, key).await
    }

    fn can_resolve(&self, key: &ComponentKey) -> bool {
        !self.is_closed() && self.container.can_resolve_key(key)
    }
}
