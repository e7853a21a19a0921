//! 依赖注入容器

use crate::cache::LifestyleCaches;
use crate::scope::{release_in_reverse, Releasable, ScopeGuard, ScopeState};
use async_trait::async_trait;
use closure_abstractions::{
    downcast_instance, Blueprint, CircularDependencyDetector, ClosureRegistration, ComponentResolver,
    DefaultCircularDependencyDetector, DependencyGraph, Instance, Registration,
};
use closure_common::{
    ComponentKey, ContainerConfig, DependencyError, DependencyResult, DuplicatePolicy, InfrastructureResult,
    ScopeInfo, ScopeKind,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 注册表
///
/// 每次写入都会递增 `generation`，依赖图检查结果按代缓存。
#[derive(Default)]
pub(crate) struct RegistrationTable {
    pub(crate) registrations: HashMap<ComponentKey, Arc<Registration>>,
    pub(crate) graph: DependencyGraph,
    pub(crate) generation: u64,
}

/// 运行统计
#[derive(Default)]
pub(crate) struct Statistics {
    pub(crate) resolutions: AtomicU64,
    pub(crate) factory_invocations: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) failures: AtomicU64,
    pub(crate) active_scopes: AtomicUsize,
}

/// 容器统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerStats {
    /// 已注册的组件数
    pub registered_components: usize,
    /// 顶层解析次数
    pub resolutions: u64,
    /// 工厂调用次数
    pub factory_invocations: u64,
    /// 复用已有实例的次数
    pub cache_hits: u64,
    /// 失败的顶层解析次数
    pub failures: u64,
    /// 尚未退出的作用域数
    pub active_scopes: usize,
    /// 组件池中的实例数
    pub pooled_instances: usize,
    /// 组件池中空闲的实例数
    pub idle_pooled_instances: usize,
}

pub(crate) struct ContainerInner {
    pub(crate) config: ContainerConfig,
    pub(crate) table: RwLock<RegistrationTable>,
    pub(crate) validated: DashMap<ComponentKey, u64>,
    pub(crate) detector: DefaultCircularDependencyDetector,
    pub(crate) caches: LifestyleCaches,
    pub(crate) root_scope: Arc<ScopeState>,
    /// 容器拥有的待释放实例，按创建顺序排列
    pub(crate) owned: Mutex<Vec<Releasable>>,
    pub(crate) stats: Statistics,
    pub(crate) shut_down: AtomicBool,
}

/// 依赖注入容器
///
/// 克隆开销很小，所有克隆共享同一份注册表与缓存。容器总是显式传递，
/// 不存在进程级的全局容器。
///
/// ```ignore
/// let container = Container::new();
/// container.register_blueprint::<Factories>()?;
/// let foo = container.resolve::<Foo>().await?;
/// ```
#[derive(Clone)]
pub struct Container {
    pub(crate) inner: Arc<ContainerInner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Container {
    /// 使用默认配置创建容器
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// 使用指定配置创建容器
    pub fn with_config(config: ContainerConfig) -> Self {
        debug!("创建容器: {:?}", config);
        Self {
            inner: Arc::new(ContainerInner {
                config,
                table: RwLock::new(RegistrationTable::default()),
                validated: DashMap::new(),
                detector: DefaultCircularDependencyDetector,
                caches: LifestyleCaches::default(),
                root_scope: ScopeState::new(ScopeInfo::root(), None),
                owned: Mutex::new(Vec::new()),
                stats: Statistics::default(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// 创建容器构建器
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    pub(crate) fn ensure_running(&self) -> DependencyResult<()> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(DependencyError::ContainerShutDown);
        }
        Ok(())
    }

    /// 注册组件
    ///
    /// 同一组件类型已注册时按配置的重复注册策略处理；覆盖时淘汰旧注册的缓存实例。
    pub fn register(&self, registration: Registration) -> DependencyResult<()> {
        self.ensure_running()?;
        registration.validate()?;

        let key = registration.component();
        let lifestyle = registration.lifestyle().name();
        let mut table = self.inner.table.write();

        let replaced = table.registrations.contains_key(&key);
        if replaced {
            match self.inner.config.duplicate_policy {
                DuplicatePolicy::Reject => {
                    return Err(DependencyError::DuplicateRegistration {
                        type_name: key.type_name().to_string(),
                    });
                }
                DuplicatePolicy::Overwrite => {
                    warn!("组件重复注册，覆盖之前的注册: {}", key);
                }
            }
        }

        if self.inner.config.reject_cycles_on_register {
            let mut candidate = table.graph.clone();
            candidate.insert(&registration);
            self.inner.detector.detect_cycle_from(&candidate, &key)?;
        }

        table.graph.insert(&registration);
        table.registrations.insert(key, Arc::new(registration));
        table.generation += 1;
        drop(table);

        if replaced {
            self.inner.caches.evict(&key);
        }

        info!("注册组件: {} ({})", key, lifestyle);
        Ok(())
    }

    /// 批量注册，返回注册数量
    ///
    /// 遇到第一个失败即停止，之前的注册保留。
    pub fn register_all<I>(&self, registrations: I) -> DependencyResult<usize>
    where
        I: IntoIterator<Item = Registration>,
    {
        let mut count = 0;
        for registration in registrations {
            self.register(registration)?;
            count += 1;
        }
        Ok(count)
    }

    /// 注册一批工厂
    pub fn register_closure(&self, closure: ClosureRegistration) -> DependencyResult<usize> {
        let source = closure.source();
        let count = self.register_all(closure.into_registrations())?;
        info!("从 {} 注册了 {} 个组件", source, count);
        Ok(count)
    }

    /// 发现并注册蓝图上的全部工厂，使用蓝图声明的生命周期
    pub fn register_blueprint<B: Blueprint + ?Sized>(&self) -> DependencyResult<usize> {
        self.register_closure(ClosureRegistration::for_blueprint::<B>())
    }

    /// 注册已有实例（单例）
    pub fn register_instance<T>(&self, value: T) -> DependencyResult<()>
    where
        T: Send + Sync + 'static,
    {
        self.register(Registration::instance(value))
    }

    /// 检查组件是否已注册
    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.is_registered_key(&ComponentKey::of::<T>())
    }

    /// 检查组件是否已注册（通过组件标识）
    pub fn is_registered_key(&self, key: &ComponentKey) -> bool {
        self.inner.table.read().registrations.contains_key(key)
    }

    /// 获取组件的注册
    pub fn registration<T: ?Sized + 'static>(&self) -> Option<Registration> {
        self.lookup(&ComponentKey::of::<T>())
            .map(|registration| registration.as_ref().clone())
    }

    /// 按类型名排序的已注册组件
    pub fn registered_components(&self) -> Vec<ComponentKey> {
        self.inner.table.read().graph.components()
    }

    pub(crate) fn lookup(&self, key: &ComponentKey) -> Option<Arc<Registration>> {
        self.inner.table.read().registrations.get(key).cloned()
    }

    /// 检查整个依赖图：缺失的依赖与循环
    pub fn validate(&self) -> DependencyResult<()> {
        let table = self.inner.table.read();
        for registration in table.registrations.values() {
            registration.validate()?;
        }
        self.inner.detector.detect_circular_dependencies(&table.graph)?;
        debug!("依赖图检查通过，共 {} 个组件", table.graph.len());
        Ok(())
    }

    /// 解析前的依赖图检查，结果按注册表的代缓存
    pub(crate) fn preflight(&self, key: &ComponentKey) -> DependencyResult<()> {
        let table = self.inner.table.read();
        if self.inner.validated.get(key).map(|generation| *generation) == Some(table.generation) {
            return Ok(());
        }

        self.inner.detector.check_component(&table.graph, key)?;
        self.inner.validated.insert(*key, table.generation);
        Ok(())
    }

    /// 检查组件及其全部依赖能否解析
    pub fn can_resolve_key(&self, key: &ComponentKey) -> bool {
        self.ensure_running().is_ok() && self.preflight(key).is_ok()
    }

    /// 解析组件
    pub async fn resolve<T>(&self) -> DependencyResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let instance = self.resolve_key(ComponentKey::of::<T>()).await?;
        downcast_instance(instance)
    }

    /// 按组件类型解析
    pub async fn resolve_key(&self, key: ComponentKey) -> DependencyResult<Instance> {
        self.resolve_root(key, None).await
    }

    /// 进入作用域
    pub fn enter_scope(&self) -> ScopeGuard {
        self.enter(ScopeInfo::new("scope", ScopeKind::Standard))
    }

    /// 进入具名作用域，可被 `ScopeSelector::Named` 选中
    pub fn enter_named_scope(&self, name: impl Into<String>) -> ScopeGuard {
        self.enter(ScopeInfo::new(name, ScopeKind::Standard))
    }

    /// 进入逻辑请求作用域
    pub fn enter_request_scope(&self) -> ScopeGuard {
        self.enter(ScopeInfo::new("request", ScopeKind::Request))
    }

    fn enter(&self, info: ScopeInfo) -> ScopeGuard {
        ScopeGuard::new(self.clone(), ScopeState::new(info, None))
    }

    pub(crate) fn scope_entered(&self, info: &ScopeInfo) {
        self.inner.stats.active_scopes.fetch_add(1, Ordering::Relaxed);
        debug!("进入作用域: {}", info);
    }

    pub(crate) fn scope_exited(&self) {
        self.inner.stats.active_scopes.fetch_sub(1, Ordering::Relaxed);
    }

    /// 容器接管实例的释放，容器已关闭时立即释放
    pub(crate) fn own(&self, entries: Vec<Releasable>) {
        if entries.is_empty() {
            return;
        }
        if self.inner.shut_down.load(Ordering::Acquire) {
            release_in_reverse(entries);
            return;
        }
        self.inner.owned.lock().extend(entries);
    }

    /// 统计快照
    pub fn stats(&self) -> ContainerStats {
        let stats = &self.inner.stats;
        let (pooled_instances, idle_pooled_instances) = self.inner.caches.pool_usage();
        ContainerStats {
            registered_components: self.inner.table.read().registrations.len(),
            resolutions: stats.resolutions.load(Ordering::Relaxed),
            factory_invocations: stats.factory_invocations.load(Ordering::Relaxed),
            cache_hits: stats.cache_hits.load(Ordering::Relaxed),
            failures: stats.failures.load(Ordering::Relaxed),
            active_scopes: stats.active_scopes.load(Ordering::Relaxed),
            pooled_instances,
            idle_pooled_instances,
        }
    }

    /// 是否已关闭
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// 关闭容器
    ///
    /// 根作用域、容器（单例与每线程）和组件池拥有的实例合并在一起，按创建的逆序释放，
    /// 因此被依赖的实例总是晚于依赖它的实例释放。之后的解析与注册都返回
    /// [`DependencyError::ContainerShutDown`]。重复调用无副作用。
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut entries = self.inner.root_scope.detach();
        let scoped = entries.len();
        let owned = std::mem::take(&mut *self.inner.owned.lock());
        let count = owned.len();
        entries.extend(owned);
        let (pooled, drained) = self.inner.caches.clear();
        entries.extend(drained);

        release_in_reverse(entries);
        self.inner.validated.clear();

        info!(
            "容器已关闭，释放实例: 容器 {}, 根作用域 {}, 组件池 {}",
            count, scoped, pooled
        );
    }
}

#[async_trait]
impl ComponentResolver for Container {
    async fn resolve_key(&self, key: ComponentKey) -> Result<Instance, DependencyError> {
        Container::resolve_key(self, key).await
    }

    fn can_resolve(&self, key: &ComponentKey) -> bool {
        self.can_resolve_key(key)
    }
}

/// 容器构建器
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    config: ContainerConfig,
    registrations: Vec<Registration>,
    validate: bool,
}

impl ContainerBuilder {
    /// 创建构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置容器配置
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// 添加注册
    pub fn register(mut self, registration: Registration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// 添加一批工厂
    pub fn register_closure(mut self, closure: ClosureRegistration) -> Self {
        self.registrations.extend(closure.into_registrations());
        self
    }

    /// 添加蓝图上的全部工厂
    pub fn register_blueprint<B: Blueprint + ?Sized>(self) -> Self {
        self.register_closure(ClosureRegistration::for_blueprint::<B>())
    }

    /// 添加已有实例
    pub fn register_instance<T>(self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.register(Registration::instance(value))
    }

    /// 构建时检查整个依赖图
    pub fn validate_on_build(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// 构建容器
    pub fn build(self) -> InfrastructureResult<Container> {
        self.config.validate()?;

        let container = Container::with_config(self.config);
        let count = container.register_all(self.registrations)?;
        if self.validate {
            container.validate()?;
        }

        info!("构建容器完成，注册了 {} 个组件", count);
        Ok(container)
    }
}
