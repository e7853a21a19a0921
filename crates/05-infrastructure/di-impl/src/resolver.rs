//! 依赖解析
//!
//! 一次顶层解析分两步：先对请求类型可达的依赖图做检查（缺失的注册与循环），
//! 通过后才开始构造，因此失败的解析不会留下构造了一半的实例。
//! 构造阶段按参数顺序逐个递归解析依赖，每个依赖构造完成后才开始下一个。

use crate::container::Container;
use crate::pool::{ComponentPool, PoolCheckout};
use crate::scope::{release_in_reverse, Releasable, ScopeState};
use closure_abstractions::{AncestorSelector, Instance, LifestylePolicy, Registration, ScopeSelector};
use closure_common::{ComponentKey, DependencyError, DependencyResult, ScopeKind};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// 解析链上的一帧
#[derive(Debug, Clone, Copy)]
struct Frame {
    id: usize,
    key: ComponentKey,
}

/// 实例归属
enum Owner {
    Container,
    Scope(Arc<ScopeState>),
    /// 池化实例由组件池自己释放，依赖归容器
    Pool,
}

/// 一次顶层解析的上下文
///
/// 持有解析链、活动作用域、绑定到上级组件的实例，以及尚无归属的可释放实例。
/// 解析失败或被取消（上下文被丢弃）时，尚无归属的实例按创建的逆序释放。
pub(crate) struct ResolveContext {
    scope: Option<Arc<ScopeState>>,
    frames: Vec<Frame>,
    next_frame: usize,
    max_depth: usize,
    bound: HashMap<(usize, ComponentKey), Instance>,
    pending: Vec<Releasable>,
    committed: bool,
}

impl ResolveContext {
    fn new(scope: Option<Arc<ScopeState>>, max_depth: usize) -> Self {
        Self {
            scope,
            frames: Vec::new(),
            next_frame: 0,
            max_depth,
            bound: HashMap::new(),
            pending: Vec::new(),
            committed: false,
        }
    }

    fn chain(&self) -> Vec<ComponentKey> {
        self.frames.iter().map(|frame| frame.key).collect()
    }

    fn requirer(&self) -> Option<String> {
        self.frames.last().map(|frame| frame.key.type_name().to_string())
    }

    fn check_cycle(&self, key: ComponentKey) -> DependencyResult<()> {
        if let Some(start) = self.frames.iter().position(|frame| frame.key == key) {
            let cycle = self.frames[start..]
                .iter()
                .map(|frame| frame.key)
                .chain(std::iter::once(key))
                .map(|key| key.short_name().to_string())
                .collect();
            return Err(DependencyError::CircularDependency { cycle });
        }
        Ok(())
    }

    fn enter(&mut self, key: ComponentKey) -> DependencyResult<()> {
        self.check_cycle(key)?;
        if self.frames.len() >= self.max_depth {
            return Err(DependencyError::ResolutionDepthExceeded {
                type_name: key.type_name().to_string(),
                max_depth: self.max_depth,
            });
        }

        self.frames.push(Frame {
            id: self.next_frame,
            key,
        });
        self.next_frame += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.frames.pop();
    }

    fn track(&mut self, registration: &Registration, instance: &Instance) {
        if let Some(releaser) = registration.releaser() {
            self.pending.push(Releasable::new(releaser, instance.clone()));
        }
    }

    /// 解析成功：尚无归属的实例交给活动作用域，没有作用域时由调用方负责
    fn commit(&mut self) {
        self.committed = true;
        let pending = std::mem::take(&mut self.pending);
        if let Some(scope) = &self.scope {
            scope.own(pending);
        }
    }
}

impl Drop for ResolveContext {
    fn drop(&mut self) {
        if !self.committed && !self.pending.is_empty() {
            debug!("解析未完成，释放 {} 个已创建的实例", self.pending.len());
            release_in_reverse(std::mem::take(&mut self.pending));
        }
    }
}

impl Container {
    /// 顶层解析入口
    pub(crate) async fn resolve_root(
        &self,
        key: ComponentKey,
        scope: Option<Arc<ScopeState>>,
    ) -> DependencyResult<Instance> {
        let stats = &self.inner.stats;
        stats.resolutions.fetch_add(1, Ordering::Relaxed);

        let result = self.resolve_checked(key, scope).await;
        match &result {
            Ok(_) => debug!("解析完成: {}", key),
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                debug!("解析失败: {}, {}", key, e);
            }
        }
        result
    }

    async fn resolve_checked(
        &self,
        key: ComponentKey,
        scope: Option<Arc<ScopeState>>,
    ) -> DependencyResult<Instance> {
        self.ensure_running()?;
        if let Some(scope) = &scope {
            scope.ensure_open()?;
        }
        self.preflight(&key)?;

        let mut context = ResolveContext::new(scope, self.inner.config.max_resolution_depth);
        let instance = self.resolve_in(&mut context, key).await?;
        context.commit();
        Ok(instance)
    }

    fn resolve_in<'a>(
        &'a self,
        context: &'a mut ResolveContext,
        key: ComponentKey,
    ) -> BoxFuture<'a, DependencyResult<Instance>> {
        async move {
            self.ensure_running()?;
            let registration = self.lookup(&key).ok_or_else(|| DependencyError::UnregisteredType {
                type_name: key.type_name().to_string(),
                required_by: context.requirer(),
            })?;

            // 缓存查找之前检查循环，避免等待自己正在初始化的槽位
            context.check_cycle(key)?;

            match registration.lifestyle().clone() {
                LifestylePolicy::Transient => {
                    let instance = self.construct(context, &registration).await?;
                    context.track(&registration, &instance);
                    Ok(instance)
                }
                LifestylePolicy::Singleton => {
                    let slot = self.inner.caches.singleton(key);
                    self.resolve_slot(context, &registration, &slot, Owner::Container).await
                }
                LifestylePolicy::PerThread => {
                    let slot = self.inner.caches.per_thread(key, std::thread::current().id());
                    self.resolve_slot(context, &registration, &slot, Owner::Container).await
                }
                LifestylePolicy::Pooled(size) => {
                    let pool = self.inner.caches.pool(key, size, registration.releaser());
                    self.resolve_pooled(context, &registration, &pool).await
                }
                LifestylePolicy::Scoped(selector) => {
                    let scope = self.select_scope(context, &registration, &selector)?;
                    let slot = scope.slot(key);
                    self.resolve_slot(context, &registration, &slot, Owner::Scope(scope)).await
                }
                LifestylePolicy::PerLogicalRequest => {
                    let scope = self.request_scope(context, &registration)?;
                    let slot = scope.slot(key);
                    self.resolve_slot(context, &registration, &slot, Owner::Scope(scope)).await
                }
                LifestylePolicy::BoundToAncestor(selector) => {
                    self.resolve_bound(context, &registration, &selector).await
                }
            }
        }
        .boxed()
    }

    /// 递归解析依赖并调用工厂
    async fn construct(
        &self,
        context: &mut ResolveContext,
        registration: &Registration,
    ) -> DependencyResult<Instance> {
        let key = registration.component();
        context.enter(key)?;

        let mut dependencies = Vec::with_capacity(registration.dependencies().len());
        for dependency in registration.dependencies() {
            match self.resolve_in(context, *dependency).await {
                Ok(instance) => dependencies.push(instance),
                Err(e) => {
                    context.leave();
                    return Err(e);
                }
            }
        }
        context.leave();

        trace!("调用工厂: {} ({})", registration.name(), registration.signature());
        self.inner.stats.factory_invocations.fetch_add(1, Ordering::Relaxed);
        registration.factory().create(dependencies).await
    }

    /// 构造要缓存的实例，并把它和构造期间产生的可释放实例交给归属方
    async fn construct_owned(
        &self,
        context: &mut ResolveContext,
        registration: &Registration,
        owner: &Owner,
    ) -> DependencyResult<Instance> {
        let mark = context.pending.len();
        let instance = self.construct(context, registration).await?;

        let mut owned = context.pending.split_off(mark);
        match owner {
            Owner::Container => {
                if let Some(releaser) = registration.releaser() {
                    owned.push(Releasable::new(releaser, instance.clone()));
                }
                self.own(owned);
            }
            Owner::Scope(scope) => {
                if let Some(releaser) = registration.releaser() {
                    owned.push(Releasable::new(releaser, instance.clone()));
                }
                scope.own(owned);
            }
            Owner::Pool => self.own(owned),
        }
        Ok(instance)
    }

    async fn resolve_slot(
        &self,
        context: &mut ResolveContext,
        registration: &Registration,
        slot: &tokio::sync::OnceCell<Instance>,
        owner: Owner,
    ) -> DependencyResult<Instance> {
        if let Some(instance) = slot.get() {
            self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(instance.clone());
        }

        let instance = slot
            .get_or_try_init(|| self.construct_owned(context, registration, &owner))
            .await?;
        Ok(instance.clone())
    }

    async fn resolve_pooled(
        &self,
        context: &mut ResolveContext,
        registration: &Registration,
        pool: &Arc<ComponentPool>,
    ) -> DependencyResult<Instance> {
        pool.warm_up_cell()
            .get_or_try_init(|| self.warm_up(context, registration, pool))
            .await?;

        let timeout = self.inner.config.pool_wait_timeout();
        let poll_interval = self.inner.config.pool_poll_interval();
        let started = Instant::now();

        loop {
            let returned = pool.returned();
            tokio::pin!(returned);
            returned.as_mut().enable();

            match pool.try_acquire() {
                PoolCheckout::Idle(instance) => {
                    self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(instance);
                }
                PoolCheckout::Reserved(reservation) => {
                    let instance = self.construct_owned(context, registration, &Owner::Pool).await?;
                    return Ok(reservation.fulfil(instance));
                }
                PoolCheckout::Exhausted => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(DependencyError::PoolExhausted {
                            type_name: registration.component().type_name().to_string(),
                            max: pool.size().max,
                            waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                    trace!("组件池已满，等待归还: {}", registration.component());
                    // 位置被归还时立即唤醒，使用方丢弃实例则靠轮询发现
                    let _ = tokio::time::timeout(poll_interval.min(timeout - waited), returned).await;
                }
            }
        }
    }

    /// 首次使用组件池时预先创建 `min` 个空闲实例
    async fn warm_up(
        &self,
        context: &mut ResolveContext,
        registration: &Registration,
        pool: &Arc<ComponentPool>,
    ) -> DependencyResult<()> {
        let min = pool.size().min;
        for _ in 0..min {
            let Some(reservation) = pool.try_reserve() else {
                break;
            };
            let instance = self.construct_owned(context, registration, &Owner::Pool).await?;
            drop(reservation.fulfil(instance));
        }
        debug!("组件池预热完成: {}, {} 个实例", registration.component(), min);
        Ok(())
    }

    async fn resolve_bound(
        &self,
        context: &mut ResolveContext,
        registration: &Registration,
        selector: &AncestorSelector,
    ) -> DependencyResult<Instance> {
        let key = registration.component();
        let index = selector
            .select(&context.chain())
            .ok_or_else(|| DependencyError::AncestorNotFound {
                type_name: key.type_name().to_string(),
                ancestor: selector.describe(),
            })?;
        let binding = (context.frames[index].id, key);

        if let Some(instance) = context.bound.get(&binding) {
            self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(instance.clone());
        }

        let instance = self.construct(context, registration).await?;
        context.track(registration, &instance);
        context.bound.insert(binding, instance.clone());
        Ok(instance)
    }

    /// 活动作用域，没有时按配置退回根作用域
    fn active_scope(&self, context: &ResolveContext) -> Option<Arc<ScopeState>> {
        context.scope.clone().or_else(|| {
            self.inner
                .config
                .root_scope_fallback
                .then(|| self.inner.root_scope.clone())
        })
    }

    fn select_scope(
        &self,
        context: &ResolveContext,
        registration: &Registration,
        selector: &ScopeSelector,
    ) -> DependencyResult<Arc<ScopeState>> {
        let unavailable = |required: String| DependencyError::ScopeUnavailable {
            type_name: registration.component().type_name().to_string(),
            required,
        };

        let active = self
            .active_scope(context)
            .ok_or_else(|| unavailable("active scope".to_string()))?;

        let selected = match selector {
            ScopeSelector::Current => Some(active.clone()),
            ScopeSelector::Outermost => active.lineage().last().cloned(),
            ScopeSelector::Named(name) => active
                .lineage()
                .find(|scope| scope.info().local_name() == name || scope.info().name == *name)
                .cloned(),
        };

        let scope = selected.ok_or_else(|| match selector {
            ScopeSelector::Named(name) => unavailable(format!("scope named {}", name)),
            _ => unavailable("active scope".to_string()),
        })?;
        scope.ensure_open()?;
        Ok(scope)
    }

    fn request_scope(
        &self,
        context: &ResolveContext,
        registration: &Registration,
    ) -> DependencyResult<Arc<ScopeState>> {
        let nearest_request = context.scope.as_ref().and_then(|scope| {
            scope
                .lineage()
                .find(|scope| scope.info().kind == ScopeKind::Request)
                .cloned()
        });

        let scope = nearest_request
            .or_else(|| {
                self.inner
                    .config
                    .root_scope_fallback
                    .then(|| self.inner.root_scope.clone())
            })
            .ok_or_else(|| DependencyError::ScopeUnavailable {
                type_name: registration.component().type_name().to_string(),
                required: "request scope".to_string(),
            })?;
        scope.ensure_open()?;
        Ok(scope)
    }
}
