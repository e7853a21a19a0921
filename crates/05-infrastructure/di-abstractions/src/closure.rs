//! 批量注册构建器
//!
//! 先从蓝图发现一批注册，再链式地给整批注册套用同一个生命周期策略：
//!
//! ```ignore
//! let queries = ClosureRegistration::for_blueprint::<Queries>().lifestyle_singleton();
//! container.register_closure(queries)?;
//! ```
//!
//! 每次调用都产生新的集合，后调用的策略覆盖先调用的。

use crate::discovery::{discover, Blueprint};
use crate::lifestyle::{
    apply_policy, AncestorMatch, AncestorSelector, LifestylePolicy, PoolSize, ScopeSelector, DEFAULT_POOL_MAX,
    DEFAULT_POOL_MIN,
};
use crate::registration::Registration;
use closure_common::ComponentKey;
use std::sync::Arc;

/// 一批工厂注册
#[derive(Debug, Clone)]
pub struct ClosureRegistration {
    source: &'static str,
    registrations: Vec<Registration>,
}

impl ClosureRegistration {
    /// 发现蓝图上的全部工厂
    pub fn for_blueprint<B: Blueprint + ?Sized>() -> Self {
        Self {
            source: B::blueprint_name(),
            registrations: discover::<B>(),
        }
    }

    /// 从已有注册创建
    pub fn from_registrations(source: &'static str, registrations: Vec<Registration>) -> Self {
        Self { source, registrations }
    }

    /// 来源名称
    pub fn source(&self) -> &'static str {
        self.source
    }

    /// 给整批注册套用策略
    pub fn lifestyle(self, policy: LifestylePolicy) -> Self {
        Self {
            source: self.source,
            registrations: apply_policy(&self.registrations, &policy),
        }
    }

    /// 瞬态
    pub fn lifestyle_transient(self) -> Self {
        self.lifestyle(LifestylePolicy::Transient)
    }

    /// 单例
    pub fn lifestyle_singleton(self) -> Self {
        self.lifestyle(LifestylePolicy::Singleton)
    }

    /// 每线程
    pub fn lifestyle_per_thread(self) -> Self {
        self.lifestyle(LifestylePolicy::PerThread)
    }

    /// 组件池，未指定时初始大小为 5、上限为 15
    ///
    /// 只指定上限且上限小于默认初始大小时，初始大小取上限。
    pub fn lifestyle_pooled(self, min: Option<usize>, max: Option<usize>) -> Self {
        let max = max.unwrap_or(DEFAULT_POOL_MAX);
        let min = min.unwrap_or(DEFAULT_POOL_MIN.min(max));
        self.lifestyle(LifestylePolicy::Pooled(PoolSize::new(min, max)))
    }

    /// 当前作用域内共享
    pub fn lifestyle_scoped(self) -> Self {
        self.lifestyle(LifestylePolicy::scoped())
    }

    /// 在指定作用域内共享
    pub fn lifestyle_scoped_in(self, selector: ScopeSelector) -> Self {
        self.lifestyle(LifestylePolicy::Scoped(selector))
    }

    /// 绑定到最远的 `T` 类型上级
    pub fn lifestyle_bound_to<T: ?Sized + 'static>(self) -> Self {
        self.lifestyle(LifestylePolicy::bound_to::<T>())
    }

    /// 绑定到最近的 `T` 类型上级
    pub fn lifestyle_bound_to_nearest<T: ?Sized + 'static>(self) -> Self {
        self.lifestyle(LifestylePolicy::bound_to_nearest::<T>())
    }

    /// 绑定到最近的满足条件的上级
    pub fn lifestyle_bound_to_matching<P>(self, predicate: P) -> Self
    where
        P: Fn(&ComponentKey) -> bool + Send + Sync + 'static,
    {
        self.lifestyle(LifestylePolicy::BoundToAncestor(AncestorSelector::Nearest(
            AncestorMatch::Predicate(Arc::new(predicate)),
        )))
    }

    /// 用自定义函数在解析链中挑选绑定目标
    pub fn lifestyle_bound_to_with<F>(self, binder: F) -> Self
    where
        F: Fn(&[ComponentKey]) -> Option<usize> + Send + Sync + 'static,
    {
        self.lifestyle(LifestylePolicy::BoundToAncestor(AncestorSelector::Custom(Arc::new(binder))))
    }

    /// 逻辑请求内共享
    pub fn lifestyle_per_logical_request(self) -> Self {
        self.lifestyle(LifestylePolicy::PerLogicalRequest)
    }

    /// 当前持有的注册
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    /// 取出注册
    pub fn into_registrations(self) -> Vec<Registration> {
        self.registrations
    }

    /// 注册数量
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
