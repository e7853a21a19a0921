//! 组件生命周期策略
//!
//! 策略决定解析器是否复用已创建的实例，以及复用范围。

use crate::registration::Registration;
use closure_common::ComponentKey;
use std::fmt;
use std::sync::Arc;

/// 组件池默认初始大小
pub const DEFAULT_POOL_MIN: usize = 5;
/// 组件池默认上限
pub const DEFAULT_POOL_MAX: usize = 15;

/// 组件池容量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSize {
    /// 首次使用时预先创建的实例数
    pub min: usize,
    /// 同时存活的实例上限
    pub max: usize,
}

impl PoolSize {
    /// 创建组件池容量
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

impl Default for PoolSize {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_MIN, DEFAULT_POOL_MAX)
    }
}

/// 作用域组件绑定到哪个作用域
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScopeSelector {
    /// 当前作用域
    #[default]
    Current,
    /// 最外层作用域
    Outermost,
    /// 由内向外最近的同名作用域
    Named(String),
}

/// 上级组件匹配条件
#[derive(Clone)]
pub enum AncestorMatch {
    /// 类型完全一致
    Type(ComponentKey),
    /// 自定义判断
    Predicate(Arc<dyn Fn(&ComponentKey) -> bool + Send + Sync>),
}

impl AncestorMatch {
    /// 判断组件是否匹配
    pub fn matches(&self, key: &ComponentKey) -> bool {
        match self {
            AncestorMatch::Type(expected) => expected == key,
            AncestorMatch::Predicate(predicate) => predicate(key),
        }
    }
}

impl fmt::Debug for AncestorMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AncestorMatch::Type(key) => f.debug_tuple("Type").field(&key.type_name()).finish(),
            AncestorMatch::Predicate(_) => f.write_str("Predicate(<function>)"),
        }
    }
}

/// 在解析链中挑选绑定目标的自定义函数，返回链中的下标
pub type AncestorBinder = Arc<dyn Fn(&[ComponentKey]) -> Option<usize> + Send + Sync>;

/// 绑定到上级组件的方式
///
/// 解析链从根（下标 0）到当前组件的直接上级排列。
#[derive(Clone)]
pub enum AncestorSelector {
    /// 最近的匹配上级
    Nearest(AncestorMatch),
    /// 最远（最靠近根）的匹配上级
    Farthest(AncestorMatch),
    /// 自定义选择
    Custom(AncestorBinder),
}

impl AncestorSelector {
    /// 在解析链中选择绑定目标
    pub fn select(&self, chain: &[ComponentKey]) -> Option<usize> {
        match self {
            AncestorSelector::Nearest(matcher) => chain.iter().rposition(|key| matcher.matches(key)),
            AncestorSelector::Farthest(matcher) => chain.iter().position(|key| matcher.matches(key)),
            AncestorSelector::Custom(binder) => binder(chain).filter(|index| *index < chain.len()),
        }
    }

    /// 用于错误信息的描述
    pub fn describe(&self) -> String {
        match self {
            AncestorSelector::Nearest(AncestorMatch::Type(key)) => format!("nearest {}", key.short_name()),
            AncestorSelector::Farthest(AncestorMatch::Type(key)) => format!("farthest {}", key.short_name()),
            AncestorSelector::Nearest(AncestorMatch::Predicate(_)) => "nearest <predicate>".to_string(),
            AncestorSelector::Farthest(AncestorMatch::Predicate(_)) => "farthest <predicate>".to_string(),
            AncestorSelector::Custom(_) => "<custom binder>".to_string(),
        }
    }
}

impl fmt::Debug for AncestorSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AncestorSelector::Nearest(matcher) => f.debug_tuple("Nearest").field(matcher).finish(),
            AncestorSelector::Farthest(matcher) => f.debug_tuple("Farthest").field(matcher).finish(),
            AncestorSelector::Custom(_) => f.write_str("Custom(<function>)"),
        }
    }
}

/// 生命周期策略
///
/// 每个注册只有一个策略，后应用的覆盖先应用的。
#[derive(Debug, Clone, Default)]
pub enum LifestylePolicy {
    /// 每次解析都创建新实例
    #[default]
    Transient,
    /// 容器内唯一实例
    Singleton,
    /// 每个线程一个实例
    PerThread,
    /// 有上限的实例池
    Pooled(PoolSize),
    /// 作用域内共享
    Scoped(ScopeSelector),
    /// 与解析链上的某个上级组件共享
    BoundToAncestor(AncestorSelector),
    /// 逻辑请求内共享，绑定到最近的请求作用域
    PerLogicalRequest,
}

impl LifestylePolicy {
    /// 当前作用域内共享
    pub fn scoped() -> Self {
        Self::Scoped(ScopeSelector::Current)
    }

    /// 指定容量的组件池
    pub fn pooled(min: usize, max: usize) -> Self {
        Self::Pooled(PoolSize::new(min, max))
    }

    /// 绑定到最远的 `T` 类型上级
    pub fn bound_to<T: ?Sized + 'static>() -> Self {
        Self::BoundToAncestor(AncestorSelector::Farthest(AncestorMatch::Type(ComponentKey::of::<T>())))
    }

    /// 绑定到最近的 `T` 类型上级
    pub fn bound_to_nearest<T: ?Sized + 'static>() -> Self {
        Self::BoundToAncestor(AncestorSelector::Nearest(AncestorMatch::Type(ComponentKey::of::<T>())))
    }

    /// 策略名称
    pub fn name(&self) -> &'static str {
        match self {
            LifestylePolicy::Transient => "transient",
            LifestylePolicy::Singleton => "singleton",
            LifestylePolicy::PerThread => "per-thread",
            LifestylePolicy::Pooled(_) => "pooled",
            LifestylePolicy::Scoped(_) => "scoped",
            LifestylePolicy::BoundToAncestor(_) => "bound-to-ancestor",
            LifestylePolicy::PerLogicalRequest => "per-logical-request",
        }
    }

    /// 是否复用实例
    pub fn reuses_instances(&self) -> bool {
        !matches!(self, LifestylePolicy::Transient)
    }

    /// 是否需要作用域
    pub fn requires_scope(&self) -> bool {
        matches!(self, LifestylePolicy::Scoped(_) | LifestylePolicy::PerLogicalRequest)
    }

    /// 校验策略参数
    pub fn validate(&self) -> Result<(), String> {
        if let LifestylePolicy::Pooled(size) = self {
            if size.max == 0 {
                return Err("组件池上限必须大于 0".to_string());
            }
            if size.min > size.max {
                return Err(format!("组件池初始大小 {} 超过上限 {}", size.min, size.max));
            }
        }
        Ok(())
    }
}

impl fmt::Display for LifestylePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 批量应用生命周期策略
///
/// 返回新的注册集合，每个元素的策略都被替换为 `policy`，输入保持不变。
pub fn apply_policy(registrations: &[Registration], policy: &LifestylePolicy) -> Vec<Registration> {
    registrations
        .iter()
        .cloned()
        .map(|registration| registration.with_lifestyle(policy.clone()))
        .collect()
}
