//! 组件生命周期与作用域描述

use std::fmt;

/// 可释放资源约定
///
/// 组件实例在所属作用域退出或容器关闭时调用 `release`。
/// 实例本身由 `Arc` 持有，`release` 只负责释放外部资源。
pub trait Release: Send + Sync {
    /// 释放实例持有的资源
    fn release(&self);
}

/// 作用域类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// 容器自带的根作用域
    Root,
    /// 普通作用域
    Standard,
    /// 逻辑请求作用域，`PerLogicalRequest` 实例绑定到最近的请求作用域
    Request,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Root => write!(f, "root"),
            ScopeKind::Standard => write!(f, "scope"),
            ScopeKind::Request => write!(f, "request"),
        }
    }
}

/// 组件作用域描述
#[derive(Debug, Clone)]
pub struct ScopeInfo {
    pub id: uuid::Uuid,
    pub name: String,
    pub kind: ScopeKind,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ScopeInfo {
    /// 创建新作用域
    pub fn new(name: impl Into<String>, kind: ScopeKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            kind,
            created_at: chrono::Utc::now(),
        }
    }

    /// 创建根作用域
    pub fn root() -> Self {
        Self::new("root", ScopeKind::Root)
    }

    /// 创建子作用域
    pub fn child(&self, name: impl Into<String>, kind: ScopeKind) -> Self {
        Self::new(format!("{}.{}", self.name, name.into()), kind)
    }

    /// 名称的最后一段，即创建时传入的名称
    pub fn local_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for ScopeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.name, self.id)
    }
}
