//! # 依赖注入具体实现
//!
//! 提供依赖注入容器、解析器与各生命周期策略的实例缓存。
//!
//! ## 核心类型
//!
//! - [`Container`] - 注册表与解析入口，克隆开销很小
//! - [`ContainerBuilder`] - 批量注册后构建容器
//! - [`ScopeGuard`] - 作用域句柄，退出时释放作用域拥有的实例
//! - [`ContainerStats`] - 运行统计快照

mod cache;
mod container;
mod pool;
mod resolver;
mod scope;

pub use container::{Container, ContainerBuilder, ContainerStats};
pub use scope::ScopeGuard;

pub use closure_abstractions::{
    apply_policy, discover, resolve_as, Blueprint, ClosureRegistration, ComponentResolver, Instance,
    LifestylePolicy, Registration,
};
pub use closure_common::{ComponentKey, ContainerConfig, DependencyError, DependencyResult, Release};
