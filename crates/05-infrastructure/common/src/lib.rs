//! # Closure Common
//!
//! Closure 容器各层共享的基础类型。
//!
//! ## 核心内容
//!
//! - [`ComponentKey`] - 组件类型标识
//! - [`DependencyError`] - 注册与解析错误
//! - [`ScopeInfo`] / [`Release`] - 作用域描述与资源释放约定
//! - [`ContainerConfig`] / [`LoggingConfig`] - 容器与日志配置
//!
//! ## 设计原则
//!
//! - 不持有任何进程级全局容器，容器句柄总是显式传递
//! - 错误总是显式返回，不以空值代替失败

pub mod configuration;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod metadata;

pub use configuration::*;
pub use errors::*;
pub use lifecycle::*;
pub use logging::*;
pub use metadata::*;
