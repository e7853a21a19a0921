//! # Closure Abstractions
//!
//! 依赖注入抽象层，定义组件注册、工厂函数与生命周期策略。
//!
//! ## 核心接口
//!
//! - [`Registration`] - 一个组件的注册信息
//! - [`ComponentFactory`] / [`FactoryFn`] - 工厂抽象与工厂函数适配
//! - [`LifestylePolicy`] / [`ClosureRegistration`] - 生命周期策略与批量应用
//! - [`Blueprint`] - 工厂函数集合的发现约定
//! - [`ComponentResolver`] - 依赖解析器接口
//! - [`CircularDependencyDetector`] - 依赖图循环检测

pub mod closure;
pub mod discovery;
pub mod factory;
pub mod lifestyle;
pub mod registration;
pub mod registry;
pub mod resolver;

pub use closure::*;
pub use discovery::*;
pub use factory::*;
pub use lifestyle::*;
pub use registration::*;
pub use registry::*;
pub use resolver::*;

pub use closure_common::{ComponentKey, DependencyError, DependencyResult, Release};
