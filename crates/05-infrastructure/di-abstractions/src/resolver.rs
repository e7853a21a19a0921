//! 组件解析器抽象接口
//!
//! 提供依赖解析和组件实例化的能力

use crate::factory::{downcast_instance, Instance};
use async_trait::async_trait;
use closure_common::{ComponentKey, DependencyError};
use std::sync::Arc;

/// 组件解析器 trait
///
/// 负责解析组件依赖并创建组件实例
#[async_trait]
pub trait ComponentResolver: Send + Sync {
    /// 按组件类型解析
    async fn resolve_key(&self, key: ComponentKey) -> Result<Instance, DependencyError>;

    /// 检查是否可以解析指定类型及其全部依赖
    fn can_resolve(&self, key: &ComponentKey) -> bool;
}

/// 通过任意解析器解析具体类型
pub async fn resolve_as<T, R>(resolver: &R) -> Result<Arc<T>, DependencyError>
where
    T: Send + Sync + 'static,
    R: ComponentResolver + ?Sized,
{
    let instance = resolver.resolve_key(ComponentKey::of::<T>()).await?;
    downcast_instance(instance)
}
