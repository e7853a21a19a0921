//! 组件注册信息

use crate::factory::{ClosureFactory, ComponentFactory, FactoryFn, FactorySignature, Instance};
use crate::lifestyle::LifestylePolicy;
use closure_common::{BoxError, ComponentKey, DependencyError, DependencyResult, Release};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 实例释放回调
pub type Releaser = Arc<dyn Fn(&Instance) + Send + Sync>;

/// 组件注册
///
/// 描述如何产出一个组件：组件类型、工厂、生命周期策略以及可选的释放回调。
/// 注册是值类型，修改方法都返回新的注册，交给容器后不再变化。
#[derive(Clone)]
pub struct Registration {
    factory: Arc<dyn ComponentFactory>,
    lifestyle: LifestylePolicy,
    releaser: Option<Releaser>,
}

impl Registration {
    /// 使用自定义工厂创建注册，生命周期为瞬态
    pub fn new(factory: Arc<dyn ComponentFactory>) -> Self {
        Self {
            factory,
            lifestyle: LifestylePolicy::Transient,
            releaser: None,
        }
    }

    /// 从同步工厂函数创建注册
    ///
    /// ```ignore
    /// fn make_foo(bar: Arc<Bar>) -> Foo { Foo { bar } }
    /// let registration = Registration::from_fn(make_foo);
    /// ```
    pub fn from_fn<Args, T, F>(factory: F) -> Self
    where
        Args: 'static,
        T: Send + Sync + 'static,
        F: FactoryFn<Args, T>,
    {
        Self::new(Arc::new(ClosureFactory::from_fn(factory)))
    }

    /// 从可能失败的同步工厂函数创建注册
    pub fn from_try_fn<Args, T, E, F>(factory: F) -> Self
    where
        Args: 'static,
        T: Send + Sync + 'static,
        E: Into<BoxError> + 'static,
        F: FactoryFn<Args, Result<T, E>>,
    {
        Self::new(Arc::new(ClosureFactory::from_try_fn(factory)))
    }

    /// 从异步工厂函数创建注册
    pub fn from_async_fn<Args, T, Fut, F>(factory: F) -> Self
    where
        Args: 'static,
        T: Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        F: FactoryFn<Args, Fut>,
    {
        Self::new(Arc::new(ClosureFactory::from_async_fn(factory)))
    }

    /// 从可能失败的异步工厂函数创建注册
    pub fn from_async_try_fn<Args, T, E, Fut, F>(factory: F) -> Self
    where
        Args: 'static,
        T: Send + Sync + 'static,
        E: Into<BoxError> + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        F: FactoryFn<Args, Fut>,
    {
        Self::new(Arc::new(ClosureFactory::from_async_try_fn(factory)))
    }

    /// 注册已有实例，生命周期为单例
    pub fn instance<T>(value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::shared(Arc::new(value))
    }

    /// 注册共享实例，生命周期为单例
    pub fn shared<T>(value: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::new(Arc::new(ClosureFactory::from_instance(value))).with_lifestyle(LifestylePolicy::Singleton)
    }

    /// 替换生命周期策略
    pub fn with_lifestyle(mut self, lifestyle: LifestylePolicy) -> Self {
        self.lifestyle = lifestyle;
        self
    }

    /// 设置释放回调
    ///
    /// 回调在拥有该实例的作用域退出或容器关闭时调用，按创建的逆序执行。
    pub fn on_release<T, F>(mut self, release: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.releaser = Some(Arc::new(move |instance: &Instance| {
            if let Some(component) = (**instance).downcast_ref::<T>() {
                release(component);
            }
        }));
        self
    }

    /// 使用组件自身的 [`Release`] 实现作为释放回调
    pub fn releasing<T>(self) -> Self
    where
        T: Release + 'static,
    {
        self.on_release(|component: &T| component.release())
    }

    /// 组件类型
    pub fn component(&self) -> ComponentKey {
        self.factory.signature().component
    }

    /// 依赖类型，按参数顺序
    pub fn dependencies(&self) -> &[ComponentKey] {
        &self.factory.signature().parameters
    }

    /// 工厂签名
    pub fn signature(&self) -> &FactorySignature {
        self.factory.signature()
    }

    /// 生命周期策略
    pub fn lifestyle(&self) -> &LifestylePolicy {
        &self.lifestyle
    }

    /// 工厂
    pub fn factory(&self) -> &Arc<dyn ComponentFactory> {
        &self.factory
    }

    /// 工厂名称
    pub fn name(&self) -> &str {
        self.factory.name()
    }

    /// 是否带有释放回调
    pub fn has_releaser(&self) -> bool {
        self.releaser.is_some()
    }

    /// 获取释放回调
    pub fn releaser(&self) -> Option<Releaser> {
        self.releaser.clone()
    }

    /// 对实例执行释放回调
    pub fn release(&self, instance: &Instance) {
        if let Some(releaser) = &self.releaser {
            releaser(instance);
        }
    }

    /// 校验生命周期参数
    pub fn validate(&self) -> DependencyResult<()> {
        self.lifestyle
            .validate()
            .map_err(|message| DependencyError::InvalidLifestyle {
                type_name: self.component().type_name().to_string(),
                message,
            })
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("component", &self.component().type_name())
            .field("signature", &self.signature().to_string())
            .field("lifestyle", &self.lifestyle)
            .field("releaser", &self.releaser.as_ref().map(|_| "<function>"))
            .finish()
    }
}
