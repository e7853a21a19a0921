//! 组件工厂抽象接口
//!
//! 提供组件实例创建的工厂模式支持。普通函数通过 [`FactoryFn`] 适配为工厂：
//! 函数的返回类型就是组件类型，每个 `Arc<T>` 参数就是一个依赖。

use async_trait::async_trait;
use closure_common::{BoxError, ComponentKey, DependencyError};
use futures::future::{self, BoxFuture, FutureExt};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 类型擦除后的组件实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 工厂签名：产出的组件类型与按声明顺序排列的依赖类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorySignature {
    /// 产出的组件类型
    pub component: ComponentKey,
    /// 依赖类型，按参数顺序
    pub parameters: Vec<ComponentKey>,
}

impl FactorySignature {
    /// 创建新的工厂签名
    pub fn new(component: ComponentKey, parameters: Vec<ComponentKey>) -> Self {
        Self {
            component,
            parameters,
        }
    }
}

impl fmt::Display for FactorySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters = self
            .parameters
            .iter()
            .map(ComponentKey::short_name)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "fn({}) -> {}", parameters, self.component.short_name())
    }
}

/// 组件工厂 trait
///
/// 用于创建组件实例，依赖实例由解析器按签名顺序提供
#[async_trait]
pub trait ComponentFactory: Send + Sync {
    /// 创建组件实例
    async fn create(&self, dependencies: Vec<Instance>) -> Result<Instance, DependencyError>;

    /// 获取工厂签名
    fn signature(&self) -> &FactorySignature;

    /// 获取工厂名称
    fn name(&self) -> &str;
}

/// 把类型擦除的实例还原为具体类型
pub fn downcast_instance<T>(instance: Instance) -> Result<Arc<T>, DependencyError>
where
    T: Send + Sync + 'static,
{
    instance
        .downcast::<T>()
        .map_err(|_| DependencyError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
        })
}

fn next_dependency<T>(dependencies: &mut impl Iterator<Item = Instance>) -> Result<Arc<T>, DependencyError>
where
    T: Send + Sync + 'static,
{
    let instance = dependencies.next().ok_or_else(|| DependencyError::TypeMismatch {
        expected: std::any::type_name::<T>().to_string(),
    })?;
    downcast_instance(instance)
}

/// 工厂函数适配 trait
///
/// 为参数全部是 `Arc<T>` 的函数（最多 8 个参数）自动实现。
/// `Args` 是参数类型组成的元组，`Out` 是函数返回值。
pub trait FactoryFn<Args, Out>: Send + Sync + 'static {
    /// 依赖类型列表
    fn parameters() -> Vec<ComponentKey>;

    /// 用解析好的依赖调用函数
    fn invoke(&self, dependencies: Vec<Instance>) -> Result<Out, DependencyError>;
}

macro_rules! impl_factory_fn {
    ($($param:ident),*) => {
        impl<Func, Out, $($param,)*> FactoryFn<($($param,)*), Out> for Func
        where
            Func: Fn($(Arc<$param>),*) -> Out + Send + Sync + 'static,
            $($param: Send + Sync + 'static,)*
        {
            fn parameters() -> Vec<ComponentKey> {
                vec![$(ComponentKey::of::<$param>()),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn invoke(&self, dependencies: Vec<Instance>) -> Result<Out, DependencyError> {
                let mut dependencies = dependencies.into_iter();
                $(let $param = next_dependency::<$param>(&mut dependencies)?;)*
                Ok((self)($($param),*))
            }
        }
    };
}

impl_factory_fn!();
impl_factory_fn!(A1);
impl_factory_fn!(A1, A2);
impl_factory_fn!(A1, A2, A3);
impl_factory_fn!(A1, A2, A3, A4);
impl_factory_fn!(A1, A2, A3, A4, A5);
impl_factory_fn!(A1, A2, A3, A4, A5, A6);
impl_factory_fn!(A1, A2, A3, A4, A5, A6, A7);
impl_factory_fn!(A1, A2, A3, A4, A5, A6, A7, A8);

type Invoker =
    Box<dyn Fn(Vec<Instance>) -> BoxFuture<'static, Result<Instance, DependencyError>> + Send + Sync>;

/// 基于函数的组件工厂
pub struct ClosureFactory {
    signature: FactorySignature,
    name: String,
    invoker: Invoker,
}

impl fmt::Debug for ClosureFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureFactory")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("invoker", &"<function>")
            .finish()
    }
}

impl ClosureFactory {
    fn with_invoker<T: 'static>(
        parameters: Vec<ComponentKey>,
        name: impl Into<String>,
        invoker: Invoker,
    ) -> Self {
        Self {
            signature: FactorySignature::new(ComponentKey::of::<T>(), parameters),
            name: name.into(),
            invoker,
        }
    }

    /// 同步、不会失败的工厂函数
    pub fn from_fn<Args, T, F>(factory: F) -> Self
    where
        Args: 'static,
        T: Send + Sync + 'static,
        F: FactoryFn<Args, T>,
    {
        let invoker: Invoker = Box::new(move |dependencies: Vec<Instance>| {
            let result = factory
                .invoke(dependencies)
                .map(|component| Arc::new(component) as Instance);
            future::ready(result).boxed()
        });
        Self::with_invoker::<T>(<F as FactoryFn<Args, T>>::parameters(), std::any::type_name::<F>(), invoker)
    }

    /// 同步、可能失败的工厂函数
    pub fn from_try_fn<Args, T, E, F>(factory: F) -> Self
    where
        Args: 'static,
        T: Send + Sync + 'static,
        E: Into<BoxError> + 'static,
        F: FactoryFn<Args, Result<T, E>>,
    {
        let invoker: Invoker = Box::new(move |dependencies: Vec<Instance>| {
            let result = factory.invoke(dependencies).and_then(|built| {
                built
                    .map(|component| Arc::new(component) as Instance)
                    .map_err(|e| DependencyError::factory_failure(std::any::type_name::<T>(), e))
            });
            future::ready(result).boxed()
        });
        Self::with_invoker::<T>(
            <F as FactoryFn<Args, Result<T, E>>>::parameters(),
            std::any::type_name::<F>(),
            invoker,
        )
    }

    /// 异步、不会失败的工厂函数
    pub fn from_async_fn<Args, T, Fut, F>(factory: F) -> Self
    where
        Args: 'static,
        T: Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        F: FactoryFn<Args, Fut>,
    {
        let invoker: Invoker = Box::new(move |dependencies: Vec<Instance>| match factory.invoke(dependencies) {
            Ok(pending) => async move { Ok::<Instance, DependencyError>(Arc::new(pending.await)) }.boxed(),
            Err(e) => future::ready(Err(e)).boxed(),
        });
        Self::with_invoker::<T>(<F as FactoryFn<Args, Fut>>::parameters(), std::any::type_name::<F>(), invoker)
    }

    /// 异步、可能失败的工厂函数
    pub fn from_async_try_fn<Args, T, E, Fut, F>(factory: F) -> Self
    where
        Args: 'static,
        T: Send + Sync + 'static,
        E: Into<BoxError> + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        F: FactoryFn<Args, Fut>,
    {
        let invoker: Invoker = Box::new(move |dependencies: Vec<Instance>| match factory.invoke(dependencies) {
            Ok(pending) => async move {
                pending
                    .await
                    .map(|component| Arc::new(component) as Instance)
                    .map_err(|e| DependencyError::factory_failure(std::any::type_name::<T>(), e))
            }
            .boxed(),
            Err(e) => future::ready(Err(e)).boxed(),
        });
        Self::with_invoker::<T>(<F as FactoryFn<Args, Fut>>::parameters(), std::any::type_name::<F>(), invoker)
    }

    /// 直接返回已有实例的工厂
    pub fn from_instance<T>(instance: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let invoker: Invoker = Box::new(move |_: Vec<Instance>| {
            let instance: Instance = instance.clone();
            future::ready(Ok(instance)).boxed()
        });
        Self::with_invoker::<T>(Vec::new(), format!("instance<{}>", std::any::type_name::<T>()), invoker)
    }
}

#[async_trait]
impl ComponentFactory for ClosureFactory {
    async fn create(&self, dependencies: Vec<Instance>) -> Result<Instance, DependencyError> {
        (self.invoker)(dependencies).await
    }

    fn signature(&self) -> &FactorySignature {
        &self.signature
    }

    fn name(&self) -> &str {
        &self.name
    }
}
