//! 实例释放、取消与容器关闭的端到端测试


use closure_abstractions::{resolve_as, ComponentKey, ComponentResolver, LifestylePolicy, Registration};
use closure_common::{ContainerConfig, DependencyError, DuplicatePolicy, InfrastructureError, Release};
use closure_container::Container;
use common::{init_test_logging, Resource, Tracker};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

/// 依赖 Resource 的组件
struct Repository {
    resource: Arc<Resource>,
}

fn register_resource(container: &Container, tracker: &Arc<Tracker>, label: &'static str, policy: LifestylePolicy) {
    let tracker = tracker.clone();
    container
        .register(
            Registration::from_fn(move || Resource::new(label, &tracker))
                .with_lifestyle(policy)
                .releasing::<Resource>(),
        )
        .unwrap();
}

#[tokio::test]
async fn test_scope_exit_releases_in_reverse_order() {
    init_test_logging();
    let tracker = Tracker::new();
    let container = Container::new();
    register_resource(&container, &tracker, "session", LifestylePolicy::scoped());

    let repositories = tracker.clone();
    container
        .register(
            Registration::from_fn(|resource: Arc<Resource>| Repository { resource })
                .with_lifestyle(LifestylePolicy::scoped())
                .on_release(move |repository: &Repository| {
                    repositories.record_release(format!("repository({})", repository.resource.label));
                }),
        )
        .unwrap();

    let scope = container.enter_scope();
    let repository = scope.resolve::<Repository>().await.unwrap();
    assert_eq!(repository.resource.serial, 1);
    assert!(tracker.released().is_empty());

    scope.exit();
    assert_eq!(tracker.released(), vec!["repository(session)", "session#1"]);
}

#[tokio::test]
async fn test_transients_created_in_scope_are_owned_by_scope() {
    init_test_logging();
    let tracker = Tracker::new();
    let container = Container::new();
    register_resource(&container, &tracker, "buffer", LifestylePolicy::Transient);

    {
        let scope = container.enter_scope();
        let first = scope.resolve::<Resource>().await.unwrap();
        let second = scope.resolve::<Resource>().await.unwrap();
        assert_ne!(first.serial, second.serial);
        assert_eq!(tracker.released_count(), 0);
    }
    assert_eq!(tracker.released(), vec!["buffer#2", "buffer#1"]);

    // 没有作用域时由调用方负责
    let _unowned = container.resolve::<Resource>().await.unwrap();
    container.shutdown();
    assert_eq!(tracker.released_count(), 2);
}

struct Broken;

#[tokio::test]
async fn test_failed_resolution_releases_partial_graph() {
    init_test_logging();
    let tracker = Tracker::new();
    let container = Container::new();
    register_resource(&container, &tracker, "handle", LifestylePolicy::Transient);
    container
        .register(Registration::from_try_fn(|_: Arc<Resource>, _: Arc<Resource>| -> Result<Broken, String> {
            Err("refused".to_string())
        }))
        .unwrap();

    let scope = container.enter_scope();
    let result = scope.resolve::<Broken>().await;
    assert!(matches!(result, Err(DependencyError::FactoryInvocationFailure { .. })));
    assert_eq!(tracker.released(), vec!["handle#2", "handle#1"]);

    // 作用域退出时不会重复释放
    drop(scope);
    assert_eq!(tracker.released_count(), 2);
}

struct Stalled;

#[tokio::test]
async fn test_cancelled_resolution_releases_and_can_retry() {
    init_test_logging();
    let tracker = Tracker::new();
    let container = Container::new();
    register_resource(&container, &tracker, "lease", LifestylePolicy::Transient);
    container
        .register(
            Registration::from_async_fn(|_: Arc<Resource>| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Stalled
            })
            .with_lifestyle(LifestylePolicy::Singleton),
        )
        .unwrap();

    let result = tokio::time::timeout(Duration::from_millis(20), container.resolve::<Stalled>()).await;
    assert!(result.is_err());
    assert_eq!(tracker.released(), vec!["lease#1"]);

    // 单例槽位保持为空，之后的解析重新构造
    container
        .register(Registration::from_fn(|_: Arc<Resource>| Stalled).with_lifestyle(LifestylePolicy::Singleton))
        .unwrap();
    assert_ok!(container.resolve::<Stalled>().await);
    assert_eq!(tracker.created(), 2);
}

#[tokio::test]
async fn test_shutdown_releases_container_owned_instances() {
    init_test_logging();
    let tracker = Tracker::new();
    let config = ContainerConfig {
        root_scope_fallback: true,
        ..ContainerConfig::default()
    };
    let container = Container::with_config(config);
    register_resource(&container, &tracker, "singleton", LifestylePolicy::Singleton);

    struct Cached(Arc<Resource>);
    let cached = tracker.clone();
    container
        .register(
            Registration::from_fn(move || Cached(Arc::new(Resource::new("root", &cached))))
                .with_lifestyle(LifestylePolicy::scoped())
                .on_release(|cached: &Cached| cached.0.release()),
        )
        .unwrap();

    let singleton = container.resolve::<Resource>().await.unwrap();
    let _root = container.resolve::<Cached>().await.unwrap();
    assert!(tracker.released().is_empty());

    container.shutdown();
    assert!(container.is_shut_down());
    assert_eq!(tracker.released(), vec!["root#2", "singleton#1"]);

    let result = container.resolve::<Resource>().await;
    assert!(matches!(result, Err(DependencyError::ContainerShutDown)));
    assert!(matches!(
        container.register_instance(1u8),
        Err(DependencyError::ContainerShutDown)
    ));

    // 重复关闭无副作用
    container.shutdown();
    assert_eq!(tracker.released_count(), 2);
    drop(singleton);
}

#[tokio::test]
async fn test_shutdown_releases_dependents_before_dependencies() {
    init_test_logging();
    let tracker = Tracker::new();
    let config = ContainerConfig {
        root_scope_fallback: true,
        ..ContainerConfig::default()
    };
    let container = Container::with_config(config);
    register_resource(&container, &tracker, "root", LifestylePolicy::scoped());

    let repositories = tracker.clone();
    container
        .register(
            Registration::from_fn(|resource: Arc<Resource>| Repository { resource })
                .with_lifestyle(LifestylePolicy::Singleton)
                .on_release(move |repository: &Repository| {
                    repositories.record_release(format!("repository({})", repository.resource.label));
                }),
        )
        .unwrap();

    // 单例依赖根作用域中的实例，两者归属不同
    let repository = container.resolve::<Repository>().await.unwrap();
    assert_eq!(repository.resource.serial, 1);

    container.shutdown();
    assert_eq!(tracker.released(), vec!["repository(root)", "root#1"]);
}

#[tokio::test]
async fn test_shutdown_releases_pooled_instances() {
    init_test_logging();
    let tracker = Tracker::new();
    let container = Container::new();
    register_resource(&container, &tracker, "pooled", LifestylePolicy::pooled(2, 3));

    let busy = container.resolve::<Resource>().await.unwrap();
    assert_eq!(tracker.created(), 2);

    container.shutdown();
    assert_eq!(tracker.released_count(), 2);
    drop(busy);
}

#[tokio::test]
async fn test_resolve_through_trait_objects() {
    init_test_logging();
    let tracker = Tracker::new();
    let container = Container::new();
    register_resource(&container, &tracker, "shared", LifestylePolicy::scoped());

    let scope = container.enter_scope();
    let resolver: &dyn ComponentResolver = &scope;
    assert!(resolver.can_resolve(&ComponentKey::of::<Resource>()));
    let first = resolve_as::<Resource, _>(resolver).await.unwrap();
    let second = scope.resolve::<Resource>().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let resolver: Arc<dyn ComponentResolver> = Arc::new(container.clone());
    assert!(!resolver.can_resolve(&ComponentKey::of::<Repository>()));
    let result = resolver.resolve_key(ComponentKey::of::<Resource>()).await;
    assert!(matches!(result, Err(DependencyError::ScopeUnavailable { .. })));

    scope.exit();
    assert_eq!(tracker.released(), vec!["shared#1"]);
}

#[tokio::test]
async fn test_configuration_drives_container() -> anyhow::Result<()> {
    init_test_logging();
    let config = ContainerConfig::from_toml_str(
        r#"
            duplicate_policy = "reject"
            max_resolution_depth = 8
            pool_wait_timeout_ms = 10
        "#,
    )?;
    assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
    assert!(!config.root_scope_fallback);

    let config = config.with_overrides(vec![("CLOSURE_ROOT_SCOPE_FALLBACK", "true")], "closure")?;
    assert!(config.root_scope_fallback);

    let container = Container::builder()
        .with_config(config)
        .register_instance(7u32)
        .register(Registration::from_fn(|value: Arc<u32>| u64::from(*value)))
        .validate_on_build(true)
        .build()?;

    assert_eq!(*container.resolve::<u64>().await?, 7);
    assert!(container.register_instance(8u32).is_err());
    assert_eq!(container.stats().registered_components, 2);
    Ok(())
}

#[test]
fn test_builder_reports_invalid_configuration() {
    let config = ContainerConfig {
        max_resolution_depth: 0,
        ..ContainerConfig::default()
    };
    let result = Container::builder().with_config(config).build();
    assert!(matches!(result, Err(InfrastructureError::ConfigError { .. })));
}
