//! 注册与解析的端到端测试


use closure_abstractions::{apply_policy, discover, Blueprint, ClosureRegistration, LifestylePolicy, Registration};
use closure_common::{ContainerConfig, DependencyError, DuplicatePolicy};
use closure_container::Container;
use common::{init_test_logging, Tracker};
use std::error::Error as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[derive(Debug)]
struct Bar {
    serial: usize,
}

#[derive(Debug)]
struct Foo {
    bar: Arc<Bar>,
}

struct Factories;

static BAR_SERIAL: AtomicUsize = AtomicUsize::new(0);

impl Factories {
    fn make_bar() -> Bar {
        Bar {
            serial: BAR_SERIAL.fetch_add(1, Ordering::SeqCst),
        }
    }

    fn make_foo(bar: Arc<Bar>) -> Foo {
        Foo { bar }
    }
}

impl Blueprint for Factories {
    fn factories() -> Vec<Registration> {
        vec![
            Registration::from_fn(Self::make_foo),
            Registration::from_fn(Self::make_bar),
        ]
    }
}

#[tokio::test]
async fn test_discovery_round_trip() {
    init_test_logging();

    let registrations = discover::<Factories>();
    assert_eq!(registrations.len(), 2);

    let container = Container::new();
    assert_eq!(container.register_blueprint::<Factories>().unwrap(), 2);
    container
        .register_closure(ClosureRegistration::for_blueprint::<Factories>().lifestyle_singleton())
        .unwrap();

    let foo = container.resolve::<Foo>().await.unwrap();
    let bar = container.resolve::<Bar>().await.unwrap();
    assert!(Arc::ptr_eq(&foo.bar, &bar));
    assert_eq!(foo.bar.serial, bar.serial);
}

struct Plain;

#[tokio::test]
async fn test_transient_and_singleton() {
    init_test_logging();
    let container = Container::new();

    container.register(Registration::from_fn(|| Plain)).unwrap();
    let first = container.resolve::<Plain>().await.unwrap();
    let second = container.resolve::<Plain>().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    container
        .register(Registration::from_fn(|| Plain).with_lifestyle(LifestylePolicy::Singleton))
        .unwrap();
    let first = container.resolve::<Plain>().await.unwrap();
    let second = container.resolve::<Plain>().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

struct Slow;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_singleton_constructed_once() {
    init_test_logging();
    let tracker = Tracker::new();
    let counter = tracker.clone();

    let container = Container::new();
    container
        .register(
            Registration::from_async_fn(move || {
                let counter = counter.clone();
                async move {
                    counter.create();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Slow
                }
            })
            .with_lifestyle(LifestylePolicy::Singleton),
        )
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let container = container.clone();
            tokio::spawn(async move { container.resolve::<Slow>().await })
        })
        .collect();

    let mut instances = Vec::new();
    for handle in handles {
        instances.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(tracker.created(), 1);
    assert!(instances.iter().all(|instance| Arc::ptr_eq(instance, &instances[0])));
    assert_eq!(container.stats().factory_invocations, 1);
}

struct CycleA;
struct CycleB;
struct CycleC;

#[tokio::test]
async fn test_circular_dependency_reported_with_path() {
    init_test_logging();
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = invoked.clone();

    let container = Container::new();
    container.register(Registration::from_fn(|_: Arc<CycleB>| CycleA)).unwrap();
    container.register(Registration::from_fn(|_: Arc<CycleC>| CycleB)).unwrap();
    container
        .register(Registration::from_fn(move |_: Arc<CycleA>| {
            counter.fetch_add(1, Ordering::SeqCst);
            CycleC
        }))
        .unwrap();

    match container.resolve::<CycleA>().await {
        Err(DependencyError::CircularDependency { cycle }) => {
            assert_eq!(cycle, vec!["CycleA", "CycleB", "CycleC", "CycleA"]);
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert!(matches!(container.validate(), Err(DependencyError::CircularDependency { .. })));
}

#[tokio::test]
async fn test_self_dependency_under_singleton() {
    init_test_logging();
    let container = Container::new();
    container
        .register(Registration::from_fn(|_: Arc<CycleA>| CycleA).with_lifestyle(LifestylePolicy::Singleton))
        .unwrap();

    let result = container.resolve::<CycleA>().await;
    assert!(matches!(result, Err(DependencyError::CircularDependency { cycle }) if cycle.len() == 2));
}

struct Unrelated;
struct NeedsMissing;
struct Missing;

#[tokio::test]
async fn test_unregistered_type_constructs_nothing() {
    init_test_logging();
    let tracker = Tracker::new();
    let counter = tracker.clone();

    let container = Container::new();
    container
        .register(Registration::from_fn(move || {
            counter.create();
            Unrelated
        }))
        .unwrap();
    container
        .register(Registration::from_fn(|_: Arc<Unrelated>, _: Arc<Missing>| NeedsMissing))
        .unwrap();

    let result = container.resolve::<Missing>().await;
    assert!(matches!(
        result,
        Err(DependencyError::UnregisteredType { required_by: None, .. })
    ));

    // 缺失的依赖在第二个参数上，第一个参数也不会被构造
    match container.resolve::<NeedsMissing>().await {
        Err(DependencyError::UnregisteredType { type_name, required_by }) => {
            assert!(type_name.ends_with("Missing"));
            assert!(required_by.unwrap().ends_with("NeedsMissing"));
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    assert_eq!(tracker.created(), 0);
    assert_eq!(container.stats().failures, 2);
}

#[derive(Debug)]
struct Config;
#[derive(Debug)]
struct Connection;

#[tokio::test]
async fn test_factory_failure_is_wrapped_with_source() {
    init_test_logging();
    let container = Container::new();
    container
        .register(Registration::from_try_fn(|| -> anyhow::Result<Config> {
            anyhow::bail!("missing connection string")
        }))
        .unwrap();
    container
        .register(Registration::from_fn(|_: Arc<Config>| Connection))
        .unwrap();

    let error = container.resolve::<Connection>().await.unwrap_err();
    match &error {
        DependencyError::FactoryInvocationFailure { type_name, .. } => {
            assert!(type_name.ends_with("Config"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(error.source().unwrap().to_string(), "missing connection string");
    assert!(!error.is_registration_defect());
}

#[tokio::test]
async fn test_async_factories() {
    init_test_logging();
    let container = Container::new();
    container
        .register(Registration::from_async_fn(|| async {
            tokio::task::yield_now().await;
            Bar { serial: 42 }
        }))
        .unwrap();
    container
        .register(Registration::from_async_try_fn(|bar: Arc<Bar>| async move {
            if bar.serial == 42 {
                Ok(Foo { bar })
            } else {
                Err("wrong bar".to_string())
            }
        }))
        .unwrap();

    let foo = container.resolve::<Foo>().await.unwrap();
    assert_eq!(foo.bar.serial, 42);
}

#[tokio::test]
async fn test_duplicate_registration_policies() {
    init_test_logging();

    // 默认覆盖，后注册的生效
    let container = Container::new();
    container.register(Registration::from_fn(|| Bar { serial: 1 })).unwrap();
    container.register(Registration::from_fn(|| Bar { serial: 2 })).unwrap();
    assert_eq!(container.resolve::<Bar>().await.unwrap().serial, 2);

    let config = ContainerConfig {
        duplicate_policy: DuplicatePolicy::Reject,
        ..ContainerConfig::default()
    };
    let container = Container::with_config(config);
    assert_ok!(container.register(Registration::from_fn(|| Bar { serial: 1 })));
    let result = container.register(Registration::from_fn(|| Bar { serial: 2 }));
    assert!(matches!(result, Err(DependencyError::DuplicateRegistration { .. })));
    assert_eq!(container.resolve::<Bar>().await.unwrap().serial, 1);
}

#[tokio::test]
async fn test_overwrite_evicts_cached_singleton() {
    init_test_logging();
    let container = Container::new();
    container
        .register(Registration::from_fn(|| Bar { serial: 1 }).with_lifestyle(LifestylePolicy::Singleton))
        .unwrap();
    assert_eq!(container.resolve::<Bar>().await.unwrap().serial, 1);

    container
        .register(Registration::from_fn(|| Bar { serial: 2 }).with_lifestyle(LifestylePolicy::Singleton))
        .unwrap();
    assert_eq!(container.resolve::<Bar>().await.unwrap().serial, 2);
}

#[tokio::test]
async fn test_apply_policy_is_a_pure_transform() {
    init_test_logging();
    let original = discover::<Factories>();
    let singletons = apply_policy(&original, &LifestylePolicy::Singleton);

    assert!(original
        .iter()
        .all(|registration| matches!(registration.lifestyle(), LifestylePolicy::Transient)));
    assert!(singletons
        .iter()
        .all(|registration| matches!(registration.lifestyle(), LifestylePolicy::Singleton)));

    let container = Container::new();
    assert_eq!(container.register_all(singletons).unwrap(), 2);
    let first = container.resolve::<Foo>().await.unwrap();
    let second = container.resolve::<Foo>().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_invalid_pool_size_rejected_at_registration() {
    init_test_logging();
    let container = Container::new();
    let result = container.register(Registration::from_fn(|| Plain).with_lifestyle(LifestylePolicy::pooled(3, 1)));
    assert!(matches!(result, Err(DependencyError::InvalidLifestyle { .. })));
    assert_err!(container.register(Registration::from_fn(|| Plain).with_lifestyle(LifestylePolicy::pooled(0, 0))));
    assert!(!container.is_registered::<Plain>());
}
