//! #[blueprint] 宏集成测试

use closure_abstractions::{discover, Blueprint, ClosureRegistration, ComponentKey, LifestylePolicy};
use closure_container::Container;
use closure_macros::blueprint;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct Bar {
    pub serial: usize,
}

#[derive(Debug)]
pub struct Foo {
    pub bar: Arc<Bar>,
}

#[derive(Debug)]
pub struct Baz {
    pub foo: Arc<Foo>,
}

#[derive(Debug)]
pub struct Settings {
    pub retries: u32,
}

static SERIAL: AtomicUsize = AtomicUsize::new(0);

pub struct Factories;

#[blueprint]
impl Factories {
    pub fn make_foo(bar: Arc<Bar>) -> Foo {
        Foo { bar }
    }

    pub fn make_bar() -> Bar {
        Bar {
            serial: SERIAL.fetch_add(1, Ordering::SeqCst),
        }
    }

    pub async fn make_baz(foo: Arc<Foo>) -> Baz {
        tokio::task::yield_now().await;
        Baz { foo }
    }

    pub fn make_settings() -> Result<Settings, String> {
        Ok(Settings { retries: 3 })
    }

    /// 不是工厂形状：参数不是 Arc
    pub fn describe(foo: &Foo) -> String {
        format!("foo with bar {}", foo.bar.serial)
    }

    /// 不能跨线程共享的返回类型不收集
    pub fn local_bar() -> Rc<Bar> {
        Rc::new(Bar { serial: 7 })
    }

    #[closure(skip)]
    pub fn spare_bar() -> Bar {
        Bar { serial: usize::MAX }
    }

    fn hidden() -> Bar {
        Bar { serial: 0 }
    }
}

#[test]
fn test_harvested_factories() {
    let registrations = discover::<Factories>();
    let components: Vec<ComponentKey> = registrations.iter().map(|registration| registration.component()).collect();

    assert_eq!(registrations.len(), 4);
    assert!(components.contains(&ComponentKey::of::<Foo>()));
    assert!(components.contains(&ComponentKey::of::<Bar>()));
    assert!(components.contains(&ComponentKey::of::<Baz>()));
    assert!(components.contains(&ComponentKey::of::<Settings>()));

    let foo = registrations
        .iter()
        .find(|registration| registration.component().is::<Foo>())
        .unwrap();
    assert_eq!(foo.dependencies(), &[ComponentKey::of::<Bar>()]);
    assert!(matches!(foo.lifestyle(), LifestylePolicy::Transient));

    // 原有的函数保留
    assert_eq!(Factories::hidden().serial, 0);
    assert_eq!(Factories::spare_bar().serial, usize::MAX);
    assert_eq!(Factories::local_bar().serial, 7);
}

#[tokio::test]
async fn test_discovery_round_trip() {
    let container = Container::new();
    container
        .register_closure(ClosureRegistration::for_blueprint::<Factories>().lifestyle_singleton())
        .unwrap();

    let foo = container.resolve::<Foo>().await.unwrap();
    let bar = container.resolve::<Bar>().await.unwrap();
    assert!(Arc::ptr_eq(&foo.bar, &bar));

    let baz = container.resolve::<Baz>().await.unwrap();
    assert!(Arc::ptr_eq(&baz.foo, &foo));
    assert_eq!(container.resolve::<Settings>().await.unwrap().retries, 3);
    assert!(Factories::describe(&foo).starts_with("foo with bar"));
}

pub struct Session {
    pub id: usize,
}

pub struct Handler {
    pub session: Arc<Session>,
}

pub struct ScopedFactories;

#[blueprint(scoped, name = "scoped_factories")]
impl ScopedFactories {
    pub fn session() -> Session {
        Session {
            id: SERIAL.fetch_add(1, Ordering::SeqCst),
        }
    }

    #[closure(transient)]
    pub fn handler(session: Arc<Session>) -> Handler {
        Handler { session }
    }
}

#[tokio::test]
async fn test_blueprint_lifestyles() {
    assert_eq!(ScopedFactories::blueprint_name(), "scoped_factories");

    let container = Container::new();
    assert_eq!(container.register_blueprint::<ScopedFactories>().unwrap(), 2);

    let scope = container.enter_scope();
    let first = scope.resolve::<Handler>().await.unwrap();
    let second = scope.resolve::<Handler>().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.session, &second.session));

    let other = container.enter_scope();
    let third = other.resolve::<Handler>().await.unwrap();
    assert_ne!(first.session.id, third.session.id);
}
