//! 翻译示例领域的组装测试


use closure_abstractions::{discover, Blueprint, ClosureRegistration, LifestylePolicy};
use closure_container::Container;
use common::init_test_logging;
use common::translation::*;
use std::sync::Arc;

fn compose(policy: LifestylePolicy) -> anyhow::Result<Container> {
    let container = Container::builder()
        .register_instance(sample_language_api())
        .register_closure(ClosureRegistration::for_blueprint::<CommandsQueries>().lifestyle(policy))
        .validate_on_build(true)
        .build()?;
    Ok(container)
}

#[tokio::test]
async fn test_view_model_composed_from_blueprint() -> anyhow::Result<()> {
    init_test_logging();
    assert_eq!(CommandsQueries::blueprint_name(), "commands_queries");
    assert_eq!(discover::<CommandsQueries>().len(), 9);

    let container = compose(LifestylePolicy::Singleton)?;
    let refresh = container.resolve::<RefreshTranslationsCommand>().await?;
    refresh.execute().await;

    let view_model = container.resolve::<LanguageViewModel>().await?;
    view_model.start().await;
    assert_eq!(view_model.title().as_deref(), Some("Language"));
    assert_eq!(view_model.languages.lock().len(), 3);

    view_model
        .change_language
        .execute(&Language::new("de", "Deutsch"))
        .await?;
    view_model.start().await;
    assert_eq!(view_model.title().as_deref(), Some("Sprache"));

    // 单例：同一份缓存贯穿整个对象图
    let query = container.resolve::<GetTranslationQuery>().await?;
    assert_eq!(query.execute("LanguageViewModel_Title").as_deref(), Some("Sprache"));

    let error = view_model
        .change_language
        .execute(&Language::new("xx", "Unknown"))
        .await;
    assert!(error.is_err());
    Ok(())
}

#[tokio::test]
async fn test_async_factory_loads_stored_translations() -> anyhow::Result<()> {
    init_test_logging();
    let container = compose(LifestylePolicy::Singleton)?;

    let store = container.resolve::<TranslationsStore>().await?;
    let downloader = container.resolve::<TranslationsDownloader>().await?;
    store.store(downloader.download().await).await;

    // 异步工厂在构造时把存储的翻译读入缓存
    let _load = container.resolve::<LoadTranslationsCommand>().await?;
    let cache = container.resolve::<TranslationsCache>().await?;
    assert_eq!(cache.get("LanguageViewModel_Title").as_deref(), Some("Language"));
    Ok(())
}

#[tokio::test]
async fn test_request_scoped_queries() -> anyhow::Result<()> {
    init_test_logging();
    let container = Container::new();
    container.register_instance(sample_language_api())?;
    container.register_closure(ClosureRegistration::for_blueprint::<CommandsQueries>().lifestyle_per_logical_request())?;

    let first = container.enter_request_scope();
    let second = container.enter_request_scope();

    let a = first.resolve::<LanguageViewModel>().await?;
    let b = first.resolve::<LanguageViewModel>().await?;
    let c = second.resolve::<LanguageViewModel>().await?;
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));

    // 语言服务是注册的实例，所有请求共享
    let api_a = first.resolve::<LanguageServiceApi>().await?;
    let api_c = second.resolve::<LanguageServiceApi>().await?;
    assert!(Arc::ptr_eq(&api_a, &api_c));
    Ok(())
}

#[tokio::test]
async fn test_transient_composition_builds_separate_graphs() -> anyhow::Result<()> {
    init_test_logging();
    let container = compose(LifestylePolicy::Transient)?;

    let first = container.resolve::<LanguageViewModel>().await?;
    let second = container.resolve::<LanguageViewModel>().await?;
    assert!(!Arc::ptr_eq(&first, &second));

    let stats = container.stats();
    assert_eq!(stats.registered_components, 10);
    assert_eq!(stats.resolutions, 2);
    Ok(())
}
