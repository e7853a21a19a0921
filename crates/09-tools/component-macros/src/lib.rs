//! # Closure Macros
//!
//! 这个 crate 提供在编译期收集工厂函数的过程宏。
//!
//! ## 核心宏
//!
//! - [`blueprint`] - 把 impl 块上工厂形状的关联函数收集为 `Blueprint` 实现
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use closure_macros::blueprint;
//! use std::sync::Arc;
//!
//! pub struct Factories;
//!
//! #[blueprint(singleton)]
//! impl Factories {
//!     pub fn make_bar() -> Bar {
//!         Bar::default()
//!     }
//!
//!     pub fn make_foo(bar: Arc<Bar>) -> Foo {
//!         Foo { bar }
//!     }
//! }
//! ```

use proc_macro::TokenStream;

mod blueprint;
mod utils;

// Re-exports are not allowed in proc-macro crates

/// 工厂收集宏
///
/// 标注在固有 impl 块上，为 Self 类型实现 `Blueprint`。满足以下条件的关联函数被收集为工厂：
///
/// - `pub` 且没有 `self` 接收者
/// - 没有泛型参数
/// - 有返回值且不是 `()`
/// - 每个参数的类型都是 `Arc<T>`
/// - 组件类型满足 `Send + Sync + 'static`
///
/// 返回 `Rc`、`Cell`、`RefCell` 或裸指针的函数不被收集；其他不满足 `Send + Sync` 的组件类型
/// 在该函数的返回类型处报编译错误。
///
/// 其余函数原样保留、不做收集。返回 `Result` 的函数使用可失败的适配，`async fn` 使用异步适配。
///
/// # 参数
///
/// - `transient`（默认）/ `singleton` / `per_thread` / `scoped` / `per_logical_request` - 整批工厂的初始生命周期
/// - `name = "..."` - 蓝图名称，默认为类型名
/// - `crate_path = "..."` - 抽象层 crate 的路径，默认为 `::closure_abstractions`
///
/// 单个函数可以用 `#[closure(...)]` 调整：`skip` 不收集，`fallible` 按可失败处理
/// （返回类型是 `Result` 的别名时使用），生命周期参数覆盖整批的设置。
///
/// # 示例
///
/// ```rust,ignore
/// #[blueprint(scoped, name = "queries")]
/// impl Queries {
///     pub fn languages(store: Arc<LanguageStore>) -> GetLanguages { .. }
///
///     #[closure(singleton)]
///     pub fn store() -> LanguageStore { .. }
///
///     #[closure(skip)]
///     pub fn helper() -> u32 { 0 }
/// }
/// ```
#[proc_macro_attribute]
pub fn blueprint(args: TokenStream, input: TokenStream) -> TokenStream {
    blueprint::blueprint_impl(args, input)
}
