//! 工厂收集宏实现

use crate::utils::{arc_inner_type, extract_generic_type, is_component_type, is_result_type, is_thread_bound_type};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote, quote_spanned};
use syn::{
    parse::Parse, parse::ParseStream, punctuated::Punctuated, spanned::Spanned, Expr, FnArg, Ident,
    ImplItem, ImplItemFn, Item, ItemImpl, Lit, Meta, Path, Result, ReturnType, Token, Type, Visibility,
};

const CLOSURE_ATTR: &str = "closure";

/// 宏参数中可用的生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifestyle {
    #[default]
    Transient,
    Singleton,
    PerThread,
    Pooled,
    Scoped,
    PerLogicalRequest,
}

impl Lifestyle {
    fn from_path(path: &Path) -> Option<Self> {
        let ident = path.get_ident()?;
        let lifestyle = match ident.to_string().as_str() {
            "transient" => Self::Transient,
            "singleton" => Self::Singleton,
            "per_thread" => Self::PerThread,
            "pooled" => Self::Pooled,
            "scoped" => Self::Scoped,
            "per_logical_request" => Self::PerLogicalRequest,
            _ => return None,
        };
        Some(lifestyle)
    }

    fn tokens(&self, krate: &Path) -> TokenStream2 {
        match self {
            Self::Transient => quote! { #krate::LifestylePolicy::Transient },
            Self::Singleton => quote! { #krate::LifestylePolicy::Singleton },
            Self::PerThread => quote! { #krate::LifestylePolicy::PerThread },
            Self::Pooled => quote! { #krate::LifestylePolicy::Pooled(::core::default::Default::default()) },
            Self::Scoped => quote! { #krate::LifestylePolicy::scoped() },
            Self::PerLogicalRequest => quote! { #krate::LifestylePolicy::PerLogicalRequest },
        }
    }
}

/// `#[blueprint(...)]` 的参数
#[derive(Debug, Clone)]
pub struct BlueprintArgs {
    pub lifestyle: Lifestyle,
    pub name: Option<String>,
    pub crate_path: Path,
}

impl Default for BlueprintArgs {
    fn default() -> Self {
        Self {
            lifestyle: Lifestyle::default(),
            name: None,
            crate_path: syn::parse_quote!(::closure_abstractions),
        }
    }
}

fn lit_str(expr: &Expr) -> Result<String> {
    match expr {
        Expr::Lit(expr_lit) => match &expr_lit.lit {
            Lit::Str(lit_str) => Ok(lit_str.value()),
            other => Err(syn::Error::new(other.span(), "expected a string literal")),
        },
        other => Err(syn::Error::new(other.span(), "expected a string literal")),
    }
}

impl Parse for BlueprintArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut args = BlueprintArgs::default();

        let parsed = Punctuated::<Meta, Token![,]>::parse_terminated(input)?;

        for meta in parsed {
            match meta {
                Meta::Path(path) => match Lifestyle::from_path(&path) {
                    Some(lifestyle) => args.lifestyle = lifestyle,
                    None => return Err(syn::Error::new(path.span(), "unknown blueprint lifestyle")),
                },
                Meta::NameValue(nv) if nv.path.is_ident("name") => {
                    args.name = Some(lit_str(&nv.value)?);
                }
                Meta::NameValue(nv) if nv.path.is_ident("crate_path") => {
                    let value = lit_str(&nv.value)?;
                    args.crate_path = syn::parse_str(&value)
                        .map_err(|e| syn::Error::new(nv.value.span(), format!("invalid crate_path: {}", e)))?;
                }
                other => return Err(syn::Error::new(other.span(), "unknown blueprint argument")),
            }
        }

        Ok(args)
    }
}

/// 单个函数上 `#[closure(...)]` 的选项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactoryOptions {
    pub skip: bool,
    pub fallible: bool,
    pub lifestyle: Option<Lifestyle>,
    pub explicit: bool,
}

impl FactoryOptions {
    /// 读取并移除函数上的 `#[closure(...)]` 属性
    fn take(method: &mut ImplItemFn) -> Result<Self> {
        let mut options = FactoryOptions::default();
        let mut error: Option<syn::Error> = None;

        method.attrs.retain(|attr| {
            if !attr.path().is_ident(CLOSURE_ATTR) {
                return true;
            }
            options.explicit = true;
            let parsed = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    options.skip = true;
                } else if meta.path.is_ident("fallible") {
                    options.fallible = true;
                } else if let Some(lifestyle) = Lifestyle::from_path(&meta.path) {
                    options.lifestyle = Some(lifestyle);
                } else {
                    return Err(meta.error("unknown closure option"));
                }
                Ok(())
            });
            if let Err(e) = parsed {
                match error.as_mut() {
                    Some(existing) => existing.combine(e),
                    None => error = Some(e),
                }
            }
            false
        });

        match error {
            Some(e) => Err(e),
            None => Ok(options),
        }
    }
}

/// 被收集的工厂函数
struct Factory {
    ident: Ident,
    constructor: Ident,
    component: Type,
    lifestyle: Lifestyle,
}

/// 判断函数是否为工厂形状，不是则返回原因
fn factory_shape(method: &ImplItemFn, fallible: bool) -> std::result::Result<(Ident, Type), &'static str> {
    let sig = &method.sig;

    if !matches!(method.vis, Visibility::Public(_)) {
        return Err("factory functions must be `pub`");
    }
    if !sig.generics.params.is_empty() {
        return Err("factory functions cannot be generic");
    }
    if sig.unsafety.is_some() || sig.abi.is_some() || sig.variadic.is_some() {
        return Err("factory functions cannot be `unsafe` or `extern`");
    }

    for input in &sig.inputs {
        match input {
            FnArg::Receiver(_) => return Err("factory functions cannot take `self`"),
            FnArg::Typed(pat_type) => {
                if arc_inner_type(&pat_type.ty).is_none() {
                    return Err("factory parameters must be `Arc<T>`");
                }
            }
        }
    }

    let ReturnType::Type(_, output) = &sig.output else {
        return Err("factory functions must return a component");
    };
    let fallible = fallible || is_result_type(output);
    let component = if fallible {
        extract_generic_type(output).ok_or("fallible factories must return `Result<T, E>`")?
    } else {
        output.as_ref()
    };
    if !is_component_type(component) {
        return Err("factory functions must return a component");
    }
    if is_thread_bound_type(component) {
        return Err("factory components must be `Send + Sync`; `Rc`, `Cell`, `RefCell` and raw pointers are not");
    }

    let constructor = match (sig.asyncness.is_some(), fallible) {
        (false, false) => "from_fn",
        (false, true) => "from_try_fn",
        (true, false) => "from_async_fn",
        (true, true) => "from_async_try_fn",
    };
    Ok((format_ident!("{}", constructor), component.clone()))
}

fn harvest(item: &mut ItemImpl, default_lifestyle: Lifestyle) -> Result<Vec<Factory>> {
    let mut factories = Vec::new();

    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };

        let options = FactoryOptions::take(method)?;
        if options.skip {
            continue;
        }

        match factory_shape(method, options.fallible) {
            Ok((constructor, component)) => factories.push(Factory {
                ident: method.sig.ident.clone(),
                constructor,
                component,
                lifestyle: options.lifestyle.unwrap_or(default_lifestyle),
            }),
            // 显式标注过的函数必须能被收集
            Err(reason) if options.explicit => {
                return Err(syn::Error::new(method.sig.span(), reason));
            }
            Err(_) => {}
        }
    }

    Ok(factories)
}

/// 展开 `#[blueprint]`
pub fn expand(args: BlueprintArgs, mut item: ItemImpl) -> Result<TokenStream2> {
    if let Some((_, trait_path, _)) = &item.trait_ {
        return Err(syn::Error::new(
            trait_path.span(),
            "#[blueprint] must be placed on an inherent impl block",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new(
            item.generics.span(),
            "#[blueprint] does not support generic impl blocks",
        ));
    }

    let factories = harvest(&mut item, args.lifestyle)?;
    let krate = &args.crate_path;
    let self_ty = &item.self_ty;

    let registrations = factories.iter().map(|factory| {
        let Factory {
            ident,
            constructor,
            lifestyle,
            ..
        } = factory;
        let lifestyle = lifestyle.tokens(krate);
        quote! {
            #krate::Registration::#constructor(<#self_ty>::#ident).with_lifestyle(#lifestyle)
        }
    });

    // 组件类型不满足 Send + Sync 时，错误指向对应函数的返回类型
    let assertions = (!factories.is_empty()).then(|| {
        let checks = factories.iter().map(|factory| {
            let component = &factory.component;
            quote_spanned! {component.span()=>
                __assert_component::<#component>();
            }
        });
        quote! {
            fn __assert_component<T: ::core::marker::Send + ::core::marker::Sync + 'static>() {}
            #(#checks)*
        }
    });

    let name_fn = args.name.as_ref().map(|name| {
        quote! {
            fn blueprint_name() -> &'static str {
                #name
            }
        }
    });

    Ok(quote! {
        #item

        impl #krate::Blueprint for #self_ty {
            #name_fn

            fn factories() -> ::std::vec::Vec<#krate::Registration> {
                #assertions
                ::std::vec![#(#registrations),*]
            }
        }
    })
}

/// 实现 #[blueprint] 宏
pub fn blueprint_impl(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = if args.is_empty() {
        BlueprintArgs::default()
    } else {
        match syn::parse::<BlueprintArgs>(args) {
            Ok(args) => args,
            Err(e) => return e.to_compile_error().into(),
        }
    };

    let item = match syn::parse::<Item>(input) {
        Ok(Item::Impl(item)) => item,
        Ok(other) => {
            return syn::Error::new(other.span(), "#[blueprint] can only be applied to impl blocks")
                .to_compile_error()
                .into();
        }
        Err(e) => return e.to_compile_error().into(),
    };

    match expand(args, item) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(e) => e.to_compile_error().into(),
    }
}
