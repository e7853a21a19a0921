//! 宏工具函数

use syn::{GenericArgument, PathArguments, Type};

/// 从类型中提取第一个泛型参数
pub fn extract_generic_type(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => match args.args.first() {
            Some(GenericArgument::Type(inner_type)) => Some(inner_type),
            _ => None,
        },
        _ => None,
    }
}

fn last_segment_is(ty: &Type, name: &str) -> bool {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map_or(false, |segment| segment.ident == name),
        Type::Group(group) => last_segment_is(&group.elem, name),
        Type::Paren(paren) => last_segment_is(&paren.elem, name),
        _ => false,
    }
}

/// 检查类型是否为 Arc<T>，返回 T
///
/// `Arc<dyn Trait>` 这类不定长的目标类型不算依赖。
pub fn arc_inner_type(ty: &Type) -> Option<&Type> {
    if !last_segment_is(ty, "Arc") {
        return None;
    }
    match extract_generic_type(ty)? {
        Type::TraitObject(_) | Type::Slice(_) | Type::ImplTrait(_) => None,
        Type::Path(path) if path.path.is_ident("str") => None,
        inner => Some(inner),
    }
}

/// 检查类型是否为 Result<T, E>
pub fn is_result_type(ty: &Type) -> bool {
    last_segment_is(ty, "Result")
}

/// 检查类型是否为 ()
pub fn is_unit_type(ty: &Type) -> bool {
    match ty {
        Type::Tuple(tuple) => tuple.elems.is_empty(),
        Type::Paren(paren) => is_unit_type(&paren.elem),
        _ => false,
    }
}

/// 检查返回类型能否作为组件类型
pub fn is_component_type(ty: &Type) -> bool {
    !is_unit_type(ty) && !matches!(ty, Type::ImplTrait(_) | Type::Never(_) | Type::Infer(_))
}

/// 检查类型是否明显不能在线程间共享
///
/// 只做语法判断：`Rc`、`Cell`、`RefCell`、`UnsafeCell` 与裸指针，包括出现在泛型参数、
/// 元组和数组中的情况。
pub fn is_thread_bound_type(ty: &Type) -> bool {
    match ty {
        Type::Ptr(_) => true,
        Type::Path(type_path) => type_path.path.segments.iter().any(|segment| {
            let thread_bound = ["Rc", "Cell", "RefCell", "UnsafeCell"]
                .iter()
                .any(|name| segment.ident == name);
            thread_bound
                || match &segment.arguments {
                    PathArguments::AngleBracketed(args) => args.args.iter().any(|arg| {
                        matches!(arg, GenericArgument::Type(inner) if is_thread_bound_type(inner))
                    }),
                    _ => false,
                }
        }),
        Type::Reference(reference) => is_thread_bound_type(&reference.elem),
        Type::Tuple(tuple) => tuple.elems.iter().any(is_thread_bound_type),
        Type::Array(array) => is_thread_bound_type(&array.elem),
        Type::Group(group) => is_thread_bound_type(&group.elem),
        Type::Paren(paren) => is_thread_bound_type(&paren.elem),
        _ => false,
    }
}
