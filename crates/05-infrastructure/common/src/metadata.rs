//! 元数据定义
//!
//! 提供组件类型的标识信息

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 组件类型标识
///
/// 容器注册表、生命周期缓存与依赖图都以它为键。
/// 相等性与哈希只取决于 `TypeId`，类型名称仅用于日志和错误信息。
#[derive(Debug, Clone, Copy)]
pub struct ComponentKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl ComponentKey {
    /// 从类型获取组件标识
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 类型ID
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 完整类型名称（包含模块路径）
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 获取简短的类型名称（不包含模块路径）
    pub fn short_name(&self) -> &'static str {
        // 泛型参数里也可能出现 `::`，只截取最外层路径
        let outer = self
            .type_name
            .split_once('<')
            .map_or(self.type_name, |(head, _)| head);
        let start = outer.rfind("::").map_or(0, |idx| idx + 2);
        &self.type_name[start..]
    }

    /// 是否为指定类型
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for ComponentKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentKey {}

impl Hash for ComponentKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}
