//! 工厂函数发现约定
//!
//! 蓝图类型本身从不实例化，只是一组工厂函数的载体。
//! `#[blueprint]` 属性宏在编译期收集这些函数，也可以手工实现 [`Blueprint`]。

use crate::registration::Registration;
use std::collections::HashMap;
use tracing::debug;

/// 蓝图 trait
///
/// 列出蓝图上所有工厂形状的函数，每个函数对应一个注册。
pub trait Blueprint {
    /// 蓝图名称
    fn blueprint_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// 蓝图上的工厂注册
    fn factories() -> Vec<Registration>;
}

/// 发现蓝图上的工厂
///
/// 纯函数，没有副作用。组件类型是发现的主键，同一类型出现多次时保留最后一个，
/// 位置沿用该类型第一次出现的位置。
pub fn discover<B: Blueprint + ?Sized>() -> Vec<Registration> {
    let mut discovered: Vec<Registration> = Vec::new();
    let mut positions = HashMap::new();

    for registration in B::factories() {
        let component = registration.component();
        match positions.get(&component) {
            Some(&index) => {
                debug!("蓝图 {} 中 {} 的工厂被后声明者覆盖", B::blueprint_name(), component);
                discovered[index] = registration;
            }
            None => {
                positions.insert(component, discovered.len());
                discovered.push(registration);
            }
        }
    }

    debug!("从蓝图 {} 发现 {} 个工厂", B::blueprint_name(), discovered.len());
    discovered
}
