//! 依赖图与循环依赖检测

use crate::registration::Registration;
use closure_common::{ComponentKey, DependencyError, DependencyResult};
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};

/// 依赖图节点
#[derive(Debug, Clone)]
pub struct DependencyGraphNode {
    /// 组件类型
    pub component: ComponentKey,
    /// 工厂名称
    pub name: String,
    /// 依赖类型，按参数顺序
    pub dependencies: Vec<ComponentKey>,
}

/// 依赖图
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<ComponentKey, DependencyGraphNode>,
}

impl DependencyGraph {
    /// 创建空依赖图
    pub fn new() -> Self {
        Self::default()
    }

    /// 由注册集合构建依赖图
    pub fn from_registrations<I, R>(registrations: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Borrow<Registration>,
    {
        let mut graph = Self::new();
        for registration in registrations {
            graph.insert(registration.borrow());
        }
        graph
    }

    /// 加入或替换一个节点
    pub fn insert(&mut self, registration: &Registration) {
        let component = registration.component();
        self.nodes.insert(
            component,
            DependencyGraphNode {
                component,
                name: registration.name().to_string(),
                dependencies: registration.dependencies().to_vec(),
            },
        );
    }

    /// 获取节点
    pub fn get(&self, key: &ComponentKey) -> Option<&DependencyGraphNode> {
        self.nodes.get(key)
    }

    /// 是否包含该组件
    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// 节点数量
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 按类型名排序的全部组件
    pub fn components(&self) -> Vec<ComponentKey> {
        let mut components: Vec<_> = self.nodes.keys().copied().collect();
        components.sort_by_key(|key| key.type_name());
        components
    }
}

/// 循环依赖检测器
pub trait CircularDependencyDetector: Send + Sync {
    /// 检查整个依赖图
    fn detect_circular_dependencies(&self, graph: &DependencyGraph) -> DependencyResult<()>;

    /// 检查从 `root` 出发可达的部分：缺失的依赖和循环
    fn check_component(&self, graph: &DependencyGraph, root: &ComponentKey) -> DependencyResult<()>;

    /// 只检查从 `root` 出发的循环，缺失的依赖视为叶子
    fn detect_cycle_from(&self, graph: &DependencyGraph, root: &ComponentKey) -> DependencyResult<()>;
}

/// 默认循环依赖检测器
///
/// 深度优先遍历，依赖按参数顺序访问，因此报告的第一个错误与实际解析时遇到的一致。
#[derive(Debug, Default)]
pub struct DefaultCircularDependencyDetector;

impl CircularDependencyDetector for DefaultCircularDependencyDetector {
    fn detect_circular_dependencies(&self, graph: &DependencyGraph) -> DependencyResult<()> {
        let mut visited = HashSet::new();
        for component in graph.components() {
            if !visited.contains(&component) {
                let mut path = Vec::new();
                self.dfs_check(component, None, graph, true, &mut visited, &mut path)?;
            }
        }
        Ok(())
    }

    fn check_component(&self, graph: &DependencyGraph, root: &ComponentKey) -> DependencyResult<()> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        self.dfs_check(*root, None, graph, true, &mut visited, &mut path)
    }

    fn detect_cycle_from(&self, graph: &DependencyGraph, root: &ComponentKey) -> DependencyResult<()> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        self.dfs_check(*root, None, graph, false, &mut visited, &mut path)
    }
}

impl DefaultCircularDependencyDetector {
    fn dfs_check(
        &self,
        current: ComponentKey,
        required_by: Option<&ComponentKey>,
        graph: &DependencyGraph,
        strict: bool,
        visited: &mut HashSet<ComponentKey>,
        path: &mut Vec<ComponentKey>,
    ) -> DependencyResult<()> {
        if let Some(start) = path.iter().position(|key| *key == current) {
            let cycle = path[start..]
                .iter()
                .chain(std::iter::once(&current))
                .map(|key| key.short_name().to_string())
                .collect();
            return Err(DependencyError::CircularDependency { cycle });
        }

        if visited.contains(&current) {
            return Ok(());
        }

        let Some(node) = graph.get(&current) else {
            if !strict {
                return Ok(());
            }
            return Err(DependencyError::UnregisteredType {
                type_name: current.type_name().to_string(),
                required_by: required_by.map(|key| key.type_name().to_string()),
            });
        };

        path.push(current);
        for dependency in &node.dependencies {
            self.dfs_check(*dependency, Some(&current), graph, strict, visited, path)?;
        }
        path.pop();
        visited.insert(current);

        Ok(())
    }
}
