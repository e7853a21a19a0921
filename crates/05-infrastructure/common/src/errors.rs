//! 错误类型定义

use thiserror::Error;

/// 可跨线程传递的通用错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件读取失败: {source}")]
    FileReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("配置解析失败: {source}")]
    ParseError { source: BoxError },

    #[error("不支持的配置文件格式: {path}")]
    UnsupportedFormat { path: String },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

/// 依赖注入错误类型
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("组件未注册: {type_name}{}", required_by_suffix(.required_by))]
    UnregisteredType {
        type_name: String,
        required_by: Option<String>,
    },

    #[error("检测到循环依赖: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("组件重复注册: {type_name}")]
    DuplicateRegistration { type_name: String },

    #[error("组件池已耗尽: {type_name}, 上限 {max}, 已等待 {waited_ms}ms")]
    PoolExhausted {
        type_name: String,
        max: usize,
        waited_ms: u64,
    },

    #[error("组件工厂调用失败: {type_name}, 原因: {source}")]
    FactoryInvocationFailure {
        type_name: String,
        #[source]
        source: BoxError,
    },

    #[error("没有可用的作用域: {type_name} 需要 {required}")]
    ScopeUnavailable { type_name: String, required: String },

    #[error("作用域已关闭: {scope}")]
    ScopeClosed { scope: String },

    #[error("找不到可绑定的上级组件: {type_name}, 绑定目标 {ancestor}")]
    AncestorNotFound { type_name: String, ancestor: String },

    #[error("生命周期策略无效: {type_name}, 原因: {message}")]
    InvalidLifestyle { type_name: String, message: String },

    #[error("类型转换失败: 期望 {expected}")]
    TypeMismatch { expected: String },

    #[error("超过最大解析深度 {max_depth}: {type_name}")]
    ResolutionDepthExceeded { type_name: String, max_depth: usize },

    #[error("容器已关闭")]
    ContainerShutDown,
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    required_by
        .as_ref()
        .map(|parent| format!(" (被 {parent} 依赖)"))
        .unwrap_or_default()
}

impl DependencyError {
    /// 创建未注册错误
    pub fn unregistered(type_name: impl Into<String>) -> Self {
        Self::UnregisteredType {
            type_name: type_name.into(),
            required_by: None,
        }
    }

    /// 创建工厂调用失败错误
    pub fn factory_failure(type_name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::FactoryInvocationFailure {
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// 是否为设计缺陷类错误（重试没有意义）
    pub fn is_registration_defect(&self) -> bool {
        matches!(
            self,
            Self::UnregisteredType { .. }
                | Self::CircularDependency { .. }
                | Self::DuplicateRegistration { .. }
                | Self::InvalidLifestyle { .. }
        )
    }
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("依赖注入错误: {source}")]
    DependencyError {
        #[from]
        source: DependencyError,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DependencyResult<T> = Result<T, DependencyError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;
