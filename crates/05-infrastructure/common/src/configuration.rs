//! 容器配置
//!
//! 支持 TOML / JSON 文本或文件加载，并可用带前缀的环境变量覆盖。

use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 重复注册处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// 后注册的覆盖先注册的
    #[default]
    Overwrite,
    /// 拒绝重复注册
    Reject,
}

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 重复注册处理策略
    pub duplicate_policy: DuplicatePolicy,
    /// 注册时即拒绝形成循环依赖的注册
    pub reject_cycles_on_register: bool,
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// 组件池等待超时时间（毫秒）
    pub pool_wait_timeout_ms: u64,
    /// 组件池等待期间的轮询间隔（毫秒）
    pub pool_poll_interval_ms: u64,
    /// 没有活动作用域时，作用域组件落到容器自带的根作用域
    pub root_scope_fallback: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Overwrite,
            reject_cycles_on_register: false,
            max_resolution_depth: 64,
            pool_wait_timeout_ms: 5000,
            pool_poll_interval_ms: 5,
            root_scope_fallback: false,
        }
    }
}

impl ContainerConfig {
    /// 从 TOML 文本加载
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            source: Box::new(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文本加载
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| ConfigError::ParseError {
            source: Box::new(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载，格式由扩展名决定
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!("加载容器配置文件: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    /// 用环境变量覆盖配置
    ///
    /// `PREFIX_POOL_WAIT_TIMEOUT_MS=100` 覆盖 `pool_wait_timeout_ms`。
    pub fn with_env_overrides(self, prefix: &str) -> ConfigResult<Self> {
        self.with_overrides(std::env::vars(), prefix)
    }

    /// 用任意键值对覆盖配置，键的规则同 [`Self::with_env_overrides`]
    pub fn with_overrides<I, K, V>(self, vars: I, prefix: &str) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let prefix = format!("{}_", prefix.to_uppercase());
        let mut value = serde_json::to_value(&self).map_err(|e| ConfigError::ParseError {
            source: Box::new(e),
        })?;

        let Value::Object(fields) = &mut value else {
            return Ok(self);
        };

        for (key, raw) in vars {
            let Some(field) = key.as_ref().strip_prefix(&prefix) else {
                continue;
            };
            let field = field.to_lowercase();
            if !fields.contains_key(&field) {
                continue;
            }

            // 数字与布尔按 JSON 解析，其余按字符串处理
            let raw = raw.as_ref();
            let parsed = serde_json::from_str::<Value>(raw)
                .unwrap_or_else(|_| Value::String(raw.to_string()));
            debug!("配置项被覆盖: {} = {}", field, parsed);
            fields.insert(field, parsed);
        }

        let config: Self = serde_json::from_value(value).map_err(|e| ConfigError::ParseError {
            source: Box::new(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_resolution_depth 必须大于 0".to_string(),
            });
        }
        if self.pool_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "pool_poll_interval_ms 必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    /// 组件池等待超时
    pub fn pool_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_wait_timeout_ms)
    }

    /// 组件池轮询间隔
    pub fn pool_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pool_poll_interval_ms)
    }
}
