use lattice_aop::AopError;
use lattice_core::error::ContainerError;
use thiserror::Error;

/// 缓存错误
///
/// 都属于使用或配置错误，调用方不应重试
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cannot find cache named '{cache_name}' for {operation}")]
    CacheNotFound { cache_name: String, operation: String },

    #[error("No cache names configured for {operation}: declare them on the operation or with CacheConfig")]
    NoCacheNames { operation: String },

    /// key 表达式求值为 null
    #[error("Null key returned for cache operation {operation} (maybe a parameter is missing?)")]
    NullKey { operation: String },

    #[error("Invalid cache expression '{expression}': {message}")]
    Expression { expression: String, message: String },

    /// 值的类型没有登记为缓存键
    #[error("{origin} of type '{type_name}' cannot be used as a cache key")]
    UnsupportedKey { origin: String, type_name: String },

    #[error(transparent)]
    Aop(#[from] AopError),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl CacheError {
    pub fn expression(expression: &str, message: impl Into<String>) -> Self {
        CacheError::Expression {
            expression: expression.to_string(),
            message: message.into(),
        }
    }
}

impl From<CacheError> for ContainerError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Container(inner) => inner,
            CacheError::Aop(inner) => inner.into(),
            other => ContainerError::Other(anyhow::Error::new(other)),
        }
    }
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
