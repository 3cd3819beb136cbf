use lattice_core::error::ContainerError;
use thiserror::Error;

/// AOP 错误
#[derive(Debug, Error)]
pub enum AopError {
    /// 处理器还没有拿到 BeanFactory
    #[error("{0} requires a bean factory but none has been set")]
    MissingBeanFactory(String),

    #[error("Method '{method}' is not exposed by the proxy for bean '{bean_name}'")]
    MethodNotExposed { bean_name: String, method: String },

    #[error("No method named '{method}' on class '{class_name}'")]
    NoSuchMethod { class_name: String, method: String },

    #[error("Cannot create proxy for bean '{bean_name}': {message}")]
    ProxyCreation { bean_name: String, message: String },

    #[error("Cannot find current proxy: set 'expose_proxy' on the proxy creator to make it available")]
    ProxyNotExposed,

    #[error("Class name '{0}' is not a known auto-proxy creator")]
    UnknownCreator(String),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl From<AopError> for ContainerError {
    fn from(error: AopError) -> Self {
        match error {
            AopError::Container(inner) => inner,
            other => ContainerError::Other(anyhow::Error::new(other)),
        }
    }
}

pub type AopResult<T> = std::result::Result<T, AopError>;
