//! 容器错误类型
//!
//! 配置期错误（定义错误）与解析期错误（创建错误）分开建模，
//! "没有匹配"之类的正常情况使用 `Option` 表达，不走错误通道。

use thiserror::Error;

use crate::annotation::problems::Problem;

pub use anyhow::Result;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("No bean named '{0}' available")]
    BeanNotFound(String),

    #[error("No qualifying bean of type '{type_name}' available for {member}")]
    NoSuchBeanOfType { type_name: String, member: String },

    #[error(
        "No qualifying bean of type '{type_name}' available: expected single matching bean but found {}: {}",
        candidates.len(),
        candidates.join(", ")
    )]
    NoUniqueBean {
        type_name: String,
        candidates: Vec<String>,
    },

    #[error("Error creating bean with name '{bean_name}': unsatisfied dependency expressed through {member}: {source}")]
    UnsatisfiedDependency {
        bean_name: String,
        member: String,
        #[source]
        source: Box<ContainerError>,
    },

    #[error("Error creating bean with name '{bean_name}': {message}")]
    BeanCreation { bean_name: String, message: String },

    #[error("Error creating bean with name '{bean_name}': {source}")]
    BeanCreationFailed {
        bean_name: String,
        #[source]
        source: Box<ContainerError>,
    },

    #[error("Invalid constructor declaration on bean '{bean_name}' of [{class_name}]: {message}")]
    InvalidConstructorDeclaration {
        bean_name: String,
        class_name: String,
        message: String,
    },

    #[error("Bean named '{name}' is expected to be of type '{required}'")]
    BeanNotOfRequiredType { name: String, required: String },

    #[error("Requested bean is currently in creation: circular reference {0}")]
    CircularDependency(String),

    #[error("Cannot register bean definition for bean '{name}': there is already {existing} bound")]
    BeanDefinitionOverride { name: String, existing: String },

    #[error("Invalid bean definition: {0}")]
    BeanDefinitionStore(String),

    #[error("Class '{class_name}' imported by '{importing_class}' is not a valid configuration class: {reason}")]
    InvalidConfigurationImport {
        class_name: String,
        importing_class: String,
        reason: String,
    },

    #[error("Configuration problems detected:\n{}", format_problems(.0))]
    Configuration(Vec<Problem>),

    #[error("Ambiguous mapping for '{key}': cannot map {new}, there is already {existing} mapped")]
    AmbiguousMapping {
        key: String,
        existing: String,
        new: String,
    },

    #[error("Could not resolve placeholder '{placeholder}' in value \"{value}\"")]
    PlaceholderResolution { placeholder: String, value: String },

    #[error("Failed to load resource '{location}': {message}")]
    ResourceLoading { location: String, message: String },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ContainerError {
    /// 用户回调（构造函数、工厂方法、初始化方法）失败时的包装
    pub fn callback(bean_name: &str, err: anyhow::Error) -> Self {
        ContainerError::BeanCreation {
            bean_name: bean_name.to_string(),
            message: format!("{:#}", err),
        }
    }

    /// 依赖无法满足（没有候选或候选不唯一）
    pub fn is_unsatisfied(&self) -> bool {
        matches!(
            self,
            ContainerError::NoSuchBeanOfType { .. } | ContainerError::NoUniqueBean { .. }
        )
    }

    /// 沿包装链找到最初的错误
    pub fn root_cause(&self) -> &ContainerError {
        match self {
            ContainerError::UnsatisfiedDependency { source, .. }
            | ContainerError::BeanCreationFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

fn format_problems(problems: &[Problem]) -> String {
    problems
        .iter()
        .map(|p| format!("  - {}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 应用启动错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoadFailed(String),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;
