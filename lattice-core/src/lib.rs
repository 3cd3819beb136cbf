// lattice-core: 注解驱动的依赖注入容器
//
// 提供：
// - Bean 定义注册表和 BeanFactory（单例/原型作用域、别名、父定义合并）
// - 配置类解析（Bean 方法、导入、组件扫描、配置源）
// - 字段/方法/构造函数注入
// - Environment、profile 和占位符解析

pub mod annotation;
pub mod app;
pub mod bean;
pub mod bean_factory;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod injection;
pub mod lifecycle;
pub mod logging;
pub mod mapping;
pub mod metadata;
pub mod registry;
pub mod resource;
pub mod scope;
pub mod utils;

// 重新导出常用类型
pub use app::LatticeApplication;
pub use bean::{AutowireMode, BeanDefinition, BeanObject, BeanOrigin, BeanRef, FactoryBean, Role};
pub use bean_factory::DefaultListableBeanFactory;
pub use config::{
    ConfigValue, ContainerSettings, Environment, EnvironmentPropertySource, MapPropertySource, PropertyResolver,
    PropertySource, TomlPropertySource,
};
pub use constants::*;
pub use context::{ApplicationContext, ShutdownHook};
pub use error::{ApplicationError, ApplicationResult, ContainerError, ContainerResult, Result};
pub use lifecycle::{BeanFactoryPostProcessor, BeanPostProcessor, PostProcessorRegistration};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use mapping::{HandlerMethod, MappingRegistry};
pub use metadata::{
    arg, opt_arg, Annotated, Annotation, ClassIndex, ClassMetadata, ClassRegistration, ConstructorMetadata,
    FieldMetadata, MetadataReader, MethodMetadata, ParameterMetadata,
};
pub use registry::BeanDefinitionRegistry;
pub use resource::{FileSystemResourceLoader, ResourceLoader, StaticResourceLoader};
pub use scope::{Scope, ScopedProxyMode};

// 供 ClassRegistration / PostProcessorRegistration 提交使用
pub use inventory;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::annotation::{ImportBeanDefinitionRegistrar, ImportSelector};
    pub use crate::app::LatticeApplication;
    pub use crate::bean::{BeanDefinition, BeanObject, BeanRef, FactoryBean};
    pub use crate::bean_factory::DefaultListableBeanFactory;
    pub use crate::config::{Environment, MapPropertySource, PropertyResolver, PropertySource, TomlPropertySource};
    pub use crate::context::ApplicationContext;
    pub use crate::error::{ContainerError, ContainerResult};
    pub use crate::lifecycle::{BeanFactoryPostProcessor, BeanPostProcessor};
    pub use crate::logging::LoggingConfig;
    pub use crate::metadata::{
        arg, opt_arg, Annotation, BeanAttributes, ClassIndex, ClassMetadata, ConstructorMetadata, FieldMetadata,
        MetadataReader, MethodMetadata, ParameterMetadata,
    };
    pub use crate::registry::BeanDefinitionRegistry;
    pub use crate::scope::Scope;
    pub use anyhow::{anyhow, Context};
}
