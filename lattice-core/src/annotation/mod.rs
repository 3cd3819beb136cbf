//! 注解驱动的配置处理
//!
//! 配置类候选判断、配置图解析、组件扫描、导入扩展点，以及把解析结果转换为 Bean 定义。

pub mod candidate;
pub mod configuration_class;
pub mod imports;
pub mod parser;
pub mod post_processor;
pub mod problems;
pub mod reader;
pub mod scan;

pub use candidate::{check_configuration_class_candidate, configuration_kind, is_configuration_candidate, ConfigurationKind};
pub use configuration_class::{BeanMethod, ConfigurationClass, ImportedResource};
pub use imports::{ImportBeanDefinitionRegistrar, ImportSelector, ImportStack};
pub use parser::ConfigurationClassParser;
pub use post_processor::ConfigurationClassPostProcessor;
pub use problems::{Problem, ProblemKind, ProblemReporter};
pub use reader::{BeanDefinitionReader, BeanDefinitionReaders, ConfigurationClassBeanDefinitionReader, TomlBeanDefinitionReader};
pub use scan::{
    AnnotationBeanNameGenerator, BeanNameGenerator, ClassPathBeanDefinitionScanner, FullyQualifiedBeanNameGenerator,
    TypeFilter,
};
