//! 依赖注入引擎
//!
//! - [`descriptor`]：依赖描述符与解析器接口
//! - [`metadata`]：每个类的注入点及其解析缓存
//! - [`autowired`]：处理注入标记的后置处理器

pub mod autowired;
pub mod descriptor;
pub mod metadata;

pub use autowired::AutowiredAnnotationBeanPostProcessor;
pub use descriptor::{DependencyDescriptor, DependencyResolver, InjectionPoint};
pub use metadata::{InjectedElement, InjectedMember, InjectionMetadata, InjectionMetadataCache};
