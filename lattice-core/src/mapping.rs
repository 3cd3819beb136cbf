//! 处理器映射注册表
//!
//! 记录 映射键 → (Bean, 方法)。同一个键映射到不同的目标是定义错误，
//! 这里只负责注册和查找，不负责分发。

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use crate::bean_factory::DefaultListableBeanFactory;
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::Annotated;
use crate::registry::BeanDefinitionRegistry;

/// 映射的目标方法
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerMethod {
    pub bean_name: String,
    pub class_name: String,
    pub method_name: String,
}

impl HandlerMethod {
    pub fn new(bean_name: impl Into<String>, class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            bean_name: bean_name.into(),
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }
}

impl fmt::Display for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' method {}#{}()", self.bean_name, self.class_name, self.method_name)
    }
}

#[derive(Debug, Default)]
struct Mappings {
    by_key: HashMap<String, HandlerMethod>,
    /// 注册顺序
    keys: Vec<String>,
}

/// 映射注册表
#[derive(Debug, Default)]
pub struct MappingRegistry {
    mappings: RwLock<Mappings>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册映射；同一个目标重复注册是幂等的
    pub fn register(&self, key: impl Into<String>, handler: HandlerMethod) -> ContainerResult<()> {
        let key = key.into();
        let mut mappings = self.mappings.write();
        if let Some(existing) = mappings.by_key.get(&key) {
            if *existing == handler {
                return Ok(());
            }
            return Err(ContainerError::AmbiguousMapping {
                key,
                existing: existing.to_string(),
                new: handler.to_string(),
            });
        }
        tracing::debug!("Mapped '{}' onto {}", key, handler);
        mappings.keys.push(key.clone());
        mappings.by_key.insert(key, handler);
        Ok(())
    }

    pub fn unregister(&self, key: &str) -> Option<HandlerMethod> {
        let mut mappings = self.mappings.write();
        let removed = mappings.by_key.remove(key);
        if removed.is_some() {
            mappings.keys.retain(|k| k != key);
        }
        removed
    }

    pub fn lookup(&self, key: &str) -> Option<HandlerMethod> {
        self.mappings.read().by_key.get(key).cloned()
    }

    /// 所有映射，按注册顺序
    pub fn mappings(&self) -> Vec<(String, HandlerMethod)> {
        let mappings = self.mappings.read();
        mappings
            .keys
            .iter()
            .filter_map(|k| mappings.by_key.get(k).map(|h| (k.clone(), h.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.mappings.read().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 检查所有已注册的 Bean，注册它们方法上声明的映射
    ///
    /// 返回新注册的映射数量
    pub fn detect_handler_methods(&self, factory: &DefaultListableBeanFactory) -> ContainerResult<usize> {
        let before = self.len();
        let reader = factory.metadata_reader();
        for bean_name in factory.bean_definition_names() {
            let definition = factory.merged_bean_definition(&bean_name)?;
            if definition.is_abstract {
                continue;
            }
            let Some(type_name) = factory.predict_bean_type(&bean_name) else {
                continue;
            };
            for class in reader.superclass_chain(&type_name) {
                for method in &class.methods {
                    if let Some(key) = method.mapping() {
                        self.register(key, HandlerMethod::new(&bean_name, &class.name, &method.name))?;
                    }
                }
            }
        }
        let detected = self.len() - before;
        if detected > 0 {
            tracing::info!("Detected {} handler mappings", detected);
        }
        Ok(detected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanDefinition;
    use crate::config::Environment;
    use crate::metadata::{Annotation, ClassIndex, ClassMetadata, MethodMetadata};
    use std::sync::Arc;

    #[test]
    fn test_conflicting_mapping_names_both_targets() {
        let registry = MappingRegistry::new();
        registry
            .register("GET /users", HandlerMethod::new("userController", "app::UserController", "list"))
            .unwrap();
        registry
            .register("GET /users", HandlerMethod::new("userController", "app::UserController", "list"))
            .unwrap();

        let err = registry
            .register("GET /users", HandlerMethod::new("adminController", "app::AdminController", "users"))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("app::UserController#list()"));
        assert!(message.contains("app::AdminController#users()"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("GET /users").unwrap().bean_name, "userController");
    }

    #[test]
    fn test_detects_mappings_from_bean_methods() {
        let index = Arc::new(ClassIndex::with_classes([
            ClassMetadata::new("app::BaseController")
                .with_method(MethodMetadata::new("health").with_annotation(Annotation::Mapping("GET /health".into()))),
            ClassMetadata::new("app::UserController")
                .extends("app::BaseController")
                .with_method(MethodMetadata::new("list").with_annotation(Annotation::Mapping("GET /users".into())))
                .with_method(MethodMetadata::new("helper")),
        ]));
        let factory = DefaultListableBeanFactory::new(index, Arc::new(Environment::new()));
        factory
            .register_bean_definition("userController", BeanDefinition::for_class("app::UserController"))
            .unwrap();

        let registry = MappingRegistry::new();
        assert_eq!(registry.detect_handler_methods(&factory).unwrap(), 2);
        let keys: Vec<String> = registry.mappings().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["GET /health", "GET /users"]);
        assert!(registry.unregister("GET /health").is_some());
        assert!(registry.lookup("GET /health").is_none());
    }
}
