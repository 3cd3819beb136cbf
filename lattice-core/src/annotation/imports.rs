//! 导入扩展点和导入栈

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::PropertyResolver;
use crate::metadata::{ClassMetadata, MetadataReader};
use crate::registry::BeanDefinitionRegistry;
use crate::resource::ResourceLoader;

/// 导入选择器：根据导入方的元数据给出要继续导入的类名
///
/// 选择器引入的类不参与循环导入检查
pub trait ImportSelector: Send + Sync {
    fn select_imports(&self, importing_class: &ClassMetadata) -> Vec<String>;

    fn set_environment(&mut self, _environment: Arc<dyn PropertyResolver>) {}

    fn set_resource_loader(&mut self, _loader: Arc<dyn ResourceLoader>) {}

    fn set_metadata_reader(&mut self, _reader: Arc<dyn MetadataReader>) {}
}

/// 导入注册器：直接向注册表注册定义
pub trait ImportBeanDefinitionRegistrar: Send + Sync {
    fn register_bean_definitions(
        &self,
        importing_class: &ClassMetadata,
        registry: &dyn BeanDefinitionRegistry,
    ) -> anyhow::Result<()>;

    fn set_environment(&mut self, _environment: Arc<dyn PropertyResolver>) {}

    fn set_resource_loader(&mut self, _loader: Arc<dyn ResourceLoader>) {}

    fn set_metadata_reader(&mut self, _reader: Arc<dyn MetadataReader>) {}
}

/// 正在处理的配置类栈，同时记录谁导入了谁
#[derive(Debug, Default)]
pub struct ImportStack {
    stack: Vec<String>,
    /// 被导入的类 → 导入它的类
    imports: HashMap<String, Vec<String>>,
}

impl ImportStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, class_name: &str) {
        self.stack.push(class_name.to_string());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.stack.pop()
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.stack.iter().any(|c| c == class_name)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.stack
    }

    pub fn register_import(&mut self, importing_class: &str, imported_class: &str) {
        let importers = self.imports.entry(imported_class.to_string()).or_default();
        if !importers.iter().any(|c| c == importing_class) {
            importers.push(importing_class.to_string());
        }
    }

    /// 最后一个导入 `imported_class` 的类
    pub fn importing_class_for(&self, imported_class: &str) -> Option<&str> {
        self.imports
            .get(imported_class)
            .and_then(|importers| importers.last())
            .map(String::as_str)
    }

    pub fn remove_importing_class(&mut self, importing_class: &str) {
        for importers in self.imports.values_mut() {
            importers.retain(|c| c != importing_class);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_registry_tracks_last_importer() {
        let mut stack = ImportStack::new();
        stack.push("app::Root");
        stack.register_import("app::Root", "app::Data");
        stack.register_import("app::Web", "app::Data");
        assert!(stack.contains("app::Root"));
        assert_eq!(stack.importing_class_for("app::Data"), Some("app::Web"));

        stack.remove_importing_class("app::Web");
        assert_eq!(stack.importing_class_for("app::Data"), Some("app::Root"));
        assert_eq!(stack.pop().as_deref(), Some("app::Root"));
        assert!(!stack.contains("app::Root"));
    }
}
