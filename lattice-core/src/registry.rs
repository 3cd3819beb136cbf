//! Bean 定义注册表
//!
//! 配置期的可变存储：名称 → 定义，外加别名。配置类处理器、导入注册器和
//! 外部工具都通过 [`BeanDefinitionRegistry`] 修改它。

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::bean::BeanDefinition;
use crate::error::{ContainerError, ContainerResult};

/// Bean 定义注册表接口
///
/// 不包含泛型方法，可以作为 trait object 传给后处理器和导入注册器
pub trait BeanDefinitionRegistry: Send + Sync {
    /// 注册 Bean 定义，同名时覆盖（除非禁止覆盖）
    fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> ContainerResult<()>;

    /// 移除 Bean 定义
    fn remove_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition>;

    /// 获取 Bean 定义（支持别名）
    fn get_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition>;

    fn contains_bean_definition(&self, name: &str) -> bool;

    /// 所有定义名称，按注册顺序
    fn bean_definition_names(&self) -> Vec<String>;

    fn bean_definition_count(&self) -> usize {
        self.bean_definition_names().len()
    }

    /// 注册别名
    fn register_alias(&self, name: &str, alias: &str) -> ContainerResult<()>;

    fn remove_alias(&self, alias: &str) -> ContainerResult<()>;

    /// 指向该名称的所有别名（含传递别名）
    fn get_aliases(&self, name: &str) -> Vec<String>;

    /// 别名解析后的规范名称
    fn canonical_name(&self, name: &str) -> String;

    fn is_alias(&self, name: &str) -> bool;

    /// 名称是否已被定义或别名占用
    fn is_bean_name_in_use(&self, name: &str) -> bool {
        self.contains_bean_definition(name) || self.is_alias(name)
    }
}

/// 定义与别名的存储，供注册表实现复用
#[derive(Debug, Clone)]
pub struct DefinitionStore {
    definitions: HashMap<String, BeanDefinition>,
    names: Vec<String>,
    /// 别名 → 名称
    aliases: HashMap<String, String>,
    allow_overriding: bool,
}

impl Default for DefinitionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
            names: Vec::new(),
            aliases: HashMap::new(),
            allow_overriding: true,
        }
    }

    pub fn set_allow_overriding(&mut self, allow: bool) {
        self.allow_overriding = allow;
    }

    pub fn is_allow_overriding(&self) -> bool {
        self.allow_overriding
    }

    /// 注册定义，返回被覆盖的旧定义
    pub fn register(&mut self, name: &str, definition: BeanDefinition) -> ContainerResult<Option<BeanDefinition>> {
        if name.is_empty() {
            return Err(ContainerError::BeanDefinitionStore(
                "Bean name must not be empty".to_string(),
            ));
        }

        if let Some(existing) = self.definitions.get(name) {
            if !self.allow_overriding {
                return Err(ContainerError::BeanDefinitionOverride {
                    name: name.to_string(),
                    existing: existing.description(),
                });
            }
            if existing.role < definition.role {
                tracing::info!(
                    "Overriding user-defined bean definition for bean '{}' with a framework-generated bean definition: replacing [{}] with [{}]",
                    name,
                    existing.description(),
                    definition.description()
                );
            } else {
                tracing::debug!(
                    "Overriding bean definition for bean '{}': replacing [{}] with [{}]",
                    name,
                    existing.description(),
                    definition.description()
                );
            }
        } else {
            self.names.push(name.to_string());
        }

        // 同名别名让位给真正的定义
        self.aliases.remove(name);
        Ok(self.definitions.insert(name.to_string(), definition))
    }

    pub fn remove(&mut self, name: &str) -> ContainerResult<BeanDefinition> {
        let definition = self
            .definitions
            .remove(name)
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))?;
        self.names.retain(|n| n != name);
        Ok(definition)
    }

    pub fn get(&self, name: &str) -> Option<&BeanDefinition> {
        self.definitions
            .get(name)
            .or_else(|| self.definitions.get(&self.canonical_name(name)))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut BeanDefinition> {
        let canonical = self.canonical_name(name);
        self.definitions.get_mut(&canonical)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BeanDefinition)> {
        self.names
            .iter()
            .filter_map(|name| self.definitions.get(name).map(|def| (name, def)))
    }

    pub fn register_alias(&mut self, name: &str, alias: &str) -> ContainerResult<()> {
        if alias == name {
            self.aliases.remove(alias);
            tracing::debug!("Alias definition '{}' ignored since it points to same name", alias);
            return Ok(());
        }

        if let Some(registered) = self.aliases.get(alias) {
            if registered == name {
                return Ok(());
            }
            if !self.allow_overriding {
                return Err(ContainerError::BeanDefinitionStore(format!(
                    "Cannot define alias '{}' for name '{}': it is already registered for name '{}'",
                    alias, name, registered
                )));
            }
            tracing::debug!(
                "Overriding alias '{}' definition for registered name '{}' with new target name '{}'",
                alias,
                registered,
                name
            );
        }

        if self.has_alias(alias, name) {
            return Err(ContainerError::BeanDefinitionStore(format!(
                "Cannot register alias '{}' for name '{}': circular reference - '{}' is a direct or indirect alias for '{}' already",
                alias, name, name, alias
            )));
        }

        self.aliases.insert(alias.to_string(), name.to_string());
        tracing::trace!("Alias definition '{}' registered for name '{}'", alias, name);
        Ok(())
    }

    /// `name` 是否（传递地）把 `alias` 作为别名
    fn has_alias(&self, name: &str, alias: &str) -> bool {
        self.aliases.iter().any(|(registered_alias, registered_name)| {
            registered_name == name
                && (registered_alias == alias || self.has_alias(registered_alias, alias))
        })
    }

    pub fn remove_alias(&mut self, alias: &str) -> ContainerResult<()> {
        self.aliases
            .remove(alias)
            .map(|_| ())
            .ok_or_else(|| ContainerError::IllegalState(format!("No alias '{}' registered", alias)))
    }

    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        let mut result = Vec::new();
        self.collect_aliases(name, &mut result);
        result.sort();
        result
    }

    fn collect_aliases(&self, name: &str, result: &mut Vec<String>) {
        for (alias, target) in &self.aliases {
            if target == name && !result.contains(alias) {
                result.push(alias.clone());
                self.collect_aliases(alias, result);
            }
        }
    }

    pub fn canonical_name(&self, name: &str) -> String {
        let mut canonical = name;
        let mut hops = 0;
        while let Some(target) = self.aliases.get(canonical) {
            canonical = target;
            hops += 1;
            if hops > self.aliases.len() {
                break;
            }
        }
        canonical.to_string()
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }
}

/// 独立的注册表实现，用于只需要收集定义的场景（例如读取外部定义文件）
#[derive(Debug, Default)]
pub struct SimpleBeanDefinitionRegistry {
    store: RwLock<DefinitionStore>,
}

impl SimpleBeanDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出存储的快照
    pub fn snapshot(&self) -> DefinitionStore {
        self.store.read().clone()
    }
}

impl BeanDefinitionRegistry for SimpleBeanDefinitionRegistry {
    fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> ContainerResult<()> {
        self.store.write().register(name, definition).map(|_| ())
    }

    fn remove_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition> {
        self.store.write().remove(name)
    }

    fn get_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition> {
        self.store
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.store.read().contains(name)
    }

    fn bean_definition_names(&self) -> Vec<String> {
        self.store.read().names().to_vec()
    }

    fn register_alias(&self, name: &str, alias: &str) -> ContainerResult<()> {
        self.store.write().register_alias(name, alias)
    }

    fn remove_alias(&self, alias: &str) -> ContainerResult<()> {
        self.store.write().remove_alias(alias)
    }

    fn get_aliases(&self, name: &str) -> Vec<String> {
        self.store.read().aliases_of(name)
    }

    fn canonical_name(&self, name: &str) -> String {
        self.store.read().canonical_name(name)
    }

    fn is_alias(&self, name: &str) -> bool {
        self.store.read().is_alias(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::Role;

    #[test]
    fn test_names_keep_registration_order() {
        let registry = SimpleBeanDefinitionRegistry::new();
        registry
            .register_bean_definition("zeta", BeanDefinition::for_class("app::Zeta"))
            .unwrap();
        registry
            .register_bean_definition("alpha", BeanDefinition::for_class("app::Alpha"))
            .unwrap();
        registry
            .register_bean_definition("zeta", BeanDefinition::for_class("app::Zeta2"))
            .unwrap();

        assert_eq!(registry.bean_definition_names(), vec!["zeta", "alpha"]);
        assert_eq!(
            registry.get_bean_definition("zeta").unwrap().bean_class_name.as_deref(),
            Some("app::Zeta2")
        );
    }

    #[test]
    fn test_overriding_can_be_disabled() {
        let mut store = DefinitionStore::new();
        store.set_allow_overriding(false);
        store
            .register("userService", BeanDefinition::for_class("app::UserService"))
            .unwrap();
        let result = store.register(
            "userService",
            BeanDefinition::for_class("app::OtherService").with_role(Role::Infrastructure),
        );
        assert!(matches!(result, Err(ContainerError::BeanDefinitionOverride { .. })));
    }

    #[test]
    fn test_alias_resolution() {
        let registry = SimpleBeanDefinitionRegistry::new();
        registry
            .register_bean_definition("userService", BeanDefinition::for_class("app::UserService"))
            .unwrap();
        registry.register_alias("userService", "users").unwrap();
        registry.register_alias("users", "people").unwrap();

        assert_eq!(registry.canonical_name("people"), "userService");
        assert_eq!(registry.get_aliases("userService"), vec!["people", "users"]);
        assert!(registry.get_bean_definition("people").is_ok());
        assert!(registry.is_bean_name_in_use("users"));
    }

    #[test]
    fn test_circular_alias_is_rejected() {
        let mut store = DefinitionStore::new();
        store.register_alias("a", "b").unwrap();
        assert!(store.register_alias("b", "a").is_err());
    }
}
