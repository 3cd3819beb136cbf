//! 把解析好的配置类转换为 Bean 定义
//!
//! - 被导入的配置类自身注册为以完整类名命名的定义
//! - bean 方法注册为工厂方法定义
//! - 导入的资源交给对应类型的 [`BeanDefinitionReader`]
//! - 导入注册器直接操作注册表

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;

use crate::annotation::candidate::check_configuration_class_candidate;
use crate::annotation::configuration_class::{BeanMethod, ConfigurationClass, ImportedResource};
use crate::annotation::scan::{
    process_common_definition_annotations, resolve_scope, BeanNameGenerator, FullyQualifiedBeanNameGenerator,
};
use crate::bean::{ArgumentValue, AutowireMode, BeanDefinition, BeanOrigin, Role};
use crate::config::PropertyResolver;
use crate::constants::FACTORY_METHOD_RETURN_TYPE_ATTRIBUTE;
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{find_merged, Annotated, Annotation, MetadataReader};
use crate::registry::BeanDefinitionRegistry;
use crate::resource::ResourceLoader;
use crate::scope::{Scope, ScopedProxyMode};

/// 外部定义文件的读取器
pub trait BeanDefinitionReader: Send + Sync {
    /// 加载一个位置上的定义，返回注册的数量
    fn load_bean_definitions(&self, location: &str, registry: &dyn BeanDefinitionRegistry) -> ContainerResult<usize>;
}

/// 默认的读取器类型
pub const DEFAULT_READER_TYPE: &str = "toml";

/// 按类型名查找的读取器集合
#[derive(Clone)]
pub struct BeanDefinitionReaders {
    readers: HashMap<String, Arc<dyn BeanDefinitionReader>>,
}

impl BeanDefinitionReaders {
    /// 预先注册 TOML 读取器
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        let mut readers: HashMap<String, Arc<dyn BeanDefinitionReader>> = HashMap::new();
        readers.insert(
            DEFAULT_READER_TYPE.to_string(),
            Arc::new(TomlBeanDefinitionReader::new(loader)),
        );
        Self { readers }
    }

    pub fn register(&mut self, reader_type: impl Into<String>, reader: Arc<dyn BeanDefinitionReader>) {
        self.readers.insert(reader_type.into(), reader);
    }

    pub fn get(&self, reader_type: &str) -> Option<Arc<dyn BeanDefinitionReader>> {
        self.readers.get(reader_type).cloned()
    }

    /// 显式类型优先，其次按扩展名，最后使用默认读取器
    pub fn reader_type_for(&self, resource: &ImportedResource) -> String {
        if let Some(reader_type) = &resource.reader {
            return reader_type.clone();
        }
        resource
            .location
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| self.readers.contains_key(ext))
            .unwrap_or_else(|| DEFAULT_READER_TYPE.to_string())
    }
}

impl std::fmt::Debug for BeanDefinitionReaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.readers.keys().collect();
        types.sort();
        f.debug_struct("BeanDefinitionReaders").field("types", &types).finish()
    }
}

pub struct ConfigurationClassBeanDefinitionReader<'a> {
    registry: &'a dyn BeanDefinitionRegistry,
    reader: Arc<dyn MetadataReader>,
    environment: Arc<dyn PropertyResolver>,
    readers: &'a BeanDefinitionReaders,
    imported_name_generator: FullyQualifiedBeanNameGenerator,
}

impl<'a> ConfigurationClassBeanDefinitionReader<'a> {
    pub fn new(
        registry: &'a dyn BeanDefinitionRegistry,
        reader: Arc<dyn MetadataReader>,
        environment: Arc<dyn PropertyResolver>,
        readers: &'a BeanDefinitionReaders,
    ) -> Self {
        Self {
            registry,
            reader,
            environment,
            readers,
            imported_name_generator: FullyQualifiedBeanNameGenerator,
        }
    }

    pub fn load_bean_definitions(&self, classes: &mut [ConfigurationClass]) -> ContainerResult<()> {
        for config in classes.iter_mut() {
            self.load_bean_definitions_for_configuration_class(config)?;
        }
        Ok(())
    }

    fn load_bean_definitions_for_configuration_class(&self, config: &mut ConfigurationClass) -> ContainerResult<()> {
        if config.is_imported() && config.bean_name().is_none() {
            self.register_imported_configuration_class(config)?;
        }
        for bean_method in config.bean_methods() {
            self.load_bean_definition_for_bean_method(config, bean_method)?;
        }
        self.load_bean_definitions_from_imported_resources(config.imported_resources())?;
        self.load_bean_definitions_from_registrars(config)
    }

    fn register_imported_configuration_class(&self, config: &mut ConfigurationClass) -> ContainerResult<()> {
        let class = config.class();
        let bean_name = self
            .imported_name_generator
            .generate_bean_name(class, self.reader.as_ref());

        let mut definition = BeanDefinition::for_class(class.name.clone()).with_origin(BeanOrigin::ImportedConfiguration {
            imported_by: config.imported_by().first().cloned().unwrap_or_default(),
        });
        if let Some((scope, mode)) = resolve_scope(self.reader.as_ref(), &class.annotations) {
            definition.scope = scope;
            definition.scoped_proxy = mode.resolve(ScopedProxyMode::No);
        }
        process_common_definition_annotations(self.reader.as_ref(), &class.annotations, &mut definition);
        check_configuration_class_candidate(self.reader.as_ref(), &mut definition);

        self.registry.register_bean_definition(&bean_name, definition)?;
        tracing::trace!("Registered bean definition for imported class '{}'", bean_name);
        config.set_bean_name(bean_name);
        Ok(())
    }

    fn load_bean_definition_for_bean_method(
        &self,
        config: &ConfigurationClass,
        bean_method: &BeanMethod,
    ) -> ContainerResult<()> {
        let method = &bean_method.method;
        if let Some(profiles) = method.find_annotation(|a| match a {
            Annotation::Profile(profiles) => Some(profiles.clone()),
            _ => None,
        }) {
            if !self.environment.accepts_profiles(&profiles) {
                tracing::debug!("Skipping bean method {}::{} due to profile mismatch", config.name(), method.name);
                return Ok(());
            }
        }

        let attributes = method.bean_attributes().cloned().unwrap_or_default();
        let bean_name = attributes.names.first().cloned().unwrap_or_else(|| method.name.clone());
        if config.bean_name() == Some(bean_name.as_str()) {
            return Err(ContainerError::BeanDefinitionStore(format!(
                "Bean name derived from bean method '{}' clashes with bean name for containing configuration class; please make those names unique",
                method.name
            )));
        }
        for alias in attributes.names.iter().skip(1) {
            self.registry.register_alias(&bean_name, alias)?;
        }

        if self.is_overridden_by_existing(config, bean_method, &bean_name)? {
            return Ok(());
        }

        let mut definition = if method.is_static {
            BeanDefinition::for_static_factory_method(config.name(), method.name.clone())
        } else {
            let factory_bean = config.bean_name().ok_or_else(|| {
                ContainerError::IllegalState(format!(
                    "Configuration class [{}] has no bean name for instance bean method '{}'",
                    config.name(),
                    method.name
                ))
            })?;
            BeanDefinition::for_factory_method(factory_bean, method.name.clone())
        };
        definition.origin = BeanOrigin::ConfigurationClass {
            declaring_class: config.name().to_string(),
            method_name: method.name.clone(),
        };
        if let Some(return_type) = &method.return_type {
            definition
                .attributes
                .insert(FACTORY_METHOD_RETURN_TYPE_ATTRIBUTE.to_string(), return_type.clone());
        }
        definition.autowire_mode = attributes.autowire;
        definition.autowire_candidate = attributes.autowire_candidate.unwrap_or(true);
        definition.init_method_name = attributes.init_method.filter(|m| !m.is_empty());
        definition.destroy_method_name = attributes.destroy_method.filter(|m| !m.is_empty());

        // 方法上没有 Lazy 时沿用配置类上的
        if let Some(lazy) = find_merged(self.reader.as_ref(), &config.class().annotations, &|a| match a {
            Annotation::Lazy(lazy) => Some(*lazy),
            _ => None,
        }) {
            definition.lazy_init = lazy;
        }
        process_common_definition_annotations(self.reader.as_ref(), &method.annotations, &mut definition);

        if let Some((scope, mode)) = resolve_scope(self.reader.as_ref(), &method.annotations) {
            definition.scope = scope;
            definition.scoped_proxy = mode.resolve(ScopedProxyMode::No);
        }

        tracing::trace!(
            "Registering bean definition for bean method {}::{}()",
            config.name(),
            method.name
        );
        self.registry.register_bean_definition(&bean_name, definition)
    }

    /// 已有同名定义时是否保留它
    ///
    /// 同一个配置类（重载的 bean 方法）保留已有的；其他配置类、扫描得到的和基础设施定义
    /// 被覆盖；外部文件和代码注册的定义保留
    fn is_overridden_by_existing(
        &self,
        config: &ConfigurationClass,
        bean_method: &BeanMethod,
        bean_name: &str,
    ) -> ContainerResult<bool> {
        if !self.registry.contains_bean_definition(bean_name) {
            return Ok(false);
        }
        let existing = self.registry.get_bean_definition(bean_name)?;

        match &existing.origin {
            BeanOrigin::ConfigurationClass { declaring_class, .. } => {
                if declaring_class == config.name() {
                    tracing::debug!(
                        "Keeping existing definition for overloaded bean method '{}' on [{}]",
                        bean_method.name(),
                        declaring_class
                    );
                    return Ok(true);
                }
                Ok(false)
            }
            BeanOrigin::Scanned => Ok(false),
            _ if existing.role != Role::Application => Ok(false),
            _ => {
                tracing::debug!(
                    "Skipping bean definition for {}::{}(): a definition for bean '{}' already exists ({})",
                    config.name(),
                    bean_method.name(),
                    bean_name,
                    existing.description()
                );
                Ok(true)
            }
        }
    }

    fn load_bean_definitions_from_imported_resources(&self, resources: &[ImportedResource]) -> ContainerResult<()> {
        for resource in resources {
            let reader_type = self.readers.reader_type_for(resource);
            let reader = self.readers.get(&reader_type).ok_or_else(|| {
                ContainerError::BeanDefinitionStore(format!(
                    "No bean definition reader registered for type '{}' (resource '{}')",
                    reader_type, resource.location
                ))
            })?;
            let location = self.environment.resolve_required_placeholders(&resource.location)?;
            let count = reader.load_bean_definitions(&location, self.registry)?;
            tracing::debug!("Loaded {} bean definitions from '{}'", count, location);
        }
        Ok(())
    }

    fn load_bean_definitions_from_registrars(&self, config: &ConfigurationClass) -> ContainerResult<()> {
        for registrar in config.registrars() {
            registrar
                .register_bean_definitions(config.class(), self.registry)
                .map_err(|e| ContainerError::Other(e.context(format!("Import registrar on [{}] failed", config.name()))))?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct BeansFile {
    #[serde(default)]
    beans: BTreeMap<String, BeanEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BeanEntry {
    class: Option<String>,
    scope: Option<String>,
    lazy: Option<bool>,
    primary: bool,
    depends_on: Vec<String>,
    aliases: Vec<String>,
    factory_bean: Option<String>,
    factory_method: Option<String>,
    parent: Option<String>,
    #[serde(rename = "abstract")]
    is_abstract: bool,
    init_method: Option<String>,
    destroy_method: Option<String>,
    autowire: Option<String>,
    autowire_candidate: Option<bool>,
    constructor_args: Vec<ArgumentEntry>,
    properties: BTreeMap<String, ArgumentEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArgumentEntry {
    index: Option<usize>,
    #[serde(rename = "ref")]
    reference: Option<String>,
    value: Option<String>,
}

impl ArgumentEntry {
    fn to_value(&self, bean: &str) -> ContainerResult<ArgumentValue> {
        match (&self.reference, &self.value) {
            (Some(reference), None) => Ok(ArgumentValue::Reference(reference.clone())),
            (None, Some(value)) => Ok(ArgumentValue::Literal(value.clone())),
            _ => Err(ContainerError::BeanDefinitionStore(format!(
                "Bean '{}': an argument needs exactly one of 'ref' or 'value'",
                bean
            ))),
        }
    }
}

fn parse_autowire_mode(bean: &str, mode: &str) -> ContainerResult<AutowireMode> {
    match mode {
        "no" => Ok(AutowireMode::No),
        "by_name" | "byName" => Ok(AutowireMode::ByName),
        "by_type" | "byType" => Ok(AutowireMode::ByType),
        "constructor" => Ok(AutowireMode::Constructor),
        other => Err(ContainerError::BeanDefinitionStore(format!(
            "Bean '{}': unknown autowire mode '{}'",
            bean, other
        ))),
    }
}

/// TOML 定义文件读取器
///
/// ```toml
/// [beans.dataSource]
/// class = "app::db::PooledDataSource"
/// depends_on = ["migrations"]
/// aliases = ["db"]
///
/// [beans.dataSource.properties]
/// url = { value = "postgres://localhost/app" }
/// ```
pub struct TomlBeanDefinitionReader {
    loader: Arc<dyn ResourceLoader>,
}

impl TomlBeanDefinitionReader {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self { loader }
    }

    /// 解析内容并注册，`resource` 记录在定义的来源上
    pub fn load_from_str(
        &self,
        content: &str,
        resource: &str,
        registry: &dyn BeanDefinitionRegistry,
    ) -> ContainerResult<usize> {
        let file: BeansFile = toml::from_str(content).map_err(|e| ContainerError::ResourceLoading {
            location: resource.to_string(),
            message: e.to_string(),
        })?;

        let mut count = 0;
        for (name, entry) in &file.beans {
            let definition = Self::build_definition(name, entry, resource)?;
            registry.register_bean_definition(name, definition)?;
            for alias in &entry.aliases {
                registry.register_alias(name, alias)?;
            }
            count += 1;
        }
        Ok(count)
    }

    fn build_definition(name: &str, entry: &BeanEntry, resource: &str) -> ContainerResult<BeanDefinition> {
        let mut definition = match (&entry.factory_method, &entry.factory_bean, &entry.parent) {
            (Some(method), Some(factory_bean), _) => BeanDefinition::for_factory_method(factory_bean.clone(), method.clone()),
            (Some(method), None, _) => {
                let class = entry.class.clone().ok_or_else(|| {
                    ContainerError::BeanDefinitionStore(format!(
                        "Bean '{}': a static factory method requires 'class'",
                        name
                    ))
                })?;
                BeanDefinition::for_static_factory_method(class, method.clone())
            }
            (None, _, Some(parent)) => {
                let mut child = BeanDefinition::child_of(parent.clone());
                child.bean_class_name = entry.class.clone();
                child
            }
            (None, _, None) => match &entry.class {
                Some(class) => BeanDefinition::for_class(class.clone()),
                None if entry.is_abstract => BeanDefinition::default().with_autowire_candidate(true),
                None => {
                    return Err(ContainerError::BeanDefinitionStore(format!(
                        "Bean '{}' in '{}' declares neither 'class', 'parent' nor 'factory_method'",
                        name, resource
                    )))
                }
            },
        };

        definition.origin = BeanOrigin::External {
            resource: resource.to_string(),
        };
        if let Some(scope) = &entry.scope {
            definition.scope = Scope::from_name(scope);
        }
        if let Some(lazy) = entry.lazy {
            definition.lazy_init = lazy;
        }
        definition.primary = entry.primary;
        definition.depends_on = entry.depends_on.clone();
        definition.is_abstract = entry.is_abstract;
        definition.init_method_name = entry.init_method.clone();
        definition.destroy_method_name = entry.destroy_method.clone();
        if let Some(mode) = &entry.autowire {
            definition.autowire_mode = parse_autowire_mode(name, mode)?;
        }
        if let Some(candidate) = entry.autowire_candidate {
            definition.autowire_candidate = candidate;
        }
        for (position, argument) in entry.constructor_args.iter().enumerate() {
            let index = argument.index.unwrap_or(position);
            definition = definition.with_constructor_arg(index, argument.to_value(name)?);
        }
        for (property, argument) in &entry.properties {
            definition = definition.with_property(property.clone(), argument.to_value(name)?);
        }
        Ok(definition)
    }
}

impl BeanDefinitionReader for TomlBeanDefinitionReader {
    fn load_bean_definitions(&self, location: &str, registry: &dyn BeanDefinitionRegistry) -> ContainerResult<usize> {
        let content = self.loader.load(location)?;
        self.load_from_str(&content, location, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::metadata::{BeanAttributes, ClassIndex, ClassMetadata, MethodMetadata};
    use crate::registry::SimpleBeanDefinitionRegistry;
    use crate::resource::StaticResourceLoader;

    fn bean_method(name: &str, attributes: BeanAttributes) -> MethodMetadata {
        MethodMetadata::new(name)
            .with_annotation(Annotation::Bean(attributes))
            .returns("app::Clock")
            .shared::<()>(|_, _| Ok(None))
    }

    fn load(
        classes: Vec<ClassMetadata>,
        configs: impl FnOnce(&ClassIndex) -> Vec<ConfigurationClass>,
        registry: &SimpleBeanDefinitionRegistry,
        loader: StaticResourceLoader,
    ) -> ContainerResult<Vec<ConfigurationClass>> {
        let index = ClassIndex::with_classes(classes);
        let mut configs = configs(&index);
        let readers = BeanDefinitionReaders::new(Arc::new(loader));
        let reader = ConfigurationClassBeanDefinitionReader::new(
            registry,
            Arc::new(index),
            Arc::new(Environment::new()),
            &readers,
        );
        reader.load_bean_definitions(&mut configs)?;
        Ok(configs)
    }

    #[test]
    fn test_bean_methods_become_factory_definitions() {
        let registry = SimpleBeanDefinitionRegistry::new();
        let classes = vec![ClassMetadata::new("app::Config")
            .with_annotation(Annotation::Configuration)
            .with_annotation(Annotation::Lazy(true))
            .with_method(bean_method("clock", BeanAttributes::named(&["systemClock", "clock"])))
            .with_method(
                bean_method("eager", BeanAttributes::default())
                    .with_annotation(Annotation::Lazy(false))
                    .with_annotation(Annotation::Primary),
            )
            .with_method(bean_method("shared", BeanAttributes::default()).as_static())];
        load(
            classes,
            |index| {
                let class = index.require("app::Config").unwrap();
                let mut config = ConfigurationClass::new(class.clone(), "config");
                for method in class.bean_methods() {
                    config.add_bean_method(BeanMethod::new(method.clone(), "app::Config"));
                }
                vec![config]
            },
            &registry,
            StaticResourceLoader::new(),
        )
        .unwrap();

        let clock = registry.get_bean_definition("systemClock").unwrap();
        assert_eq!(clock.factory_bean_name.as_deref(), Some("config"));
        assert_eq!(clock.factory_method_name.as_deref(), Some("clock"));
        assert!(clock.lazy_init);
        assert_eq!(
            clock.attributes.get(FACTORY_METHOD_RETURN_TYPE_ATTRIBUTE).map(String::as_str),
            Some("app::Clock")
        );
        assert_eq!(registry.canonical_name("clock"), "systemClock");

        let eager = registry.get_bean_definition("eager").unwrap();
        assert!(!eager.lazy_init);
        assert!(eager.primary);

        let shared = registry.get_bean_definition("shared").unwrap();
        assert_eq!(shared.bean_class_name.as_deref(), Some("app::Config"));
        assert!(shared.factory_bean_name.is_none());
    }

    #[test]
    fn test_imported_class_is_registered_by_full_name() {
        let registry = SimpleBeanDefinitionRegistry::new();
        let classes = vec![ClassMetadata::new("app::Data").with_method(bean_method("pool", BeanAttributes::default()))];
        let configs = load(
            classes,
            |index| {
                let class = index.require("app::Data").unwrap();
                let mut config = ConfigurationClass::imported(class.clone(), "app::Root");
                config.add_bean_method(BeanMethod::new(class.bean_methods().next().unwrap().clone(), "app::Data"));
                vec![config]
            },
            &registry,
            StaticResourceLoader::new(),
        )
        .unwrap();

        assert_eq!(configs[0].bean_name(), Some("app::Data"));
        let data = registry.get_bean_definition("app::Data").unwrap();
        assert_eq!(
            data.origin,
            BeanOrigin::ImportedConfiguration {
                imported_by: "app::Root".into()
            }
        );
        let pool = registry.get_bean_definition("pool").unwrap();
        assert_eq!(pool.factory_bean_name.as_deref(), Some("app::Data"));
    }

    #[test]
    fn test_existing_definitions_win_over_bean_methods() {
        let registry = SimpleBeanDefinitionRegistry::new();
        registry
            .register_bean_definition("clock", BeanDefinition::for_class("app::ManualClock"))
            .unwrap();
        registry
            .register_bean_definition(
                "scanned",
                BeanDefinition::for_class("app::ScannedClock").with_origin(BeanOrigin::Scanned),
            )
            .unwrap();
        let classes = vec![ClassMetadata::new("app::Config")
            .with_method(bean_method("clock", BeanAttributes::default()))
            .with_method(bean_method("scanned", BeanAttributes::default()))];
        load(
            classes,
            |index| {
                let class = index.require("app::Config").unwrap();
                let mut config = ConfigurationClass::new(class.clone(), "config");
                for method in class.bean_methods() {
                    config.add_bean_method(BeanMethod::new(method.clone(), "app::Config"));
                }
                vec![config]
            },
            &registry,
            StaticResourceLoader::new(),
        )
        .unwrap();

        let clock = registry.get_bean_definition("clock").unwrap();
        assert_eq!(clock.bean_class_name.as_deref(), Some("app::ManualClock"));
        let scanned = registry.get_bean_definition("scanned").unwrap();
        assert!(scanned.origin.is_configuration_class());
    }

    #[test]
    fn test_bean_name_clashing_with_configuration_class() {
        let registry = SimpleBeanDefinitionRegistry::new();
        let classes = vec![ClassMetadata::new("app::Config").with_method(bean_method("config", BeanAttributes::default()))];
        let result = load(
            classes,
            |index| {
                let class = index.require("app::Config").unwrap();
                let mut config = ConfigurationClass::new(class.clone(), "config");
                config.add_bean_method(BeanMethod::new(class.bean_methods().next().unwrap().clone(), "app::Config"));
                vec![config]
            },
            &registry,
            StaticResourceLoader::new(),
        );
        assert!(matches!(result, Err(ContainerError::BeanDefinitionStore(_))));
    }

    #[test]
    fn test_imported_toml_resource() {
        let registry = SimpleBeanDefinitionRegistry::new();
        let loader = StaticResourceLoader::new().with_resource(
            "beans.toml",
            r#"
[beans.dataSource]
class = "app::db::PooledDataSource"
scope = "prototype"
depends_on = ["migrations"]
aliases = ["db"]
constructor_args = [{ value = "8" }, { index = 1, ref = "metrics" }]

[beans.dataSource.properties]
url = { value = "postgres://localhost/app" }

[beans.migrations]
class = "app::db::Migrations"
lazy = true
autowire = "by_name"
"#,
        );
        let classes = vec![ClassMetadata::new("app::Config")];
        load(
            classes,
            |index| {
                let mut config = ConfigurationClass::new(index.require("app::Config").unwrap(), "config");
                config.add_imported_resource("classpath:beans.toml", None);
                vec![config]
            },
            &registry,
            loader,
        )
        .unwrap();

        let data_source = registry.get_bean_definition("db").unwrap();
        assert_eq!(data_source.scope, Scope::Prototype);
        assert_eq!(data_source.depends_on, vec!["migrations".to_string()]);
        assert_eq!(data_source.constructor_args.len(), 2);
        assert_eq!(data_source.constructor_args[1].value, ArgumentValue::Reference("metrics".into()));
        assert_eq!(data_source.property_literal("url"), Some("postgres://localhost/app"));
        assert!(matches!(data_source.origin, BeanOrigin::External { .. }));

        let migrations = registry.get_bean_definition("migrations").unwrap();
        assert!(migrations.lazy_init);
        assert_eq!(migrations.autowire_mode, AutowireMode::ByName);
    }

    #[test]
    fn test_unknown_reader_type() {
        let registry = SimpleBeanDefinitionRegistry::new();
        let result = load(
            vec![ClassMetadata::new("app::Config")],
            |index| {
                let mut config = ConfigurationClass::new(index.require("app::Config").unwrap(), "config");
                config.add_imported_resource("beans.xml", Some("xml".into()));
                vec![config]
            },
            &registry,
            StaticResourceLoader::new(),
        );
        assert!(matches!(result, Err(ContainerError::BeanDefinitionStore(ref m)) if m.contains("'xml'")));
    }
}
