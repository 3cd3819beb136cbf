//! 组件扫描
//!
//! 在元数据提供者已知的类中按包查找组件，生成定义并注册。

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::bean::{BeanDefinition, BeanOrigin};
use crate::config::PropertyResolver;
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{find_merged, has_merged, Annotation, ClassMetadata, ComponentScanSpec, MetadataReader};
use crate::registry::BeanDefinitionRegistry;
use crate::scope::{Scope, ScopedProxyMode};
use crate::utils::{naming, pattern};

/// 自定义过滤器
pub type TypeMatcher = Arc<dyn Fn(&ClassMetadata, &dyn MetadataReader) -> bool + Send + Sync>;

/// 扫描过滤器
#[derive(Clone)]
pub enum TypeFilter {
    /// 组件标记（含元注解）
    Component,
    /// 带有指定自定义注解（含元注解）
    AnnotationType(String),
    /// 带有指定类型的扩展注解
    Extension(&'static str),
    /// 可以赋给指定类型
    AssignableType(String),
    /// 类名匹配正则
    Regex(Regex),
    /// 类名匹配通配符模式
    Pattern(String),
    Custom(TypeMatcher),
}

impl TypeFilter {
    pub fn regex(pattern: &str) -> ContainerResult<Self> {
        Regex::new(pattern)
            .map(TypeFilter::Regex)
            .map_err(|e| ContainerError::BeanDefinitionStore(format!("Invalid type filter pattern '{}': {}", pattern, e)))
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ClassMetadata, &dyn MetadataReader) -> bool + Send + Sync + 'static,
    {
        TypeFilter::Custom(Arc::new(f))
    }

    pub fn matches(&self, class: &ClassMetadata, reader: &dyn MetadataReader) -> bool {
        match self {
            TypeFilter::Component => has_merged(reader, &class.annotations, &Annotation::is_component_marker),
            TypeFilter::AnnotationType(name) => {
                has_merged(reader, &class.annotations, &|a| matches!(a, Annotation::Meta(m) if m == name))
            }
            TypeFilter::Extension(type_name) => has_merged(reader, &class.annotations, &|a| {
                matches!(a, Annotation::Extension { type_name: t, .. } if t == type_name)
            }),
            TypeFilter::AssignableType(type_name) => reader.is_assignable(&class.name, type_name),
            TypeFilter::Regex(regex) => regex.is_match(&class.name),
            TypeFilter::Pattern(p) => pattern::simple_match(p, &class.name),
            TypeFilter::Custom(f) => f(class, reader),
        }
    }
}

impl fmt::Debug for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFilter::Component => write!(f, "Component"),
            TypeFilter::AnnotationType(name) => write!(f, "AnnotationType({})", name),
            TypeFilter::Extension(name) => write!(f, "Extension({})", name),
            TypeFilter::AssignableType(name) => write!(f, "AssignableType({})", name),
            TypeFilter::Regex(regex) => write!(f, "Regex({})", regex.as_str()),
            TypeFilter::Pattern(p) => write!(f, "Pattern({})", p),
            TypeFilter::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Bean 名称生成器
pub trait BeanNameGenerator: fmt::Debug + Send + Sync {
    fn generate_bean_name(&self, class: &ClassMetadata, reader: &dyn MetadataReader) -> String;
}

/// 组件标记上的显式名称，否则使用首字母小写的简单类名
#[derive(Debug, Default, Clone, Copy)]
pub struct AnnotationBeanNameGenerator;

impl BeanNameGenerator for AnnotationBeanNameGenerator {
    fn generate_bean_name(&self, class: &ClassMetadata, reader: &dyn MetadataReader) -> String {
        let explicit = find_merged(reader, &class.annotations, &|a| match a {
            Annotation::Component(Some(name)) if !name.is_empty() => Some(name.clone()),
            _ => None,
        });
        explicit.unwrap_or_else(|| naming::to_camel_case(class.simple_name()))
    }
}

/// 使用完整类名作为 Bean 名称（被导入的配置类）
#[derive(Debug, Default, Clone, Copy)]
pub struct FullyQualifiedBeanNameGenerator;

impl BeanNameGenerator for FullyQualifiedBeanNameGenerator {
    fn generate_bean_name(&self, class: &ClassMetadata, _reader: &dyn MetadataReader) -> String {
        class.name.clone()
    }
}

/// 类上的 `Profile` 是否被当前环境接受
pub fn passes_profile_check(reader: &dyn MetadataReader, class: &ClassMetadata, environment: &dyn PropertyResolver) -> bool {
    let profiles = find_merged(reader, &class.annotations, &|a| match a {
        Annotation::Profile(profiles) => Some(profiles.clone()),
        _ => None,
    });
    match profiles {
        Some(profiles) => environment.accepts_profiles(&profiles),
        None => true,
    }
}

/// 把 `Lazy` / `Primary` / `DependsOn` / `Role` 应用到定义上
pub fn process_common_definition_annotations(
    reader: &dyn MetadataReader,
    annotations: &[Annotation],
    definition: &mut BeanDefinition,
) {
    if let Some(lazy) = find_merged(reader, annotations, &|a| match a {
        Annotation::Lazy(lazy) => Some(*lazy),
        _ => None,
    }) {
        definition.lazy_init = lazy;
    }
    if has_merged(reader, annotations, &|a| matches!(a, Annotation::Primary)) {
        definition.primary = true;
    }
    if let Some(depends_on) = find_merged(reader, annotations, &|a| match a {
        Annotation::DependsOn(names) => Some(names.clone()),
        _ => None,
    }) {
        definition.depends_on = depends_on;
    }
    if let Some(role) = find_merged(reader, annotations, &|a| match a {
        Annotation::Role(role) => Some(*role),
        _ => None,
    }) {
        definition.role = role;
    }
}

/// 类或方法上的作用域
pub fn resolve_scope(reader: &dyn MetadataReader, annotations: &[Annotation]) -> Option<(Scope, ScopedProxyMode)> {
    find_merged(reader, annotations, &|a| match a {
        Annotation::Scope(name, mode) => Some((Scope::from_name(name), *mode)),
        _ => None,
    })
}

/// 组件扫描器
pub struct ClassPathBeanDefinitionScanner {
    reader: Arc<dyn MetadataReader>,
    environment: Arc<dyn PropertyResolver>,
    include_filters: Vec<TypeFilter>,
    exclude_filters: Vec<TypeFilter>,
    name_generator: Arc<dyn BeanNameGenerator>,
    lazy_init: bool,
    scoped_proxy: ScopedProxyMode,
}

impl ClassPathBeanDefinitionScanner {
    pub fn new(reader: Arc<dyn MetadataReader>, environment: Arc<dyn PropertyResolver>) -> Self {
        Self {
            reader,
            environment,
            include_filters: vec![TypeFilter::Component],
            exclude_filters: Vec::new(),
            name_generator: Arc::new(AnnotationBeanNameGenerator),
            lazy_init: false,
            scoped_proxy: ScopedProxyMode::No,
        }
    }

    /// 按扫描指令配置扫描器
    pub fn from_spec(
        reader: Arc<dyn MetadataReader>,
        environment: Arc<dyn PropertyResolver>,
        spec: &ComponentScanSpec,
    ) -> Self {
        let mut scanner = Self::new(reader, environment);
        if !spec.use_default_filters {
            scanner.include_filters.clear();
        }
        scanner.include_filters.extend(spec.include_filters.iter().cloned());
        scanner.exclude_filters.extend(spec.exclude_filters.iter().cloned());
        if let Some(generator) = &spec.name_generator {
            scanner.name_generator = Arc::clone(generator);
        }
        scanner.lazy_init = spec.lazy_init;
        scanner.scoped_proxy = spec.scoped_proxy.resolve(ScopedProxyMode::No);
        scanner
    }

    pub fn add_include_filter(&mut self, filter: TypeFilter) {
        self.include_filters.push(filter);
    }

    pub fn add_exclude_filter(&mut self, filter: TypeFilter) {
        self.exclude_filters.push(filter);
    }

    /// 排除过滤器优先，其次需要命中一个包含过滤器，最后检查 Profile
    pub fn is_candidate_component(&self, class: &ClassMetadata) -> bool {
        let reader = self.reader.as_ref();
        if self.exclude_filters.iter().any(|f| f.matches(class, reader)) {
            return false;
        }
        if !self.include_filters.iter().any(|f| f.matches(class, reader)) {
            return false;
        }
        passes_profile_check(reader, class, self.environment.as_ref())
    }

    /// 只有可以实例化的具体类才能成为组件
    fn is_instantiable(class: &ClassMetadata) -> bool {
        class.is_concrete()
    }

    /// 包中的候选组件定义
    pub fn find_candidate_components(&self, base_package: &str) -> Vec<(String, BeanDefinition)> {
        let mut candidates = Vec::new();
        for class in self.reader.classes_in_package(base_package) {
            if !self.is_candidate_component(&class) {
                continue;
            }
            if !Self::is_instantiable(&class) {
                tracing::debug!("Ignored because not a concrete top-level class: {}", class.name);
                continue;
            }
            tracing::debug!("Identified candidate component class: {}", class.name);
            candidates.push(self.build_definition(&class));
        }
        candidates
    }

    fn build_definition(&self, class: &ClassMetadata) -> (String, BeanDefinition) {
        let reader = self.reader.as_ref();
        let name = self.name_generator.generate_bean_name(class, reader);

        let mut definition = BeanDefinition::for_class(class.name.clone()).with_origin(BeanOrigin::Scanned);
        definition.lazy_init = self.lazy_init;
        if let Some((scope, mode)) = resolve_scope(reader, &class.annotations) {
            definition.scope = scope;
            definition.scoped_proxy = mode.resolve(self.scoped_proxy);
        } else {
            definition.scoped_proxy = self.scoped_proxy;
        }
        process_common_definition_annotations(reader, &class.annotations, &mut definition);
        (name, definition)
    }

    /// 扫描并注册，返回新注册的定义
    pub fn scan(
        &self,
        registry: &dyn BeanDefinitionRegistry,
        base_packages: &[String],
    ) -> ContainerResult<Vec<(String, BeanDefinition)>> {
        let mut registered = Vec::new();
        for package in base_packages {
            for (name, definition) in self.find_candidate_components(package) {
                if !self.check_candidate(registry, &name, &definition)? {
                    continue;
                }
                registry.register_bean_definition(&name, definition.clone())?;
                registered.push((name, definition));
            }
        }
        tracing::debug!("Component scan of {:?} registered {} bean definitions", base_packages, registered.len());
        Ok(registered)
    }

    /// 名称已被占用时：兼容（同一个类被重复扫描）则跳过，否则报错
    fn check_candidate(
        &self,
        registry: &dyn BeanDefinitionRegistry,
        name: &str,
        definition: &BeanDefinition,
    ) -> ContainerResult<bool> {
        if !registry.contains_bean_definition(name) {
            return Ok(true);
        }
        let existing = registry.get_bean_definition(name)?;
        let compatible = existing.origin != BeanOrigin::Scanned
            || existing.bean_class_name == definition.bean_class_name;
        if compatible {
            tracing::trace!("Skipping already registered component '{}'", name);
            return Ok(false);
        }
        Err(ContainerError::BeanDefinitionStore(format!(
            "Annotation-specified bean name '{}' for bean class [{}] conflicts with existing, non-compatible bean definition of same name and class [{}]",
            name,
            definition.bean_class_name.as_deref().unwrap_or_default(),
            existing.bean_class_name.as_deref().unwrap_or_default()
        )))
    }
}

impl fmt::Debug for ClassPathBeanDefinitionScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassPathBeanDefinitionScanner")
            .field("include_filters", &self.include_filters)
            .field("exclude_filters", &self.exclude_filters)
            .field("name_generator", &self.name_generator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::metadata::ClassIndex;
    use crate::registry::SimpleBeanDefinitionRegistry;

    fn index() -> Arc<ClassIndex> {
        Arc::new(ClassIndex::with_classes([
            ClassMetadata::annotation_type("app::Service").with_annotation(Annotation::Component(None)),
            ClassMetadata::new("app::user::UserService").with_annotation(Annotation::Meta("app::Service".into())),
            ClassMetadata::new("app::user::UserRepository")
                .with_annotation(Annotation::Component(Some("users".into())))
                .with_annotation(Annotation::Lazy(true))
                .with_annotation(Annotation::Scope("prototype".into(), ScopedProxyMode::Default)),
            ClassMetadata::new("app::user::AbstractHandler")
                .with_annotation(Annotation::Component(None))
                .abstract_class(),
            ClassMetadata::new("app::user::DevOnly")
                .with_annotation(Annotation::Component(None))
                .with_annotation(Annotation::Profile(vec!["dev".into()])),
            ClassMetadata::new("app::user::Helper"),
            ClassMetadata::new("app::order::OrderService").with_annotation(Annotation::Component(None)),
        ]))
    }

    fn scanner() -> ClassPathBeanDefinitionScanner {
        ClassPathBeanDefinitionScanner::new(index(), Arc::new(Environment::new()))
    }

    #[test]
    fn test_default_filters_find_components() {
        let names: Vec<String> = scanner()
            .find_candidate_components("app::user")
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["userService", "users"]);
    }

    #[test]
    fn test_scanned_definition_attributes() {
        let candidates = scanner().find_candidate_components("app::user");
        let (_, repository) = candidates.iter().find(|(n, _)| n == "users").unwrap();
        assert!(repository.lazy_init);
        assert_eq!(repository.scope, Scope::Prototype);
        assert_eq!(repository.origin, BeanOrigin::Scanned);
    }

    #[test]
    fn test_filters() {
        let mut scanner = scanner();
        scanner.add_exclude_filter(TypeFilter::Pattern("*Repository".into()));
        scanner.add_include_filter(TypeFilter::regex("Helper$").unwrap());
        let names: Vec<String> = scanner
            .find_candidate_components("app")
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["userService", "helper", "orderService"]);
    }

    #[test]
    fn test_rescan_is_skipped_and_conflicts_fail() {
        let registry = SimpleBeanDefinitionRegistry::new();
        let scanner = scanner();
        let packages = vec!["app::user".to_string()];
        assert_eq!(scanner.scan(&registry, &packages).unwrap().len(), 2);
        assert!(scanner.scan(&registry, &packages).unwrap().is_empty());

        registry
            .register_bean_definition(
                "orderService",
                BeanDefinition::for_class("app::Other").with_origin(BeanOrigin::Scanned),
            )
            .unwrap();
        assert!(scanner.scan(&registry, &["app::order".to_string()]).is_err());
    }
}
