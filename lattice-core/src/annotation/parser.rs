//! 配置类解析器
//!
//! 从种子配置类出发，沿着嵌套类、组件扫描、导入和父类把整个配置图解析成
//! [`ConfigurationClass`] 列表。属性源在解析时立即加入环境，组件扫描的结果立即注册，
//! 其余（bean 方法、导入的资源、注册器）留给 [`ConfigurationClassBeanDefinitionReader`]。
//!
//! [`ConfigurationClassBeanDefinitionReader`]: crate::annotation::ConfigurationClassBeanDefinitionReader

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::annotation::candidate::{check_configuration_class_candidate, is_configuration_candidate};
use crate::annotation::configuration_class::{BeanMethod, ConfigurationClass};
use crate::annotation::imports::ImportStack;
use crate::annotation::problems::{Problem, ProblemReporter};
use crate::annotation::scan::{passes_profile_check, ClassPathBeanDefinitionScanner, TypeFilter};
use crate::config::{CompositePropertySource, PropertyResolver, PropertySource};
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{
    find_merged, Annotation, ClassCapability, ClassMetadata, ComponentScanSpec, MetadataReader,
    PropertySourceSpec,
};
use crate::registry::BeanDefinitionRegistry;
use crate::resource::{load_property_source, ResourceLoader};
use crate::utils::naming;

pub struct ConfigurationClassParser<'a> {
    reader: Arc<dyn MetadataReader>,
    environment: Arc<dyn PropertyResolver>,
    resource_loader: Arc<dyn ResourceLoader>,
    registry: &'a dyn BeanDefinitionRegistry,
    /// 解析完成的配置类，按完成顺序
    configuration_classes: Vec<ConfigurationClass>,
    /// 父类 → 第一个继承它的配置类
    known_superclasses: HashMap<String, String>,
    /// 已经加入环境的属性源名称
    property_source_names: Vec<String>,
    import_stack: ImportStack,
    problems: ProblemReporter,
}

impl<'a> ConfigurationClassParser<'a> {
    pub fn new(
        reader: Arc<dyn MetadataReader>,
        environment: Arc<dyn PropertyResolver>,
        resource_loader: Arc<dyn ResourceLoader>,
        registry: &'a dyn BeanDefinitionRegistry,
    ) -> Self {
        Self {
            reader,
            environment,
            resource_loader,
            registry,
            configuration_classes: Vec::new(),
            known_superclasses: HashMap::new(),
            property_source_names: Vec::new(),
            import_stack: ImportStack::new(),
            problems: ProblemReporter::new(),
        }
    }

    /// 解析一组 `(bean 名称, 类名)` 种子
    pub fn parse(&mut self, candidates: &[(String, String)]) -> ContainerResult<()> {
        for (bean_name, class_name) in candidates {
            let class = self.reader.require(class_name)?;
            self.process_configuration_class(ConfigurationClass::new(class, bean_name.clone()))?;
        }
        Ok(())
    }

    /// 报告解析期间收集的问题
    pub fn validate(&self) -> ContainerResult<()> {
        self.problems.check()
    }

    pub fn problems(&self) -> &ProblemReporter {
        &self.problems
    }

    pub fn configuration_classes(&self) -> &[ConfigurationClass] {
        &self.configuration_classes
    }

    pub fn into_configuration_classes(self) -> Vec<ConfigurationClass> {
        self.configuration_classes
    }

    pub fn import_stack(&self) -> &ImportStack {
        &self.import_stack
    }

    fn index_of(&self, class_name: &str) -> Option<usize> {
        self.configuration_classes.iter().position(|c| c.name() == class_name)
    }

    fn process_configuration_class(&mut self, mut config: ConfigurationClass) -> ContainerResult<()> {
        if !passes_profile_check(self.reader.as_ref(), config.class(), self.environment.as_ref()) {
            tracing::debug!("Skipping configuration class {} due to profile mismatch", config.name());
            return Ok(());
        }

        if let Some(index) = self.index_of(config.name()) {
            if config.is_imported() {
                let existing = &mut self.configuration_classes[index];
                if existing.is_imported() {
                    existing.merge_imported_by(&config);
                }
                // 已有显式声明的版本时忽略这次导入
                return Ok(());
            }
            // 显式声明替换之前导入的版本
            tracing::debug!("Explicit declaration of {} replaces imported one", config.name());
            let removed = self.configuration_classes.remove(index);
            let removed_name = removed.name().to_string();
            self.known_superclasses.retain(|_, owner| *owner != removed_name);
        }

        let mut source = Some(Arc::clone(config.class()));
        while let Some(current) = source {
            source = self.do_process_configuration_class(&mut config, &current)?;
        }
        tracing::trace!("Parsed {}", config);
        self.configuration_classes.push(config);
        Ok(())
    }

    /// 处理配置类（或它的一个父类），有需要继续处理的父类时返回它
    fn do_process_configuration_class(
        &mut self,
        config: &mut ConfigurationClass,
        source: &Arc<ClassMetadata>,
    ) -> ContainerResult<Option<Arc<ClassMetadata>>> {
        self.process_member_classes(config, source)?;

        let property_sources: Vec<PropertySourceSpec> = source
            .annotations
            .iter()
            .filter_map(|a| match a {
                Annotation::PropertySource(spec) => Some(spec.clone()),
                _ => None,
            })
            .collect();
        for spec in &property_sources {
            if self.environment.as_configurable().is_some() {
                self.process_property_source(spec, source)?;
            } else {
                tracing::warn!(
                    "Ignoring property source on [{}]: environment does not support configurable property sources",
                    source.name
                );
            }
        }

        let scans: Vec<ComponentScanSpec> = source
            .annotations
            .iter()
            .filter_map(|a| match a {
                Annotation::ComponentScan(spec) => Some(spec.clone()),
                _ => None,
            })
            .collect();
        if !scans.is_empty()
            && passes_profile_check(self.reader.as_ref(), source, self.environment.as_ref())
        {
            for spec in &scans {
                let scanned = self.component_scan(spec, source)?;
                for (bean_name, mut definition) in scanned {
                    if !check_configuration_class_candidate(self.reader.as_ref(), &mut definition) {
                        continue;
                    }
                    if let Some(class_name) = definition.bean_class_name.as_deref() {
                        let class = self.reader.require(class_name)?;
                        self.process_configuration_class(ConfigurationClass::new(class, bean_name))?;
                    }
                }
            }
        }

        let imports = self.collect_imports(source);
        self.process_imports(config, source, imports, true)?;

        for annotation in &source.annotations {
            if let Annotation::ImportResource { locations, reader } = annotation {
                for location in locations {
                    config.add_imported_resource(location.clone(), reader.clone());
                }
            }
        }

        for method in source.bean_methods() {
            config.add_bean_method(BeanMethod::new(method.clone(), source.name.clone()));
        }
        self.process_interfaces(config, source);

        if let Some(superclass) = &source.superclass {
            if !self.known_superclasses.contains_key(superclass) {
                if let Some(metadata) = self.reader.class_metadata(superclass) {
                    self.known_superclasses
                        .insert(superclass.clone(), config.name().to_string());
                    return Ok(Some(metadata));
                }
                tracing::debug!("Superclass {} of {} is not known, stopping", superclass, source.name);
            }
        }
        Ok(None)
    }

    /// 嵌套的配置类，按 `Order` 排序后当作被外层导入处理
    fn process_member_classes(
        &mut self,
        config: &mut ConfigurationClass,
        source: &ClassMetadata,
    ) -> ContainerResult<()> {
        let reader = self.reader.as_ref();
        let mut candidates: Vec<Arc<ClassMetadata>> = source
            .member_classes
            .iter()
            .filter_map(|name| reader.class_metadata(name))
            .filter(|member| member.name != config.name() && is_configuration_candidate(reader, member))
            .collect();
        candidates.sort_by_key(|member| {
            find_merged(reader, &member.annotations, &|a| match a {
                Annotation::Order(order) => Some(*order),
                _ => None,
            })
            .unwrap_or(i32::MAX)
        });

        for member in candidates {
            if self.import_stack.contains(member.name.as_str()) {
                let problem = Problem::circular_import(config.name(), &member.name, self.import_stack.as_slice());
                self.problems.error(problem);
                continue;
            }
            self.import_stack.push(config.name());
            let result = self.process_configuration_class(ConfigurationClass::imported(member, config.name()));
            self.import_stack.pop();
            result?;
        }
        Ok(())
    }

    fn process_property_source(&mut self, spec: &PropertySourceSpec, source: &ClassMetadata) -> ContainerResult<()> {
        if spec.locations.is_empty() {
            return Err(ContainerError::BeanDefinitionStore(format!(
                "At least one property source location is required on [{}]",
                source.name
            )));
        }

        let mut loaded = Vec::new();
        for location in &spec.locations {
            let resolved = self.environment.resolve_required_placeholders(location)?;
            let name = if spec.locations.len() == 1 { spec.name.as_deref() } else { None };
            match load_property_source(self.resource_loader.as_ref(), &resolved, name) {
                Ok(property_source) => loaded.push(property_source),
                Err(ContainerError::ResourceLoading { message, .. }) if spec.ignore_resource_not_found => {
                    tracing::info!("Properties location [{}] not resolvable: {}", resolved, message);
                }
                Err(e) => return Err(e),
            }
        }

        match (&spec.name, loaded.len()) {
            (Some(name), n) if n > 1 => {
                // 同一个指令里后面的位置覆盖前面的
                let mut composite = CompositePropertySource::new(name.clone());
                for property_source in loaded {
                    composite.add_first_property_source(property_source);
                }
                self.add_property_source(Arc::new(composite));
            }
            _ => {
                for property_source in loaded {
                    self.add_property_source(property_source);
                }
            }
        }
        Ok(())
    }

    /// 按发现顺序追加到环境末尾；同名的属性源合并为复合属性源，先加入的优先
    fn add_property_source(&mut self, property_source: Arc<dyn PropertySource>) {
        let Some(environment) = self.environment.as_configurable() else {
            return;
        };
        let name = property_source.name().to_string();
        let known = self.property_source_names.contains(&name);

        let result = environment.with_property_sources(|sources| match sources.get(&name) {
            Some(existing) if known => {
                let mut composite = CompositePropertySource::new(name.clone());
                composite.add_property_source(existing);
                composite.add_property_source(property_source);
                sources.replace(&name, Arc::new(composite))
            }
            _ => {
                sources.add_last(property_source);
                Ok(())
            }
        });
        if let Err(e) = result {
            tracing::warn!("Failed to register property source '{}': {}", name, e);
            return;
        }
        tracing::debug!("Added property source '{}'", name);
        if !known {
            self.property_source_names.push(name);
        }
    }

    fn component_scan(
        &self,
        spec: &ComponentScanSpec,
        declaring: &ClassMetadata,
    ) -> ContainerResult<Vec<(String, crate::bean::BeanDefinition)>> {
        let mut scanner = ClassPathBeanDefinitionScanner::from_spec(
            Arc::clone(&self.reader),
            Arc::clone(&self.environment),
            spec,
        );
        let declaring_name = declaring.name.clone();
        scanner.add_exclude_filter(TypeFilter::custom(move |class, _| class.name == declaring_name));

        let mut packages = Vec::new();
        for package in &spec.base_packages {
            let resolved = self.environment.resolve_placeholders(package);
            packages.extend(
                resolved
                    .split([',', ';'])
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            );
        }
        for class_name in &spec.base_package_classes {
            packages.push(naming::package_name(class_name).to_string());
        }
        if packages.is_empty() {
            packages.push(declaring.package_name().to_string());
        }
        scanner.scan(self.registry, &packages)
    }

    /// 收集类上（包括元注解上）声明的全部导入
    fn collect_imports(&self, source: &ClassMetadata) -> Vec<String> {
        let mut imports = Vec::new();
        let mut visited = HashSet::new();
        self.collect_imports_from(&source.annotations, &mut imports, &mut visited);
        imports
    }

    fn collect_imports_from(&self, annotations: &[Annotation], imports: &mut Vec<String>, visited: &mut HashSet<String>) {
        for annotation in annotations {
            if let Annotation::Meta(annotation_type) = annotation {
                if visited.insert(annotation_type.clone()) {
                    if let Some(meta) = self.reader.class_metadata(annotation_type) {
                        self.collect_imports_from(&meta.annotations, imports, visited);
                    }
                }
            }
        }
        for annotation in annotations {
            if let Annotation::Import(classes) = annotation {
                for class in classes {
                    if !imports.contains(class) {
                        imports.push(class.clone());
                    }
                }
            }
        }
    }

    fn process_imports(
        &mut self,
        config: &mut ConfigurationClass,
        source: &ClassMetadata,
        imports: Vec<String>,
        check_for_circular_imports: bool,
    ) -> ContainerResult<()> {
        if imports.is_empty() {
            return Ok(());
        }
        if check_for_circular_imports && self.import_stack.contains(config.name()) {
            let importing = self
                .import_stack
                .as_slice()
                .last()
                .cloned()
                .unwrap_or_else(|| config.name().to_string());
            let problem = Problem::circular_import(&importing, config.name(), self.import_stack.as_slice());
            self.problems.error(problem);
            return Ok(());
        }

        self.import_stack.push(config.name());
        let result = self.process_import_candidates(config, source, imports);
        self.import_stack.pop();
        result
    }

    fn process_import_candidates(
        &mut self,
        config: &mut ConfigurationClass,
        source: &ClassMetadata,
        imports: Vec<String>,
    ) -> ContainerResult<()> {
        for candidate_name in imports {
            let candidate = self.reader.class_metadata(&candidate_name).ok_or_else(|| {
                ContainerError::InvalidConfigurationImport {
                    class_name: candidate_name.clone(),
                    importing_class: config.name().to_string(),
                    reason: "class is not known to the metadata reader".to_string(),
                }
            })?;

            match &candidate.capability {
                Some(ClassCapability::ImportSelector(factory)) => {
                    let mut selector = factory();
                    selector.set_environment(Arc::clone(&self.environment));
                    selector.set_resource_loader(Arc::clone(&self.resource_loader));
                    selector.set_metadata_reader(Arc::clone(&self.reader));
                    let selected = selector.select_imports(source);
                    tracing::debug!("Import selector {} selected {:?}", candidate.name, selected);
                    self.process_imports(config, source, selected, false)?;
                }
                Some(ClassCapability::ImportRegistrar(factory)) => {
                    let mut registrar = factory();
                    registrar.set_environment(Arc::clone(&self.environment));
                    registrar.set_resource_loader(Arc::clone(&self.resource_loader));
                    registrar.set_metadata_reader(Arc::clone(&self.reader));
                    config.add_registrar(registrar);
                }
                None => {
                    if !is_configuration_candidate(self.reader.as_ref(), &candidate) {
                        return Err(ContainerError::InvalidConfigurationImport {
                            class_name: candidate.name.clone(),
                            importing_class: config.name().to_string(),
                            reason: "expected a configuration class, a component or a class declaring bean methods"
                                .to_string(),
                        });
                    }
                    self.import_stack.register_import(&source.name, &candidate.name);
                    self.process_configuration_class(ConfigurationClass::imported(candidate, config.name()))?;
                }
            }
        }
        Ok(())
    }

    /// 接口上带实现的 bean 方法
    fn process_interfaces(&self, config: &mut ConfigurationClass, source: &ClassMetadata) {
        let mut visited = HashSet::new();
        self.process_interfaces_of(config, &source.interfaces, &mut visited);
    }

    fn process_interfaces_of(&self, config: &mut ConfigurationClass, interfaces: &[String], visited: &mut HashSet<String>) {
        for interface in interfaces {
            if !visited.insert(interface.clone()) {
                continue;
            }
            let Some(metadata) = self.reader.class_metadata(interface) else {
                continue;
            };
            for method in metadata.bean_methods() {
                if method.invoker.is_some() && !method.is_static {
                    config.add_bean_method(BeanMethod::new(method.clone(), metadata.name.clone()));
                }
            }
            self.process_interfaces_of(config, &metadata.interfaces, visited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::imports::ImportSelector;
    use crate::annotation::problems::ProblemKind;
    use crate::config::Environment;
    use crate::metadata::{ClassIndex, MethodMetadata};
    use crate::registry::SimpleBeanDefinitionRegistry;
    use crate::resource::StaticResourceLoader;

    fn bean_method(name: &str) -> MethodMetadata {
        MethodMetadata::new(name)
            .with_annotation(Annotation::bean())
            .shared::<()>(|_, _| Ok(None))
    }

    fn parse(
        index: ClassIndex,
        loader: StaticResourceLoader,
        seeds: &[(&str, &str)],
    ) -> (ContainerResult<Vec<ConfigurationClass>>, Arc<Environment>, SimpleBeanDefinitionRegistry) {
        let environment = Arc::new(Environment::new());
        let registry = SimpleBeanDefinitionRegistry::new();
        let seeds: Vec<(String, String)> = seeds.iter().map(|(b, c)| (b.to_string(), c.to_string())).collect();
        let result = {
            let mut parser = ConfigurationClassParser::new(
                Arc::new(index),
                environment.clone(),
                Arc::new(loader),
                &registry,
            );
            parser
                .parse(&seeds)
                .and_then(|_| parser.validate())
                .map(|_| parser.into_configuration_classes())
        };
        (result, environment, registry)
    }

    #[test]
    fn test_circular_import_is_reported() {
        let index = ClassIndex::with_classes([
            ClassMetadata::new("app::A")
                .with_annotation(Annotation::Configuration)
                .with_annotation(Annotation::import(&["app::B"])),
            ClassMetadata::new("app::B")
                .with_annotation(Annotation::Configuration)
                .with_annotation(Annotation::import(&["app::A"])),
        ]);
        let (result, _, _) = parse(index, StaticResourceLoader::new(), &[("a", "app::A")]);
        match result {
            Err(ContainerError::Configuration(problems)) => {
                assert_eq!(problems.len(), 1);
                assert_eq!(problems[0].kind, ProblemKind::CircularImport);
                assert!(problems[0].message.contains("app::A"));
            }
            other => panic!("expected circular import problem, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_import_fails_fast() {
        let index = ClassIndex::with_classes([
            ClassMetadata::new("app::A")
                .with_annotation(Annotation::Configuration)
                .with_annotation(Annotation::import(&["app::Plain"])),
            ClassMetadata::new("app::Plain"),
        ]);
        let (result, _, _) = parse(index, StaticResourceLoader::new(), &[("a", "app::A")]);
        assert!(matches!(
            result,
            Err(ContainerError::InvalidConfigurationImport { ref class_name, .. }) if class_name == "app::Plain"
        ));
    }

    #[test]
    fn test_imports_nested_classes_and_superclass_methods() {
        let index = ClassIndex::with_classes([
            ClassMetadata::new("app::Base").with_method(bean_method("clock")),
            ClassMetadata::new("app::Root")
                .with_annotation(Annotation::Configuration)
                .extends("app::Base")
                .with_member_class("app::Root::Inner")
                .with_annotation(Annotation::import(&["app::Data"]))
                .with_method(bean_method("root_bean")),
            ClassMetadata::new("app::Root::Inner")
                .with_annotation(Annotation::Configuration)
                .with_method(bean_method("inner_bean")),
            ClassMetadata::new("app::Data").with_method(bean_method("data_source")),
        ]);
        let (result, _, _) = parse(index, StaticResourceLoader::new(), &[("root", "app::Root")]);
        let classes = result.unwrap();
        let names: Vec<&str> = classes.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["app::Root::Inner", "app::Data", "app::Root"]);

        let root = &classes[2];
        assert_eq!(root.bean_name(), Some("root"));
        let methods: Vec<(&str, &str)> = root
            .bean_methods()
            .iter()
            .map(|m| (m.name(), m.declaring_class.as_str()))
            .collect();
        assert_eq!(methods, vec![("root_bean", "app::Root"), ("clock", "app::Base")]);
        assert_eq!(classes[1].imported_by(), &["app::Root".to_string()]);
    }

    #[test]
    fn test_lite_configuration_processes_member_classes() {
        let index = ClassIndex::with_classes([
            ClassMetadata::new("app::Lite")
                .with_member_class("app::Lite::Inner")
                .with_method(bean_method("lite_bean")),
            ClassMetadata::new("app::Lite::Inner")
                .with_annotation(Annotation::Configuration)
                .with_method(bean_method("inner_bean")),
        ]);
        let (result, _, _) = parse(index, StaticResourceLoader::new(), &[("lite", "app::Lite")]);
        let classes = result.unwrap();
        let names: Vec<&str> = classes.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["app::Lite::Inner", "app::Lite"]);

        let inner: Vec<&str> = classes[0].bean_methods().iter().map(|m| m.name()).collect();
        assert_eq!(inner, vec!["inner_bean"]);
        assert_eq!(classes[0].imported_by(), &["app::Lite".to_string()]);
    }

    #[test]
    fn test_earlier_property_sources_take_precedence() {
        let index = ClassIndex::with_classes([
            ClassMetadata::new("app::First")
                .with_annotation(Annotation::Configuration)
                .with_annotation(Annotation::PropertySource(PropertySourceSpec::locations(&["first.toml"]))),
            ClassMetadata::new("app::Second")
                .with_annotation(Annotation::Configuration)
                .with_annotation(Annotation::PropertySource(PropertySourceSpec {
                    name: Some("second".into()),
                    locations: vec!["${profile_dir:base}/a.toml".into(), "b.toml".into(), "missing.toml".into()],
                    ignore_resource_not_found: true,
                })),
        ]);
        let loader = StaticResourceLoader::new()
            .with_resource("first.toml", "shared = \"first\"")
            .with_resource("base/a.toml", "shared = \"a\"\nonly_a = \"a\"\nab = \"a\"")
            .with_resource("b.toml", "ab = \"b\"");
        let (result, environment, _) = parse(index, loader, &[("first", "app::First"), ("second", "app::Second")]);
        result.unwrap();

        assert_eq!(environment.get_string("shared").as_deref(), Some("first"));
        assert_eq!(environment.get_string("only_a").as_deref(), Some("a"));
        assert_eq!(environment.get_string("ab").as_deref(), Some("b"));
    }

    #[test]
    fn test_missing_property_source_is_an_error() {
        let index = ClassIndex::with_classes([ClassMetadata::new("app::Config")
            .with_annotation(Annotation::Configuration)
            .with_annotation(Annotation::PropertySource(PropertySourceSpec::locations(&["nope.toml"])))]);
        let (result, _, _) = parse(index, StaticResourceLoader::new(), &[("config", "app::Config")]);
        assert!(matches!(result, Err(ContainerError::ResourceLoading { .. })));
    }

    struct DataSelector;

    impl ImportSelector for DataSelector {
        fn select_imports(&self, importing_class: &ClassMetadata) -> Vec<String> {
            assert_eq!(importing_class.name, "app::Root");
            vec!["app::Data".to_string()]
        }
    }

    #[test]
    fn test_scan_and_selector_imports() {
        let index = ClassIndex::with_classes([
            ClassMetadata::new("app::Root")
                .with_annotation(Annotation::Configuration)
                .with_annotation(Annotation::ComponentScan(ComponentScanSpec::declaring_package()))
                .with_annotation(Annotation::import(&["app::Selector"])),
            ClassMetadata::new("app::Selector").import_selector(|| DataSelector),
            ClassMetadata::new("app::Data").with_method(bean_method("data_source")),
            ClassMetadata::new("app::web::WebConfig")
                .with_annotation(Annotation::Configuration)
                .with_method(bean_method("router")),
            ClassMetadata::new("app::web::Handler").with_annotation(Annotation::Component(None)),
        ]);
        let (result, _, registry) = parse(index, StaticResourceLoader::new(), &[("root", "app::Root")]);
        let classes = result.unwrap();
        let names: Vec<&str> = classes.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["app::web::WebConfig", "app::Data", "app::Root"]);

        assert!(registry.contains_bean_definition("handler"));
        assert!(registry.contains_bean_definition("webConfig"));
        assert!(!registry.contains_bean_definition("root"));
        assert_eq!(classes[0].bean_name(), Some("webConfig"));
    }
}
