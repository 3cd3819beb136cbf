use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::annotation::ConfigurationClassPostProcessor;
use crate::bean::{BeanDefinition, BeanObject, BeanOrigin, Role};
use crate::bean_factory::DefaultListableBeanFactory;
use crate::config::{ContainerSettings, Environment};
use crate::constants::{
    AUTOWIRED_ANNOTATION_PROCESSOR_BEAN_NAME, AUTOWIRED_ANNOTATION_PROCESSOR_TYPE_NAME, ENVIRONMENT_BEAN_NAME,
    ENVIRONMENT_TYPE_NAME, MAPPING_REGISTRY_BEAN_NAME,
};
use crate::error::{ContainerError, ContainerResult};
use crate::lifecycle::{find_post_processor_factory, BeanFactoryPostProcessor, BeanPostProcessor};
use crate::mapping::MappingRegistry;
use crate::metadata::MetadataReader;
use crate::registry::BeanDefinitionRegistry;
use crate::resource::ResourceLoader;
use crate::utils::dependency::validate_dependency_graph;

/// Shutdown hook类型
pub type ShutdownHook = Box<dyn Fn() -> ContainerResult<()> + Send + Sync>;

const MAPPING_REGISTRY_TYPE_NAME: &str = "lattice_core::mapping::MappingRegistry";

/// 应用上下文
///
/// 持有 BeanFactory、Environment 和资源加载器，`refresh` 把注册的定义变成可用的 Bean：
/// 基础设施定义 → 工厂后处理器（配置类处理）→ Bean 后处理器 → 映射检测 → 预实例化单例
pub struct ApplicationContext {
    /// Bean 工厂 - 负责 Bean 的创建和管理
    bean_factory: Arc<DefaultListableBeanFactory>,

    /// 配置环境
    environment: Arc<Environment>,

    resource_loader: Arc<dyn ResourceLoader>,

    /// Bean 工厂后置处理器列表（按优先级排序）
    bean_factory_post_processors: RwLock<Vec<Arc<dyn BeanFactoryPostProcessor>>>,

    mapping_registry: Arc<MappingRegistry>,

    /// Shutdown hooks
    shutdown_hooks: RwLock<Vec<ShutdownHook>>,

    /// 应用名称
    app_name: RwLock<Option<String>>,

    active: AtomicBool,
    closed: AtomicBool,
}

impl ApplicationContext {
    pub fn new(
        reader: Arc<dyn MetadataReader>,
        environment: Arc<Environment>,
        resource_loader: Arc<dyn ResourceLoader>,
    ) -> Self {
        let bean_factory = Arc::new(DefaultListableBeanFactory::new(reader, Arc::clone(&environment)));
        let context = Self {
            bean_factory,
            environment,
            resource_loader,
            bean_factory_post_processors: RwLock::new(Vec::new()),
            mapping_registry: Arc::new(MappingRegistry::new()),
            shutdown_hooks: RwLock::new(Vec::new()),
            app_name: RwLock::new(None),
            active: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        };
        let configuration_processor = ConfigurationClassPostProcessor::new(
            Arc::clone(context.bean_factory.metadata_reader()),
            context.environment.clone(),
            Arc::clone(&context.resource_loader),
        );
        context.add_bean_factory_post_processor(Arc::new(configuration_processor));
        context
    }

    /// 获取内部的 BeanFactory
    pub fn bean_factory(&self) -> &Arc<DefaultListableBeanFactory> {
        &self.bean_factory
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn resource_loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.resource_loader
    }

    pub fn mapping_registry(&self) -> &Arc<MappingRegistry> {
        &self.mapping_registry
    }

    /// 设置应用名称
    pub fn set_app_name(&self, name: impl Into<String>) {
        *self.app_name.write() = Some(name.into());
    }

    /// 获取应用名称
    pub fn app_name(&self) -> Option<String> {
        self.app_name.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// 注册 shutdown hook
    ///
    /// Shutdown hook 会在应用关闭时按注册顺序执行
    pub fn register_shutdown_hook<F>(&self, hook: F)
    where
        F: Fn() -> ContainerResult<()> + Send + Sync + 'static,
    {
        let mut hooks = self.shutdown_hooks.write();
        hooks.push(Box::new(hook));
        tracing::debug!("Registered shutdown hook, total: {}", hooks.len());
    }

    /// 注册 BeanPostProcessor
    pub fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        self.bean_factory.add_bean_post_processor(processor);
    }

    /// 注册 BeanFactoryPostProcessor，按 order 排序
    pub fn add_bean_factory_post_processor(&self, processor: Arc<dyn BeanFactoryPostProcessor>) {
        let mut processors = self.bean_factory_post_processors.write();
        tracing::debug!(
            "Registered BeanFactoryPostProcessor '{}' with order {}",
            processor.name(),
            processor.order()
        );
        processors.push(processor);
        processors.sort_by_key(|p| p.order());
    }

    pub fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> ContainerResult<()> {
        self.bean_factory.register_bean_definition(name, definition)
    }

    /// 刷新上下文，只能调用一次
    pub fn refresh(&self) -> ContainerResult<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(ContainerError::IllegalState(
                "ApplicationContext has already been refreshed".to_string(),
            ));
        }
        tracing::info!(
            "Refreshing application context{}",
            self.app_name().map(|n| format!(" '{}'", n)).unwrap_or_default()
        );

        if let Err(e) = self.do_refresh() {
            tracing::error!("Application context refresh failed: {}", e);
            self.bean_factory.destroy_singletons();
            self.active.store(false, Ordering::SeqCst);
            return Err(e);
        }
        tracing::info!(
            "Application context refreshed with {} bean definitions",
            self.bean_factory.bean_definition_count()
        );
        Ok(())
    }

    fn do_refresh(&self) -> ContainerResult<()> {
        let settings = ContainerSettings::from_environment(&self.environment)?;
        self.bean_factory
            .set_allow_bean_definition_overriding(settings.allow_bean_definition_overriding);

        self.register_infrastructure()?;
        self.invoke_bean_factory_post_processors()?;
        self.register_bean_post_processors()?;

        self.mapping_registry.detect_handler_methods(&self.bean_factory)?;
        self.validate_dependencies()?;

        if settings.lazy_initialization {
            self.apply_lazy_initialization()?;
        }
        self.bean_factory.freeze_configuration();
        self.bean_factory.preinstantiate_singletons()
    }

    /// 容器内部组件：Environment、映射注册表和依赖注入处理器的定义
    fn register_infrastructure(&self) -> ContainerResult<()> {
        let factory = &self.bean_factory;
        if !factory.contains_singleton(ENVIRONMENT_BEAN_NAME) {
            let environment: BeanObject = self.environment.clone();
            factory.register_singleton(ENVIRONMENT_BEAN_NAME, ENVIRONMENT_TYPE_NAME, environment)?;
        }
        if !factory.contains_singleton(MAPPING_REGISTRY_BEAN_NAME) {
            let registry: BeanObject = self.mapping_registry.clone();
            factory.register_singleton(MAPPING_REGISTRY_BEAN_NAME, MAPPING_REGISTRY_TYPE_NAME, registry)?;
        }
        if !factory.contains_bean_definition(AUTOWIRED_ANNOTATION_PROCESSOR_BEAN_NAME) {
            factory.register_bean_definition(
                AUTOWIRED_ANNOTATION_PROCESSOR_BEAN_NAME,
                BeanDefinition::for_class(AUTOWIRED_ANNOTATION_PROCESSOR_TYPE_NAME)
                    .with_role(Role::Infrastructure)
                    .with_origin(BeanOrigin::Infrastructure)
                    .with_autowire_candidate(false),
            )?;
        }
        Ok(())
    }

    /// 先运行全部注册表阶段，再运行全部工厂阶段
    fn invoke_bean_factory_post_processors(&self) -> ContainerResult<()> {
        let processors = self.bean_factory_post_processors.read().clone();
        tracing::debug!("Invoking {} BeanFactoryPostProcessor(s)", processors.len());

        for processor in &processors {
            tracing::trace!("Registry phase: {}", processor.name());
            processor.post_process_bean_definition_registry(&*self.bean_factory)?;
        }
        for processor in &processors {
            tracing::trace!("Factory phase: {}", processor.name());
            processor.post_process_bean_factory(&self.bean_factory)?;
        }
        Ok(())
    }

    /// 按基础设施定义创建 BeanPostProcessor
    fn register_bean_post_processors(&self) -> ContainerResult<()> {
        let factory = &self.bean_factory;
        let mut created = 0;
        for name in factory.bean_definition_names() {
            let definition = factory.merged_bean_definition(&name)?;
            let Some(class_name) = definition.bean_class_name.as_deref() else {
                continue;
            };
            let Some(create) = find_post_processor_factory(class_name) else {
                continue;
            };
            if factory.contains_singleton(&name) {
                continue;
            }
            let processor = create(&definition)?;
            processor.set_bean_factory(factory)?;
            let bean: BeanObject = Arc::new(Arc::clone(&processor));
            factory.register_singleton(&name, class_name, bean)?;
            tracing::debug!("Registered BeanPostProcessor '{}' ({})", name, processor.name());
            factory.add_bean_post_processor(processor);
            created += 1;
        }
        tracing::info!(
            "Registered {} BeanPostProcessor(s) from definitions, {} active",
            created,
            factory.get_bean_post_processors().len()
        );
        Ok(())
    }

    fn apply_lazy_initialization(&self) -> ContainerResult<()> {
        for name in self.bean_factory.bean_definition_names() {
            let definition = self.bean_factory.merged_bean_definition(&name)?;
            if definition.role != Role::Infrastructure && !definition.lazy_init {
                self.bean_factory.modify_bean_definition(&name, |d| d.lazy_init = true)?;
            }
        }
        Ok(())
    }

    /// 校验 depends_on 声明：依赖的 Bean 必须存在且没有环
    pub fn validate_dependencies(&self) -> ContainerResult<()> {
        let graph = self.bean_factory.get_depends_on_graph();
        validate_dependency_graph(&graph, |name| self.bean_factory.contains_bean(name))
            .map_err(|e| ContainerError::BeanDefinitionStore(e.to_string()))?;
        tracing::debug!("Dependency validation passed for {} bean(s)", graph.len());
        Ok(())
    }

    pub fn get_bean(&self, name: &str) -> ContainerResult<BeanObject> {
        self.bean_factory.get_bean(name)
    }

    pub fn get_bean_typed<T: Any + Send + Sync>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.bean_factory.get_bean_typed::<T>(name)
    }

    pub fn get_bean_of_type(&self, type_name: &str) -> ContainerResult<BeanObject> {
        self.bean_factory.get_bean_of_type(type_name)
    }

    pub fn get_beans_of_type(&self, type_name: &str) -> ContainerResult<Vec<(String, BeanObject)>> {
        self.bean_factory.get_beans_of_type(type_name)
    }

    pub fn contains_bean(&self, name: &str) -> bool {
        self.bean_factory.contains_bean(name)
    }

    pub fn bean_definition_names(&self) -> Vec<String> {
        self.bean_factory.bean_definition_names()
    }

    /// 关闭上下文：执行 shutdown hooks，按依赖顺序销毁单例
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Closing application context");

        let hooks = self.shutdown_hooks.read();
        tracing::debug!("Executing {} shutdown hook(s)", hooks.len());
        for (idx, hook) in hooks.iter().enumerate() {
            match hook() {
                Ok(_) => tracing::debug!("Shutdown hook {} executed successfully", idx + 1),
                Err(e) => tracing::warn!("Shutdown hook {} failed: {}", idx + 1, e),
            }
        }
        drop(hooks);

        self.bean_factory.destroy_singletons();
        self.active.store(false, Ordering::SeqCst);
        tracing::info!("Application context closed");
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("app_name", &self.app_name())
            .field("active", &self.is_active())
            .field("bean_definitions", &self.bean_factory.bean_definition_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapPropertySource;
    use crate::metadata::{
        arg, Annotation, BeanAttributes, ClassIndex, ClassMetadata, ConstructorMetadata, FieldMetadata, MethodMetadata,
        ParameterMetadata, PropertySourceSpec,
    };
    use crate::resource::StaticResourceLoader;
    use std::sync::atomic::AtomicUsize;

    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    struct AppConfig;

    struct Clock {
        zone: String,
    }

    #[derive(Default)]
    struct Greeter {
        clock: Option<Arc<Clock>>,
        greeting: Option<Arc<String>>,
    }

    impl Greeter {
        fn greet(&self) -> String {
            format!(
                "{} from {}",
                self.greeting.as_deref().map(String::as_str).unwrap_or("?"),
                self.clock.as_ref().map(|c| c.zone.as_str()).unwrap_or("?")
            )
        }
    }

    fn index() -> Arc<ClassIndex> {
        Arc::new(ClassIndex::with_classes([
            ClassMetadata::new("app::AppConfig")
                .with_annotation(Annotation::Configuration)
                .with_annotation(Annotation::PropertySource(PropertySourceSpec::locations(&["app.toml"])))
                .with_constructor(ConstructorMetadata::default_of::<AppConfig>())
                .with_method(
                    MethodMetadata::new("clock")
                        .with_annotation(Annotation::bean())
                        .with_parameter(ParameterMetadata::new("zone", "String").with_annotation(Annotation::Value("${app.zone}".into())))
                        .returns("app::Clock")
                        .shared::<AppConfig>(|_, args| {
                            let zone = arg::<String>(&args, 0)?;
                            Ok(Some(Arc::new(Clock { zone: zone.to_string() }) as BeanObject))
                        }),
                )
                .with_method(
                    MethodMetadata::new("greeter")
                        .with_annotation(Annotation::Bean(BeanAttributes {
                            destroy_method: Some("close".into()),
                            ..Default::default()
                        }))
                        .returns("app::Greeter")
                        .shared::<AppConfig>(|_, _| Ok(Some(Arc::new(Greeter::default()) as BeanObject))),
                ),
            ClassMetadata::new("app::Clock"),
            ClassMetadata::new("app::Greeter")
                .with_field(FieldMetadata::new::<Greeter, Clock>("clock", "app::Clock", |g, v| g.clock = Some(v)).with_annotation(Annotation::autowired()))
                .with_field(
                    FieldMetadata::new::<Greeter, String>("greeting", "String", |g, v| g.greeting = Some(v))
                        .with_annotation(Annotation::Value("${app.greeting:hello}".into())),
                )
                .with_method(MethodMetadata::new("close").shared::<Greeter>(|_, _| {
                    DESTROYED.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })),
        ]))
    }

    fn context() -> ApplicationContext {
        let environment = Arc::new(Environment::new());
        environment.add_property_source(Arc::new(MapPropertySource::new("overrides").with_property("app.greeting", "hi")));
        let loader = StaticResourceLoader::new().with_resource("app.toml", "[app]\nzone = \"UTC\"\ngreeting = \"hey\"");
        let context = ApplicationContext::new(index(), environment, Arc::new(loader));
        context
            .register_bean_definition("appConfig", BeanDefinition::for_class("app::AppConfig"))
            .unwrap();
        context
    }

    #[test]
    fn test_refresh_runs_configuration_and_injection() {
        let context = context();
        context.refresh().unwrap();

        let greeter = context.get_bean_typed::<Greeter>("greeter").unwrap();
        assert_eq!(greeter.greet(), "hi from UTC");
        assert!(context.contains_bean(ENVIRONMENT_BEAN_NAME));
        assert!(context.bean_factory().contains_singleton(AUTOWIRED_ANNOTATION_PROCESSOR_BEAN_NAME));
        assert!(matches!(context.refresh(), Err(ContainerError::IllegalState(_))));

        let before = DESTROYED.load(Ordering::SeqCst);
        context.close();
        context.close();
        assert_eq!(DESTROYED.load(Ordering::SeqCst), before + 1);
        assert!(!context.is_active());
    }

    #[test]
    fn test_failed_refresh_reports_and_resets() {
        let context = context();
        context
            .register_bean_definition("broken", BeanDefinition::for_class("app::Clock").with_depends_on(vec!["ghost".into()]))
            .unwrap();
        let err = context.refresh().unwrap_err();
        assert!(err.to_string().contains("ghost"));
        assert!(!context.is_active());
    }
}
