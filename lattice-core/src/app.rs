use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::annotation::{AnnotationBeanNameGenerator, BeanNameGenerator};
use crate::bean::BeanDefinition;
use crate::config::{Environment, EnvironmentPropertySource, TomlPropertySource};
use crate::context::ApplicationContext;
use crate::error::{ApplicationError, ApplicationResult};
use crate::logging::LoggingConfig;
use crate::metadata::{ClassIndex, MetadataReader};
use crate::resource::{FileSystemResourceLoader, ResourceLoader};

type Initializer = Box<dyn Fn(&ApplicationContext) -> ApplicationResult<()> + Send + Sync>;

/// Lattice 应用程序
///
/// 组装 Environment、资源加载器和种子定义，然后刷新上下文
pub struct LatticeApplication {
    /// 应用名称
    name: String,

    /// 配置文件路径
    config_files: Vec<String>,

    /// 环境变量前缀
    env_prefix: String,

    /// 激活的 profiles
    profiles: Vec<String>,

    logging_config: Option<LoggingConfig>,

    /// 是否安装全局日志订阅者
    init_logging: bool,

    reader: Option<Arc<dyn MetadataReader>>,
    resource_loader: Option<Arc<dyn ResourceLoader>>,

    /// 种子类，通常是根配置类
    sources: Vec<String>,
    definitions: Vec<(String, BeanDefinition)>,

    /// 刷新之前执行
    initializers: Vec<Initializer>,
}

impl LatticeApplication {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_files: vec!["application.toml".to_string()],
            env_prefix: "APP_".to_string(),
            profiles: Vec::new(),
            logging_config: None,
            init_logging: true,
            reader: None,
            resource_loader: None,
            sources: Vec::new(),
            definitions: Vec::new(),
            initializers: Vec::new(),
        }
    }

    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_files = vec![path.into()];
        self
    }

    pub fn config_files(mut self, paths: Vec<String>) -> Self {
        self.config_files = paths;
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn profiles(mut self, profiles: Vec<String>) -> Self {
        self.profiles = profiles;
        self
    }

    /// 不设置时使用环境变量加 `logging.*` 配置键
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self
    }

    /// 关闭日志初始化（由调用方自己安装订阅者）
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// 类元数据来源，默认收集 inventory 提交的类
    pub fn metadata_reader(mut self, reader: Arc<dyn MetadataReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn resource_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.resource_loader = Some(loader);
        self
    }

    /// 添加种子类，Bean 名称由类上的组件名或简单类名生成
    pub fn source(mut self, class_name: impl Into<String>) -> Self {
        self.sources.push(class_name.into());
        self
    }

    pub fn bean_definition(mut self, name: impl Into<String>, definition: BeanDefinition) -> Self {
        self.definitions.push((name.into(), definition));
        self
    }

    pub fn initializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&ApplicationContext) -> ApplicationResult<()> + Send + Sync + 'static,
    {
        self.initializers.push(Box::new(f));
        self
    }

    /// 运行应用，返回刷新完成的上下文
    pub fn run(self) -> ApplicationResult<Arc<ApplicationContext>> {
        let start_time = Instant::now();
        let environment = Arc::new(Environment::new());

        // 环境变量优先级最高
        environment.add_property_source(Arc::new(EnvironmentPropertySource::new(&self.env_prefix)));

        let active_profiles = self.resolve_active_profiles();
        self.load_configurations(&environment, &active_profiles)?;
        if !active_profiles.is_empty() {
            environment.set_active_profiles(active_profiles);
        }

        if self.init_logging {
            let base = self.logging_config.clone().unwrap_or_else(LoggingConfig::from_env);
            base.with_environment(&environment)?.init()?;
        }
        tracing::info!("Starting {} application", self.name);
        let profiles = environment.get_active_profiles();
        if profiles.is_empty() {
            tracing::info!("No active profiles set, falling back to default profiles");
        } else {
            tracing::info!("Active profiles: {:?}", profiles);
        }

        let reader = self.reader.clone().unwrap_or_else(|| Arc::new(ClassIndex::from_inventory()) as Arc<dyn MetadataReader>);
        let loader = self
            .resource_loader
            .clone()
            .unwrap_or_else(|| Arc::new(FileSystemResourceLoader::default()) as Arc<dyn ResourceLoader>);
        let context = ApplicationContext::new(Arc::clone(&reader), environment, loader);
        context.set_app_name(self.name.clone());

        let generator = AnnotationBeanNameGenerator;
        for class_name in &self.sources {
            let class = reader.require(class_name)?;
            let bean_name = generator.generate_bean_name(&class, reader.as_ref());
            tracing::debug!("Registering source class {} as '{}'", class_name, bean_name);
            context.register_bean_definition(&bean_name, BeanDefinition::for_class(class_name.as_str()))?;
        }
        for (name, definition) in &self.definitions {
            context.register_bean_definition(name, definition.clone())?;
        }

        for initializer in &self.initializers {
            initializer(&context)?;
        }

        context.refresh()?;
        tracing::info!("Started {} in {}ms", self.name, start_time.elapsed().as_millis());
        Ok(Arc::new(context))
    }

    /// 代码设置 > 环境变量 `{prefix}PROFILES_ACTIVE`；都没有时交给 `lattice.profiles.active`
    fn resolve_active_profiles(&self) -> Vec<String> {
        if !self.profiles.is_empty() {
            return self.profiles.clone();
        }
        std::env::var(format!("{}PROFILES_ACTIVE", self.env_prefix))
            .map(|value| {
                value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// profile 文件排在基础文件前面，后激活的 profile 优先
    fn load_configurations(&self, environment: &Environment, active_profiles: &[String]) -> ApplicationResult<()> {
        for profile in active_profiles.iter().rev() {
            for base in &self.config_files {
                self.try_load_config_file(environment, &profile_config_path(base, profile))?;
            }
        }
        for base in &self.config_files {
            self.try_load_config_file(environment, Path::new(base))?;
        }
        Ok(())
    }

    fn try_load_config_file(&self, environment: &Environment, path: &Path) -> ApplicationResult<()> {
        if !path.exists() {
            tracing::debug!("Configuration file not found: {}", path.display());
            return Ok(());
        }
        let source = TomlPropertySource::from_file(path).map_err(|e| ApplicationError::ConfigLoadFailed(e.to_string()))?;
        environment.add_property_source(Arc::new(source));
        tracing::info!("Loaded configuration from: {}", path.display());
        Ok(())
    }
}

impl Default for LatticeApplication {
    fn default() -> Self {
        Self::new("LatticeApplication")
    }
}

/// application.toml -> application-dev.toml
fn profile_config_path(base: &str, profile: &str) -> PathBuf {
    let path = Path::new(base);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => path.with_file_name(format!(
            "{}-{}.{}",
            stem.to_string_lossy(),
            profile,
            ext.to_string_lossy()
        )),
        _ => PathBuf::from(format!("{}-{}", base, profile)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanObject;
    use crate::error::ContainerError;
    use crate::metadata::{arg, Annotation, ClassMetadata, ConstructorMetadata, MethodMetadata, ParameterMetadata};
    use std::fs;

    #[derive(Default)]
    struct RootConfig;

    fn index() -> Arc<ClassIndex> {
        Arc::new(ClassIndex::with_classes([ClassMetadata::new("demo::RootConfig")
            .with_annotation(Annotation::Configuration)
            .with_constructor(ConstructorMetadata::default_of::<RootConfig>())
            .with_method(
                MethodMetadata::new("banner")
                    .with_annotation(Annotation::bean())
                    .with_parameter(
                        ParameterMetadata::new("text", "String").with_annotation(Annotation::Value("${banner.text:plain}".into())),
                    )
                    .returns("String")
                    .shared::<RootConfig>(|_, args| {
                        let text = arg::<String>(&args, 0)?;
                        Ok(Some(Arc::new(text.to_uppercase()) as BeanObject))
                    }),
            )]))
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lattice-app-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_profile_config_path() {
        assert_eq!(profile_config_path("application.toml", "dev"), PathBuf::from("application-dev.toml"));
        assert_eq!(profile_config_path("conf/app.toml", "prod"), PathBuf::from("conf/app-prod.toml"));
        assert_eq!(profile_config_path("settings", "dev"), PathBuf::from("settings-dev"));
    }

    #[test]
    fn test_profile_file_overrides_base_file() {
        let dir = scratch_dir("profiles");
        let base = dir.join("application.toml");
        fs::write(&base, "[banner]\ntext = \"base\"\n").unwrap();
        fs::write(dir.join("application-dev.toml"), "[banner]\ntext = \"dev\"\n").unwrap();

        let context = LatticeApplication::new("demo")
            .init_logging(false)
            .env_prefix("LATTICE_APP_TEST_")
            .config_file(base.to_string_lossy().to_string())
            .profiles(vec!["dev".into()])
            .metadata_reader(index())
            .source("demo::RootConfig")
            .run()
            .unwrap();

        assert_eq!(context.app_name().as_deref(), Some("demo"));
        assert!(context.contains_bean("rootConfig"));
        assert_eq!(context.get_bean_typed::<String>("banner").unwrap().as_str(), "DEV");
        assert_eq!(context.environment().get_active_profiles(), vec!["dev".to_string()]);
        context.close();
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_files_use_defaults_and_initializers_run() {
        let context = LatticeApplication::new("defaults")
            .init_logging(false)
            .env_prefix("LATTICE_APP_TEST_")
            .config_file("does-not-exist.toml")
            .metadata_reader(index())
            .bean_definition("root", BeanDefinition::for_class("demo::RootConfig"))
            .initializer(|context| {
                context.set_app_name("renamed");
                Ok(())
            })
            .run()
            .unwrap();
        assert_eq!(context.get_bean_typed::<String>("banner").unwrap().as_str(), "PLAIN");
        assert_eq!(context.app_name().as_deref(), Some("renamed"));
    }

    #[test]
    fn test_unknown_source_class_fails() {
        let result = LatticeApplication::new("broken")
            .init_logging(false)
            .metadata_reader(index())
            .source("demo::Missing")
            .run();
        assert!(matches!(
            result,
            Err(ApplicationError::Container(ContainerError::BeanDefinitionStore(_)))
        ));
    }

    #[test]
    fn test_malformed_config_file_is_reported() {
        let dir = scratch_dir("malformed");
        let file = dir.join("application.toml");
        fs::write(&file, "[banner\ntext = ").unwrap();
        let result = LatticeApplication::new("malformed")
            .init_logging(false)
            .config_file(file.to_string_lossy().to_string())
            .metadata_reader(index())
            .run();
        assert!(matches!(result, Err(ApplicationError::ConfigLoadFailed(_))));
        fs::remove_dir_all(dir).ok();
    }
}
