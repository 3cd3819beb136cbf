//! 配置类后处理器
//!
//! 注册表阶段找出配置类候选，解析配置图并加载定义；新加载的定义中如果又出现配置类，
//! 继续下一轮，直到没有新的候选。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::annotation::candidate::{check_configuration_class_candidate, order_of};
use crate::annotation::parser::ConfigurationClassParser;
use crate::annotation::reader::{BeanDefinitionReader, BeanDefinitionReaders, ConfigurationClassBeanDefinitionReader};
use crate::bean::BeanDefinition;
use crate::bean_factory::DefaultListableBeanFactory;
use crate::config::PropertyResolver;
use crate::error::{ContainerError, ContainerResult};
use crate::lifecycle::BeanFactoryPostProcessor;
use crate::metadata::MetadataReader;
use crate::registry::BeanDefinitionRegistry;
use crate::resource::ResourceLoader;

pub struct ConfigurationClassPostProcessor {
    reader: Arc<dyn MetadataReader>,
    environment: Arc<dyn PropertyResolver>,
    resource_loader: Arc<dyn ResourceLoader>,
    readers: RwLock<BeanDefinitionReaders>,
    registry_processed: AtomicBool,
    factory_processed: AtomicBool,
}

impl ConfigurationClassPostProcessor {
    pub fn new(
        reader: Arc<dyn MetadataReader>,
        environment: Arc<dyn PropertyResolver>,
        resource_loader: Arc<dyn ResourceLoader>,
    ) -> Self {
        let readers = BeanDefinitionReaders::new(Arc::clone(&resource_loader));
        Self {
            reader,
            environment,
            resource_loader,
            readers: RwLock::new(readers),
            registry_processed: AtomicBool::new(false),
            factory_processed: AtomicBool::new(false),
        }
    }

    /// 注册额外的导入资源读取器
    pub fn register_reader(&self, reader_type: impl Into<String>, reader: Arc<dyn BeanDefinitionReader>) {
        self.readers.write().register(reader_type, reader);
    }

    /// 注册表中的配置类候选，按 `Order` 排序
    fn find_candidates(
        &self,
        registry: &dyn BeanDefinitionRegistry,
        names: &[String],
        already_parsed: &HashSet<String>,
    ) -> ContainerResult<Vec<(String, String, Option<i32>)>> {
        let mut candidates = Vec::new();
        for name in names {
            let mut definition: BeanDefinition = registry.get_bean_definition(name)?;
            let Some(class_name) = definition.bean_class_name.clone() else {
                continue;
            };
            if already_parsed.contains(&class_name) {
                continue;
            }
            if check_configuration_class_candidate(self.reader.as_ref(), &mut definition) {
                candidates.push((name.clone(), class_name, order_of(&definition)));
            }
        }
        candidates.sort_by_key(|(_, _, order)| order.unwrap_or(i32::MAX));
        Ok(candidates)
    }

    /// 解析注册表中的配置类并加载它们贡献的定义
    pub fn process_config_bean_definitions(&self, registry: &dyn BeanDefinitionRegistry) -> ContainerResult<()> {
        let mut already_parsed: HashSet<String> = HashSet::new();
        let mut known_names: HashSet<String> = registry.bean_definition_names().into_iter().collect();
        let names = registry.bean_definition_names();
        let mut candidates = self.find_candidates(registry, &names, &already_parsed)?;
        if candidates.is_empty() {
            tracing::debug!("No configuration classes found in the registry");
            return Ok(());
        }

        let readers = self.readers.read().clone();
        while !candidates.is_empty() {
            let seeds: Vec<(String, String)> = candidates
                .iter()
                .map(|(name, class, _)| (name.clone(), class.clone()))
                .collect();
            tracing::debug!("Parsing configuration classes {:?}", seeds);

            let mut parser = ConfigurationClassParser::new(
                Arc::clone(&self.reader),
                Arc::clone(&self.environment),
                Arc::clone(&self.resource_loader),
                registry,
            );
            parser.parse(&seeds)?;
            parser.validate()?;

            let mut classes = parser.into_configuration_classes();
            classes.retain(|c| !already_parsed.contains(c.name()));
            let loader = ConfigurationClassBeanDefinitionReader::new(
                registry,
                Arc::clone(&self.reader),
                Arc::clone(&self.environment),
                &readers,
            );
            loader.load_bean_definitions(&mut classes)?;
            already_parsed.extend(classes.iter().map(|c| c.name().to_string()));
            // 种子被 profile 跳过时同样不再处理
            already_parsed.extend(seeds.into_iter().map(|(_, class)| class));

            let names = registry.bean_definition_names();
            let new_names: Vec<String> = names
                .iter()
                .filter(|name| !known_names.contains(*name))
                .cloned()
                .collect();
            known_names.extend(new_names.iter().cloned());
            candidates = self.find_candidates(registry, &new_names, &already_parsed)?;
        }
        tracing::info!("Processed {} configuration classes", already_parsed.len());
        Ok(())
    }
}

impl BeanFactoryPostProcessor for ConfigurationClassPostProcessor {
    fn name(&self) -> &str {
        "ConfigurationClassPostProcessor"
    }

    fn order(&self) -> i32 {
        i32::MIN
    }

    fn post_process_bean_definition_registry(&self, registry: &dyn BeanDefinitionRegistry) -> ContainerResult<()> {
        if self.registry_processed.swap(true, Ordering::SeqCst) {
            return Err(ContainerError::IllegalState(
                "post_process_bean_definition_registry already called on this post-processor".to_string(),
            ));
        }
        self.process_config_bean_definitions(registry)
    }

    fn post_process_bean_factory(&self, factory: &Arc<DefaultListableBeanFactory>) -> ContainerResult<()> {
        if self.factory_processed.swap(true, Ordering::SeqCst) {
            return Err(ContainerError::IllegalState(
                "post_process_bean_factory already called on this post-processor".to_string(),
            ));
        }
        if !self.registry_processed.swap(true, Ordering::SeqCst) {
            // 注册表阶段没有运行过，在这里补上
            self.process_config_bean_definitions(&**factory)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConfigurationClassPostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationClassPostProcessor")
            .field("readers", &*self.readers.read())
            .field("registry_processed", &self.registry_processed.load(Ordering::SeqCst))
            .finish()
    }
}
