//! AutowiredAnnotationBeanPostProcessor
//!
//! 处理 `Autowired` / `Inject` / `Value` 标记：选择候选构造函数，
//! 在属性填充阶段注入字段和方法。

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::bean::BeanDefinition;
use crate::bean_factory::DefaultListableBeanFactory;
use crate::constants::AUTOWIRED_ANNOTATION_PROCESSOR_TYPE_NAME;
use crate::error::{ContainerError, ContainerResult};
use crate::injection::metadata::{InjectedElement, InjectionMetadata, InjectionMetadataCache};
use crate::injection::DependencyResolver;
use crate::lifecycle::{BeanPostProcessor, PostProcessorRegistration};
use crate::metadata::{find_merged, Annotated, Annotation, ClassMetadata, MetadataReader};

/// 在其他处理器之前完成注入
pub const AUTOWIRED_PROCESSOR_ORDER: i32 = 100;

/// 依赖注入后处理器
#[derive(Default)]
pub struct AutowiredAnnotationBeanPostProcessor {
    resolver: RwLock<Option<Weak<dyn DependencyResolver>>>,
    reader: RwLock<Option<Arc<dyn MetadataReader>>>,

    /// 类名 → 候选构造函数下标
    candidate_constructors: RwLock<HashMap<String, Option<Vec<usize>>>>,
    candidate_lock: Mutex<()>,

    injection_metadata: InjectionMetadataCache,
}

impl AutowiredAnnotationBeanPostProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 不经过工厂直接指定协作者
    pub fn with_collaborators(resolver: Weak<dyn DependencyResolver>, reader: Arc<dyn MetadataReader>) -> Self {
        let processor = Self::new();
        *processor.resolver.write() = Some(resolver);
        *processor.reader.write() = Some(reader);
        processor
    }

    fn resolver(&self) -> ContainerResult<Arc<dyn DependencyResolver>> {
        self.resolver
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                ContainerError::IllegalState(
                    "AutowiredAnnotationBeanPostProcessor requires a bean factory".to_string(),
                )
            })
    }

    fn reader(&self) -> ContainerResult<Arc<dyn MetadataReader>> {
        self.reader.read().clone().ok_or_else(|| {
            ContainerError::IllegalState("AutowiredAnnotationBeanPostProcessor requires a metadata reader".to_string())
        })
    }

    /// 成员上的注入标记（含元注解）
    fn find_autowired(reader: &dyn MetadataReader, annotations: &[Annotation]) -> Option<bool> {
        find_merged(reader, annotations, &|a| match a {
            Annotation::Autowired { required } => Some(*required),
            Annotation::Inject => Some(true),
            _ => None,
        })
    }

    /// 候选构造函数，按类名缓存
    pub fn candidate_constructors(&self, class: &ClassMetadata, bean_name: &str) -> ContainerResult<Option<Vec<usize>>> {
        if let Some(cached) = self.candidate_constructors.read().get(&class.name) {
            return Ok(cached.clone());
        }

        let _lock = self.candidate_lock.lock();
        if let Some(cached) = self.candidate_constructors.read().get(&class.name) {
            return Ok(cached.clone());
        }

        let reader = self.reader()?;
        let candidates = Self::select_constructors(reader.as_ref(), class, bean_name)?;
        self.candidate_constructors
            .write()
            .insert(class.name.clone(), candidates.clone());
        Ok(candidates)
    }

    fn select_constructors(
        reader: &dyn MetadataReader,
        class: &ClassMetadata,
        bean_name: &str,
    ) -> ContainerResult<Option<Vec<usize>>> {
        let mut candidates = Vec::new();
        let mut required_constructor = None;
        let mut default_constructor = None;

        for (index, constructor) in class.constructors.iter().enumerate() {
            let Some(required) = Self::find_autowired(reader, &constructor.annotations) else {
                if constructor.parameters.is_empty() {
                    default_constructor = Some(index);
                }
                continue;
            };

            let invalid = |message: String| ContainerError::InvalidConstructorDeclaration {
                bean_name: bean_name.to_string(),
                class_name: class.name.clone(),
                message,
            };
            if required_constructor.is_some() {
                return Err(invalid(format!(
                    "invalid autowire-marked constructor {}: found constructor with 'required' Autowired annotation already",
                    index
                )));
            }
            if constructor.parameters.is_empty() {
                return Err(invalid(format!(
                    "Autowired annotation requires at least one argument: constructor {}",
                    index
                )));
            }
            if required {
                if !candidates.is_empty() {
                    return Err(invalid(format!(
                        "invalid autowire-marked constructors {:?}: found constructor with 'required' Autowired annotation",
                        candidates
                    )));
                }
                required_constructor = Some(index);
            }
            candidates.push(index);
        }

        if candidates.is_empty() {
            return Ok(None);
        }

        if required_constructor.is_none() {
            match default_constructor {
                Some(default) => candidates.push(default),
                None if candidates.len() == 1 => {
                    tracing::warn!(
                        "Inconsistent constructor declaration on bean with name '{}': single autowire-marked constructor flagged as optional - this constructor is effectively required since there is no default constructor to fall back to",
                        bean_name
                    );
                }
                None => {}
            }
        }
        Ok(Some(candidates))
    }

    /// 注入元数据，按 Bean 名称缓存（没有名称时按类名）
    pub fn find_autowiring_metadata(&self, bean_name: &str, class: &ClassMetadata) -> ContainerResult<Arc<InjectionMetadata>> {
        let key = if bean_name.is_empty() { class.name.as_str() } else { bean_name };
        self.injection_metadata
            .get_or_build(key, &class.name, || self.build_autowiring_metadata(class))
    }

    fn build_autowiring_metadata(&self, class: &ClassMetadata) -> ContainerResult<InjectionMetadata> {
        let reader = self.reader()?;
        let mut chain = reader.superclass_chain(&class.name);
        if chain.is_empty() {
            chain.push(Arc::new(class.clone()));
        }

        let mut elements = Vec::new();
        for (depth, owner) in chain.iter().enumerate() {
            for field in &owner.fields {
                let autowired = Self::find_autowired(reader.as_ref(), &field.annotations);
                if autowired.is_none() && field.value_expression().is_none() {
                    continue;
                }
                if field.is_static {
                    tracing::info!("Autowired annotation is not supported on static fields: {}::{}", owner.name, field.name);
                    continue;
                }
                if field.setter.is_none() {
                    tracing::warn!("Field {}::{} is marked for injection but has no setter", owner.name, field.name);
                    continue;
                }
                elements.push(InjectedElement::field(field.clone(), autowired.unwrap_or(true)));
            }

            for method in &owner.methods {
                let Some(required) = Self::find_autowired(reader.as_ref(), &method.annotations) else {
                    continue;
                };
                if method.is_static {
                    tracing::info!("Autowired annotation is not supported on static methods: {}::{}", owner.name, method.name);
                    continue;
                }
                // 子类覆盖的方法只在子类一层处理
                let signature = method.signature();
                let overridden = chain[depth + 1..]
                    .iter()
                    .any(|sub| sub.methods.iter().any(|m| m.signature() == signature));
                if overridden {
                    continue;
                }
                if method.parameters.is_empty() {
                    tracing::info!(
                        "Autowired annotation should only be used on methods with parameters: {}::{}",
                        owner.name,
                        method.name
                    );
                }
                elements.push(InjectedElement::method(method.clone(), required));
            }
        }

        tracing::trace!("Found {} injected elements on class [{}]", elements.len(), class.name);
        Ok(InjectionMetadata::new(class.name.clone(), elements))
    }

    /// 对任意实例做注入，不经过 Bean 创建流程
    pub fn process_injection(&self, bean: &mut (dyn Any + Send + Sync), class: &ClassMetadata) -> ContainerResult<()> {
        let metadata = self.find_autowiring_metadata("", class)?;
        let resolver = self.resolver()?;
        metadata.inject(bean, None, resolver.as_ref())
    }
}

impl BeanPostProcessor for AutowiredAnnotationBeanPostProcessor {
    fn name(&self) -> &str {
        "AutowiredAnnotationBeanPostProcessor"
    }

    fn order(&self) -> i32 {
        AUTOWIRED_PROCESSOR_ORDER
    }

    fn set_bean_factory(&self, factory: &Arc<DefaultListableBeanFactory>) -> ContainerResult<()> {
        let resolver: Weak<dyn DependencyResolver> = Arc::downgrade(factory) as Weak<dyn DependencyResolver>;
        *self.resolver.write() = Some(resolver);
        *self.reader.write() = Some(Arc::clone(factory.metadata_reader()));
        Ok(())
    }

    fn determine_candidate_constructors(&self, class: &ClassMetadata, bean_name: &str) -> ContainerResult<Option<Vec<usize>>> {
        self.candidate_constructors(class, bean_name)
    }

    fn post_process_properties(
        &self,
        bean: &mut (dyn Any + Send + Sync),
        class: &ClassMetadata,
        bean_name: &str,
    ) -> ContainerResult<()> {
        let metadata = self.find_autowiring_metadata(bean_name, class)?;
        if metadata.is_empty() {
            return Ok(());
        }
        let resolver = self.resolver()?;
        metadata.inject(bean, Some(bean_name), resolver.as_ref())
    }

    fn reset_bean_definition(&self, bean_name: &str) {
        self.injection_metadata.clear(bean_name);
    }
}

fn create_autowired_processor(_definition: &BeanDefinition) -> ContainerResult<Arc<dyn BeanPostProcessor>> {
    Ok(Arc::new(AutowiredAnnotationBeanPostProcessor::new()))
}

inventory::submit! {
    PostProcessorRegistration {
        class_name: AUTOWIRED_ANNOTATION_PROCESSOR_TYPE_NAME,
        create: create_autowired_processor,
    }
}
