//! 注入元数据
//!
//! 每个目标类的可注入字段和方法只计算一次；每个元素第一次解析后缓存解析形态，
//! 之后的注入不再重新判断注解。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::bean::BeanObject;
use crate::error::{ContainerError, ContainerResult};
use crate::injection::{DependencyDescriptor, DependencyResolver, InjectionPoint};
use crate::metadata::{FieldMetadata, MethodMetadata, Receiver};

/// 可注入的成员
#[derive(Debug, Clone)]
pub enum InjectedMember {
    Field(FieldMetadata),
    Method(MethodMetadata),
}

impl InjectedMember {
    pub fn name(&self) -> &str {
        match self {
            InjectedMember::Field(field) => &field.name,
            InjectedMember::Method(method) => &method.name,
        }
    }

    pub fn declaring_class(&self) -> &str {
        match self {
            InjectedMember::Field(field) => &field.declaring_class,
            InjectedMember::Method(method) => &method.declaring_class,
        }
    }
}

/// 单个依赖第一次解析后的形态
#[derive(Debug, Clone)]
enum CachedArgument {
    /// 每次注入都重新解析
    Descriptor(DependencyDescriptor),
    /// 唯一候选：直接按名称取 Bean
    Shortcut { bean_name: String },
}

#[derive(Debug, Clone)]
enum CachedInjection {
    /// 可选依赖没有候选，之后都跳过
    Skip,
    Arguments(Vec<CachedArgument>),
}

/// 一个注入点
pub struct InjectedElement {
    member: InjectedMember,
    required: bool,
    cached: RwLock<Option<CachedInjection>>,
}

impl InjectedElement {
    pub fn field(field: FieldMetadata, required: bool) -> Self {
        Self::new(InjectedMember::Field(field), required)
    }

    pub fn method(method: MethodMetadata, required: bool) -> Self {
        Self::new(InjectedMember::Method(method), required)
    }

    fn new(member: InjectedMember, required: bool) -> Self {
        Self {
            member,
            required,
            cached: RwLock::new(None),
        }
    }

    pub fn member(&self) -> &InjectedMember {
        &self.member
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// 是否已经缓存了解析形态
    pub fn is_cached(&self) -> bool {
        self.cached.read().is_some()
    }

    /// 该元素每个依赖的描述符
    fn descriptors(&self) -> Vec<DependencyDescriptor> {
        match &self.member {
            InjectedMember::Field(field) => vec![DependencyDescriptor::for_field(field, self.required)],
            InjectedMember::Method(method) => method
                .parameters
                .iter()
                .enumerate()
                .map(|(index, parameter)| {
                    DependencyDescriptor::for_parameter(
                        parameter,
                        InjectionPoint::MethodParameter {
                            class: method.declaring_class.clone(),
                            method: method.name.clone(),
                            index,
                        },
                        self.required,
                    )
                })
                .collect(),
        }
    }

    /// 解析依赖并注入到目标实例
    pub fn inject(
        &self,
        target: &mut (dyn Any + Send + Sync),
        bean_name: Option<&str>,
        resolver: &dyn DependencyResolver,
    ) -> ContainerResult<()> {
        if self.defer_if_awaiting(bean_name, resolver) {
            return Ok(());
        }
        let Some(args) = self.resolve_arguments(bean_name, resolver)? else {
            return Ok(());
        };

        match &self.member {
            InjectedMember::Field(field) => {
                let (Some(setter), Some(Some(value))) = (&field.setter, args.into_iter().next()) else {
                    return Ok(());
                };
                tracing::trace!("Injecting field '{}' of bean '{}'", field.name, bean_name.unwrap_or("<none>"));
                setter(target, value).map_err(|e| ContainerError::BeanCreation {
                    bean_name: bean_name.unwrap_or_default().to_string(),
                    message: format!("Could not inject field '{}': {:#}", field.name, e),
                })
            }
            InjectedMember::Method(method) => {
                tracing::trace!(
                    "Invoking injection method '{}' of bean '{}'",
                    method.name,
                    bean_name.unwrap_or("<none>")
                );
                method
                    .invoke(Receiver::Owned(target), args)
                    .map(|_| ())
                    .map_err(|e| ContainerError::BeanCreation {
                        bean_name: bean_name.unwrap_or_default().to_string(),
                        message: format!("Could not invoke injection method '{}': {:#}", method.name, e),
                    })
            }
        }
    }

    /// `BeanRef` 字段指向正在创建的单例时，登记延后注入而不是立即解析
    fn defer_if_awaiting(&self, bean_name: Option<&str>, resolver: &dyn DependencyResolver) -> bool {
        let (InjectedMember::Field(field), Some(name)) = (&self.member, bean_name) else {
            return false;
        };
        let Some(setter) = &field.late_setter else {
            return false;
        };
        let descriptor = DependencyDescriptor::for_field(field, self.required);
        let Some(awaited) = resolver.singleton_in_creation(&descriptor, Some(name)) else {
            return false;
        };
        tracing::debug!(
            "Deferring field '{}' of bean '{}' until singleton '{}' is registered",
            field.name,
            name,
            awaited
        );
        resolver.register_dependent_bean(&awaited, name);
        resolver.defer_injection(&awaited, name, &field.name, Arc::clone(setter));
        true
    }

    /// 返回 `None` 表示本次不注入
    ///
    /// 解析期间不持有元素上的锁。并发的首次解析各自完成，缓存只接受第一个写入者。
    fn resolve_arguments(
        &self,
        bean_name: Option<&str>,
        resolver: &dyn DependencyResolver,
    ) -> ContainerResult<Option<Vec<Option<BeanObject>>>> {
        let cached = self.cached.read().clone();
        if let Some(cached) = cached {
            return self.resolve_cached(&cached, bean_name, resolver);
        }

        let descriptors = self.descriptors();
        let mut values = Vec::with_capacity(descriptors.len());
        let mut shapes = Vec::with_capacity(descriptors.len());
        let mut skip = false;

        for descriptor in descriptors {
            let mut autowired_names = Vec::new();
            let value = self.resolve_one(&descriptor, bean_name, resolver, &mut autowired_names)?;
            if value.is_none() && !self.required {
                skip = true;
                break;
            }
            if let Some(name) = bean_name {
                for autowired in &autowired_names {
                    resolver.register_dependent_bean(autowired, name);
                }
            }

            let shortcut = match autowired_names.as_slice() {
                [only] if descriptor.value_expression.is_none()
                    && !descriptor.collection
                    && resolver.contains_bean(only)
                    && resolver.is_type_match(only, &descriptor.type_name) =>
                {
                    Some(only.clone())
                }
                _ => None,
            };
            shapes.push(match shortcut {
                Some(bean_name) => CachedArgument::Shortcut { bean_name },
                None => CachedArgument::Descriptor(descriptor),
            });
            values.push(value);
        }

        if skip {
            self.publish(CachedInjection::Skip);
            return Ok(None);
        }
        self.publish(CachedInjection::Arguments(shapes));
        Ok(Some(values))
    }

    fn publish(&self, shape: CachedInjection) {
        let mut slot = self.cached.write();
        if slot.is_none() {
            *slot = Some(shape);
        }
    }

    fn resolve_cached(
        &self,
        cached: &CachedInjection,
        bean_name: Option<&str>,
        resolver: &dyn DependencyResolver,
    ) -> ContainerResult<Option<Vec<Option<BeanObject>>>> {
        let CachedInjection::Arguments(arguments) = cached else {
            return Ok(None);
        };

        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments {
            let value = match argument {
                CachedArgument::Shortcut { bean_name: target } => {
                    let bean = resolver.get_bean(target).map_err(|e| self.unsatisfied(bean_name, e))?;
                    if let Some(name) = bean_name {
                        resolver.register_dependent_bean(target, name);
                    }
                    Some(bean)
                }
                CachedArgument::Descriptor(descriptor) => {
                    let mut autowired_names = Vec::new();
                    let value = self.resolve_one(descriptor, bean_name, resolver, &mut autowired_names)?;
                    if let Some(name) = bean_name {
                        for autowired in &autowired_names {
                            resolver.register_dependent_bean(autowired, name);
                        }
                    }
                    if value.is_none() && !self.required {
                        return Ok(None);
                    }
                    value
                }
            };
            values.push(value);
        }
        Ok(Some(values))
    }

    fn resolve_one(
        &self,
        descriptor: &DependencyDescriptor,
        bean_name: Option<&str>,
        resolver: &dyn DependencyResolver,
        autowired_names: &mut Vec<String>,
    ) -> ContainerResult<Option<BeanObject>> {
        resolver
            .resolve_dependency(descriptor, bean_name, autowired_names)
            .map_err(|e| ContainerError::UnsatisfiedDependency {
                bean_name: bean_name.unwrap_or_default().to_string(),
                member: descriptor.member_description(),
                source: Box::new(e),
            })
    }

    fn unsatisfied(&self, bean_name: Option<&str>, err: ContainerError) -> ContainerError {
        let member = match &self.member {
            InjectedMember::Field(field) => format!("field '{}'", field.name),
            InjectedMember::Method(method) => format!("method '{}'", method.name),
        };
        ContainerError::UnsatisfiedDependency {
            bean_name: bean_name.unwrap_or_default().to_string(),
            member,
            source: Box::new(err),
        }
    }

    /// 丢弃缓存的解析形态
    pub fn clear_cache(&self) {
        *self.cached.write() = None;
    }
}

impl fmt::Debug for InjectedElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectedElement")
            .field("member", &format_args!("{}::{}", self.member.declaring_class(), self.member.name()))
            .field("required", &self.required)
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// 一个目标类的全部注入点，父类的在前
#[derive(Debug)]
pub struct InjectionMetadata {
    target_class: String,
    elements: Vec<InjectedElement>,
}

impl InjectionMetadata {
    pub fn new(target_class: impl Into<String>, elements: Vec<InjectedElement>) -> Self {
        Self {
            target_class: target_class.into(),
            elements,
        }
    }

    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    pub fn elements(&self) -> &[InjectedElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// 缓存的元数据与实际类不一致时需要重建
    pub fn needs_refresh(metadata: Option<&Arc<InjectionMetadata>>, class_name: &str) -> bool {
        metadata.map_or(true, |m| m.target_class != class_name)
    }

    /// 按声明顺序注入全部元素
    pub fn inject(
        &self,
        target: &mut (dyn Any + Send + Sync),
        bean_name: Option<&str>,
        resolver: &dyn DependencyResolver,
    ) -> ContainerResult<()> {
        for element in &self.elements {
            element.inject(&mut *target, bean_name, resolver)?;
        }
        Ok(())
    }

    /// 定义变化后清空各元素的解析缓存，元数据本身保留
    pub fn clear(&self) {
        for element in &self.elements {
            element.clear_cache();
        }
    }
}

/// 注入元数据缓存：读无阻塞，构建在锁内二次检查，每个键只构建一次
#[derive(Default)]
pub struct InjectionMetadataCache {
    entries: RwLock<HashMap<String, Arc<InjectionMetadata>>>,
    build_lock: Mutex<()>,
}

impl InjectionMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出 `key` 对应且目标类为 `class_name` 的元数据，不存在或过期时用 `build` 构建
    pub fn get_or_build<F>(&self, key: &str, class_name: &str, build: F) -> ContainerResult<Arc<InjectionMetadata>>
    where
        F: FnOnce() -> ContainerResult<InjectionMetadata>,
    {
        let cached = self.entries.read().get(key).cloned();
        if !InjectionMetadata::needs_refresh(cached.as_ref(), class_name) {
            if let Some(metadata) = cached {
                return Ok(metadata);
            }
        }

        let _lock = self.build_lock.lock();
        let cached = self.entries.read().get(key).cloned();
        if !InjectionMetadata::needs_refresh(cached.as_ref(), class_name) {
            if let Some(metadata) = cached {
                return Ok(metadata);
            }
        }

        if cached.is_some() {
            tracing::debug!("Injection metadata for '{}' is stale, rebuilding for [{}]", key, class_name);
        }
        let metadata = Arc::new(build()?);
        self.entries.write().insert(key.to_string(), Arc::clone(&metadata));
        Ok(metadata)
    }

    pub fn get(&self, key: &str) -> Option<Arc<InjectionMetadata>> {
        self.entries.read().get(key).cloned()
    }

    /// 清空 `key` 的元素缓存
    pub fn clear(&self, key: &str) {
        if let Some(metadata) = self.entries.read().get(key) {
            metadata.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for InjectionMetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionMetadataCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_stale_metadata_is_rebuilt() {
        let cache = InjectionMetadataCache::new();
        let builds = AtomicUsize::new(0);
        let build = |class: &'static str| -> ContainerResult<InjectionMetadata> {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(InjectionMetadata::new(class, Vec::new()))
        };

        let first = cache.get_or_build("service", "app::Service", || build("app::Service")).unwrap();
        let again = cache.get_or_build("service", "app::Service", || build("app::Service")).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        let rebuilt = cache.get_or_build("service", "app::ServiceV2", || build("app::ServiceV2")).unwrap();
        assert_eq!(rebuilt.target_class(), "app::ServiceV2");
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let cache = InjectionMetadataCache::new();
        let result = cache.get_or_build("broken", "app::Broken", || {
            Err(ContainerError::IllegalState("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(cache.get("broken").is_none());
    }
}
