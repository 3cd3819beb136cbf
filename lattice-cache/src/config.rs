//! 启用声明式缓存
//!
//! [`enable_caching`] 注册三个基础设施 Bean：操作源、拦截器和 Advisor，并确保容器中有
//! 至少是基础设施级别的自动代理创建器。缓存管理器由应用提供，按类型
//! [`CACHE_MANAGER_TYPE_NAME`] 注入。

use std::sync::Arc;

use lattice_aop::{
    force_auto_proxy_creator_to_use_class_proxying, register_auto_proxy_creator_if_necessary, Advisor, CreatorKind,
    ADVISOR_TYPE_NAME,
};
use lattice_core::bean::{BeanDefinition, BeanObject, BeanOrigin, Role};
use lattice_core::metadata::{arg, opt_arg, ClassMetadata, ClassRegistration, ConstructorMetadata, ParameterMetadata};
use lattice_core::registry::BeanDefinitionRegistry;

use crate::advisor::{CacheAdvisor, CACHE_ADVISOR_TYPE_NAME};
use crate::cache::{CacheManager, ConcurrentMapCacheManager, CACHE_MANAGER_TYPE_NAME};
use crate::error::CacheResult;
use crate::interceptor::{CacheInterceptor, CACHE_INTERCEPTOR_TYPE_NAME};
use crate::operation::{AnnotationCacheOperationSource, OPERATION_SOURCE_TYPE_NAME};

pub const CACHE_OPERATION_SOURCE_BEAN_NAME: &str = "lattice.internalCacheOperationSource";
pub const CACHE_INTERCEPTOR_BEAN_NAME: &str = "lattice.internalCacheInterceptor";
pub const CACHE_ADVISOR_BEAN_NAME: &str = "lattice.internalCacheAdvisor";

pub const CONCURRENT_MAP_CACHE_MANAGER_TYPE_NAME: &str = "lattice_cache::ConcurrentMapCacheManager";

/// 缓存配置选项
#[derive(Debug, Clone, Default)]
pub struct EnableCaching {
    proxy_target_class: bool,
}

impl EnableCaching {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用类代理，所有方法都经过代理
    pub fn proxy_target_class(mut self, proxy_target_class: bool) -> Self {
        self.proxy_target_class = proxy_target_class;
        self
    }

    /// 注册缓存基础设施，重复调用不会重复注册
    pub fn register(&self, registry: &dyn BeanDefinitionRegistry) -> CacheResult<()> {
        let kind = register_auto_proxy_creator_if_necessary(registry, CreatorKind::Infrastructure)?;
        if self.proxy_target_class {
            force_auto_proxy_creator_to_use_class_proxying(registry)?;
        }

        register_infrastructure(registry, CACHE_OPERATION_SOURCE_BEAN_NAME, OPERATION_SOURCE_TYPE_NAME)?;
        register_infrastructure(registry, CACHE_INTERCEPTOR_BEAN_NAME, CACHE_INTERCEPTOR_TYPE_NAME)?;
        register_infrastructure(registry, CACHE_ADVISOR_BEAN_NAME, CACHE_ADVISOR_TYPE_NAME)?;

        tracing::debug!("Caching enabled (auto-proxy creator: {:?})", kind);
        Ok(())
    }
}

/// 以默认选项启用缓存
pub fn enable_caching(registry: &dyn BeanDefinitionRegistry) -> CacheResult<()> {
    EnableCaching::new().register(registry)
}

fn register_infrastructure(registry: &dyn BeanDefinitionRegistry, name: &str, class_name: &str) -> CacheResult<()> {
    if registry.contains_bean_definition(name) {
        return Ok(());
    }
    let definition = BeanDefinition::for_class(class_name)
        .with_role(Role::Infrastructure)
        .with_origin(BeanOrigin::Infrastructure);
    registry.register_bean_definition(name, definition)?;
    Ok(())
}

/// 缓存管理器参数，接受 `Arc<dyn CacheManager>` 或者 [`ConcurrentMapCacheManager`] 实例
fn cache_manager_arg(args: &[Option<BeanObject>], index: usize) -> anyhow::Result<Arc<dyn CacheManager>> {
    if let Ok(Some(manager)) = opt_arg::<Arc<dyn CacheManager>>(args, index) {
        return Ok(Arc::clone(&*manager));
    }
    let manager: Arc<dyn CacheManager> = arg::<ConcurrentMapCacheManager>(args, index)?;
    Ok(manager)
}

fn cache_manager_interface() -> ClassMetadata {
    ClassMetadata::interface(CACHE_MANAGER_TYPE_NAME)
}

fn concurrent_map_cache_manager_class() -> ClassMetadata {
    ClassMetadata::new(CONCURRENT_MAP_CACHE_MANAGER_TYPE_NAME)
        .implements(CACHE_MANAGER_TYPE_NAME)
        .with_constructor(ConstructorMetadata::default_of::<ConcurrentMapCacheManager>())
}

fn operation_source_class() -> ClassMetadata {
    ClassMetadata::new(OPERATION_SOURCE_TYPE_NAME)
        .with_constructor(ConstructorMetadata::default_of::<AnnotationCacheOperationSource>())
}

fn cache_interceptor_class() -> ClassMetadata {
    ClassMetadata::new(CACHE_INTERCEPTOR_TYPE_NAME).with_constructor(ConstructorMetadata::new(
        vec![
            ParameterMetadata::new("operationSource", OPERATION_SOURCE_TYPE_NAME),
            ParameterMetadata::new("cacheManager", CACHE_MANAGER_TYPE_NAME),
        ],
        |args| {
            let source = arg::<AnnotationCacheOperationSource>(&args, 0)?;
            let manager = cache_manager_arg(&args, 1)?;
            Ok(CacheInterceptor::with(manager, source))
        },
    ))
}

fn cache_advisor_class() -> ClassMetadata {
    ClassMetadata::new(CACHE_ADVISOR_TYPE_NAME)
        .implements(ADVISOR_TYPE_NAME)
        .with_constructor(ConstructorMetadata::new(
            vec![
                ParameterMetadata::new("operationSource", OPERATION_SOURCE_TYPE_NAME),
                ParameterMetadata::new("cacheInterceptor", CACHE_INTERCEPTOR_TYPE_NAME),
            ],
            |args| {
                let source = arg::<AnnotationCacheOperationSource>(&args, 0)?;
                let interceptor = arg::<CacheInterceptor>(&args, 1)?;
                Ok(Arc::new(CacheAdvisor::new(source, interceptor)) as Arc<dyn Advisor>)
            },
        ))
}

/// 缓存基础设施的类描述符
///
/// 使用 [`ClassIndex::from_inventory`](lattice_core::metadata::ClassIndex::from_inventory) 时自动包含
pub fn caching_classes() -> Vec<ClassMetadata> {
    vec![
        cache_manager_interface(),
        concurrent_map_cache_manager_class(),
        operation_source_class(),
        cache_interceptor_class(),
        cache_advisor_class(),
    ]
}

inventory::submit! { ClassRegistration { build: cache_manager_interface } }
inventory::submit! { ClassRegistration { build: concurrent_map_cache_manager_class } }
inventory::submit! { ClassRegistration { build: operation_source_class } }
inventory::submit! { ClassRegistration { build: cache_interceptor_class } }
inventory::submit! { ClassRegistration { build: cache_advisor_class } }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::key::CacheKey;
    use crate::operation::{CacheEvict, Cacheable};
    use lattice_aop::{AopProxy, AUTO_PROXY_CREATOR_BEAN_NAME};
    use lattice_core::config::Environment;
    use lattice_core::context::ApplicationContext;
    use lattice_core::metadata::{Annotation, ClassIndex, MethodMetadata};
    use lattice_core::registry::SimpleBeanDefinitionRegistry;
    use lattice_core::resource::StaticResourceLoader;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct UserService {
        calls: AtomicUsize,
    }

    fn user_service_class() -> ClassMetadata {
        ClassMetadata::new("app::UserService")
            .with_constructor(ConstructorMetadata::default_of::<UserService>())
            .with_method(
                MethodMetadata::new("get_user")
                    .with_parameter(ParameterMetadata::new("id", "u32"))
                    .with_annotation(Annotation::extension(Cacheable::new(&["users"])))
                    .shared::<UserService>(|service, args| {
                        service.calls.fetch_add(1, Ordering::SeqCst);
                        let id = arg::<u32>(&args, 0)?;
                        Ok(Some(Arc::new(format!("user:{}", id)) as BeanObject))
                    }),
            )
            .with_method(
                MethodMetadata::new("reset")
                    .with_annotation(Annotation::extension(CacheEvict::new(&["users"]).all_entries()))
                    .shared::<UserService>(|_, _| Ok(None)),
            )
            .with_method(MethodMetadata::new("ping").shared::<UserService>(|_, _| Ok(None)))
    }

    fn context() -> ApplicationContext {
        let classes = caching_classes().into_iter().chain([user_service_class()]);
        ApplicationContext::new(
            Arc::new(ClassIndex::with_classes(classes)),
            Arc::new(Environment::new()),
            Arc::new(StaticResourceLoader::new()),
        )
    }

    fn calls(proxy: &AopProxy) -> usize {
        proxy
            .target_as::<UserService>()
            .map(|service| service.calls.load(Ordering::SeqCst))
            .unwrap_or_default()
    }

    #[test]
    fn test_enable_caching_registers_infrastructure_once() {
        let registry = SimpleBeanDefinitionRegistry::new();
        register_auto_proxy_creator_if_necessary(&registry, CreatorKind::AspectAware).unwrap();

        enable_caching(&registry).unwrap();
        enable_caching(&registry).unwrap();

        for name in [CACHE_OPERATION_SOURCE_BEAN_NAME, CACHE_INTERCEPTOR_BEAN_NAME, CACHE_ADVISOR_BEAN_NAME] {
            assert_eq!(registry.get_bean_definition(name).unwrap().role, Role::Infrastructure);
        }
        assert_eq!(registry.bean_definition_count(), 4);
        assert_eq!(
            registry
                .get_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME)
                .unwrap()
                .bean_class_name
                .as_deref(),
            Some(CreatorKind::AspectAware.type_name())
        );
    }

    #[test]
    fn test_cached_method_through_context() {
        let context = context();
        let factory = Arc::clone(context.bean_factory());
        context
            .register_bean_definition("cacheManager", BeanDefinition::for_class(CONCURRENT_MAP_CACHE_MANAGER_TYPE_NAME))
            .unwrap();
        enable_caching(&*factory).unwrap();
        context
            .register_bean_definition("userService", BeanDefinition::for_class("app::UserService"))
            .unwrap();
        context.refresh().unwrap();

        let proxy = context.get_bean_typed::<AopProxy>("userService").unwrap();
        assert_eq!(proxy.advisors().len(), 1);
        assert_eq!(proxy.advisors()[0].name(), "cacheAdvisor");

        let id: BeanObject = Arc::new(5u32);
        let first = proxy.invoke("get_user", vec![Some(Arc::clone(&id))]).unwrap().unwrap();
        let second = proxy.invoke("get_user", vec![Some(id)]).unwrap().unwrap();
        assert_eq!(second.downcast_ref::<String>().unwrap(), "user:5");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls(&proxy), 1);

        let manager = context
            .get_bean_typed::<ConcurrentMapCacheManager>("cacheManager")
            .unwrap();
        let users = manager.get_cache("users").unwrap();
        assert!(users.get(&CacheKey::of(5u32)).is_some());

        proxy.invoke("reset", vec![]).unwrap();
        assert!(users.get(&CacheKey::of(5u32)).is_none());
        proxy.invoke("ping", vec![]).unwrap();
    }

    #[test]
    fn test_application_supplied_cache_manager() {
        let context = context();
        let factory = Arc::clone(context.bean_factory());
        let manager: Arc<dyn CacheManager> = Arc::new(ConcurrentMapCacheManager::with_cache_names(&["users"]));
        factory
            .register_singleton("caches", CACHE_MANAGER_TYPE_NAME, Arc::new(Arc::clone(&manager)))
            .unwrap();
        EnableCaching::new().proxy_target_class(true).register(&*factory).unwrap();
        context
            .register_bean_definition("userService", BeanDefinition::for_class("app::UserService"))
            .unwrap();
        context.refresh().unwrap();

        let proxy = context.get_bean_typed::<AopProxy>("userService").unwrap();
        assert!(proxy.is_proxy_target_class());

        let id: BeanObject = Arc::new(9u32);
        proxy.invoke("get_user", vec![Some(Arc::clone(&id))]).unwrap();
        proxy.invoke("get_user", vec![Some(id)]).unwrap();
        assert_eq!(calls(&proxy), 1);
        assert!(manager
            .get_cache("users")
            .and_then(|cache| cache.get(&CacheKey::of(9u32)))
            .is_some());
    }
}
