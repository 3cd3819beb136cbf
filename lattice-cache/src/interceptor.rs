//! 缓存拦截器
//!
//! 一次调用的处理顺序：
//!
//! 1. 解析全部操作的缓存，任何一个名称找不到就在修改缓存之前失败
//! 2. 调用前的移除
//! 3. Cacheable：条件通过的操作计算键，按声明顺序查找，第一个命中即返回，不再调用方法
//! 4. CachePut：条件通过的操作计算键
//! 5. 未命中时调用方法，成功后执行调用后的移除，再把结果写入未被 unless 否决的操作的缓存

use std::fmt;
use std::sync::Arc;

use lattice_aop::{MethodInterceptor, MethodInvocation};
use lattice_core::bean::BeanObject;
use lattice_core::metadata::{ClassMetadata, MethodMetadata};
use parking_lot::RwLock;

use crate::cache::{Cache, CacheManager, ValueWrapper};
use crate::error::{CacheError, CacheResult};
use crate::expression::{EvaluationContext, ExpressionEvaluator, InvocationResult, Value};
use crate::key::{argument_key, CacheKey, KeyGenerator, SimpleKeyGenerator};
use crate::operation::{AnnotationCacheOperationSource, CacheOperation};

/// 缓存拦截器 Bean 的类型名
pub const CACHE_INTERCEPTOR_TYPE_NAME: &str = "lattice_cache::CacheInterceptor";

/// 声明式缓存的拦截器
///
/// 缓存管理器和操作源都设置之后才生效，之前直接调用目标方法
pub struct CacheInterceptor {
    cache_manager: RwLock<Option<Arc<dyn CacheManager>>>,
    operation_source: RwLock<Option<Arc<AnnotationCacheOperationSource>>>,
    key_generator: RwLock<Arc<dyn KeyGenerator>>,
    evaluator: ExpressionEvaluator,
}

impl CacheInterceptor {
    /// 未初始化的拦截器
    pub fn new() -> Self {
        Self {
            cache_manager: RwLock::new(None),
            operation_source: RwLock::new(None),
            key_generator: RwLock::new(Arc::new(SimpleKeyGenerator::new())),
            evaluator: ExpressionEvaluator::new(),
        }
    }

    pub fn with(cache_manager: Arc<dyn CacheManager>, operation_source: Arc<AnnotationCacheOperationSource>) -> Self {
        let interceptor = Self::new();
        interceptor.set_cache_manager(cache_manager);
        interceptor.set_operation_source(operation_source);
        interceptor
    }

    pub fn set_cache_manager(&self, cache_manager: Arc<dyn CacheManager>) {
        *self.cache_manager.write() = Some(cache_manager);
    }

    pub fn set_operation_source(&self, operation_source: Arc<AnnotationCacheOperationSource>) {
        *self.operation_source.write() = Some(operation_source);
    }

    pub fn set_key_generator(&self, key_generator: Arc<dyn KeyGenerator>) {
        *self.key_generator.write() = key_generator;
    }

    pub fn cache_manager(&self) -> Option<Arc<dyn CacheManager>> {
        self.cache_manager.read().clone()
    }

    pub fn operation_source(&self) -> Option<Arc<AnnotationCacheOperationSource>> {
        self.operation_source.read().clone()
    }

    pub fn key_generator(&self) -> Arc<dyn KeyGenerator> {
        Arc::clone(&self.key_generator.read())
    }

    pub fn is_initialized(&self) -> bool {
        self.cache_manager.read().is_some() && self.operation_source.read().is_some()
    }

    fn execute(
        &self,
        invocation: &mut MethodInvocation<'_>,
        manager: &dyn CacheManager,
        source: &AnnotationCacheOperationSource,
    ) -> anyhow::Result<Option<BeanObject>> {
        let method = invocation.method();
        let class = invocation.target_class();
        let Some(operations) = source.get_cache_operations(method, class)? else {
            return invocation.proceed();
        };

        let args = invocation.arguments().to_vec();
        let contexts = operations
            .iter()
            .map(|operation| OperationContext::resolve(operation, manager, method, class, &args))
            .collect::<CacheResult<Vec<_>>>()?;

        let mut evicts = Vec::new();
        let mut cacheables = Vec::new();
        let mut puts = Vec::new();
        for context in &contexts {
            match context.operation {
                CacheOperation::Evict(_) => evicts.push(context),
                CacheOperation::Cacheable(_) => cacheables.push(context),
                CacheOperation::Put(_) => puts.push(context),
            }
        }

        self.process_evictions(&evicts, true, InvocationResult::Pending)?;

        let mut cache_hit: Option<ValueWrapper> = None;
        let mut updates: Vec<PendingUpdate<'_, '_>> = Vec::new();
        for context in cacheables {
            if !context.is_condition_passing(&self.evaluator, InvocationResult::Pending)? {
                tracing::trace!("Cache condition failed for {}", context.describe());
                continue;
            }
            let key = self.generate_key(context, InvocationResult::Pending)?;
            if cache_hit.is_none() {
                cache_hit = find_cached_item(context, &key);
            }
            updates.push(PendingUpdate {
                context,
                key: Some(key),
                deferred_condition: false,
            });
        }

        let mut put_updates = Vec::new();
        for context in puts {
            let deferred_condition = context.condition_references_result(&self.evaluator)?;
            if !deferred_condition && !context.is_condition_passing(&self.evaluator, InvocationResult::Pending)? {
                tracing::trace!("Cache condition failed for {}", context.describe());
                continue;
            }
            let key = if context.key_references_result(&self.evaluator)? {
                None
            } else {
                Some(self.generate_key(context, InvocationResult::Pending)?)
            };
            put_updates.push(PendingUpdate {
                context,
                key,
                deferred_condition,
            });
        }

        if let Some(hit) = cache_hit {
            return Ok(hit.into_inner());
        }
        updates.extend(put_updates);

        let result = invocation.proceed()?;
        let returned = InvocationResult::Returned(result.as_ref());

        self.process_evictions(&evicts, false, returned)?;

        for update in updates {
            let context = update.context;
            if update.deferred_condition && !context.is_condition_passing(&self.evaluator, returned)? {
                tracing::trace!("Cache condition failed for {}", context.describe());
                continue;
            }
            if !context.can_put(&self.evaluator, result.as_ref())? {
                tracing::trace!("Result of {} vetoed by unless", context.describe());
                continue;
            }
            let key = match update.key {
                Some(key) => key,
                None => self.generate_key(context, returned)?,
            };
            for cache in &context.caches {
                tracing::trace!("Storing {:?} in cache '{}'", key, cache.name());
                cache.put(key.clone(), result.clone());
            }
        }

        Ok(result)
    }

    fn process_evictions(
        &self,
        contexts: &[&OperationContext<'_>],
        before_invocation: bool,
        result: InvocationResult<'_>,
    ) -> CacheResult<()> {
        for context in contexts {
            let CacheOperation::Evict(operation) = context.operation else {
                continue;
            };
            if operation.before_invocation != before_invocation
                || !context.is_condition_passing(&self.evaluator, result)?
            {
                continue;
            }

            if operation.all_entries {
                for cache in &context.caches {
                    tracing::trace!("Clearing cache '{}' for {}", cache.name(), context.describe());
                    cache.clear();
                }
            } else {
                let key = self.generate_key(context, result)?;
                for cache in &context.caches {
                    tracing::trace!("Evicting {:?} from cache '{}'", key, cache.name());
                    cache.evict(&key);
                }
            }
        }
        Ok(())
    }

    fn generate_key(&self, context: &OperationContext<'_>, result: InvocationResult<'_>) -> CacheResult<CacheKey> {
        let generator = self.key_generator();
        let Some(expression) = context.operation.key() else {
            return generator.generate(context.class, context.method, context.args);
        };

        let value = self.evaluator.evaluate(expression, &context.evaluation_context(result))?;
        match value {
            Value::Null => Err(CacheError::NullKey {
                operation: context.describe(),
            }),
            Value::Bool(b) => Ok(CacheKey::of(b)),
            Value::Int(i) => Ok(CacheKey::of(i)),
            Value::Str(s) => Ok(CacheKey::of(s)),
            Value::Argument(index, object) => argument_key(&*generator, context.method, index, &object),
            Value::Returned(object) => generator.key_for_value(&object).ok_or_else(|| CacheError::UnsupportedKey {
                origin: "#result".to_string(),
                type_name: context
                    .method
                    .return_type
                    .clone()
                    .unwrap_or_else(|| "<unknown>".to_string()),
            }),
        }
    }
}

impl Default for CacheInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodInterceptor for CacheInterceptor {
    fn name(&self) -> &str {
        "CacheInterceptor"
    }

    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Option<BeanObject>> {
        let (Some(manager), Some(source)) = (self.cache_manager(), self.operation_source()) else {
            return invocation.proceed();
        };
        self.execute(invocation, &*manager, &source)
    }
}

impl fmt::Debug for CacheInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheInterceptor")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// 一个操作在本次调用中的上下文
struct OperationContext<'a> {
    operation: &'a CacheOperation,
    caches: Vec<Arc<dyn Cache>>,
    method: &'a MethodMetadata,
    class: &'a ClassMetadata,
    args: &'a [Option<BeanObject>],
}

impl<'a> OperationContext<'a> {
    fn resolve(
        operation: &'a CacheOperation,
        manager: &dyn CacheManager,
        method: &'a MethodMetadata,
        class: &'a ClassMetadata,
        args: &'a [Option<BeanObject>],
    ) -> CacheResult<Self> {
        let mut context = Self {
            operation,
            caches: Vec::with_capacity(operation.cache_names().len()),
            method,
            class,
            args,
        };
        for name in operation.cache_names() {
            let cache = manager.get_cache(name).ok_or_else(|| CacheError::CacheNotFound {
                cache_name: name.clone(),
                operation: context.describe(),
            })?;
            context.caches.push(cache);
        }
        Ok(context)
    }

    fn describe(&self) -> String {
        format!("{} on {}::{}", self.operation, self.class.name, self.method.name)
    }

    fn evaluation_context<'r>(&'r self, result: InvocationResult<'r>) -> EvaluationContext<'r> {
        EvaluationContext {
            method: self.method,
            args: self.args,
            result,
        }
    }

    fn is_condition_passing(&self, evaluator: &ExpressionEvaluator, result: InvocationResult<'_>) -> CacheResult<bool> {
        match self.operation.condition() {
            Some(condition) => evaluator.condition(condition, &self.evaluation_context(result)),
            None => Ok(true),
        }
    }

    fn condition_references_result(&self, evaluator: &ExpressionEvaluator) -> CacheResult<bool> {
        match self.operation.condition() {
            Some(condition) => Ok(evaluator.parse(condition)?.references_result()),
            None => Ok(false),
        }
    }

    fn key_references_result(&self, evaluator: &ExpressionEvaluator) -> CacheResult<bool> {
        match self.operation.key() {
            Some(key) => Ok(evaluator.parse(key)?.references_result()),
            None => Ok(false),
        }
    }

    /// unless 为真时否决写入
    fn can_put(&self, evaluator: &ExpressionEvaluator, value: Option<&BeanObject>) -> CacheResult<bool> {
        match self.operation.unless() {
            Some(unless) => {
                let context = self.evaluation_context(InvocationResult::Returned(value));
                Ok(!evaluator.condition(unless, &context)?)
            }
            None => Ok(true),
        }
    }
}

struct PendingUpdate<'c, 'a> {
    context: &'c OperationContext<'a>,
    /// `None` 时在调用之后计算
    key: Option<CacheKey>,
    /// 条件引用了 `#result`，在调用之后判断
    deferred_condition: bool,
}

fn find_cached_item(context: &OperationContext<'_>, key: &CacheKey) -> Option<ValueWrapper> {
    for cache in &context.caches {
        if let Some(value) = cache.get(key) {
            tracing::trace!("Cache entry for key {:?} found in cache '{}'", key, cache.name());
            return Some(value);
        }
    }
    tracing::trace!("No cache entry for key {:?} in cache(s) {:?}", key, context.operation.cache_names());
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ConcurrentMapCacheManager;
    use crate::operation::{CacheEvict, CachePut, Cacheable};
    use lattice_aop::{AopProxy, ProxyFactory};
    use lattice_core::metadata::{arg, Annotation, ClassIndex, ParameterMetadata};
    use parking_lot::Mutex;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct User {
        id: u32,
        name: String,
    }

    struct UserService {
        calls: AtomicUsize,
        caches: Arc<ConcurrentMapCacheManager>,
        seen_sizes: Mutex<Vec<usize>>,
    }

    impl UserService {
        fn called(&self) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst) + 1
        }

        fn users_cache_size(&self) -> usize {
            self.caches
                .get_cache("users")
                .and_then(|cache| cache.get(&CacheKey::of(5u32)).map(|_| 1))
                .unwrap_or(0)
        }
    }

    fn some<T: Any + Send + Sync>(value: T) -> Option<BeanObject> {
        Some(Arc::new(value))
    }

    fn user(id: u32, name: &str) -> Option<BeanObject> {
        some(User {
            id,
            name: name.to_string(),
        })
    }

    fn with_cache(method: MethodMetadata, annotation: impl Any + Send + Sync) -> MethodMetadata {
        method.with_annotation(Annotation::extension(annotation))
    }

    fn user_service_class() -> ClassMetadata {
        let id = || ParameterMetadata::new("id", "u32");
        ClassMetadata::new("app::UserService")
            .with_method(with_cache(
                MethodMetadata::new("get_user")
                    .with_parameter(id())
                    .shared::<UserService>(|service, args| {
                        service.called();
                        let id = arg::<u32>(&args, 0)?;
                        Ok(user(*id, "loaded"))
                    }),
                Cacheable::new(&["users"]),
            ))
            .with_method(with_cache(
                MethodMetadata::new("find_user")
                    .with_parameter(id())
                    .shared::<UserService>(|service, args| {
                        service.called();
                        let id = arg::<u32>(&args, 0)?;
                        Ok(if *id == 404 { None } else { user(*id, "found") })
                    }),
                Cacheable::new(&["users"]).condition("#id != 0").unless("#result == null"),
            ))
            .with_method(with_cache(
                MethodMetadata::new("reset").shared::<UserService>(|service, _| {
                    service.called();
                    service.seen_sizes.lock().push(service.users_cache_size());
                    Ok(None)
                }),
                CacheEvict::new(&["users"]).all_entries().before_invocation(),
            ))
            .with_method(with_cache(
                MethodMetadata::new("rename")
                    .with_parameter(id())
                    .with_parameter(ParameterMetadata::new("name", "String"))
                    .shared::<UserService>(|service, args| {
                        service.called();
                        let id = arg::<u32>(&args, 0)?;
                        let name = arg::<String>(&args, 1)?;
                        Ok(user(*id, &name))
                    }),
                CachePut::new(&["users"]).key("#p0"),
            ))
            .with_method(with_cache(
                MethodMetadata::new("delete")
                    .with_parameter(id())
                    .shared::<UserService>(|service, args| {
                        service.called();
                        if *arg::<u32>(&args, 0)? == 0 {
                            anyhow::bail!("cannot delete user 0");
                        }
                        Ok(None)
                    }),
                CacheEvict::new(&["users"]).key("#id"),
            ))
            .with_method(with_cache(
                MethodMetadata::new("archived").shared::<UserService>(|service, _| {
                    service.called();
                    Ok(None)
                }),
                Cacheable::new(&["users", "archive"]),
            ))
            .with_method(with_cache(
                MethodMetadata::new("by_name")
                    .with_parameter(id())
                    .with_parameter(ParameterMetadata::new("name", "String"))
                    .shared::<UserService>(|service, _| {
                        service.called();
                        Ok(None)
                    }),
                Cacheable::new(&["users"]).key("#name"),
            ))
    }

    struct Fixture {
        proxy: Arc<AopProxy>,
        service: Arc<UserService>,
        caches: Arc<ConcurrentMapCacheManager>,
    }

    impl Fixture {
        fn new(caches: ConcurrentMapCacheManager) -> Self {
            let caches = Arc::new(caches);
            let service = Arc::new(UserService {
                calls: AtomicUsize::new(0),
                caches: Arc::clone(&caches),
                seen_sizes: Mutex::new(Vec::new()),
            });
            let interceptor = CacheInterceptor::with(
                Arc::clone(&caches) as Arc<dyn CacheManager>,
                Arc::new(AnnotationCacheOperationSource::new()),
            );
            let proxy = ProxyFactory::new(
                Arc::new(ClassIndex::with_classes([user_service_class()])),
                "userService",
                Arc::clone(&service) as BeanObject,
                "app::UserService",
            )
            .add_interceptor(Arc::new(interceptor))
            .get_proxy()
            .unwrap();
            Self { proxy, service, caches }
        }

        fn calls(&self) -> usize {
            self.service.calls.load(Ordering::SeqCst)
        }

        fn cached(&self, key: CacheKey) -> Option<ValueWrapper> {
            self.caches.get_cache("users").unwrap().get(&key)
        }
    }

    fn as_user(value: Option<BeanObject>) -> Arc<User> {
        value.unwrap().downcast::<User>().unwrap()
    }

    #[test]
    fn test_second_call_is_served_from_cache() {
        let fixture = Fixture::new(ConcurrentMapCacheManager::new());

        let first = as_user(fixture.proxy.invoke("get_user", vec![some(5u32)]).unwrap());
        assert_eq!(first.id, 5);
        assert_eq!(fixture.calls(), 1);
        assert!(fixture.cached(CacheKey::of(5u32)).is_some());

        let second = as_user(fixture.proxy.invoke("get_user", vec![some(5u32)]).unwrap());
        assert_eq!(fixture.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));

        fixture.proxy.invoke("get_user", vec![some(6u32)]).unwrap();
        assert_eq!(fixture.calls(), 2);
    }

    #[test]
    fn test_evict_all_entries_runs_before_the_method_body() {
        let fixture = Fixture::new(ConcurrentMapCacheManager::new());
        fixture.proxy.invoke("get_user", vec![some(5u32)]).unwrap();
        assert!(fixture.cached(CacheKey::of(5u32)).is_some());

        fixture.proxy.invoke("reset", vec![]).unwrap();
        assert_eq!(*fixture.service.seen_sizes.lock(), vec![0]);
        assert!(fixture.cached(CacheKey::of(5u32)).is_none());
    }

    #[test]
    fn test_condition_and_unless() {
        let fixture = Fixture::new(ConcurrentMapCacheManager::new());

        fixture.proxy.invoke("find_user", vec![some(0u32)]).unwrap();
        fixture.proxy.invoke("find_user", vec![some(0u32)]).unwrap();
        assert_eq!(fixture.calls(), 2);
        assert!(fixture.cached(CacheKey::of(0u32)).is_none());

        assert!(fixture.proxy.invoke("find_user", vec![some(404u32)]).unwrap().is_none());
        assert!(fixture.cached(CacheKey::of(404u32)).is_none());

        fixture.proxy.invoke("find_user", vec![some(7u32)]).unwrap();
        fixture.proxy.invoke("find_user", vec![some(7u32)]).unwrap();
        assert_eq!(fixture.calls(), 4);
    }

    #[test]
    fn test_put_and_keyed_evict_share_keys_with_cacheable() {
        let fixture = Fixture::new(ConcurrentMapCacheManager::new());
        fixture.proxy.invoke("get_user", vec![some(5u32)]).unwrap();

        fixture
            .proxy
            .invoke("rename", vec![some(5u32), some("ann".to_string())])
            .unwrap();
        let renamed = as_user(fixture.proxy.invoke("get_user", vec![some(5u32)]).unwrap());
        assert_eq!(renamed.name, "ann");
        assert_eq!(fixture.calls(), 2);

        fixture.proxy.invoke("delete", vec![some(5u32)]).unwrap();
        assert!(fixture.cached(CacheKey::of(5u32)).is_none());
    }

    #[test]
    fn test_failed_invocation_skips_after_evictions() {
        let fixture = Fixture::new(ConcurrentMapCacheManager::new());
        fixture.caches.get_cache("users").unwrap().put(CacheKey::of(0u32), None);

        let error = fixture.proxy.invoke("delete", vec![some(0u32)]).unwrap_err();
        assert_eq!(error.to_string(), "cannot delete user 0");
        assert!(fixture.cached(CacheKey::of(0u32)).is_some());
    }

    #[test]
    fn test_unknown_cache_fails_before_any_mutation() {
        let fixture = Fixture::new(ConcurrentMapCacheManager::with_cache_names(&["users"]));

        let error = fixture.proxy.invoke("archived", vec![]).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<CacheError>(),
            Some(CacheError::CacheNotFound { cache_name, .. }) if cache_name == "archive"
        ));
        assert_eq!(fixture.calls(), 0);
        assert!(fixture.cached(CacheKey::Empty).is_none());
    }

    #[test]
    fn test_null_key_is_fatal() {
        let fixture = Fixture::new(ConcurrentMapCacheManager::new());

        let error = fixture.proxy.invoke("by_name", vec![some(1u32), None]).unwrap_err();
        assert!(matches!(error.downcast_ref::<CacheError>(), Some(CacheError::NullKey { .. })));
        assert_eq!(fixture.calls(), 0);
    }

    #[test]
    fn test_uninitialized_interceptor_bypasses_caching() {
        let interceptor = CacheInterceptor::new();
        assert!(!interceptor.is_initialized());

        let service = Arc::new(UserService {
            calls: AtomicUsize::new(0),
            caches: Arc::new(ConcurrentMapCacheManager::new()),
            seen_sizes: Mutex::new(Vec::new()),
        });
        let proxy = ProxyFactory::new(
            Arc::new(ClassIndex::with_classes([user_service_class()])),
            "userService",
            Arc::clone(&service) as BeanObject,
            "app::UserService",
        )
        .add_interceptor(Arc::new(interceptor))
        .get_proxy()
        .unwrap();

        proxy.invoke("get_user", vec![some(5u32)]).unwrap();
        proxy.invoke("get_user", vec![some(5u32)]).unwrap();
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
        assert!(service.caches.cache_names().is_empty());
    }
}
