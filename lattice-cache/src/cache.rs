//! 缓存与缓存管理器

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lattice_core::bean::BeanObject;
use parking_lot::RwLock;

use crate::key::CacheKey;

/// 缓存管理器 Bean 的类型名
pub const CACHE_MANAGER_TYPE_NAME: &str = "lattice_cache::CacheManager";

/// 缓存中的值
///
/// 方法可能返回空值，`ValueWrapper(None)` 表示缓存了一个空结果，和未命中不同
#[derive(Clone)]
pub struct ValueWrapper(pub Option<BeanObject>);

impl ValueWrapper {
    pub fn get(&self) -> Option<&BeanObject> {
        self.0.as_ref()
    }

    pub fn into_inner(self) -> Option<BeanObject> {
        self.0
    }
}

impl fmt::Debug for ValueWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(_) => write!(f, "ValueWrapper(<value>)"),
            None => write!(f, "ValueWrapper(null)"),
        }
    }
}

/// 缓存
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    /// 未命中返回 `None`
    fn get(&self, key: &CacheKey) -> Option<ValueWrapper>;

    fn put(&self, key: CacheKey, value: Option<BeanObject>);

    fn evict(&self, key: &CacheKey);

    /// 清空整个缓存
    fn clear(&self);
}

/// 基于 HashMap 的内存缓存
pub struct ConcurrentMapCache {
    name: String,
    store: RwLock<HashMap<CacheKey, ValueWrapper>>,
    allow_null_values: bool,
}

impl ConcurrentMapCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_null_values(name, true)
    }

    pub fn with_null_values(name: impl Into<String>, allow_null_values: bool) -> Self {
        Self {
            name: name.into(),
            store: RwLock::new(HashMap::new()),
            allow_null_values,
        }
    }

    pub fn is_allow_null_values(&self) -> bool {
        self.allow_null_values
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.store.read().contains_key(key)
    }
}

impl Cache for ConcurrentMapCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &CacheKey) -> Option<ValueWrapper> {
        self.store.read().get(key).cloned()
    }

    fn put(&self, key: CacheKey, value: Option<BeanObject>) {
        if value.is_none() && !self.allow_null_values {
            tracing::trace!("Cache '{}' does not store null values, evicting {:?}", self.name, key);
            self.store.write().remove(&key);
            return;
        }
        self.store.write().insert(key, ValueWrapper(value));
    }

    fn evict(&self, key: &CacheKey) {
        self.store.write().remove(key);
    }

    fn clear(&self) {
        self.store.write().clear();
    }
}

impl fmt::Debug for ConcurrentMapCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMapCache")
            .field("name", &self.name)
            .field("size", &self.len())
            .finish()
    }
}

/// 缓存管理器
pub trait CacheManager: Send + Sync {
    /// 按名称取缓存，不存在时返回 `None`
    fn get_cache(&self, name: &str) -> Option<Arc<dyn Cache>>;

    fn cache_names(&self) -> Vec<String>;
}

/// [`ConcurrentMapCache`] 的管理器
///
/// 默认按需创建缓存；指定了缓存名称后进入静态模式，只提供这些缓存
pub struct ConcurrentMapCacheManager {
    caches: RwLock<HashMap<String, Arc<ConcurrentMapCache>>>,
    order: RwLock<Vec<String>>,
    dynamic: bool,
    allow_null_values: bool,
}

impl ConcurrentMapCacheManager {
    pub fn new() -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            dynamic: true,
            allow_null_values: true,
        }
    }

    /// 静态模式，只有这些缓存
    pub fn with_cache_names(names: &[&str]) -> Self {
        let manager = Self {
            dynamic: false,
            ..Self::new()
        };
        for name in names {
            manager.create(name);
        }
        manager
    }

    pub fn allow_null_values(mut self, allow: bool) -> Self {
        self.allow_null_values = allow;
        self
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    fn create(&self, name: &str) -> Arc<ConcurrentMapCache> {
        let mut caches = self.caches.write();
        if let Some(cache) = caches.get(name) {
            return Arc::clone(cache);
        }
        tracing::debug!("Creating cache '{}'", name);
        let cache = Arc::new(ConcurrentMapCache::with_null_values(name, self.allow_null_values));
        caches.insert(name.to_string(), Arc::clone(&cache));
        self.order.write().push(name.to_string());
        cache
    }
}

impl Default for ConcurrentMapCacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManager for ConcurrentMapCacheManager {
    fn get_cache(&self, name: &str) -> Option<Arc<dyn Cache>> {
        if let Some(cache) = self.caches.read().get(name) {
            return Some(Arc::clone(cache) as Arc<dyn Cache>);
        }
        if !self.dynamic {
            return None;
        }
        Some(self.create(name) as Arc<dyn Cache>)
    }

    fn cache_names(&self) -> Vec<String> {
        self.order.read().clone()
    }
}

impl fmt::Debug for ConcurrentMapCacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMapCacheManager")
            .field("caches", &self.cache_names())
            .field("dynamic", &self.dynamic)
            .finish()
    }
}
