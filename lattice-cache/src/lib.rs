//! Lattice Cache - 声明式方法缓存
//!
//! - `Cacheable` / `CacheEvict` / `CachePut` 方法注解，`CacheConfig` 类级默认值
//! - 基于 Lattice AOP 的缓存拦截器和 Advisor
//! - 条件、key 和 unless 表达式
//! - 基于并发 Map 的缓存和缓存管理器

pub mod advisor;
pub mod cache;
pub mod config;
pub mod error;
pub mod expression;
pub mod interceptor;
pub mod key;
pub mod operation;

pub use advisor::{CacheAdvisor, CacheOperationSourcePointcut, CACHE_ADVISOR_TYPE_NAME};
pub use cache::{
    Cache, CacheManager, ConcurrentMapCache, ConcurrentMapCacheManager, ValueWrapper, CACHE_MANAGER_TYPE_NAME,
};
pub use config::{
    caching_classes, enable_caching, EnableCaching, CACHE_ADVISOR_BEAN_NAME, CACHE_INTERCEPTOR_BEAN_NAME,
    CACHE_OPERATION_SOURCE_BEAN_NAME, CONCURRENT_MAP_CACHE_MANAGER_TYPE_NAME,
};
pub use error::{CacheError, CacheResult};
pub use expression::{EvaluationContext, Expression, ExpressionEvaluator, InvocationResult, Value};
pub use interceptor::{CacheInterceptor, CACHE_INTERCEPTOR_TYPE_NAME};
pub use key::{CacheKey, KeyGenerator, KeyPart, SimpleKeyGenerator};
pub use operation::{
    AnnotationCacheOperationSource, CacheConfig, CacheEvict, CacheOperation, CachePut, Cacheable,
    OPERATION_SOURCE_TYPE_NAME,
};

/// 预导入模块
pub mod prelude {
    pub use crate::cache::{Cache, CacheManager, ConcurrentMapCacheManager};
    pub use crate::config::{enable_caching, EnableCaching};
    pub use crate::key::CacheKey;
    pub use crate::operation::{CacheConfig, CacheEvict, CachePut, Cacheable};
}
