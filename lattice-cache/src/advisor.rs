//! 缓存 Advisor：声明了缓存操作的方法才会被拦截

use std::fmt;
use std::sync::Arc;

use lattice_aop::{Advisor, MethodInterceptor, Pointcut};
use lattice_core::metadata::{ClassMetadata, MethodMetadata};

use crate::operation::AnnotationCacheOperationSource;

/// 缓存 Advisor Bean 的类型名
pub const CACHE_ADVISOR_TYPE_NAME: &str = "lattice_cache::CacheAdvisor";

/// 匹配带缓存注解的方法
pub struct CacheOperationSourcePointcut {
    source: Arc<AnnotationCacheOperationSource>,
}

impl CacheOperationSourcePointcut {
    pub fn new(source: Arc<AnnotationCacheOperationSource>) -> Self {
        Self { source }
    }
}

impl Pointcut for CacheOperationSourcePointcut {
    fn matches_method(&self, method: &MethodMetadata, _class: &ClassMetadata) -> bool {
        self.source.has_cache_operations(method)
    }
}

impl fmt::Debug for CacheOperationSourcePointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheOperationSourcePointcut")
    }
}

pub struct CacheAdvisor {
    pointcut: CacheOperationSourcePointcut,
    interceptor: Arc<dyn MethodInterceptor>,
    order: Option<i32>,
}

impl CacheAdvisor {
    pub fn new(source: Arc<AnnotationCacheOperationSource>, interceptor: Arc<dyn MethodInterceptor>) -> Self {
        Self {
            pointcut: CacheOperationSourcePointcut::new(source),
            interceptor,
            order: None,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }
}

impl Advisor for CacheAdvisor {
    fn name(&self) -> &str {
        "cacheAdvisor"
    }

    fn pointcut(&self) -> &dyn Pointcut {
        &self.pointcut
    }

    fn interceptor(&self) -> Arc<dyn MethodInterceptor> {
        Arc::clone(&self.interceptor)
    }

    fn order(&self) -> Option<i32> {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::CacheInterceptor;
    use crate::operation::Cacheable;
    use lattice_core::metadata::Annotation;

    #[test]
    fn test_matches_only_cache_annotated_methods() {
        let advisor = CacheAdvisor::new(
            Arc::new(AnnotationCacheOperationSource::new()),
            Arc::new(CacheInterceptor::new()),
        )
        .with_order(10);
        let class = ClassMetadata::new("app::UserService");
        let cached = MethodMetadata::new("find").with_annotation(Annotation::extension(Cacheable::new(&["users"])));

        assert!(advisor.pointcut().matches_method(&cached, &class));
        assert!(!advisor.pointcut().matches_method(&MethodMetadata::new("save"), &class));
        assert_eq!(advisor.order(), Some(10));
        assert_eq!(advisor.interceptor().name(), "CacheInterceptor");
    }
}
