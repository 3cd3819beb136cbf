//! 缓存操作
//!
//! 声明方式：在方法元数据上挂 `Annotation::extension(Cacheable::new(&["users"]).key("#p0"))`，
//! 类上可以用 [`CacheConfig`] 提供默认的缓存名称。
//! [`AnnotationCacheOperationSource`] 把这些注解解析成 [`CacheOperation`] 并按方法缓存。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lattice_core::metadata::{Annotated, ClassMetadata, MethodMetadata};
use parking_lot::RwLock;

use crate::error::{CacheError, CacheResult};

/// 操作源 Bean 的类型名
pub const OPERATION_SOURCE_TYPE_NAME: &str = "lattice_cache::AnnotationCacheOperationSource";

/// 读缓存，未命中时调用方法并写入结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cacheable {
    pub cache_names: Vec<String>,
    pub key: Option<String>,
    pub condition: Option<String>,
    /// 结果为真时不写入
    pub unless: Option<String>,
}

impl Cacheable {
    pub fn new(cache_names: &[&str]) -> Self {
        Self {
            cache_names: names(cache_names),
            ..Default::default()
        }
    }

    pub fn key(mut self, expression: &str) -> Self {
        self.key = Some(expression.to_string());
        self
    }

    pub fn condition(mut self, expression: &str) -> Self {
        self.condition = Some(expression.to_string());
        self
    }

    pub fn unless(mut self, expression: &str) -> Self {
        self.unless = Some(expression.to_string());
        self
    }
}

/// 移除缓存条目
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEvict {
    pub cache_names: Vec<String>,
    pub key: Option<String>,
    pub condition: Option<String>,
    /// 清空整个缓存而不是移除单个键
    pub all_entries: bool,
    /// 在方法调用之前移除；默认在方法成功返回之后
    pub before_invocation: bool,
}

impl CacheEvict {
    pub fn new(cache_names: &[&str]) -> Self {
        Self {
            cache_names: names(cache_names),
            ..Default::default()
        }
    }

    pub fn key(mut self, expression: &str) -> Self {
        self.key = Some(expression.to_string());
        self
    }

    pub fn condition(mut self, expression: &str) -> Self {
        self.condition = Some(expression.to_string());
        self
    }

    pub fn all_entries(mut self) -> Self {
        self.all_entries = true;
        self
    }

    pub fn before_invocation(mut self) -> Self {
        self.before_invocation = true;
        self
    }
}

/// 总是调用方法并写入结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePut {
    pub cache_names: Vec<String>,
    pub key: Option<String>,
    pub condition: Option<String>,
    pub unless: Option<String>,
}

impl CachePut {
    pub fn new(cache_names: &[&str]) -> Self {
        Self {
            cache_names: names(cache_names),
            ..Default::default()
        }
    }

    pub fn key(mut self, expression: &str) -> Self {
        self.key = Some(expression.to_string());
        self
    }

    pub fn condition(mut self, expression: &str) -> Self {
        self.condition = Some(expression.to_string());
        self
    }

    pub fn unless(mut self, expression: &str) -> Self {
        self.unless = Some(expression.to_string());
        self
    }
}

/// 类级别的缓存默认设置
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfig {
    pub cache_names: Vec<String>,
}

impl CacheConfig {
    pub fn new(cache_names: &[&str]) -> Self {
        Self {
            cache_names: names(cache_names),
        }
    }
}

fn names(cache_names: &[&str]) -> Vec<String> {
    cache_names.iter().map(|s| s.to_string()).collect()
}

/// 解析后的缓存操作，缓存名称已经补全
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOperation {
    Cacheable(Cacheable),
    Evict(CacheEvict),
    Put(CachePut),
}

impl CacheOperation {
    pub fn cache_names(&self) -> &[String] {
        match self {
            CacheOperation::Cacheable(op) => &op.cache_names,
            CacheOperation::Evict(op) => &op.cache_names,
            CacheOperation::Put(op) => &op.cache_names,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            CacheOperation::Cacheable(op) => op.key.as_deref(),
            CacheOperation::Evict(op) => op.key.as_deref(),
            CacheOperation::Put(op) => op.key.as_deref(),
        }
    }

    pub fn condition(&self) -> Option<&str> {
        match self {
            CacheOperation::Cacheable(op) => op.condition.as_deref(),
            CacheOperation::Evict(op) => op.condition.as_deref(),
            CacheOperation::Put(op) => op.condition.as_deref(),
        }
    }

    /// 写入前的否决表达式，移除操作没有
    pub fn unless(&self) -> Option<&str> {
        match self {
            CacheOperation::Cacheable(op) => op.unless.as_deref(),
            CacheOperation::Put(op) => op.unless.as_deref(),
            CacheOperation::Evict(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CacheOperation::Cacheable(_) => "Cacheable",
            CacheOperation::Evict(_) => "CacheEvict",
            CacheOperation::Put(_) => "CachePut",
        }
    }

    fn cache_names_mut(&mut self) -> &mut Vec<String> {
        match self {
            CacheOperation::Cacheable(op) => &mut op.cache_names,
            CacheOperation::Evict(op) => &mut op.cache_names,
            CacheOperation::Put(op) => &mut op.cache_names,
        }
    }
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.kind(), self.cache_names())?;
        if let Some(key) = self.key() {
            write!(f, " key='{}'", key)?;
        }
        if let Some(condition) = self.condition() {
            write!(f, " condition='{}'", condition)?;
        }
        Ok(())
    }
}

type OperationCacheKey = (String, String);

/// 从注解中解析缓存操作
///
/// 结果按 (类, 方法签名) 缓存，没有操作的方法也会记住
#[derive(Default)]
pub struct AnnotationCacheOperationSource {
    cache: RwLock<HashMap<OperationCacheKey, Option<Arc<[CacheOperation]>>>>,
}

impl AnnotationCacheOperationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 方法上是否声明了缓存操作
    pub fn has_cache_operations(&self, method: &MethodMetadata) -> bool {
        method.extension::<Cacheable>().is_some()
            || method.extension::<CacheEvict>().is_some()
            || method.extension::<CachePut>().is_some()
    }

    /// 方法的缓存操作，没有时返回 `None`
    pub fn get_cache_operations(
        &self,
        method: &MethodMetadata,
        class: &ClassMetadata,
    ) -> CacheResult<Option<Arc<[CacheOperation]>>> {
        let key = (class.name.clone(), method.signature());
        if let Some(cached) = self.cache.read().get(&key) {
            return Ok(cached.clone());
        }

        let operations = self.compute_operations(method, class)?;
        let mut cache = self.cache.write();
        Ok(cache.entry(key).or_insert(operations).clone())
    }

    fn compute_operations(
        &self,
        method: &MethodMetadata,
        class: &ClassMetadata,
    ) -> CacheResult<Option<Arc<[CacheOperation]>>> {
        let mut operations: Vec<CacheOperation> = Vec::new();
        operations.extend(method.extensions::<Cacheable>().into_iter().cloned().map(CacheOperation::Cacheable));
        operations.extend(method.extensions::<CacheEvict>().into_iter().cloned().map(CacheOperation::Evict));
        operations.extend(method.extensions::<CachePut>().into_iter().cloned().map(CacheOperation::Put));
        if operations.is_empty() {
            return Ok(None);
        }

        let defaults = class.extension::<CacheConfig>();
        for operation in &mut operations {
            if operation.cache_names().is_empty() {
                match defaults {
                    Some(config) if !config.cache_names.is_empty() => {
                        *operation.cache_names_mut() = config.cache_names.clone();
                    }
                    _ => {
                        return Err(CacheError::NoCacheNames {
                            operation: format!("{} on {}::{}", operation.kind(), class.name, method.name),
                        })
                    }
                }
            }
        }

        tracing::trace!(
            "Resolved {} cache operation(s) for {}::{}",
            operations.len(),
            class.name,
            method.name
        );
        Ok(Some(operations.into()))
    }
}

impl fmt::Debug for AnnotationCacheOperationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationCacheOperationSource")
            .field("cached_methods", &self.cache.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::metadata::Annotation;

    #[test]
    fn test_operations_grouped_by_kind() {
        let source = AnnotationCacheOperationSource::new();
        let class = ClassMetadata::new("app::UserService");
        let method = MethodMetadata::new("update")
            .with_annotation(Annotation::extension(CachePut::new(&["users"]).key("#p0")))
            .with_annotation(Annotation::extension(CacheEvict::new(&["lists"]).all_entries()));

        let operations = source.get_cache_operations(&method, &class).unwrap().unwrap();
        assert_eq!(operations.len(), 2);
        assert!(matches!(&operations[0], CacheOperation::Evict(op) if op.all_entries));
        assert_eq!(operations[1].key(), Some("#p0"));
        assert_eq!(operations[1].to_string(), "CachePut[\"users\"] key='#p0'");

        let again = source.get_cache_operations(&method, &class).unwrap().unwrap();
        assert!(Arc::ptr_eq(&operations, &again));
    }

    #[test]
    fn test_class_defaults_fill_missing_names() {
        let source = AnnotationCacheOperationSource::new();
        let method = MethodMetadata::new("find").with_annotation(Annotation::extension(Cacheable::default()));

        let configured =
            ClassMetadata::new("app::UserService").with_annotation(Annotation::extension(CacheConfig::new(&["users"])));
        let operations = source.get_cache_operations(&method, &configured).unwrap().unwrap();
        assert_eq!(operations[0].cache_names(), ["users".to_string()]);

        let bare = ClassMetadata::new("app::OrderService");
        assert!(matches!(
            source.get_cache_operations(&method, &bare),
            Err(CacheError::NoCacheNames { .. })
        ));
    }

    #[test]
    fn test_methods_without_operations() {
        let source = AnnotationCacheOperationSource::new();
        let class = ClassMetadata::new("app::UserService");
        let method = MethodMetadata::new("plain");
        assert!(!source.has_cache_operations(&method));
        assert!(source.get_cache_operations(&method, &class).unwrap().is_none());
    }
}
