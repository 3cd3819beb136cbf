//! 缓存键与键生成
//!
//! 方法参数以 `Arc<dyn Any>` 传递，无法直接比较和哈希。能作为键的类型需要登记一个转换函数，
//! 转换后的 [`CacheKey`] 把相等性和哈希委托给值本身的类型。

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use lattice_core::bean::BeanObject;
use lattice_core::metadata::{ClassMetadata, MethodMetadata};
use parking_lot::RwLock;

use crate::error::{CacheError, CacheResult};

/// 可作为缓存键一部分的值
pub trait KeyPart: Any + Send + Sync {
    fn eq_part(&self, other: &dyn KeyPart) -> bool;

    fn hash_part(&self, state: &mut dyn Hasher);

    fn fmt_part(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;

    fn as_any(&self) -> &dyn Any;
}

impl<T> KeyPart for T
where
    T: Any + Send + Sync + Eq + Hash + fmt::Debug,
{
    fn eq_part(&self, other: &dyn KeyPart) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn hash_part(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }

    fn fmt_part(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 缓存键
#[derive(Clone)]
pub enum CacheKey {
    /// 无参数方法
    Empty,
    /// 组合键中缺失的参数
    Null,
    Value(Arc<dyn KeyPart>),
    /// 多个参数
    Composite(Arc<[CacheKey]>),
}

impl CacheKey {
    pub fn of<T>(value: T) -> Self
    where
        T: Any + Send + Sync + Eq + Hash + fmt::Debug,
    {
        CacheKey::Value(Arc::new(value))
    }

    pub fn composite(parts: Vec<CacheKey>) -> Self {
        CacheKey::Composite(parts.into())
    }

    /// 单值键的值
    pub fn value<T: Any>(&self) -> Option<&T> {
        match self {
            CacheKey::Value(part) => part.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CacheKey::Empty, CacheKey::Empty) | (CacheKey::Null, CacheKey::Null) => true,
            (CacheKey::Value(a), CacheKey::Value(b)) => a.eq_part(&**b),
            (CacheKey::Composite(a), CacheKey::Composite(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CacheKey::Empty | CacheKey::Null => {}
            CacheKey::Value(part) => part.hash_part(state),
            CacheKey::Composite(parts) => parts.hash(state),
        }
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Empty => write!(f, "[]"),
            CacheKey::Null => write!(f, "null"),
            CacheKey::Value(part) => part.fmt_part(f),
            CacheKey::Composite(parts) => f.debug_list().entries(parts.iter()).finish(),
        }
    }
}

/// 把参数对象转换为缓存键，类型不符时返回 `None`
pub type KeyConverter = fn(&BeanObject) -> Option<CacheKey>;

fn convert<T>(value: &BeanObject) -> Option<CacheKey>
where
    T: Any + Send + Sync + Eq + Hash + fmt::Debug + Clone,
{
    value.downcast_ref::<T>().map(|v| CacheKey::of(v.clone()))
}

fn pass_through(value: &BeanObject) -> Option<CacheKey> {
    value.downcast_ref::<CacheKey>().cloned()
}

/// 键生成策略
pub trait KeyGenerator: Send + Sync {
    fn generate(
        &self,
        target_class: &ClassMetadata,
        method: &MethodMetadata,
        args: &[Option<BeanObject>],
    ) -> CacheResult<CacheKey>;

    /// 单个值转换为键，类型不支持时返回 `None`
    fn key_for_value(&self, value: &BeanObject) -> Option<CacheKey>;
}

/// 默认键生成器
///
/// - 无参数：[`CacheKey::Empty`]
/// - 一个非空参数：参数本身
/// - 其他情况：按位置组合的键，缺失的参数记为 [`CacheKey::Null`]
pub struct SimpleKeyGenerator {
    converters: RwLock<Vec<KeyConverter>>,
}

impl SimpleKeyGenerator {
    pub fn new() -> Self {
        let converters: Vec<KeyConverter> = vec![
            pass_through,
            convert::<String>,
            convert::<&'static str>,
            convert::<bool>,
            convert::<char>,
            convert::<i8>,
            convert::<i16>,
            convert::<i32>,
            convert::<i64>,
            convert::<i128>,
            convert::<isize>,
            convert::<u8>,
            convert::<u16>,
            convert::<u32>,
            convert::<u64>,
            convert::<u128>,
            convert::<usize>,
        ];
        Self {
            converters: RwLock::new(converters),
        }
    }

    /// 登记一个可作为键的参数类型
    pub fn register<T>(&self)
    where
        T: Any + Send + Sync + Eq + Hash + fmt::Debug + Clone,
    {
        self.converters.write().push(convert::<T>);
    }
}

impl Default for SimpleKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator for SimpleKeyGenerator {
    fn generate(
        &self,
        _target_class: &ClassMetadata,
        method: &MethodMetadata,
        args: &[Option<BeanObject>],
    ) -> CacheResult<CacheKey> {
        match args {
            [] => Ok(CacheKey::Empty),
            [Some(value)] => argument_key(self, method, 0, value),
            _ => {
                let parts = args
                    .iter()
                    .enumerate()
                    .map(|(index, arg)| match arg {
                        Some(value) => argument_key(self, method, index, value),
                        None => Ok(CacheKey::Null),
                    })
                    .collect::<CacheResult<Vec<_>>>()?;
                Ok(CacheKey::composite(parts))
            }
        }
    }

    fn key_for_value(&self, value: &BeanObject) -> Option<CacheKey> {
        self.converters.read().iter().find_map(|converter| converter(value))
    }
}

/// 第 `index` 个参数转换为键
pub fn argument_key(
    generator: &dyn KeyGenerator,
    method: &MethodMetadata,
    index: usize,
    value: &BeanObject,
) -> CacheResult<CacheKey> {
    generator.key_for_value(value).ok_or_else(|| CacheError::UnsupportedKey {
        origin: format!("argument {}", index),
        type_name: method
            .parameters
            .get(index)
            .map(|p| p.type_name.clone())
            .unwrap_or_else(|| "<unknown>".to_string()),
    })
}
