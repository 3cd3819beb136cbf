use std::fmt;

use crate::bean::BeanObject;
use crate::error::ContainerResult;
use crate::metadata::{Annotated, FieldMetadata, ParameterMetadata, SharedFieldSetter};

/// 依赖声明所在的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionPoint {
    Field {
        class: String,
        field: String,
    },
    MethodParameter {
        class: String,
        method: String,
        index: usize,
    },
    ConstructorParameter {
        class: String,
        index: usize,
    },
}

impl fmt::Display for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionPoint::Field { field, .. } => write!(f, "field '{}'", field),
            InjectionPoint::MethodParameter { method, index, .. } => {
                write!(f, "method '{}' parameter {}", method, index)
            }
            InjectionPoint::ConstructorParameter { class, index } => {
                write!(f, "constructor parameter {} of [{}]", index, class)
            }
        }
    }
}

/// 依赖描述符 - 一次依赖解析的全部输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDescriptor {
    /// 期望的类型名；集合依赖时是元素类型
    pub type_name: String,
    pub required: bool,
    pub member: InjectionPoint,
    pub qualifier: Option<String>,
    /// 字段名或参数名，多候选时作为名称回退
    pub dependency_name: Option<String>,
    /// 注入所有匹配的 Bean（`Vec<BeanObject>`）
    pub collection: bool,
    /// `${...}` 值注入，注入解析后的 `String`
    pub value_expression: Option<String>,
}

impl DependencyDescriptor {
    pub fn new(type_name: impl Into<String>, member: InjectionPoint, required: bool) -> Self {
        Self {
            type_name: type_name.into(),
            required,
            member,
            qualifier: None,
            dependency_name: None,
            collection: false,
            value_expression: None,
        }
    }

    pub fn for_field(field: &FieldMetadata, required: bool) -> Self {
        Self {
            qualifier: field.qualifier().map(str::to_string),
            dependency_name: Some(field.name.clone()),
            collection: field.collection,
            value_expression: field.value_expression().map(str::to_string),
            ..Self::new(
                field.type_name.clone(),
                InjectionPoint::Field {
                    class: field.declaring_class.clone(),
                    field: field.name.clone(),
                },
                required,
            )
        }
    }

    pub fn for_parameter(parameter: &ParameterMetadata, member: InjectionPoint, required: bool) -> Self {
        Self {
            qualifier: parameter.qualifier().map(str::to_string),
            dependency_name: Some(parameter.name.clone()),
            collection: parameter.collection,
            value_expression: parameter.value_expression().map(str::to_string),
            ..Self::new(parameter.type_name.clone(), member, required)
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn member_description(&self) -> String {
        self.member.to_string()
    }
}

/// 依赖解析器
///
/// 注入引擎只通过这个接口访问工厂：解析依赖、按名称取 Bean、记录依赖关系
pub trait DependencyResolver: Send + Sync {
    /// 解析依赖，把参与满足依赖的 Bean 名称追加到 `autowired_names`
    ///
    /// 依赖可选且没有候选时返回 `Ok(None)`
    fn resolve_dependency(
        &self,
        descriptor: &DependencyDescriptor,
        requesting_bean: Option<&str>,
        autowired_names: &mut Vec<String>,
    ) -> ContainerResult<Option<BeanObject>>;

    fn get_bean(&self, name: &str) -> ContainerResult<BeanObject>;

    fn contains_bean(&self, name: &str) -> bool;

    /// 名为 `name` 的 Bean 能否赋给 `type_name`
    fn is_type_match(&self, name: &str, type_name: &str) -> bool;

    /// 记录 `dependent` 依赖 `bean`
    fn register_dependent_bean(&self, bean: &str, dependent: &str);

    /// 依赖指向当前线程正在创建、尚未注册的单例时返回它的名称
    fn singleton_in_creation(&self, descriptor: &DependencyDescriptor, requesting_bean: Option<&str>) -> Option<String>;

    /// `awaited` 注册之后再通过 `setter` 绑定 `dependent` 的字段
    fn defer_injection(&self, awaited: &str, dependent: &str, field: &str, setter: SharedFieldSetter);
}
