use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::scope::{Scope, ScopedProxyMode};

/// 容器中的 Bean 实例
pub type BeanObject = Arc<dyn Any + Send + Sync>;

/// 直接提供实例的回调（编程式注册）
pub type InstanceSupplier = Arc<dyn Fn() -> anyhow::Result<BeanObject> + Send + Sync>;

/// FactoryBean 的名称前缀，`&name` 表示取工厂本身
pub const FACTORY_BEAN_PREFIX: &str = "&";

/// FactoryBean 的类型名
pub const FACTORY_BEAN_TYPE: &str = "lattice::FactoryBean";

/// 定义属性：FactoryBean 产出对象的类型名
pub const FACTORY_BEAN_OBJECT_TYPE_ATTRIBUTE: &str = "factoryBeanObjectType";

/// Bean 的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Role {
    /// 应用自身定义的 Bean
    #[default]
    Application,
    /// 较大配置中的支撑部分
    Support,
    /// 框架内部基础设施
    Infrastructure,
}

/// 自动装配模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutowireMode {
    #[default]
    No,
    ByName,
    ByType,
    Constructor,
}

/// Bean 定义的来源
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BeanOrigin {
    /// 代码直接注册
    #[default]
    Programmatic,
    /// 组件扫描
    Scanned,
    /// 配置类中的 bean 方法
    ConfigurationClass {
        declaring_class: String,
        method_name: String,
    },
    /// 被导入的配置类本身
    ImportedConfiguration { imported_by: String },
    /// 外部资源文件
    External { resource: String },
    /// 容器内部
    Infrastructure,
}

impl BeanOrigin {
    pub fn is_configuration_class(&self) -> bool {
        matches!(self, BeanOrigin::ConfigurationClass { .. })
    }
}

/// 构造参数或属性的值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentValue {
    /// 引用另一个 Bean
    Reference(String),
    /// 字面量（注入为 `String`）
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorArgument {
    pub index: usize,
    pub value: ArgumentValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue {
    pub name: String,
    pub value: ArgumentValue,
}

/// FactoryBean - 由容器管理、负责产出其他对象的 Bean
pub trait FactoryBean: Send + Sync {
    /// 产出对象
    fn get_object(&self) -> anyhow::Result<BeanObject>;

    /// 产出对象的类型名
    fn object_type(&self) -> Option<String> {
        None
    }

    /// 产出对象是否可缓存
    fn is_singleton(&self) -> bool {
        true
    }
}

/// FactoryBean 在容器中的存放形式
pub struct FactoryBeanObject(pub Arc<dyn FactoryBean>);

/// 延后绑定的 Bean 引用
///
/// 字段注入形成单例环时，环上的引用在目标单例注册之后才写入；
/// 绑定之前 [`BeanRef::get`] 返回 `None`。
pub struct BeanRef<T> {
    cell: OnceCell<Arc<T>>,
}

impl<T> BeanRef<T> {
    pub fn new() -> Self {
        Self { cell: OnceCell::new() }
    }

    pub fn get(&self) -> Option<&Arc<T>> {
        self.cell.get()
    }

    pub fn is_bound(&self) -> bool {
        self.cell.get().is_some()
    }

    /// 写入目标，已经绑定过时返回 `false`
    pub fn bind(&self, value: Arc<T>) -> bool {
        self.cell.set(value).is_ok()
    }
}

impl<T> Default for BeanRef<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BeanRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanRef")
            .field("target", &std::any::type_name::<T>())
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Bean 定义 - 描述如何创建和管理 Bean
#[derive(Clone, Default)]
pub struct BeanDefinition {
    /// Bean 的类名（工厂方法场景下是声明静态方法的类）
    pub bean_class_name: Option<String>,

    /// 实例工厂方法所在的 Bean
    pub factory_bean_name: Option<String>,

    /// 工厂方法名
    pub factory_method_name: Option<String>,

    pub scope: Scope,
    pub scoped_proxy: ScopedProxyMode,

    /// 是否延迟初始化（仅对单例有效）
    pub lazy_init: bool,

    /// 是否参与按类型自动装配
    pub autowire_candidate: bool,

    pub primary: bool,
    pub role: Role,

    /// 必须先初始化的 Bean
    pub depends_on: Vec<String>,

    pub constructor_args: Vec<ConstructorArgument>,
    pub property_values: Vec<PropertyValue>,

    /// 父定义（定义继承）
    pub parent_name: Option<String>,

    /// 抽象定义永远不会被实例化
    pub is_abstract: bool,

    pub autowire_mode: AutowireMode,
    pub init_method_name: Option<String>,
    pub destroy_method_name: Option<String>,

    pub origin: BeanOrigin,

    /// 附加属性
    pub attributes: BTreeMap<String, String>,

    /// 编程式实例提供者
    pub instance_supplier: Option<InstanceSupplier>,
}

impl BeanDefinition {
    /// 基于类创建定义
    pub fn for_class(class_name: impl Into<String>) -> Self {
        Self {
            bean_class_name: Some(class_name.into()),
            autowire_candidate: true,
            ..Default::default()
        }
    }

    /// 基于实例工厂方法创建定义
    pub fn for_factory_method(
        factory_bean_name: impl Into<String>,
        factory_method_name: impl Into<String>,
    ) -> Self {
        Self {
            factory_bean_name: Some(factory_bean_name.into()),
            factory_method_name: Some(factory_method_name.into()),
            autowire_candidate: true,
            ..Default::default()
        }
    }

    /// 基于静态工厂方法创建定义
    pub fn for_static_factory_method(
        class_name: impl Into<String>,
        factory_method_name: impl Into<String>,
    ) -> Self {
        Self {
            bean_class_name: Some(class_name.into()),
            factory_method_name: Some(factory_method_name.into()),
            autowire_candidate: true,
            ..Default::default()
        }
    }

    /// 由提供者直接给出实例，`type_name` 用于按类型匹配
    pub fn from_supplier<F>(type_name: impl Into<String>, supplier: F) -> Self
    where
        F: Fn() -> anyhow::Result<BeanObject> + Send + Sync + 'static,
    {
        Self {
            bean_class_name: Some(type_name.into()),
            autowire_candidate: true,
            instance_supplier: Some(Arc::new(supplier)),
            ..Default::default()
        }
    }

    /// 继承父定义的子定义
    pub fn child_of(parent_name: impl Into<String>) -> Self {
        Self {
            parent_name: Some(parent_name.into()),
            autowire_candidate: true,
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy_init = lazy;
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_origin(mut self, origin: BeanOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_autowire_mode(mut self, mode: AutowireMode) -> Self {
        self.autowire_mode = mode;
        self
    }

    pub fn with_autowire_candidate(mut self, candidate: bool) -> Self {
        self.autowire_candidate = candidate;
        self
    }

    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    pub fn with_init_method(mut self, name: impl Into<String>) -> Self {
        self.init_method_name = Some(name.into());
        self
    }

    pub fn with_destroy_method(mut self, name: impl Into<String>) -> Self {
        self.destroy_method_name = Some(name.into());
        self
    }

    pub fn with_constructor_arg(mut self, index: usize, value: ArgumentValue) -> Self {
        self.constructor_args.push(ConstructorArgument { index, value });
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: ArgumentValue) -> Self {
        self.property_values.push(PropertyValue {
            name: name.into(),
            value,
        });
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn is_factory_method(&self) -> bool {
        self.factory_method_name.is_some()
    }

    /// 查找字面量属性值
    pub fn property_literal(&self, name: &str) -> Option<&str> {
        self.property_values
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| match &p.value {
                ArgumentValue::Literal(v) => Some(v.as_str()),
                ArgumentValue::Reference(_) => None,
            })
    }

    /// 设置（或覆盖）一个属性值
    pub fn set_property(&mut self, name: &str, value: ArgumentValue) {
        self.property_values.retain(|p| p.name != name);
        self.property_values.push(PropertyValue {
            name: name.to_string(),
            value,
        });
    }

    /// 用子定义覆盖父定义得到合并后的定义
    ///
    /// 类名/工厂信息在子定义未设置时继承父定义；依赖、构造参数、属性按父在前合并，
    /// 同索引/同名时子定义优先。
    pub fn merged_with_parent(&self, parent: &BeanDefinition) -> BeanDefinition {
        let mut merged = parent.clone();

        if self.bean_class_name.is_some() {
            merged.bean_class_name = self.bean_class_name.clone();
        }
        if self.factory_bean_name.is_some() {
            merged.factory_bean_name = self.factory_bean_name.clone();
        }
        if self.factory_method_name.is_some() {
            merged.factory_method_name = self.factory_method_name.clone();
        }
        if self.instance_supplier.is_some() {
            merged.instance_supplier = self.instance_supplier.clone();
        }
        if self.init_method_name.is_some() {
            merged.init_method_name = self.init_method_name.clone();
        }
        if self.destroy_method_name.is_some() {
            merged.destroy_method_name = self.destroy_method_name.clone();
        }

        merged.scope = self.scope.clone();
        merged.scoped_proxy = self.scoped_proxy;
        merged.lazy_init = self.lazy_init;
        merged.autowire_candidate = self.autowire_candidate;
        merged.primary = self.primary;
        merged.role = self.role;
        merged.is_abstract = self.is_abstract;
        merged.autowire_mode = self.autowire_mode;
        merged.origin = self.origin.clone();
        merged.parent_name = None;

        for dep in &self.depends_on {
            if !merged.depends_on.contains(dep) {
                merged.depends_on.push(dep.clone());
            }
        }
        for arg in &self.constructor_args {
            merged.constructor_args.retain(|a| a.index != arg.index);
            merged.constructor_args.push(arg.clone());
        }
        for prop in &self.property_values {
            merged.set_property(&prop.name, prop.value.clone());
        }
        for (k, v) in &self.attributes {
            merged.attributes.insert(k.clone(), v.clone());
        }

        merged
    }

    /// 简短描述，用于日志和错误信息
    pub fn description(&self) -> String {
        match (
            &self.bean_class_name,
            &self.factory_bean_name,
            &self.factory_method_name,
        ) {
            (_, Some(factory), Some(method)) => format!("factory method '{}' on bean '{}'", method, factory),
            (Some(class), None, Some(method)) => format!("static factory method '{}' on class [{}]", method, class),
            (Some(class), _, None) => format!("class [{}]", class),
            _ => "definition without class".to_string(),
        }
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("bean_class_name", &self.bean_class_name)
            .field("factory_bean_name", &self.factory_bean_name)
            .field("factory_method_name", &self.factory_method_name)
            .field("scope", &self.scope)
            .field("lazy_init", &self.lazy_init)
            .field("primary", &self.primary)
            .field("role", &self.role)
            .field("depends_on", &self.depends_on)
            .field("parent_name", &self.parent_name)
            .field("is_abstract", &self.is_abstract)
            .field("origin", &self.origin)
            .field("has_instance_supplier", &self.instance_supplier.is_some())
            .finish()
    }
}

impl fmt::Display for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}; scope={}; abstract={}; lazyInit={}; primary={}",
            self.description(),
            self.scope,
            self.is_abstract,
            self.lazy_init,
            self.primary
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_definition_inherits_class_and_merges_dependencies() {
        let parent = BeanDefinition::for_class("app::BaseService")
            .with_depends_on(vec!["dataSource".to_string()])
            .with_constructor_arg(0, ArgumentValue::Literal("base".to_string()))
            .with_abstract(true);

        let child = BeanDefinition::child_of("baseService")
            .with_depends_on(vec!["cache".to_string()])
            .with_constructor_arg(0, ArgumentValue::Literal("child".to_string()));

        let merged = child.merged_with_parent(&parent);

        assert_eq!(merged.bean_class_name.as_deref(), Some("app::BaseService"));
        assert!(!merged.is_abstract);
        assert_eq!(merged.depends_on, vec!["dataSource", "cache"]);
        assert_eq!(merged.constructor_args.len(), 1);
        assert_eq!(
            merged.constructor_args[0].value,
            ArgumentValue::Literal("child".to_string())
        );
        assert!(merged.parent_name.is_none());
    }

    #[test]
    fn test_set_property_replaces_existing_value() {
        let mut def = BeanDefinition::for_class("app::Creator")
            .with_property("proxyTargetClass", ArgumentValue::Literal("false".to_string()));
        def.set_property("proxyTargetClass", ArgumentValue::Literal("true".to_string()));

        assert_eq!(def.property_values.len(), 1);
        assert_eq!(def.property_literal("proxyTargetClass"), Some("true"));
    }
}
