//! 类元数据
//!
//! 容器不做运行时反射：每个受管类型都用 [`ClassMetadata`] 描述自身的注解、字段、
//! 方法和构造函数，字段设置器、方法调用器、构造函数都以闭包形式挂在描述符上。
//! 描述符可以手工构建，也可以通过 `inventory` 在编译期提交，由 [`ClassIndex`] 收集。

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::annotation::imports::{ImportBeanDefinitionRegistrar, ImportSelector};
use crate::annotation::scan::{BeanNameGenerator, TypeFilter};
use crate::bean::{AutowireMode, BeanObject, BeanRef, Role};
use crate::error::{ContainerError, ContainerResult};
use crate::scope::ScopedProxyMode;
use crate::utils::naming;

/// 构造函数句柄：按参数顺序接收解析好的依赖
pub type ConstructorFn =
    Arc<dyn Fn(Vec<Option<BeanObject>>) -> anyhow::Result<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// 字段设置器句柄
pub type FieldSetter =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), BeanObject) -> anyhow::Result<()> + Send + Sync>;

/// 经共享引用写入的字段设置器，用于 [`BeanRef`] 字段
pub type SharedFieldSetter =
    Arc<dyn Fn(&(dyn Any + Send + Sync), BeanObject) -> anyhow::Result<()> + Send + Sync>;

/// 方法调用器句柄
pub type MethodInvoker = Arc<
    dyn Fn(Receiver<'_>, Vec<Option<BeanObject>>) -> anyhow::Result<Option<BeanObject>> + Send + Sync,
>;

/// 把闭包转成构造函数句柄
pub fn constructor_fn<F>(f: F) -> ConstructorFn
where
    F: Fn(Vec<Option<BeanObject>>) -> anyhow::Result<Box<dyn Any + Send + Sync>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 把闭包转成字段设置器句柄
pub fn field_setter<F>(f: F) -> FieldSetter
where
    F: Fn(&mut (dyn Any + Send + Sync), BeanObject) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 把闭包转成方法调用器句柄
pub fn method_invoker<F>(f: F) -> MethodInvoker
where
    F: Fn(Receiver<'_>, Vec<Option<BeanObject>>) -> anyhow::Result<Option<BeanObject>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 方法调用的接收者
pub enum Receiver<'a> {
    /// 静态方法
    Static,
    /// 初始化完成前独占的实例
    Owned(&'a mut (dyn Any + Send + Sync)),
    /// 已共享的实例
    Shared(&'a BeanObject),
}

/// 类的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassKind {
    #[default]
    Class,
    Interface,
    Annotation,
}

/// bean 方法上的属性
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeanAttributes {
    /// 第一个是 Bean 名称，其余是别名；为空时使用方法名
    pub names: Vec<String>,
    pub autowire: AutowireMode,
    pub autowire_candidate: Option<bool>,
    pub init_method: Option<String>,
    pub destroy_method: Option<String>,
}

impl BeanAttributes {
    pub fn named(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// 组件扫描指令
#[derive(Debug, Clone, Default)]
pub struct ComponentScanSpec {
    /// 为空时使用声明类所在的包
    pub base_packages: Vec<String>,
    /// 以这些类所在的包作为扫描根
    pub base_package_classes: Vec<String>,
    pub include_filters: Vec<TypeFilter>,
    pub exclude_filters: Vec<TypeFilter>,
    pub use_default_filters: bool,
    pub lazy_init: bool,
    pub scoped_proxy: ScopedProxyMode,
    pub name_generator: Option<Arc<dyn BeanNameGenerator>>,
}

impl ComponentScanSpec {
    pub fn packages(packages: &[&str]) -> Self {
        Self {
            base_packages: packages.iter().map(|s| s.to_string()).collect(),
            use_default_filters: true,
            ..Default::default()
        }
    }

    pub fn declaring_package() -> Self {
        Self {
            use_default_filters: true,
            ..Default::default()
        }
    }

    pub fn include(mut self, filter: TypeFilter) -> Self {
        self.include_filters.push(filter);
        self
    }

    pub fn exclude(mut self, filter: TypeFilter) -> Self {
        self.exclude_filters.push(filter);
        self
    }

    pub fn without_default_filters(mut self) -> Self {
        self.use_default_filters = false;
        self
    }
}

/// 属性源指令
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySourceSpec {
    pub name: Option<String>,
    pub locations: Vec<String>,
    pub ignore_resource_not_found: bool,
}

impl PropertySourceSpec {
    pub fn locations(locations: &[&str]) -> Self {
        Self {
            locations: locations.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// 注解
///
/// 容器识别的声明式意图是一个封闭集合，业务模块的附加意图通过 `Extension` 携带，
/// 自定义注解通过 `Meta` 引用一个 [`ClassKind::Annotation`] 类型的元数据。
#[derive(Clone)]
pub enum Annotation {
    Configuration,
    Component(Option<String>),
    Bean(BeanAttributes),
    ComponentScan(ComponentScanSpec),
    Import(Vec<String>),
    ImportResource {
        locations: Vec<String>,
        reader: Option<String>,
    },
    PropertySource(PropertySourceSpec),
    Lazy(bool),
    Primary,
    DependsOn(Vec<String>),
    Role(Role),
    Scope(String, ScopedProxyMode),
    Profile(Vec<String>),
    Autowired {
        required: bool,
    },
    Inject,
    Qualifier(String),
    Value(String),
    Mapping(String),
    Order(i32),
    /// 自定义注解，元注解从该注解类型的元数据中读取
    Meta(String),
    /// 其他模块定义的注解
    Extension {
        type_name: &'static str,
        value: Arc<dyn Any + Send + Sync>,
    },
}

impl Annotation {
    pub fn extension<T: Any + Send + Sync>(value: T) -> Self {
        Annotation::Extension {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn import(classes: &[&str]) -> Self {
        Annotation::Import(classes.iter().map(|s| s.to_string()).collect())
    }

    pub fn bean() -> Self {
        Annotation::Bean(BeanAttributes::default())
    }

    pub fn autowired() -> Self {
        Annotation::Autowired { required: true }
    }

    /// 取出扩展注解的值
    pub fn as_extension<T: Any>(&self) -> Option<&T> {
        match self {
            Annotation::Extension { value, .. } => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_component_marker(&self) -> bool {
        matches!(self, Annotation::Component(_) | Annotation::Configuration)
    }
}

impl fmt::Debug for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Configuration => write!(f, "@Configuration"),
            Annotation::Component(name) => write!(f, "@Component({:?})", name),
            Annotation::Bean(attrs) => write!(f, "@Bean({:?})", attrs.names),
            Annotation::ComponentScan(spec) => write!(f, "@ComponentScan({:?})", spec.base_packages),
            Annotation::Import(classes) => write!(f, "@Import({:?})", classes),
            Annotation::ImportResource { locations, .. } => write!(f, "@ImportResource({:?})", locations),
            Annotation::PropertySource(spec) => write!(f, "@PropertySource({:?})", spec.locations),
            Annotation::Lazy(v) => write!(f, "@Lazy({})", v),
            Annotation::Primary => write!(f, "@Primary"),
            Annotation::DependsOn(names) => write!(f, "@DependsOn({:?})", names),
            Annotation::Role(role) => write!(f, "@Role({:?})", role),
            Annotation::Scope(name, mode) => write!(f, "@Scope({}, {:?})", name, mode),
            Annotation::Profile(profiles) => write!(f, "@Profile({:?})", profiles),
            Annotation::Autowired { required } => write!(f, "@Autowired(required = {})", required),
            Annotation::Inject => write!(f, "@Inject"),
            Annotation::Qualifier(q) => write!(f, "@Qualifier({})", q),
            Annotation::Value(v) => write!(f, "@Value({})", v),
            Annotation::Mapping(key) => write!(f, "@Mapping({})", key),
            Annotation::Order(order) => write!(f, "@Order({})", order),
            Annotation::Meta(name) => write!(f, "@{}", naming::simple_name(name)),
            Annotation::Extension { type_name, .. } => write!(f, "@{}", naming::simple_name(type_name)),
        }
    }
}

/// 可携带注解的元素
pub trait Annotated {
    fn annotations(&self) -> &[Annotation];

    fn find_annotation<T>(&self, f: impl Fn(&Annotation) -> Option<T>) -> Option<T> {
        self.annotations().iter().find_map(f)
    }

    fn has_annotation(&self, f: impl Fn(&Annotation) -> bool) -> bool {
        self.annotations().iter().any(f)
    }

    fn is_configuration(&self) -> bool {
        self.has_annotation(|a| matches!(a, Annotation::Configuration))
    }

    fn bean_attributes(&self) -> Option<&BeanAttributes> {
        self.annotations().iter().find_map(|a| match a {
            Annotation::Bean(attrs) => Some(attrs),
            _ => None,
        })
    }

    /// 依赖注入标记；`Some(required)`
    fn autowired(&self) -> Option<bool> {
        self.find_annotation(|a| match a {
            Annotation::Autowired { required } => Some(*required),
            Annotation::Inject => Some(true),
            _ => None,
        })
    }

    fn qualifier(&self) -> Option<&str> {
        self.annotations().iter().find_map(|a| match a {
            Annotation::Qualifier(q) => Some(q.as_str()),
            _ => None,
        })
    }

    fn value_expression(&self) -> Option<&str> {
        self.annotations().iter().find_map(|a| match a {
            Annotation::Value(v) => Some(v.as_str()),
            _ => None,
        })
    }

    fn lazy(&self) -> Option<bool> {
        self.find_annotation(|a| match a {
            Annotation::Lazy(v) => Some(*v),
            _ => None,
        })
    }

    fn is_primary(&self) -> bool {
        self.has_annotation(|a| matches!(a, Annotation::Primary))
    }

    fn depends_on(&self) -> Vec<String> {
        self.find_annotation(|a| match a {
            Annotation::DependsOn(names) => Some(names.clone()),
            _ => None,
        })
        .unwrap_or_default()
    }

    fn role(&self) -> Option<Role> {
        self.find_annotation(|a| match a {
            Annotation::Role(role) => Some(*role),
            _ => None,
        })
    }

    fn scope(&self) -> Option<(&str, ScopedProxyMode)> {
        self.annotations().iter().find_map(|a| match a {
            Annotation::Scope(name, mode) => Some((name.as_str(), *mode)),
            _ => None,
        })
    }

    fn order(&self) -> Option<i32> {
        self.find_annotation(|a| match a {
            Annotation::Order(order) => Some(*order),
            _ => None,
        })
    }

    fn mapping(&self) -> Option<&str> {
        self.annotations().iter().find_map(|a| match a {
            Annotation::Mapping(key) => Some(key.as_str()),
            _ => None,
        })
    }

    /// 第一个指定类型的扩展注解
    fn extension<T: Any>(&self) -> Option<&T> {
        self.annotations().iter().find_map(|a| a.as_extension::<T>())
    }

    /// 全部指定类型的扩展注解
    fn extensions<T: Any>(&self) -> Vec<&T> {
        self.annotations()
            .iter()
            .filter_map(|a| a.as_extension::<T>())
            .collect()
    }
}

/// 在注解及其元注解中查找，自定义注解按名称去重避免循环
pub fn find_merged<T>(
    reader: &dyn MetadataReader,
    annotations: &[Annotation],
    f: &dyn Fn(&Annotation) -> Option<T>,
) -> Option<T> {
    let mut visited = HashSet::new();
    find_merged_inner(reader, annotations, f, &mut visited)
}

fn find_merged_inner<T>(
    reader: &dyn MetadataReader,
    annotations: &[Annotation],
    f: &dyn Fn(&Annotation) -> Option<T>,
    visited: &mut HashSet<String>,
) -> Option<T> {
    if let Some(found) = annotations.iter().find_map(f) {
        return Some(found);
    }
    for annotation in annotations {
        if let Annotation::Meta(name) = annotation {
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(meta) = reader.class_metadata(name) {
                if let Some(found) = find_merged_inner(reader, &meta.annotations, f, visited) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// 注解（含元注解）中是否存在满足条件的注解
pub fn has_merged(
    reader: &dyn MetadataReader,
    annotations: &[Annotation],
    f: &dyn Fn(&Annotation) -> bool,
) -> bool {
    find_merged(reader, annotations, &|a| f(a).then_some(())).is_some()
}

/// 方法或构造函数的参数
#[derive(Debug, Clone)]
pub struct ParameterMetadata {
    pub name: String,
    pub type_name: String,
    /// 参数是否为 `Vec<T>`，此时注入全部匹配的 Bean
    pub collection: bool,
    pub annotations: Vec<Annotation>,
}

impl ParameterMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            collection: false,
            annotations: Vec::new(),
        }
    }

    pub fn collection_of(name: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self {
            collection: true,
            ..Self::new(name, element_type)
        }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

impl Annotated for ParameterMetadata {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

/// 字段
#[derive(Clone)]
pub struct FieldMetadata {
    pub name: String,
    pub type_name: String,
    pub declaring_class: String,
    pub is_static: bool,
    pub collection: bool,
    pub annotations: Vec<Annotation>,
    pub setter: Option<FieldSetter>,
    /// [`BeanRef`] 字段的共享设置器，允许实例共享之后再绑定
    pub late_setter: Option<SharedFieldSetter>,
}

impl FieldMetadata {
    /// 带类型化设置器的字段：依赖以 `Arc<D>` 交给设置器
    pub fn new<T, D>(
        name: impl Into<String>,
        type_name: impl Into<String>,
        setter: impl Fn(&mut T, Arc<D>) + Send + Sync + 'static,
    ) -> Self
    where
        T: Any + Send + Sync,
        D: Any + Send + Sync,
    {
        let name = name.into();
        let field = name.clone();
        let setter = field_setter(move |target, value| {
            let target = target.downcast_mut::<T>().ok_or_else(|| {
                anyhow::anyhow!("field '{}' set on an instance of the wrong type", field)
            })?;
            let value = value.downcast::<D>().map_err(|_| {
                anyhow::anyhow!(
                    "value for field '{}' is not a {}",
                    field,
                    std::any::type_name::<D>()
                )
            })?;
            setter(target, value);
            Ok(())
        });
        Self::with_setter(name, type_name, setter)
    }

    pub fn with_setter(name: impl Into<String>, type_name: impl Into<String>, setter: FieldSetter) -> Self {
        Self {
            setter: Some(setter),
            ..Self::declared(name, type_name)
        }
    }

    /// [`BeanRef`] 字段：`access` 返回实例上的引用槽
    ///
    /// 普通注入时和其他字段一样在填充阶段绑定；依赖是正在创建的单例时，
    /// 容器在该单例注册之后再绑定。
    pub fn late<T, D>(
        name: impl Into<String>,
        type_name: impl Into<String>,
        access: impl Fn(&T) -> &BeanRef<D> + Send + Sync + 'static,
    ) -> Self
    where
        T: Any + Send + Sync,
        D: Any + Send + Sync,
    {
        let name = name.into();
        let field = name.clone();
        let late_setter: SharedFieldSetter = Arc::new(
            move |target: &(dyn Any + Send + Sync), value: BeanObject| -> anyhow::Result<()> {
                let target = target.downcast_ref::<T>().ok_or_else(|| {
                    anyhow::anyhow!("field '{}' set on an instance of the wrong type", field)
                })?;
                let value = value.downcast::<D>().map_err(|_| {
                    anyhow::anyhow!("value for field '{}' is not a {}", field, std::any::type_name::<D>())
                })?;
                if !access(target).bind(value) {
                    anyhow::bail!("field '{}' is already bound", field);
                }
                Ok(())
            },
        );
        let shared = Arc::clone(&late_setter);
        let setter = field_setter(move |target, value| shared(&*target, value));
        Self {
            late_setter: Some(late_setter),
            ..Self::with_setter(name, type_name, setter)
        }
    }

    /// 只有描述、没有设置器的字段
    pub fn declared(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            declaring_class: String::new(),
            is_static: false,
            collection: false,
            annotations: Vec::new(),
            setter: None,
            late_setter: None,
        }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn as_collection(mut self) -> Self {
        self.collection = true;
        self
    }
}

impl Annotated for FieldMetadata {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl fmt::Debug for FieldMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMetadata")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("declaring_class", &self.declaring_class)
            .field("is_static", &self.is_static)
            .field("late", &self.late_setter.is_some())
            .field("annotations", &self.annotations)
            .finish()
    }
}

/// 方法
#[derive(Clone)]
pub struct MethodMetadata {
    pub name: String,
    pub declaring_class: String,
    pub is_static: bool,
    pub parameters: Vec<ParameterMetadata>,
    pub return_type: Option<String>,
    pub annotations: Vec<Annotation>,
    pub invoker: Option<MethodInvoker>,
}

impl MethodMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_class: String::new(),
            is_static: false,
            parameters: Vec::new(),
            return_type: None,
            annotations: Vec::new(),
            invoker: None,
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterMetadata) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.return_type = Some(type_name.into());
        self
    }

    pub fn with_invoker(mut self, invoker: MethodInvoker) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// `&self` 方法
    pub fn shared<T>(
        mut self,
        f: impl Fn(&T, Vec<Option<BeanObject>>) -> anyhow::Result<Option<BeanObject>> + Send + Sync + 'static,
    ) -> Self
    where
        T: Any + Send + Sync,
    {
        let method = self.name.clone();
        self.invoker = Some(method_invoker(move |receiver, args| {
            let target = match receiver {
                Receiver::Static => None,
                Receiver::Owned(target) => target.downcast_ref::<T>(),
                Receiver::Shared(target) => target.downcast_ref::<T>(),
            };
            let target = target.ok_or_else(|| {
                anyhow::anyhow!(
                    "method '{}' invoked on a receiver that is not a {}",
                    method,
                    std::any::type_name::<T>()
                )
            })?;
            f(target, args)
        }));
        self
    }

    /// `&mut self` 方法，只能在实例共享之前调用（setter 注入、初始化方法）
    pub fn owned<T>(
        mut self,
        f: impl Fn(&mut T, Vec<Option<BeanObject>>) -> anyhow::Result<Option<BeanObject>> + Send + Sync + 'static,
    ) -> Self
    where
        T: Any + Send + Sync,
    {
        let method = self.name.clone();
        self.invoker = Some(method_invoker(move |receiver, args| match receiver {
            Receiver::Owned(target) => {
                let target = target.downcast_mut::<T>().ok_or_else(|| {
                    anyhow::anyhow!(
                        "method '{}' invoked on a receiver that is not a {}",
                        method,
                        std::any::type_name::<T>()
                    )
                })?;
                f(target, args)
            }
            _ => Err(anyhow::anyhow!(
                "method '{}' requires exclusive access to its receiver",
                method
            )),
        }));
        self
    }

    /// 静态方法
    pub fn static_fn(
        mut self,
        f: impl Fn(Vec<Option<BeanObject>>) -> anyhow::Result<Option<BeanObject>> + Send + Sync + 'static,
    ) -> Self {
        self.is_static = true;
        self.invoker = Some(method_invoker(move |_receiver, args| f(args)));
        self
    }

    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn is_bean_method(&self) -> bool {
        self.bean_attributes().is_some()
    }

    pub fn invoke(&self, receiver: Receiver<'_>, args: Vec<Option<BeanObject>>) -> anyhow::Result<Option<BeanObject>> {
        match &self.invoker {
            Some(invoker) => invoker(receiver, args),
            None => Err(anyhow::anyhow!(
                "method '{}::{}' has no invoker",
                self.declaring_class,
                self.name
            )),
        }
    }

    /// 参数类型签名，用于判断子类是否覆盖了父类方法
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self.parameters.iter().map(|p| p.type_name.as_str()).collect();
        format!("{}({})", self.name, params.join(","))
    }
}

impl Annotated for MethodMetadata {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl fmt::Debug for MethodMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodMetadata")
            .field("name", &self.name)
            .field("declaring_class", &self.declaring_class)
            .field("is_static", &self.is_static)
            .field("parameters", &self.parameters)
            .field("return_type", &self.return_type)
            .field("annotations", &self.annotations)
            .finish()
    }
}

/// 构造函数
#[derive(Clone)]
pub struct ConstructorMetadata {
    pub parameters: Vec<ParameterMetadata>,
    pub annotations: Vec<Annotation>,
    pub factory: ConstructorFn,
}

impl ConstructorMetadata {
    pub fn new<T, F>(parameters: Vec<ParameterMetadata>, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Vec<Option<BeanObject>>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            parameters,
            annotations: Vec::new(),
            factory: constructor_fn(move |args| Ok(Box::new(f(args)?) as Box<dyn Any + Send + Sync>)),
        }
    }

    /// 无参构造函数
    pub fn default_of<T>() -> Self
    where
        T: Any + Send + Sync + Default,
    {
        Self::new(Vec::new(), |_| Ok(T::default()))
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn instantiate(&self, args: Vec<Option<BeanObject>>) -> anyhow::Result<Box<dyn Any + Send + Sync>> {
        (self.factory)(args)
    }
}

impl Annotated for ConstructorMetadata {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl fmt::Debug for ConstructorMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorMetadata")
            .field("parameters", &self.parameters)
            .field("annotations", &self.annotations)
            .finish()
    }
}

/// 导入时的特殊能力
#[derive(Clone)]
pub enum ClassCapability {
    ImportSelector(Arc<dyn Fn() -> Box<dyn ImportSelector> + Send + Sync>),
    ImportRegistrar(Arc<dyn Fn() -> Box<dyn ImportBeanDefinitionRegistrar> + Send + Sync>),
}

/// 类描述符
#[derive(Clone, Default)]
pub struct ClassMetadata {
    pub name: String,
    pub kind: ClassKind,
    pub is_abstract: bool,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub member_classes: Vec<String>,
    pub fields: Vec<FieldMetadata>,
    pub methods: Vec<MethodMetadata>,
    pub constructors: Vec<ConstructorMetadata>,
    pub capability: Option<ClassCapability>,
}

impl ClassMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Interface,
            is_abstract: true,
            ..Default::default()
        }
    }

    /// 自定义注解类型
    pub fn annotation_type(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Annotation,
            is_abstract: true,
            ..Default::default()
        }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_member_class(mut self, class_name: impl Into<String>) -> Self {
        self.member_classes.push(class_name.into());
        self
    }

    pub fn with_field(mut self, mut field: FieldMetadata) -> Self {
        field.declaring_class = self.name.clone();
        self.fields.push(field);
        self
    }

    pub fn with_method(mut self, mut method: MethodMetadata) -> Self {
        method.declaring_class = self.name.clone();
        self.methods.push(method);
        self
    }

    pub fn with_constructor(mut self, constructor: ConstructorMetadata) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn with_capability(mut self, capability: ClassCapability) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn import_selector<S>(self, factory: fn() -> S) -> Self
    where
        S: ImportSelector + 'static,
    {
        self.with_capability(ClassCapability::ImportSelector(Arc::new(move || {
            Box::new(factory()) as Box<dyn ImportSelector>
        })))
    }

    pub fn import_registrar<R>(self, factory: fn() -> R) -> Self
    where
        R: ImportBeanDefinitionRegistrar + 'static,
    {
        self.with_capability(ClassCapability::ImportRegistrar(Arc::new(move || {
            Box::new(factory()) as Box<dyn ImportBeanDefinitionRegistrar>
        })))
    }

    pub fn simple_name(&self) -> &str {
        naming::simple_name(&self.name)
    }

    pub fn package_name(&self) -> &str {
        naming::package_name(&self.name)
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    pub fn is_annotation(&self) -> bool {
        self.kind == ClassKind::Annotation
    }

    /// 可以实例化的具体类
    pub fn is_concrete(&self) -> bool {
        self.kind == ClassKind::Class && !self.is_abstract
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodMetadata> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodMetadata> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn bean_methods(&self) -> impl Iterator<Item = &MethodMetadata> {
        self.methods.iter().filter(|m| m.is_bean_method())
    }

    pub fn has_bean_methods(&self) -> bool {
        self.bean_methods().next().is_some()
    }

    pub fn default_constructor(&self) -> Option<&ConstructorMetadata> {
        self.constructors.iter().find(|c| c.parameters.is_empty())
    }

    pub fn is_import_selector(&self) -> bool {
        matches!(self.capability, Some(ClassCapability::ImportSelector(_)))
    }

    pub fn is_import_registrar(&self) -> bool {
        matches!(self.capability, Some(ClassCapability::ImportRegistrar(_)))
    }
}

impl Annotated for ClassMetadata {
    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

impl fmt::Debug for ClassMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMetadata")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_abstract", &self.is_abstract)
            .field("superclass", &self.superclass)
            .field("interfaces", &self.interfaces)
            .field("annotations", &self.annotations)
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .field("constructors", &self.constructors.len())
            .finish()
    }
}

/// 取出第 `index` 个必需参数
pub fn arg<T: Any + Send + Sync>(args: &[Option<BeanObject>], index: usize) -> anyhow::Result<Arc<T>> {
    opt_arg::<T>(args, index)?.ok_or_else(|| anyhow::anyhow!("argument {} is missing", index))
}

/// 取出第 `index` 个可选参数
pub fn opt_arg<T: Any + Send + Sync>(
    args: &[Option<BeanObject>],
    index: usize,
) -> anyhow::Result<Option<Arc<T>>> {
    match args.get(index).cloned().flatten() {
        None => Ok(None),
        Some(value) => value.downcast::<T>().map(Some).map_err(|_| {
            anyhow::anyhow!(
                "argument {} is not a {}",
                index,
                std::any::type_name::<T>()
            )
        }),
    }
}

/// 元数据提供者
pub trait MetadataReader: Send + Sync {
    fn class_metadata(&self, name: &str) -> Option<Arc<ClassMetadata>>;

    /// 所有已知类名，按注册顺序
    fn class_names(&self) -> Vec<String>;

    fn require(&self, name: &str) -> ContainerResult<Arc<ClassMetadata>> {
        self.class_metadata(name)
            .ok_or_else(|| ContainerError::BeanDefinitionStore(format!("Unknown class '{}'", name)))
    }

    /// 包及其子包中的类
    fn classes_in_package(&self, package: &str) -> Vec<Arc<ClassMetadata>> {
        let prefix = format!("{}::", package);
        self.class_names()
            .into_iter()
            .filter(|name| package.is_empty() || name.starts_with(&prefix))
            .filter_map(|name| self.class_metadata(&name))
            .collect()
    }

    /// 从最顶层父类到类本身的继承链；链中断（父类未知）时从已知部分开始
    fn superclass_chain(&self, name: &str) -> Vec<Arc<ClassMetadata>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.class_metadata(name);
        while let Some(class) = current {
            if !visited.insert(class.name.clone()) {
                break;
            }
            current = class.superclass.as_deref().and_then(|s| self.class_metadata(s));
            chain.push(class);
        }
        chain.reverse();
        chain
    }

    /// `from` 类型的值能否赋给 `to` 类型
    fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut visited = HashSet::new();
        let mut pending = vec![from.to_string()];
        while let Some(current) = pending.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(class) = self.class_metadata(&current) {
                pending.extend(class.superclass.iter().cloned());
                pending.extend(class.interfaces.iter().cloned());
            }
        }
        false
    }
}

/// 编译期提交的类描述符
pub struct ClassRegistration {
    pub build: fn() -> ClassMetadata,
}

inventory::collect!(ClassRegistration);

/// 类索引 - 内存中的 [`MetadataReader`]
#[derive(Default)]
pub struct ClassIndex {
    classes: RwLock<HashMap<String, Arc<ClassMetadata>>>,
    order: RwLock<Vec<String>>,
    chains: RwLock<HashMap<String, Vec<Arc<ClassMetadata>>>>,
}

impl ClassIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 收集所有通过 inventory 提交的类
    pub fn from_inventory() -> Self {
        let index = Self::new();
        for registration in inventory::iter::<ClassRegistration> {
            index.register((registration.build)());
        }
        tracing::debug!("Collected {} classes from inventory", index.order.read().len());
        index
    }

    pub fn with_classes(classes: impl IntoIterator<Item = ClassMetadata>) -> Self {
        let index = Self::new();
        for class in classes {
            index.register(class);
        }
        index
    }

    /// 注册或替换一个类描述符
    pub fn register(&self, class: ClassMetadata) -> Arc<ClassMetadata> {
        let name = class.name.clone();
        let class = Arc::new(class);
        let previous = self.classes.write().insert(name.clone(), Arc::clone(&class));
        if previous.is_none() {
            self.order.write().push(name);
        }
        self.chains.write().clear();
        class
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataReader for ClassIndex {
    fn class_metadata(&self, name: &str) -> Option<Arc<ClassMetadata>> {
        self.classes.read().get(name).cloned()
    }

    fn class_names(&self) -> Vec<String> {
        self.order.read().clone()
    }

    fn superclass_chain(&self, name: &str) -> Vec<Arc<ClassMetadata>> {
        if let Some(chain) = self.chains.read().get(name) {
            return chain.clone();
        }

        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.class_metadata(name);
        while let Some(class) = current {
            if !visited.insert(class.name.clone()) {
                break;
            }
            current = class.superclass.as_deref().and_then(|s| self.class_metadata(s));
            chain.push(class);
        }
        chain.reverse();

        self.chains
            .write()
            .entry(name.to_string())
            .or_insert_with(|| chain.clone());
        chain
    }
}

impl fmt::Debug for ClassIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassIndex")
            .field("classes", &self.order.read().len())
            .finish()
    }
}
