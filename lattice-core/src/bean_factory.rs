//! Bean Factory - 核心容器
//!
//! [`DefaultListableBeanFactory`] 同时是定义注册表和实例工厂：持有定义、别名、
//! 单例缓存、后处理器和依赖关系，负责按定义创建实例并解析依赖。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::bean::{
    ArgumentValue, AutowireMode, BeanDefinition, BeanObject, FactoryBeanObject, FACTORY_BEAN_OBJECT_TYPE_ATTRIBUTE,
    FACTORY_BEAN_PREFIX, FACTORY_BEAN_TYPE,
};
use crate::config::{Environment, PropertyResolver};
use crate::constants::FACTORY_METHOD_RETURN_TYPE_ATTRIBUTE;
use crate::error::{ContainerError, ContainerResult};
use crate::injection::{DependencyDescriptor, DependencyResolver, InjectionPoint};
use crate::lifecycle::BeanPostProcessor;
use crate::metadata::{
    Annotated, ClassMetadata, MetadataReader, MethodMetadata, ParameterMetadata, Receiver, SharedFieldSetter,
};
use crate::registry::{BeanDefinitionRegistry, DefinitionStore};
use crate::scope::Scope;
use crate::utils::dependency::{CreationTracker, DependentBeanRegistry};

/// 等待某个单例注册的字段注入
struct DeferredInjection {
    dependent: String,
    field: String,
    setter: SharedFieldSetter,
    /// 依赖方完成初始化之后才有实例
    target: Option<BeanObject>,
}

/// DefaultListableBeanFactory - 默认的 Bean 工厂实现
pub struct DefaultListableBeanFactory {
    /// Bean 定义与别名
    store: RwLock<DefinitionStore>,

    /// 合并父定义之后的定义缓存
    merged: RwLock<HashMap<String, Arc<BeanDefinition>>>,

    /// 单例 Bean 缓存
    singletons: RwLock<HashMap<String, BeanObject>>,

    /// 单例的创建顺序，销毁时倒序
    singleton_order: RwLock<Vec<String>>,

    /// 直接注册的单例：名称 → 类型名
    manual_singletons: RwLock<HashMap<String, String>>,

    /// FactoryBean 产出的单例对象
    factory_bean_objects: RwLock<HashMap<String, BeanObject>>,

    /// 单例创建锁，同一线程可重入
    singleton_lock: ReentrantMutex<()>,

    /// 循环依赖检测
    creation_tracker: CreationTracker,

    /// 被等待的单例名称 → 延后的字段注入
    deferred_injections: Mutex<HashMap<String, Vec<DeferredInjection>>>,

    /// Bean 之间的依赖关系，用于销毁顺序
    dependents: DependentBeanRegistry,

    /// Bean 后置处理器列表（按优先级排序）
    bean_post_processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,

    /// 配置是否已冻结
    configuration_frozen: AtomicBool,

    reader: Arc<dyn MetadataReader>,
    environment: Arc<Environment>,
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new(reader: Arc<dyn MetadataReader>, environment: Arc<Environment>) -> Self {
        Self {
            store: RwLock::new(DefinitionStore::new()),
            merged: RwLock::new(HashMap::new()),
            singletons: RwLock::new(HashMap::new()),
            singleton_order: RwLock::new(Vec::new()),
            manual_singletons: RwLock::new(HashMap::new()),
            factory_bean_objects: RwLock::new(HashMap::new()),
            singleton_lock: ReentrantMutex::new(()),
            creation_tracker: CreationTracker::new(),
            deferred_injections: Mutex::new(HashMap::new()),
            dependents: DependentBeanRegistry::new(),
            bean_post_processors: RwLock::new(Vec::new()),
            configuration_frozen: AtomicBool::new(false),
            reader,
            environment,
        }
    }

    pub fn metadata_reader(&self) -> &Arc<dyn MetadataReader> {
        &self.reader
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn set_allow_bean_definition_overriding(&self, allow: bool) {
        self.store.write().set_allow_overriding(allow);
    }

    pub fn is_allow_bean_definition_overriding(&self) -> bool {
        self.store.read().is_allow_overriding()
    }

    // ========== 后处理器 ==========

    /// 添加 BeanPostProcessor，同名处理器会被替换
    pub fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        let mut processors = self.bean_post_processors.write();
        processors.retain(|p| p.name() != processor.name());
        processors.push(processor);

        // 按优先级排序（order 值越小优先级越高）
        processors.sort_by_key(|p| p.order());
    }

    /// 获取所有 BeanPostProcessor
    pub fn get_bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.bean_post_processors.read().clone()
    }

    // ========== 单例注册 ==========

    /// 直接注册一个已经创建好的单例
    pub fn register_singleton(&self, name: &str, type_name: &str, bean: BeanObject) -> ContainerResult<()> {
        let _lock = self.singleton_lock.lock();
        if self.singletons.read().contains_key(name) {
            return Err(ContainerError::IllegalState(format!(
                "Could not register object under bean name '{}': there is already an object bound",
                name
            )));
        }
        self.manual_singletons
            .write()
            .insert(name.to_string(), type_name.to_string());
        self.add_singleton(name, bean);
        tracing::debug!("Registered singleton '{}' of type '{}'", name, type_name);
        Ok(())
    }

    fn add_singleton(&self, name: &str, bean: BeanObject) {
        self.singletons.write().insert(name.to_string(), bean);
        let mut order = self.singleton_order.write();
        if !order.iter().any(|n| n == name) {
            order.push(name.to_string());
        }
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        self.singletons.read().contains_key(name)
    }

    /// 当前线程是否正在创建该 Bean
    pub fn is_currently_in_creation(&self, name: &str) -> bool {
        self.creation_tracker.is_creating(&self.transformed_bean_name(name))
    }

    pub fn singleton_names(&self) -> Vec<String> {
        self.singleton_order.read().clone()
    }

    // ========== 定义 ==========

    /// 合并父定义之后的定义
    pub fn merged_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>> {
        let canonical = self.canonical_name(name);
        if let Some(mbd) = self.merged.read().get(&canonical) {
            return Ok(Arc::clone(mbd));
        }

        let mbd = Arc::new(self.build_merged_definition(&canonical, 0)?);
        self.merged
            .write()
            .entry(canonical)
            .or_insert_with(|| Arc::clone(&mbd));
        Ok(mbd)
    }

    fn build_merged_definition(&self, name: &str, depth: usize) -> ContainerResult<BeanDefinition> {
        let definition = self
            .store
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))?;

        let Some(parent_name) = definition.parent_name.clone() else {
            return Ok(definition);
        };

        let parent_name = self.canonical_name(&parent_name);
        if parent_name == name || depth > self.store.read().len() {
            return Err(ContainerError::BeanDefinitionStore(format!(
                "Parent name '{}' is equal to bean name '{}': cannot be resolved",
                parent_name, name
            )));
        }
        let parent = self
            .build_merged_definition(&parent_name, depth + 1)
            .map_err(|e| {
                ContainerError::BeanDefinitionStore(format!(
                    "Could not resolve parent bean definition '{}' for bean '{}': {}",
                    parent_name, name, e
                ))
            })?;
        Ok(definition.merged_with_parent(&parent))
    }

    /// 修改已注册的定义
    pub fn modify_bean_definition<F>(&self, name: &str, modifier: F) -> ContainerResult<()>
    where
        F: FnOnce(&mut BeanDefinition),
    {
        self.check_not_frozen("modify")?;
        {
            let mut store = self.store.write();
            let definition = store
                .get_mut(name)
                .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))?;
            modifier(definition);
        }
        let canonical = self.canonical_name(name);
        self.reset_bean_definition(&canonical);
        tracing::debug!("Bean definition '{}' modified", canonical);
        Ok(())
    }

    /// 定义变化后清理合并缓存、已有实例和后处理器中的缓存
    fn reset_bean_definition(&self, name: &str) {
        self.merged.write().remove(name);
        self.destroy_singleton(name);
        for processor in self.get_bean_post_processors() {
            processor.reset_bean_definition(name);
        }

        let children: Vec<String> = self
            .store
            .read()
            .iter()
            .filter(|(_, def)| def.parent_name.as_deref() == Some(name))
            .map(|(n, _)| n.clone())
            .collect();
        for child in children {
            if child != name {
                self.reset_bean_definition(&child);
            }
        }
    }

    /// 所有定义声明的 depends_on，用于启动前校验
    pub fn get_depends_on_graph(&self) -> HashMap<String, Vec<String>> {
        self.store
            .read()
            .iter()
            .filter(|(_, def)| !def.depends_on.is_empty())
            .map(|(name, def)| (name.clone(), def.depends_on.clone()))
            .collect()
    }

    pub fn freeze_configuration(&self) {
        self.configuration_frozen.store(true, Ordering::SeqCst);
        tracing::debug!("Bean factory configuration frozen");
    }

    pub fn is_configuration_frozen(&self) -> bool {
        self.configuration_frozen.load(Ordering::SeqCst)
    }

    fn check_not_frozen(&self, action: &str) -> ContainerResult<()> {
        if self.is_configuration_frozen() {
            return Err(ContainerError::IllegalState(format!(
                "Cannot {} bean definition: configuration is frozen",
                action
            )));
        }
        Ok(())
    }

    // ========== 类型 ==========

    /// 预测 Bean 的类型名（不创建实例）
    pub fn predict_bean_type(&self, name: &str) -> Option<String> {
        let is_deref = name.starts_with(FACTORY_BEAN_PREFIX);
        let bean_name = self.transformed_bean_name(name);

        if let Some(type_name) = self.manual_singletons.read().get(&bean_name) {
            return Some(type_name.clone());
        }

        let mbd = self.merged_bean_definition(&bean_name).ok()?;
        let raw = self.raw_bean_type(&mbd)?;
        if is_deref || !self.is_factory_bean_type(&raw) {
            return Some(raw);
        }
        self.factory_bean_object_type(&bean_name, &mbd).or(Some(raw))
    }

    /// 不考虑 FactoryBean 解引用的原始类型
    fn raw_bean_type(&self, mbd: &BeanDefinition) -> Option<String> {
        if !mbd.is_factory_method() || mbd.instance_supplier.is_some() {
            return mbd.bean_class_name.clone();
        }
        if let Some(type_name) = mbd.attributes.get(FACTORY_METHOD_RETURN_TYPE_ATTRIBUTE) {
            return Some(type_name.clone());
        }
        let method_name = mbd.factory_method_name.as_deref()?;
        let declaring = match &mbd.factory_bean_name {
            Some(factory_bean) => self.predict_bean_type(factory_bean)?,
            None => mbd.bean_class_name.clone()?,
        };
        self.factory_methods_named(&declaring, method_name)
            .into_iter()
            .find_map(|m| m.return_type)
    }

    /// 类、父类及其接口上指定名称的方法，子类优先
    fn factory_methods_named(&self, declaring_class: &str, method_name: &str) -> Vec<MethodMetadata> {
        let mut methods = Vec::new();
        let mut interfaces = Vec::new();
        for class in self.reader.superclass_chain(declaring_class).iter().rev() {
            methods.extend(class.methods_named(method_name).cloned());
            interfaces.extend(class.interfaces.iter().cloned());
        }
        let mut visited = HashSet::new();
        while let Some(interface) = interfaces.pop() {
            if !visited.insert(interface.clone()) {
                continue;
            }
            if let Some(metadata) = self.reader.class_metadata(&interface) {
                methods.extend(metadata.methods_named(method_name).cloned());
                interfaces.extend(metadata.interfaces.iter().cloned());
            }
        }
        methods
    }

    fn is_factory_bean_type(&self, type_name: &str) -> bool {
        type_name == FACTORY_BEAN_TYPE || self.reader.is_assignable(type_name, FACTORY_BEAN_TYPE)
    }

    fn factory_bean_object_type(&self, bean_name: &str, mbd: &BeanDefinition) -> Option<String> {
        if let Some(type_name) = mbd.attributes.get(FACTORY_BEAN_OBJECT_TYPE_ATTRIBUTE) {
            return Some(type_name.clone());
        }
        let instance = self.singletons.read().get(bean_name).cloned()?;
        instance
            .downcast_ref::<FactoryBeanObject>()
            .and_then(|fb| fb.0.object_type())
    }

    /// Bean 能否赋给指定类型
    pub fn is_type_match(&self, name: &str, type_name: &str) -> bool {
        match self.predict_bean_type(name) {
            Some(predicted) => predicted == type_name || self.reader.is_assignable(&predicted, type_name),
            None => false,
        }
    }

    /// 指定类型的所有 Bean 名称，按注册顺序，不包含抽象定义
    pub fn get_bean_names_for_type(&self, type_name: &str) -> Vec<String> {
        let definition_names: Vec<String> = self
            .store
            .read()
            .iter()
            .filter(|(_, def)| !def.is_abstract)
            .map(|(name, _)| name.clone())
            .collect();

        let mut names: Vec<String> = definition_names
            .into_iter()
            .filter(|name| self.is_type_match(name, type_name))
            .collect();

        let manual: Vec<String> = {
            let order = self.singleton_order.read();
            let manual = self.manual_singletons.read();
            order
                .iter()
                .filter(|name| manual.contains_key(*name))
                .cloned()
                .collect()
        };
        for name in manual {
            if !names.contains(&name) && self.is_type_match(&name, type_name) {
                names.push(name);
            }
        }
        names
    }

    /// 指定类型的所有 Bean 实例
    pub fn get_beans_of_type(&self, type_name: &str) -> ContainerResult<Vec<(String, BeanObject)>> {
        self.get_bean_names_for_type(type_name)
            .into_iter()
            .map(|name| self.get_bean(&name).map(|bean| (name, bean)))
            .collect()
    }

    /// 按类型获取唯一的 Bean
    pub fn get_bean_of_type(&self, type_name: &str) -> ContainerResult<BeanObject> {
        let descriptor = DependencyDescriptor::new(
            type_name,
            InjectionPoint::Field {
                class: String::new(),
                field: type_name.to_string(),
            },
            true,
        );
        let mut names = Vec::new();
        self.resolve_dependency(&descriptor, None, &mut names)?
            .ok_or_else(|| ContainerError::NoSuchBeanOfType {
                type_name: type_name.to_string(),
                member: "lookup".to_string(),
            })
    }

    /// 通过名称获取 Bean 并转换为具体类型
    pub fn get_bean_typed<T: std::any::Any + Send + Sync>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.get_bean(name)?
            .downcast::<T>()
            .map_err(|_| ContainerError::BeanNotOfRequiredType {
                name: name.to_string(),
                required: std::any::type_name::<T>().to_string(),
            })
    }

    pub fn is_singleton(&self, name: &str) -> ContainerResult<bool> {
        let bean_name = self.transformed_bean_name(name);
        if self.manual_singletons.read().contains_key(&bean_name) {
            return Ok(true);
        }
        Ok(self.merged_bean_definition(&bean_name)?.scope.is_singleton())
    }

    pub fn is_prototype(&self, name: &str) -> ContainerResult<bool> {
        let bean_name = self.transformed_bean_name(name);
        if self.manual_singletons.read().contains_key(&bean_name) {
            return Ok(false);
        }
        Ok(self.merged_bean_definition(&bean_name)?.scope.is_prototype())
    }

    // ========== 获取 Bean ==========

    /// 去掉 `&` 前缀并解析别名
    pub fn transformed_bean_name(&self, name: &str) -> String {
        let stripped = name.trim_start_matches(FACTORY_BEAN_PREFIX);
        self.canonical_name(stripped)
    }

    /// 通过名称获取 Bean
    pub fn get_bean(&self, name: &str) -> ContainerResult<BeanObject> {
        tracing::trace!("Requesting bean: '{}'", name);
        let is_deref = name.starts_with(FACTORY_BEAN_PREFIX);
        let bean_name = self.transformed_bean_name(name);

        // 检查缓存
        let cached = self.singletons.read().get(&bean_name).cloned();
        if let Some(bean) = cached {
            tracing::trace!("Returning cached instance of singleton bean '{}'", bean_name);
            return self.object_for_bean_instance(bean, &bean_name, is_deref);
        }

        let mbd = self.merged_bean_definition(&bean_name).map_err(|e| {
            if matches!(e, ContainerError::BeanNotFound(_)) {
                tracing::debug!("Bean '{}' not found in container", name);
            }
            e
        })?;

        if mbd.is_abstract {
            return Err(ContainerError::BeanCreation {
                bean_name: bean_name.clone(),
                message: "Bean definition is abstract".to_string(),
            });
        }

        // depends_on 中的 Bean 先初始化
        for dep in &mbd.depends_on {
            let dep = self.canonical_name(dep);
            if self.dependents.is_dependent(&bean_name, &dep) {
                return Err(ContainerError::BeanCreation {
                    bean_name: bean_name.clone(),
                    message: format!("Circular depends-on relationship between '{}' and '{}'", bean_name, dep),
                });
            }
            self.dependents.register_dependent(&dep, &bean_name);
            self.get_bean(&dep).map_err(|e| ContainerError::BeanCreationFailed {
                bean_name: bean_name.clone(),
                source: Box::new(e),
            })?;
        }

        let instance = match &mbd.scope {
            Scope::Singleton => self.get_or_create_singleton(&bean_name, &mbd)?,
            Scope::Prototype => {
                tracing::debug!("Creating new instance of prototype bean '{}'", bean_name);
                self.create_bean(&bean_name, &mbd)?
            }
            Scope::Custom(scope) => {
                return Err(ContainerError::IllegalState(format!(
                    "No Scope registered for scope name '{}' (bean '{}')",
                    scope, bean_name
                )))
            }
        };

        self.object_for_bean_instance(instance, &bean_name, is_deref)
    }

    fn get_or_create_singleton(&self, name: &str, mbd: &Arc<BeanDefinition>) -> ContainerResult<BeanObject> {
        let _lock = self.singleton_lock.lock();

        if let Some(bean) = self.singletons.read().get(name) {
            return Ok(Arc::clone(bean));
        }

        tracing::info!("Creating shared instance of singleton bean '{}'", name);
        let bean = self.create_bean(name, mbd)?;
        self.add_singleton(name, Arc::clone(&bean));
        tracing::debug!("Singleton bean '{}' created and cached", name);
        self.complete_deferred_injections(name, &bean)?;
        Ok(bean)
    }

    /// 依赖方初始化完成，给它等待中的注入挂上实例
    fn bind_deferred_injections(&self, dependent: &str, bean: &BeanObject) {
        let mut deferred = self.deferred_injections.lock();
        for injection in deferred.values_mut().flatten() {
            if injection.target.is_none() && injection.dependent == dependent {
                injection.target = Some(Arc::clone(bean));
            }
        }
    }

    /// 单例 `name` 已注册，绑定所有等待它的字段
    fn complete_deferred_injections(&self, name: &str, bean: &BeanObject) -> ContainerResult<()> {
        let Some(waiting) = self.deferred_injections.lock().remove(name) else {
            return Ok(());
        };
        let value = self.object_for_bean_instance(Arc::clone(bean), name, false)?;
        for injection in waiting {
            let Some(target) = &injection.target else {
                tracing::warn!(
                    "Dropping deferred injection of '{}' into field '{}' of bean '{}': bean was never initialized",
                    name,
                    injection.field,
                    injection.dependent
                );
                continue;
            };
            tracing::debug!(
                "Binding field '{}' of bean '{}' to singleton '{}'",
                injection.field,
                injection.dependent,
                name
            );
            (injection.setter)(&**target, Arc::clone(&value)).map_err(|e| ContainerError::BeanCreation {
                bean_name: injection.dependent.clone(),
                message: format!("Could not bind field '{}' to '{}': {:#}", injection.field, name, e),
            })?;
        }
        Ok(())
    }

    /// 创建失败时丢弃与该 Bean 有关的延后注入
    fn discard_deferred_injections(&self, name: &str) {
        let mut deferred = self.deferred_injections.lock();
        deferred.remove(name);
        for waiting in deferred.values_mut() {
            waiting.retain(|injection| injection.target.is_some() || injection.dependent != name);
        }
        deferred.retain(|_, waiting| !waiting.is_empty());
    }

    /// FactoryBean 解引用
    fn object_for_bean_instance(&self, instance: BeanObject, bean_name: &str, is_deref: bool) -> ContainerResult<BeanObject> {
        let factory = instance.downcast_ref::<FactoryBeanObject>().map(|fb| Arc::clone(&fb.0));

        if is_deref {
            return match factory {
                Some(_) => Ok(instance),
                None => Err(ContainerError::BeanNotOfRequiredType {
                    name: format!("{}{}", FACTORY_BEAN_PREFIX, bean_name),
                    required: FACTORY_BEAN_TYPE.to_string(),
                }),
            };
        }

        let Some(factory) = factory else {
            return Ok(instance);
        };

        if factory.is_singleton() && self.contains_singleton(bean_name) {
            let _lock = self.singleton_lock.lock();
            if let Some(object) = self.factory_bean_objects.read().get(bean_name) {
                return Ok(Arc::clone(object));
            }
            let object = self.object_from_factory_bean(&*factory, bean_name)?;
            self.factory_bean_objects
                .write()
                .insert(bean_name.to_string(), Arc::clone(&object));
            return Ok(object);
        }

        self.object_from_factory_bean(&*factory, bean_name)
    }

    fn object_from_factory_bean(&self, factory: &dyn crate::bean::FactoryBean, bean_name: &str) -> ContainerResult<BeanObject> {
        let object = factory
            .get_object()
            .map_err(|e| ContainerError::callback(bean_name, e))?;
        self.apply_bean_post_processors_after_initialization(object, bean_name)
    }

    // ========== 创建 Bean ==========

    /// 创建 Bean 实例并调用生命周期回调
    ///
    /// # 生命周期顺序
    /// 1. 实例化（提供者 / 工厂方法 / 构造函数）
    /// 2. 属性填充（BeanPostProcessor.post_process_properties）
    /// 3. BeanPostProcessor.post_process_before_initialization
    /// 4. 自定义 init-method
    /// 5. BeanPostProcessor.post_process_after_initialization
    pub fn create_bean(&self, name: &str, mbd: &BeanDefinition) -> ContainerResult<BeanObject> {
        let _guard = self
            .creation_tracker
            .start_creating(name)
            .map_err(|chain| ContainerError::CircularDependency(chain.join(" -> ")))?;

        self.do_create_bean(name, mbd).map_err(|e| {
            self.discard_deferred_injections(name);
            Self::wrap_creation_error(name, e)
        })
    }

    fn do_create_bean(&self, name: &str, mbd: &BeanDefinition) -> ContainerResult<BeanObject> {
        // 1. 实例化
        let mut bean = self.create_bean_instance(name, mbd)?;

        // 2. 属性填充
        let target_class = self
            .raw_bean_type(mbd)
            .and_then(|type_name| self.reader.class_metadata(&type_name));
        if let Some(class) = target_class.as_deref() {
            match Arc::get_mut(&mut bean) {
                Some(instance) => {
                    for processor in self.get_bean_post_processors() {
                        processor.post_process_properties(instance, class, name)?;
                    }
                    if matches!(mbd.autowire_mode, AutowireMode::ByName | AutowireMode::ByType) {
                        self.autowire_fields_by_mode(name, mbd.autowire_mode, instance, class)?;
                    }
                }
                None => tracing::warn!("Cannot populate bean '{}': instance is already shared", name),
            }
        }

        // 3. 初始化
        bean = self.apply_bean_post_processors_before_initialization(bean, name)?;
        if let Some(init_method) = &mbd.init_method_name {
            self.invoke_lifecycle_method(name, &mut bean, target_class.as_deref(), init_method, "init")?;
        }
        self.bind_deferred_injections(name, &bean);
        self.apply_bean_post_processors_after_initialization(bean, name)
    }

    /// 保留循环依赖错误和已经指向本 Bean 的错误，其余包装上 Bean 名称
    fn wrap_creation_error(name: &str, err: ContainerError) -> ContainerError {
        match &err {
            ContainerError::CircularDependency(_) => err,
            ContainerError::BeanCreation { bean_name, .. }
            | ContainerError::BeanCreationFailed { bean_name, .. }
            | ContainerError::UnsatisfiedDependency { bean_name, .. }
            | ContainerError::InvalidConstructorDeclaration { bean_name, .. }
                if bean_name == name =>
            {
                err
            }
            _ => ContainerError::BeanCreationFailed {
                bean_name: name.to_string(),
                source: Box::new(err),
            },
        }
    }

    fn create_bean_instance(&self, name: &str, mbd: &BeanDefinition) -> ContainerResult<BeanObject> {
        if let Some(supplier) = &mbd.instance_supplier {
            return supplier().map_err(|e| ContainerError::callback(name, e));
        }

        if mbd.is_factory_method() {
            return self.instantiate_using_factory_method(name, mbd);
        }

        let class_name = mbd.bean_class_name.as_deref().ok_or_else(|| ContainerError::BeanCreation {
            bean_name: name.to_string(),
            message: "Bean definition has neither a class nor a factory method".to_string(),
        })?;
        let class = self.reader.class_metadata(class_name).ok_or_else(|| ContainerError::BeanCreation {
            bean_name: name.to_string(),
            message: format!("No metadata available for class [{}]", class_name),
        })?;
        if !class.is_concrete() {
            return Err(ContainerError::BeanCreation {
                bean_name: name.to_string(),
                message: format!("Cannot instantiate [{}]: it is abstract or an interface", class_name),
            });
        }

        // 后处理器给出的候选构造函数
        let mut candidates = None;
        for processor in self.get_bean_post_processors() {
            if let Some(found) = processor.determine_candidate_constructors(&class, name)? {
                candidates = Some(found);
                break;
            }
        }

        if candidates.is_some() || mbd.autowire_mode == AutowireMode::Constructor || !mbd.constructor_args.is_empty() {
            return self.autowire_constructor(name, mbd, &class, candidates);
        }

        if let Some(constructor) = class.default_constructor() {
            tracing::trace!("Instantiating bean '{}' with its default constructor", name);
            return constructor
                .instantiate(Vec::new())
                .map(BeanObject::from)
                .map_err(|e| ContainerError::callback(name, e));
        }

        if class.constructors.len() == 1 {
            return self.autowire_constructor(name, mbd, &class, Some(vec![0]));
        }

        Err(ContainerError::BeanCreation {
            bean_name: name.to_string(),
            message: format!("No default constructor found for [{}]", class.name),
        })
    }

    /// 选择能满足的参数最多的构造函数
    fn autowire_constructor(
        &self,
        name: &str,
        mbd: &BeanDefinition,
        class: &ClassMetadata,
        candidates: Option<Vec<usize>>,
    ) -> ContainerResult<BeanObject> {
        let mut indices = candidates.unwrap_or_else(|| (0..class.constructors.len()).collect());
        indices.sort_by_key(|&i| std::cmp::Reverse(class.constructors.get(i).map_or(0, |c| c.parameters.len())));

        let mut last_error = None;
        for index in indices {
            let Some(constructor) = class.constructors.get(index) else {
                continue;
            };
            if constructor.parameters.len() < mbd.constructor_args.len() {
                continue;
            }

            let args = self.resolve_arguments(name, mbd, &constructor.parameters, |i| {
                InjectionPoint::ConstructorParameter {
                    class: class.name.clone(),
                    index: i,
                }
            });
            match args {
                Ok(args) => {
                    tracing::trace!(
                        "Autowiring bean '{}' through a constructor with {} parameters",
                        name,
                        constructor.parameters.len()
                    );
                    return constructor
                        .instantiate(args)
                        .map(BeanObject::from)
                        .map_err(|e| ContainerError::callback(name, e));
                }
                Err(e) if e.root_cause().is_unsatisfied() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ContainerError::BeanCreation {
            bean_name: name.to_string(),
            message: format!("No suitable constructor found for [{}]", class.name),
        }))
    }

    fn instantiate_using_factory_method(&self, name: &str, mbd: &BeanDefinition) -> ContainerResult<BeanObject> {
        let method_name = mbd.factory_method_name.as_deref().unwrap_or_default();

        let (factory_bean, declaring_class, is_static) = match &mbd.factory_bean_name {
            Some(factory_bean_name) => {
                if self.canonical_name(factory_bean_name) == name {
                    return Err(ContainerError::BeanCreation {
                        bean_name: name.to_string(),
                        message: "factory-bean reference points back to the same bean definition".to_string(),
                    });
                }
                let factory_bean = self.get_bean(factory_bean_name)?;
                self.dependents.register_dependent(factory_bean_name, name);
                let declaring = self.predict_bean_type(factory_bean_name).ok_or_else(|| ContainerError::BeanCreation {
                    bean_name: name.to_string(),
                    message: format!("Cannot determine the type of factory bean '{}'", factory_bean_name),
                })?;
                (Some(factory_bean), declaring, false)
            }
            None => {
                let declaring = mbd.bean_class_name.clone().ok_or_else(|| ContainerError::BeanCreation {
                    bean_name: name.to_string(),
                    message: "Static factory method requires a bean class".to_string(),
                })?;
                (None, declaring, true)
            }
        };

        let mut candidates: Vec<MethodMetadata> = self
            .factory_methods_named(&declaring_class, method_name)
            .into_iter()
            .filter(|m| m.is_static == is_static && m.invoker.is_some())
            .collect();
        candidates.sort_by_key(|m| std::cmp::Reverse(m.parameters.len()));

        if candidates.is_empty() {
            return Err(ContainerError::BeanCreation {
                bean_name: name.to_string(),
                message: format!(
                    "No matching {}factory method found: factory method '{}' on [{}]",
                    if is_static { "static " } else { "" },
                    method_name,
                    declaring_class
                ),
            });
        }

        let mut last_error = None;
        for method in candidates {
            let args = self.resolve_arguments(name, mbd, &method.parameters, |i| InjectionPoint::MethodParameter {
                class: method.declaring_class.clone(),
                method: method.name.clone(),
                index: i,
            });
            let args = match args {
                Ok(args) => args,
                Err(e) if e.root_cause().is_unsatisfied() => {
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let receiver = match &factory_bean {
                Some(bean) => Receiver::Shared(bean),
                None => Receiver::Static,
            };
            let result = method
                .invoke(receiver, args)
                .map_err(|e| ContainerError::callback(name, e))?;
            return result.ok_or_else(|| ContainerError::BeanCreation {
                bean_name: name.to_string(),
                message: format!("Factory method '{}' returned no value", method_name),
            });
        }

        Err(last_error.unwrap_or_else(|| ContainerError::BeanCreation {
            bean_name: name.to_string(),
            message: format!("No satisfiable factory method '{}'", method_name),
        }))
    }

    /// 解析构造函数或工厂方法的参数，显式参数优先
    fn resolve_arguments(
        &self,
        bean_name: &str,
        mbd: &BeanDefinition,
        parameters: &[ParameterMetadata],
        member: impl Fn(usize) -> InjectionPoint,
    ) -> ContainerResult<Vec<Option<BeanObject>>> {
        let mut args = Vec::with_capacity(parameters.len());
        for (index, parameter) in parameters.iter().enumerate() {
            if let Some(explicit) = mbd.constructor_args.iter().find(|a| a.index == index) {
                let value: BeanObject = match &explicit.value {
                    ArgumentValue::Reference(reference) => {
                        let bean = self.get_bean(reference)?;
                        self.dependents.register_dependent(reference, bean_name);
                        bean
                    }
                    ArgumentValue::Literal(literal) => {
                        Arc::new(self.environment.resolve_required_placeholders(literal)?)
                    }
                };
                args.push(Some(value));
                continue;
            }

            let descriptor = DependencyDescriptor::for_parameter(parameter, member(index), true);
            let mut autowired = Vec::new();
            let value = self
                .resolve_dependency(&descriptor, Some(bean_name), &mut autowired)
                .map_err(|e| ContainerError::UnsatisfiedDependency {
                    bean_name: bean_name.to_string(),
                    member: descriptor.member_description(),
                    source: Box::new(e),
                })?;
            for autowired_name in &autowired {
                self.dependents.register_dependent(autowired_name, bean_name);
            }
            args.push(value);
        }
        Ok(args)
    }

    /// 定义声明了按名称或按类型装配时，给未标注注入的字段赋值
    fn autowire_fields_by_mode(
        &self,
        name: &str,
        mode: AutowireMode,
        instance: &mut (dyn std::any::Any + Send + Sync),
        class: &ClassMetadata,
    ) -> ContainerResult<()> {
        for owner in self.reader.superclass_chain(&class.name) {
            for field in &owner.fields {
                let Some(setter) = &field.setter else {
                    continue;
                };
                if field.is_static || field.autowired().is_some() || field.value_expression().is_some() {
                    continue;
                }
                let value = match mode {
                    AutowireMode::ByName if self.contains_bean(&field.name) => {
                        self.dependents.register_dependent(&field.name, name);
                        Some(self.get_bean(&field.name)?)
                    }
                    AutowireMode::ByType => {
                        let descriptor = DependencyDescriptor::for_field(field, false);
                        let mut autowired = Vec::new();
                        let value = self.resolve_dependency(&descriptor, Some(name), &mut autowired)?;
                        for autowired_name in &autowired {
                            self.dependents.register_dependent(autowired_name, name);
                        }
                        value
                    }
                    _ => None,
                };
                if let Some(value) = value {
                    tracing::trace!("Autowiring field '{}' of bean '{}' ({:?})", field.name, name, mode);
                    setter(&mut *instance, value).map_err(|e| ContainerError::callback(name, e))?;
                }
            }
        }
        Ok(())
    }

    fn invoke_lifecycle_method(
        &self,
        name: &str,
        bean: &mut BeanObject,
        class: Option<&ClassMetadata>,
        method_name: &str,
        phase: &str,
    ) -> ContainerResult<()> {
        let method = class
            .and_then(|c| {
                self.reader
                    .superclass_chain(&c.name)
                    .iter()
                    .rev()
                    .find_map(|owner| owner.find_method(method_name).cloned())
            })
            .ok_or_else(|| ContainerError::BeanDefinitionStore(format!(
                "Could not find an {} method named '{}' on bean with name '{}'",
                phase, method_name, name
            )))?;

        tracing::debug!("Invoking {} method '{}' on bean '{}'", phase, method_name, name);
        let result = match Arc::get_mut(bean) {
            Some(instance) => method.invoke(Receiver::Owned(instance), Vec::new()),
            None => method.invoke(Receiver::Shared(bean), Vec::new()),
        };
        result.map(|_| ()).map_err(|e| ContainerError::callback(name, e))
    }

    /// 应用 BeanPostProcessor.post_process_before_initialization
    fn apply_bean_post_processors_before_initialization(&self, bean: BeanObject, bean_name: &str) -> ContainerResult<BeanObject> {
        let mut current_bean = bean;
        for processor in self.get_bean_post_processors() {
            current_bean = processor.post_process_before_initialization(current_bean, bean_name)?;
        }
        Ok(current_bean)
    }

    /// 应用 BeanPostProcessor.post_process_after_initialization
    fn apply_bean_post_processors_after_initialization(&self, bean: BeanObject, bean_name: &str) -> ContainerResult<BeanObject> {
        let mut current_bean = bean;
        for processor in self.get_bean_post_processors() {
            current_bean = processor.post_process_after_initialization(current_bean, bean_name)?;
        }
        Ok(current_bean)
    }

    // ========== 依赖解析 ==========

    /// 满足依赖描述符的候选 Bean 名称
    fn find_autowire_candidates(&self, requesting_bean: Option<&str>, descriptor: &DependencyDescriptor) -> Vec<String> {
        self.get_bean_names_for_type(&descriptor.type_name)
            .into_iter()
            .filter(|candidate| Some(candidate.as_str()) != requesting_bean)
            .filter(|candidate| self.is_autowire_candidate(candidate))
            .filter(|candidate| match &descriptor.qualifier {
                Some(qualifier) => self.matches_bean_name(candidate, qualifier),
                None => true,
            })
            .collect()
    }

    fn is_autowire_candidate(&self, name: &str) -> bool {
        if self.manual_singletons.read().contains_key(name) {
            return true;
        }
        self.merged_bean_definition(name)
            .map(|mbd| mbd.autowire_candidate)
            .unwrap_or(false)
    }

    fn matches_bean_name(&self, bean_name: &str, candidate: &str) -> bool {
        bean_name == candidate || self.get_aliases(bean_name).iter().any(|a| a == candidate)
    }

    fn is_primary(&self, name: &str) -> bool {
        self.merged_bean_definition(name).map(|mbd| mbd.primary).unwrap_or(false)
    }

    /// 多个候选时：primary 优先，其次按字段名 / 参数名匹配
    fn determine_autowire_candidate(&self, candidates: &[String], descriptor: &DependencyDescriptor) -> ContainerResult<Option<String>> {
        let primaries: Vec<&String> = candidates.iter().filter(|c| self.is_primary(c)).collect();
        match primaries.len() {
            1 => return Ok(Some(primaries[0].clone())),
            0 => {}
            _ => {
                return Err(ContainerError::NoUniqueBean {
                    type_name: descriptor.type_name.clone(),
                    candidates: primaries.into_iter().cloned().collect(),
                })
            }
        }

        if let Some(dependency_name) = &descriptor.dependency_name {
            if let Some(found) = candidates.iter().find(|c| self.matches_bean_name(c, dependency_name)) {
                return Ok(Some(found.clone()));
            }
        }
        Ok(None)
    }

    // ========== 销毁 ==========

    /// 销毁单个单例：先销毁依赖它的 Bean
    pub fn destroy_singleton(&self, name: &str) {
        let bean = {
            let _lock = self.singleton_lock.lock();
            let bean = self.singletons.write().remove(name);
            self.singleton_order.write().retain(|n| n != name);
            self.factory_bean_objects.write().remove(name);
            self.manual_singletons.write().remove(name);
            bean
        };

        let dependents = self.dependents.dependents_of(name);
        self.dependents.remove(name);
        for dependent in dependents {
            self.destroy_singleton(&dependent);
        }

        if let Some(mut bean) = bean {
            let destroy_method = self
                .merged
                .read()
                .get(name)
                .cloned()
                .or_else(|| self.store.read().get(name).cloned().map(Arc::new))
                .and_then(|mbd| {
                    let method = mbd.destroy_method_name.clone()?;
                    Some((method, self.raw_bean_type(&mbd)))
                });
            if let Some((method, type_name)) = destroy_method {
                let class = type_name.and_then(|t| self.reader.class_metadata(&t));
                if let Err(e) = self.invoke_lifecycle_method(name, &mut bean, class.as_deref(), &method, "destroy") {
                    tracing::warn!("Failed to destroy bean '{}': {}", name, e);
                } else {
                    tracing::debug!("Bean '{}' destroyed successfully", name);
                }
            }
        }
    }

    /// 销毁所有单例 Bean，按创建顺序倒序，依赖方先于被依赖方
    pub fn destroy_singletons(&self) {
        tracing::info!("Destroying singleton beans");
        let names: Vec<String> = self.singleton_order.read().iter().rev().cloned().collect();
        for name in names {
            self.destroy_singleton(&name);
        }
        self.dependents.clear();
        tracing::info!("Singleton beans destruction completed");
    }

    /// 预实例化所有非延迟单例
    pub fn preinstantiate_singletons(&self) -> ContainerResult<()> {
        let bean_names: Vec<String> = self.store.read().names().to_vec();
        tracing::debug!("Pre-instantiating singletons among {} bean definitions", bean_names.len());

        for name in bean_names {
            let mbd = self.merged_bean_definition(&name)?;
            if mbd.is_abstract || !mbd.scope.is_singleton() || mbd.lazy_init {
                continue;
            }
            let raw = self.raw_bean_type(&mbd);
            if raw.as_deref().is_some_and(|t| self.is_factory_bean_type(t)) {
                self.get_bean(&format!("{}{}", FACTORY_BEAN_PREFIX, name))?;
            } else {
                self.get_bean(&name)?;
            }
        }
        Ok(())
    }

    /// 依赖 `name` 的 Bean
    pub fn get_dependent_beans(&self, name: &str) -> Vec<String> {
        self.dependents.dependents_of(name)
    }

    /// `name` 依赖的 Bean
    pub fn get_dependencies_for_bean(&self, name: &str) -> Vec<String> {
        self.dependents.dependencies_of(name)
    }
}

impl BeanDefinitionRegistry for DefaultListableBeanFactory {
    fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> ContainerResult<()> {
        self.check_not_frozen("register")?;

        tracing::trace!(
            "Registering bean definition '{}': {}",
            name,
            definition.description()
        );

        let existed = self.store.write().register(name, definition)?.is_some();
        if existed || self.contains_singleton(name) {
            self.reset_bean_definition(name);
        }
        tracing::debug!("Bean definition registered successfully: '{}'", name);
        Ok(())
    }

    fn remove_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition> {
        self.check_not_frozen("remove")?;
        self.destroy_singleton(&self.canonical_name(name));
        let definition = self.store.write().remove(name)?;
        self.reset_bean_definition(name);
        tracing::debug!("Bean definition removed: '{}'", name);
        Ok(definition)
    }

    fn get_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition> {
        self.store
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.store.read().contains(name)
    }

    fn bean_definition_names(&self) -> Vec<String> {
        self.store.read().names().to_vec()
    }

    fn register_alias(&self, name: &str, alias: &str) -> ContainerResult<()> {
        self.store.write().register_alias(name, alias)
    }

    fn remove_alias(&self, alias: &str) -> ContainerResult<()> {
        self.store.write().remove_alias(alias)
    }

    fn get_aliases(&self, name: &str) -> Vec<String> {
        let store = self.store.read();
        store.aliases_of(&store.canonical_name(name))
    }

    fn canonical_name(&self, name: &str) -> String {
        self.store.read().canonical_name(name)
    }

    fn is_alias(&self, name: &str) -> bool {
        self.store.read().is_alias(name)
    }
}

impl DependencyResolver for DefaultListableBeanFactory {
    fn resolve_dependency(
        &self,
        descriptor: &DependencyDescriptor,
        requesting_bean: Option<&str>,
        autowired_names: &mut Vec<String>,
    ) -> ContainerResult<Option<BeanObject>> {
        if let Some(expression) = &descriptor.value_expression {
            let value = self.environment.resolve_required_placeholders(expression)?;
            return Ok(Some(Arc::new(value)));
        }

        let candidates = self.find_autowire_candidates(requesting_bean, descriptor);

        if descriptor.collection {
            if candidates.is_empty() {
                return if descriptor.required {
                    Err(ContainerError::NoSuchBeanOfType {
                        type_name: descriptor.type_name.clone(),
                        member: descriptor.member_description(),
                    })
                } else {
                    Ok(None)
                };
            }
            let mut beans = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                beans.push(self.get_bean(&candidate)?);
                autowired_names.push(candidate);
            }
            return Ok(Some(Arc::new(beans)));
        }

        let chosen = match candidates.len() {
            0 => {
                return if descriptor.required {
                    Err(ContainerError::NoSuchBeanOfType {
                        type_name: descriptor.type_name.clone(),
                        member: descriptor.member_description(),
                    })
                } else {
                    Ok(None)
                };
            }
            1 => candidates[0].clone(),
            _ => self
                .determine_autowire_candidate(&candidates, descriptor)?
                .ok_or_else(|| ContainerError::NoUniqueBean {
                    type_name: descriptor.type_name.clone(),
                    candidates: candidates.clone(),
                })?,
        };

        let bean = self.get_bean(&chosen)?;
        autowired_names.push(chosen);
        Ok(Some(bean))
    }

    fn get_bean(&self, name: &str) -> ContainerResult<BeanObject> {
        DefaultListableBeanFactory::get_bean(self, name)
    }

    fn contains_bean(&self, name: &str) -> bool {
        let bean_name = self.transformed_bean_name(name);
        self.contains_singleton(&bean_name) || self.contains_bean_definition(&bean_name)
    }

    fn is_type_match(&self, name: &str, type_name: &str) -> bool {
        DefaultListableBeanFactory::is_type_match(self, name, type_name)
    }

    fn register_dependent_bean(&self, bean: &str, dependent: &str) {
        self.dependents.register_dependent(bean, dependent);
    }

    fn singleton_in_creation(&self, descriptor: &DependencyDescriptor, requesting_bean: Option<&str>) -> Option<String> {
        if descriptor.value_expression.is_some() || descriptor.collection {
            return None;
        }
        let candidates = self.find_autowire_candidates(requesting_bean, descriptor);
        let chosen = match candidates.len() {
            0 => return None,
            1 => candidates[0].clone(),
            _ => self.determine_autowire_candidate(&candidates, descriptor).ok().flatten()?,
        };
        let singleton = self
            .merged_bean_definition(&chosen)
            .map(|mbd| matches!(mbd.scope, Scope::Singleton))
            .unwrap_or(false);
        (singleton && !self.contains_singleton(&chosen) && self.creation_tracker.is_creating(&chosen)).then_some(chosen)
    }

    fn defer_injection(&self, awaited: &str, dependent: &str, field: &str, setter: SharedFieldSetter) {
        self.deferred_injections
            .lock()
            .entry(awaited.to_string())
            .or_default()
            .push(DeferredInjection {
                dependent: dependent.to_string(),
                field: field.to_string(),
                setter,
                target: None,
            });
    }
}

impl DefaultListableBeanFactory {
    /// 是否包含指定名称的 Bean（定义或单例）
    pub fn contains_bean(&self, name: &str) -> bool {
        DependencyResolver::contains_bean(self, name)
    }
}

impl std::fmt::Debug for DefaultListableBeanFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultListableBeanFactory")
            .field("definitions", &self.store.read().names())
            .field("singletons", &self.singleton_order.read().len())
            .field("frozen", &self.is_configuration_frozen())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::FactoryBean;
    use crate::metadata::{arg, Annotation, ClassIndex, ConstructorMetadata, FieldMetadata};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct DataSource;

    struct Repository {
        data_source: Arc<DataSource>,
    }

    struct Service {
        repository: Arc<Repository>,
        started: bool,
    }

    struct Left {
        _right: Arc<Right>,
    }

    struct Right {
        _left: Arc<Left>,
    }

    #[derive(Default)]
    struct Settings {
        url: Option<Arc<String>>,
    }

    fn classes() -> ClassIndex {
        ClassIndex::with_classes([
            ClassMetadata::new("app::DataSource").with_constructor(ConstructorMetadata::default_of::<DataSource>()),
            ClassMetadata::new("app::Repository").with_constructor(ConstructorMetadata::new(
                vec![ParameterMetadata::new("data_source", "app::DataSource")],
                |args| {
                    Ok(Repository {
                        data_source: arg::<DataSource>(&args, 0)?,
                    })
                },
            )),
            ClassMetadata::new("app::Service")
                .with_constructor(ConstructorMetadata::new(
                    vec![ParameterMetadata::new("repository", "app::Repository")],
                    |args| {
                        Ok(Service {
                            repository: arg::<Repository>(&args, 0)?,
                            started: false,
                        })
                    },
                ))
                .with_method(MethodMetadata::new("start").owned::<Service>(|s, _| {
                    s.started = true;
                    Ok(None)
                })),
            ClassMetadata::new("app::Left").with_constructor(ConstructorMetadata::new(
                vec![ParameterMetadata::new("right", "app::Right")],
                |args| Ok(Left { _right: arg::<Right>(&args, 0)? }),
            )),
            ClassMetadata::new("app::Right").with_constructor(ConstructorMetadata::new(
                vec![ParameterMetadata::new("left", "app::Left")],
                |args| Ok(Right { _left: arg::<Left>(&args, 0)? }),
            )),
            ClassMetadata::new("app::Settings")
                .with_constructor(ConstructorMetadata::default_of::<Settings>())
                .with_field(FieldMetadata::new::<Settings, String>("url", "String", |s, v| s.url = Some(v))),
        ])
    }

    fn factory() -> DefaultListableBeanFactory {
        DefaultListableBeanFactory::new(Arc::new(classes()), Arc::new(Environment::new()))
    }

    #[test]
    fn test_constructor_autowiring_and_singleton_cache() {
        let factory = factory();
        factory
            .register_bean_definition("dataSource", BeanDefinition::for_class("app::DataSource"))
            .unwrap();
        factory
            .register_bean_definition("repository", BeanDefinition::for_class("app::Repository"))
            .unwrap();
        factory
            .register_bean_definition(
                "service",
                BeanDefinition::for_class("app::Service").with_init_method("start"),
            )
            .unwrap();

        let service = factory.get_bean_typed::<Service>("service").unwrap();
        assert!(service.started);
        let data_source = factory.get_bean_typed::<DataSource>("dataSource").unwrap();
        assert!(Arc::ptr_eq(&service.repository.data_source, &data_source));

        let again = factory.get_bean_typed::<Service>("service").unwrap();
        assert!(Arc::ptr_eq(&service, &again));
        assert_eq!(factory.get_dependent_beans("repository"), vec!["service"]);
    }

    #[test]
    fn test_prototype_creates_new_instances() {
        let factory = factory();
        factory
            .register_bean_definition(
                "dataSource",
                BeanDefinition::for_class("app::DataSource").with_scope(Scope::Prototype),
            )
            .unwrap();
        let a = factory.get_bean("dataSource").unwrap();
        let b = factory.get_bean("dataSource").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_constructor_cycle_reports_chain() {
        let factory = factory();
        factory.register_bean_definition("left", BeanDefinition::for_class("app::Left")).unwrap();
        factory.register_bean_definition("right", BeanDefinition::for_class("app::Right")).unwrap();

        let err = factory.get_bean("left").unwrap_err();
        match err.root_cause() {
            ContainerError::CircularDependency(chain) => assert_eq!(chain, "left -> right -> left"),
            other => panic!("Expected circular dependency, got {other}"),
        }
        assert!(!factory.contains_singleton("left"));
    }

    #[test]
    fn test_missing_dependency_names_member() {
        let factory = factory();
        factory
            .register_bean_definition("repository", BeanDefinition::for_class("app::Repository"))
            .unwrap();
        let err = factory.get_bean("repository").unwrap_err();
        assert!(matches!(err, ContainerError::UnsatisfiedDependency { ref bean_name, .. } if bean_name == "repository"));
        assert!(err.root_cause().is_unsatisfied());
    }

    #[test]
    fn test_primary_and_name_fallback() {
        let factory = factory();
        factory
            .register_bean_definition("dataSource", BeanDefinition::for_class("app::DataSource"))
            .unwrap();
        factory
            .register_bean_definition("data_source", BeanDefinition::for_class("app::DataSource"))
            .unwrap();
        factory
            .register_bean_definition("repository", BeanDefinition::for_class("app::Repository"))
            .unwrap();

        // 参数名 data_source 命中同名 Bean
        let repository = factory.get_bean_typed::<Repository>("repository").unwrap();
        let by_name = factory.get_bean_typed::<DataSource>("data_source").unwrap();
        assert!(Arc::ptr_eq(&repository.data_source, &by_name));

        factory
            .modify_bean_definition("dataSource", |def| def.primary = true)
            .unwrap();
        factory.destroy_singleton("repository");
        let repository = factory.get_bean_typed::<Repository>("repository").unwrap();
        let primary = factory.get_bean_typed::<DataSource>("dataSource").unwrap();
        assert!(Arc::ptr_eq(&repository.data_source, &primary));
    }

    #[test]
    fn test_ambiguous_candidates() {
        let factory = factory();
        factory.register_bean_definition("ds1", BeanDefinition::for_class("app::DataSource")).unwrap();
        factory.register_bean_definition("ds2", BeanDefinition::for_class("app::DataSource")).unwrap();
        let err = factory.get_bean_of_type("app::DataSource").unwrap_err();
        assert!(matches!(err, ContainerError::NoUniqueBean { ref candidates, .. } if candidates.len() == 2));
    }

    #[test]
    fn test_depends_on_cycle_is_an_error() {
        let factory = factory();
        factory
            .register_bean_definition(
                "a",
                BeanDefinition::for_class("app::DataSource").with_depends_on(vec!["b".to_string()]),
            )
            .unwrap();
        factory
            .register_bean_definition(
                "b",
                BeanDefinition::for_class("app::DataSource").with_depends_on(vec!["a".to_string()]),
            )
            .unwrap();
        let err = factory.get_bean("a").unwrap_err();
        assert!(err.to_string().contains("Circular depends-on"), "{err}");
    }

    #[test]
    fn test_alias_and_parent_definition() {
        let factory = factory();
        factory
            .register_bean_definition(
                "base",
                BeanDefinition::for_class("app::DataSource").with_abstract(true).with_lazy(true),
            )
            .unwrap();
        factory.register_bean_definition("child", BeanDefinition::child_of("base")).unwrap();
        factory.register_alias("child", "primaryDataSource").unwrap();

        assert!(factory.get_bean("base").is_err());
        let child = factory.get_bean("primaryDataSource").unwrap();
        assert!(child.downcast_ref::<DataSource>().is_some());
        assert_eq!(factory.get_bean_names_for_type("app::DataSource"), vec!["child"]);
    }

    #[test]
    fn test_autowire_by_name_mode() {
        let factory = factory();
        factory.register_singleton("url", "String", Arc::new("jdbc:h2".to_string())).unwrap();
        factory
            .register_bean_definition(
                "settings",
                BeanDefinition::for_class("app::Settings").with_autowire_mode(AutowireMode::ByName),
            )
            .unwrap();
        let settings = factory.get_bean_typed::<Settings>("settings").unwrap();
        assert_eq!(settings.url.as_deref().map(String::as_str), Some("jdbc:h2"));
    }

    struct CountingFactoryBean {
        calls: AtomicUsize,
    }

    impl FactoryBean for CountingFactoryBean {
        fn get_object(&self) -> anyhow::Result<BeanObject> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(DataSource))
        }

        fn object_type(&self) -> Option<String> {
            Some("app::DataSource".to_string())
        }
    }

    #[test]
    fn test_factory_bean_dereference() {
        let factory = factory();
        factory
            .register_bean_definition(
                "dataSourceFactory",
                BeanDefinition::from_supplier(FACTORY_BEAN_TYPE, || {
                    let factory: Arc<dyn FactoryBean> = Arc::new(CountingFactoryBean {
                        calls: AtomicUsize::new(0),
                    });
                    Ok(Arc::new(FactoryBeanObject(factory)) as BeanObject)
                })
                .with_attribute(FACTORY_BEAN_OBJECT_TYPE_ATTRIBUTE, "app::DataSource"),
            )
            .unwrap();
        factory.preinstantiate_singletons().unwrap();

        let product = factory.get_bean("dataSourceFactory").unwrap();
        assert!(product.downcast_ref::<DataSource>().is_some());
        let again = factory.get_bean("dataSourceFactory").unwrap();
        assert!(Arc::ptr_eq(&product, &again));

        let raw = factory.get_bean("&dataSourceFactory").unwrap();
        assert!(raw.downcast_ref::<FactoryBeanObject>().is_some());
        assert!(factory.is_type_match("dataSourceFactory", "app::DataSource"));
        assert!(factory.is_type_match("&dataSourceFactory", FACTORY_BEAN_TYPE));
    }

    #[test]
    fn test_frozen_configuration_rejects_registration() {
        let factory = factory();
        factory.freeze_configuration();
        assert!(factory
            .register_bean_definition("late", BeanDefinition::for_class("app::DataSource"))
            .is_err());
    }

    #[test]
    fn test_qualifier_selects_candidate() {
        let factory = factory();
        factory.register_bean_definition("ds1", BeanDefinition::for_class("app::DataSource")).unwrap();
        factory.register_bean_definition("ds2", BeanDefinition::for_class("app::DataSource")).unwrap();

        let descriptor = DependencyDescriptor::for_parameter(
            &ParameterMetadata::new("source", "app::DataSource").with_annotation(Annotation::Qualifier("ds2".into())),
            InjectionPoint::ConstructorParameter {
                class: "app::Repository".into(),
                index: 0,
            },
            true,
        );
        let mut names = Vec::new();
        let bean = factory.resolve_dependency(&descriptor, None, &mut names).unwrap();
        assert!(bean.is_some());
        assert_eq!(names, vec!["ds2"]);
    }
}
