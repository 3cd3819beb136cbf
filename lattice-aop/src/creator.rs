//! 自动代理创建器
//!
//! 作为 [`BeanPostProcessor`] 在初始化之后决定是否为 Bean 创建代理。
//! 两种策略：
//! - [`BeanNameAutoProxyCreator`]：按 Bean 名称（含别名）匹配模式
//! - [`AdvisorAutoProxyCreator`]：收集容器中的 Advisor，按切点筛选

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use lattice_core::bean::{BeanDefinition, BeanObject, FactoryBeanObject, Role, FACTORY_BEAN_PREFIX};
use lattice_core::bean_factory::DefaultListableBeanFactory;
use lattice_core::config::ContainerSettings;
use lattice_core::constants::ORDER_ATTRIBUTE;
use lattice_core::error::{ContainerError, ContainerResult};
use lattice_core::lifecycle::{BeanPostProcessor, PostProcessorRegistration};
use lattice_core::metadata::{ClassMetadata, MethodMetadata};
use lattice_core::registry::BeanDefinitionRegistry;
use lattice_core::utils::pattern::simple_match;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::advice::{ExposeInvocationInterceptor, MethodInterceptor};
use crate::advisor::{find_advisors_that_can_apply, sort_advisors, Advisor, DefaultPointcutAdvisor, ADVISOR_TYPE_NAME};
use crate::aspect::{registered_aspects, Aspect, AspectAdvisor, ASPECT_TYPE_NAME};
use crate::config_utils::{
    CreatorKind, BEAN_NAMES_ATTRIBUTE, BEAN_NAME_CREATOR_TYPE, EXPOSE_PROXY_ATTRIBUTE, INTERCEPTOR_NAMES_ATTRIBUTE,
    PROXY_TARGET_CLASS_ATTRIBUTE,
};
use crate::error::{AopError, AopResult};
use crate::proxy::{class_methods, AopProxy, ProxyFactory};

/// 自动代理创建器的默认顺序，排在其他处理器之后
pub const DEFAULT_CREATOR_ORDER: i32 = 2000;

thread_local! {
    static CURRENTLY_PROXIED: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// 当前线程上正在筛选 Advisor 的 Bean 名称
pub fn currently_proxied_bean_name() -> Option<String> {
    CURRENTLY_PROXIED.with(|current| current.borrow().clone())
}

/// 设置正在代理的 Bean 名称，离开作用域时恢复
struct ProxiedBeanGuard {
    previous: Option<String>,
}

impl ProxiedBeanGuard {
    fn enter(bean_name: &str) -> Self {
        let previous = CURRENTLY_PROXIED.with(|current| current.replace(Some(bean_name.to_string())));
        Self { previous }
    }
}

impl Drop for ProxiedBeanGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENTLY_PROXIED.with(|current| *current.borrow_mut() = previous);
    }
}

/// 创建器的具体策略
///
/// `None` 表示不代理；`Some(vec![])` 表示只使用公共拦截器代理
type SpecificAdvisors = Option<Vec<Arc<dyn Advisor>>>;

fn list_attribute(definition: &BeanDefinition, key: &str) -> Vec<String> {
    definition
        .attributes
        .get(key)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn flag_attribute(definition: &BeanDefinition, key: &str) -> bool {
    definition
        .attributes
        .get(key)
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

/// 容器内部的 AOP 组件永远不会被代理
fn is_infrastructure_bean(bean: &BeanObject) -> bool {
    bean.is::<Arc<dyn Advisor>>()
        || bean.is::<Arc<dyn MethodInterceptor>>()
        || bean.is::<Arc<dyn Aspect>>()
        || bean.is::<AopProxy>()
        || bean.is::<Arc<dyn BeanPostProcessor>>()
}

/// 两种创建器共享的状态和流程
pub struct ProxyCreatorSupport {
    factory: RwLock<Weak<DefaultListableBeanFactory>>,
    proxy_target_class: AtomicBool,
    expose_proxy: AtomicBool,
    interceptor_names: Vec<String>,
    order: i32,
    /// 已经判断过不需要代理的 Bean
    non_advised: RwLock<HashSet<String>>,
}

impl Default for ProxyCreatorSupport {
    fn default() -> Self {
        Self {
            factory: RwLock::new(Weak::new()),
            proxy_target_class: AtomicBool::new(false),
            expose_proxy: AtomicBool::new(false),
            interceptor_names: Vec::new(),
            order: DEFAULT_CREATOR_ORDER,
            non_advised: RwLock::new(HashSet::new()),
        }
    }
}

impl ProxyCreatorSupport {
    /// 从创建器的定义属性读取配置
    pub fn from_definition(definition: &BeanDefinition) -> Self {
        Self {
            proxy_target_class: AtomicBool::new(flag_attribute(definition, PROXY_TARGET_CLASS_ATTRIBUTE)),
            expose_proxy: AtomicBool::new(flag_attribute(definition, EXPOSE_PROXY_ATTRIBUTE)),
            interceptor_names: list_attribute(definition, INTERCEPTOR_NAMES_ATTRIBUTE),
            order: definition
                .attributes
                .get(ORDER_ATTRIBUTE)
                .and_then(|order| order.parse().ok())
                .unwrap_or(DEFAULT_CREATOR_ORDER),
            ..Default::default()
        }
    }

    pub fn set_proxy_target_class(&self, value: bool) {
        self.proxy_target_class.store(value, Ordering::SeqCst);
    }

    pub fn set_expose_proxy(&self, value: bool) {
        self.expose_proxy.store(value, Ordering::SeqCst);
    }

    pub fn set_interceptor_names(&mut self, names: Vec<String>) {
        self.interceptor_names = names;
    }

    /// 绑定 BeanFactory，全局配置中打开的代理选项同样生效
    pub fn bind(&self, factory: &Arc<DefaultListableBeanFactory>) -> ContainerResult<()> {
        let settings = ContainerSettings::from_environment(factory.environment())?;
        if settings.proxy_target_class {
            self.set_proxy_target_class(true);
        }
        if settings.expose_proxy {
            self.set_expose_proxy(true);
        }
        *self.factory.write() = Arc::downgrade(factory);
        Ok(())
    }

    fn factory(&self, creator: &str) -> AopResult<Arc<DefaultListableBeanFactory>> {
        self.factory
            .read()
            .upgrade()
            .ok_or_else(|| AopError::MissingBeanFactory(creator.to_string()))
    }

    fn forget(&self, bean_name: &str) {
        let mut non_advised = self.non_advised.write();
        non_advised.remove(bean_name);
        non_advised.remove(&format!("{}{}", FACTORY_BEAN_PREFIX, bean_name));
    }

    /// 按名称解析公共拦截器，放在链的最前面
    fn common_advisors(&self, factory: &DefaultListableBeanFactory) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let mut advisors: Vec<Arc<dyn Advisor>> = Vec::new();
        for name in &self.interceptor_names {
            let bean = factory.get_bean(name)?;
            if let Some(advisor) = bean.downcast_ref::<Arc<dyn Advisor>>() {
                advisors.push(Arc::clone(advisor));
            } else if let Some(interceptor) = bean.downcast_ref::<Arc<dyn MethodInterceptor>>() {
                advisors.push(Arc::new(DefaultPointcutAdvisor::for_all(name.clone(), Arc::clone(interceptor))));
            } else {
                return Err(AopError::ProxyCreation {
                    bean_name: name.clone(),
                    message: "common interceptor is neither an Advisor nor a MethodInterceptor".to_string(),
                });
            }
        }
        Ok(advisors)
    }

    /// 判断并创建代理
    ///
    /// `find` 返回针对这个 Bean 的 Advisor；`None` 表示不代理
    fn wrap_if_necessary<F>(&self, creator: &str, bean: BeanObject, bean_name: &str, find: F) -> AopResult<BeanObject>
    where
        F: FnOnce(&DefaultListableBeanFactory, &str, &ClassMetadata, &[MethodMetadata]) -> AopResult<SpecificAdvisors>,
    {
        if is_infrastructure_bean(&bean) {
            return Ok(bean);
        }
        let factory = self.factory(creator)?;

        let cache_key = if bean.is::<FactoryBeanObject>() {
            format!("{}{}", FACTORY_BEAN_PREFIX, bean_name)
        } else {
            bean_name.to_string()
        };
        if self.non_advised.read().contains(&cache_key) {
            return Ok(bean);
        }

        let Some(class_name) = factory.predict_bean_type(&cache_key) else {
            tracing::trace!("No type known for bean '{}', not proxying", cache_key);
            return Ok(bean);
        };
        let reader = Arc::clone(factory.metadata_reader());
        let Some(class) = reader.class_metadata(&class_name) else {
            tracing::trace!("No metadata for class '{}' of bean '{}'", class_name, cache_key);
            return Ok(bean);
        };
        let methods = class_methods(&*reader, &class_name);

        let Some(specific) = find(&*factory, cache_key.as_str(), &*class, methods.as_slice())? else {
            self.non_advised.write().insert(cache_key);
            return Ok(bean);
        };
        let mut advisors = self.common_advisors(&factory)?;
        advisors.extend(specific);
        if advisors.is_empty() {
            self.non_advised.write().insert(cache_key);
            return Ok(bean);
        }

        tracing::debug!(
            "Creating proxy for bean '{}' ({}) with advisors {:?}",
            cache_key,
            class_name,
            advisors.iter().map(|a| a.name()).collect::<Vec<_>>()
        );
        let proxy: BeanObject = ProxyFactory::new(reader, cache_key, bean, class_name)
            .add_advisors(advisors)
            .proxy_target_class(self.proxy_target_class.load(Ordering::SeqCst))
            .expose_proxy(self.expose_proxy.load(Ordering::SeqCst))
            .get_proxy()?;
        Ok(proxy)
    }
}

// ============================================================================
// 按 Bean 名称
// ============================================================================

/// 按 Bean 名称代理
///
/// 模式支持精确匹配和 `xxx*`、`*xxx`、`xxx*yyy` 通配。FactoryBean 本身只能通过
/// `&` 前缀的模式匹配，否则匹配的是它产出的对象。
pub struct BeanNameAutoProxyCreator {
    support: ProxyCreatorSupport,
    bean_names: Vec<String>,
}

impl BeanNameAutoProxyCreator {
    pub fn new(bean_names: &[&str], interceptor_names: &[&str]) -> Self {
        let mut support = ProxyCreatorSupport::default();
        support.set_interceptor_names(interceptor_names.iter().map(|s| s.to_string()).collect());
        Self {
            support,
            bean_names: bean_names.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_definition(definition: &BeanDefinition) -> Self {
        Self {
            support: ProxyCreatorSupport::from_definition(definition),
            bean_names: list_attribute(definition, BEAN_NAMES_ATTRIBUTE),
        }
    }

    pub fn support(&self) -> &ProxyCreatorSupport {
        &self.support
    }

    /// 名称或任一别名匹配
    pub fn is_match(&self, bean_name: &str, aliases: &[String], factory_bean_instance: bool) -> bool {
        self.bean_names.iter().any(|pattern| {
            let pattern = if factory_bean_instance {
                match pattern.strip_prefix(FACTORY_BEAN_PREFIX) {
                    Some(stripped) => stripped,
                    None => return false,
                }
            } else {
                pattern.as_str()
            };
            simple_match(pattern, bean_name) || aliases.iter().any(|alias| simple_match(pattern, alias))
        })
    }
}

impl BeanPostProcessor for BeanNameAutoProxyCreator {
    fn name(&self) -> &str {
        "BeanNameAutoProxyCreator"
    }

    fn order(&self) -> i32 {
        self.support.order
    }

    fn set_bean_factory(&self, factory: &Arc<DefaultListableBeanFactory>) -> ContainerResult<()> {
        self.support.bind(factory)
    }

    fn post_process_after_initialization(&self, bean: BeanObject, bean_name: &str) -> ContainerResult<BeanObject> {
        let factory_bean_instance = bean.is::<FactoryBeanObject>();
        self.support
            .wrap_if_necessary(self.name(), bean, bean_name, |factory, _, _, _| {
                let aliases = factory.get_aliases(bean_name);
                if self.is_match(bean_name, &aliases, factory_bean_instance) {
                    Ok(Some(Vec::new()))
                } else {
                    Ok(None)
                }
            })
            .map_err(ContainerError::from)
    }

    fn reset_bean_definition(&self, bean_name: &str) {
        self.support.forget(bean_name);
    }
}

// ============================================================================
// 基于 Advisor
// ============================================================================

/// 收集容器中的 Advisor 并按切点筛选
pub struct AdvisorAutoProxyCreator {
    kind: CreatorKind,
    support: ProxyCreatorSupport,
    /// 通过 inventory 提交的切面，只创建一次
    registered: OnceCell<Vec<Arc<dyn Advisor>>>,
}

impl AdvisorAutoProxyCreator {
    pub fn new(kind: CreatorKind) -> Self {
        Self {
            kind,
            support: ProxyCreatorSupport::default(),
            registered: OnceCell::new(),
        }
    }

    pub fn from_definition(kind: CreatorKind, definition: &BeanDefinition) -> Self {
        Self {
            kind,
            support: ProxyCreatorSupport::from_definition(definition),
            registered: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> CreatorKind {
        self.kind
    }

    pub fn support(&self) -> &ProxyCreatorSupport {
        &self.support
    }

    /// Infrastructure 模式只接受基础设施角色的 Advisor 定义
    fn is_eligible_advisor_bean(&self, factory: &DefaultListableBeanFactory, name: &str) -> bool {
        match self.kind {
            CreatorKind::Infrastructure => factory
                .merged_bean_definition(name)
                .map(|definition| definition.role == Role::Infrastructure)
                .unwrap_or(false),
            CreatorKind::Advisor | CreatorKind::AspectAware => true,
        }
    }

    /// 容器中的候选 Advisor，跳过正在创建中的
    pub fn find_candidate_advisors(&self, factory: &DefaultListableBeanFactory) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let mut advisors = Vec::new();
        for name in factory.get_bean_names_for_type(ADVISOR_TYPE_NAME) {
            if !self.is_eligible_advisor_bean(factory, &name) {
                continue;
            }
            if factory.is_currently_in_creation(&name) {
                tracing::trace!("Skipping currently created advisor '{}'", name);
                continue;
            }
            let bean = match factory.get_bean(&name) {
                Ok(bean) => bean,
                Err(error) if matches!(error.root_cause(), ContainerError::CircularDependency(_)) => {
                    tracing::trace!(
                        "Skipping advisor '{}' with dependency on currently created bean: {}",
                        name,
                        error
                    );
                    continue;
                }
                Err(error) => return Err(error.into()),
            };
            match bean.downcast_ref::<Arc<dyn Advisor>>() {
                Some(advisor) => advisors.push(Arc::clone(advisor)),
                None => tracing::warn!("Bean '{}' is registered as an Advisor but is not one", name),
            }
        }
        Ok(advisors)
    }

    /// 切面 Bean 和通过 inventory 提交的切面，适配成 Advisor
    fn find_aspect_advisors(&self, factory: &DefaultListableBeanFactory) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let mut advisors = Vec::new();
        for name in factory.get_bean_names_for_type(ASPECT_TYPE_NAME) {
            if factory.is_currently_in_creation(&name) {
                continue;
            }
            let bean = factory.get_bean(&name)?;
            match bean.downcast_ref::<Arc<dyn Aspect>>() {
                Some(aspect) => advisors.push(Arc::new(AspectAdvisor::new(Arc::clone(aspect))) as Arc<dyn Advisor>),
                None => tracing::warn!("Bean '{}' is registered as an Aspect but is not one", name),
            }
        }
        let registered = self.registered.get_or_init(|| {
            registered_aspects()
                .map(|registration| {
                    tracing::debug!("Loaded aspect '{}' from registrations", registration.name);
                    Arc::new(AspectAdvisor::new(registration.create_instance())) as Arc<dyn Advisor>
                })
                .collect()
        });
        advisors.extend(registered.iter().cloned());
        Ok(advisors)
    }

    /// 针对某个类筛选、扩展并排序 Advisor
    pub fn find_eligible_advisors(
        &self,
        factory: &DefaultListableBeanFactory,
        bean_name: &str,
        class: &ClassMetadata,
        methods: &[MethodMetadata],
    ) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let candidates = self.find_candidate_advisors(factory)?;
        let aspect_candidates = match self.kind {
            CreatorKind::AspectAware => self.find_aspect_advisors(factory)?,
            _ => Vec::new(),
        };

        let (mut eligible, eligible_aspects) = {
            let _guard = ProxiedBeanGuard::enter(bean_name);
            (
                find_advisors_that_can_apply(&candidates, class, methods),
                find_advisors_that_can_apply(&aspect_candidates, class, methods),
            )
        };

        if !eligible_aspects.is_empty() {
            eligible.extend(eligible_aspects);
            self.extend_advisors(&mut eligible);
        }
        sort_advisors(&mut eligible);
        Ok(eligible)
    }

    /// 有切面时在最前面加上暴露调用信息的拦截器
    fn extend_advisors(&self, advisors: &mut Vec<Arc<dyn Advisor>>) {
        let expose: Arc<dyn Advisor> = Arc::new(
            DefaultPointcutAdvisor::for_all("exposeInvocation", Arc::new(ExposeInvocationInterceptor))
                .with_order(i32::MIN + 1),
        );
        advisors.insert(0, expose);
    }
}

impl BeanPostProcessor for AdvisorAutoProxyCreator {
    fn name(&self) -> &str {
        match self.kind {
            CreatorKind::Infrastructure => "InfrastructureAdvisorAutoProxyCreator",
            CreatorKind::Advisor => "AdvisorAutoProxyCreator",
            CreatorKind::AspectAware => "AspectAwareAdvisorAutoProxyCreator",
        }
    }

    fn order(&self) -> i32 {
        self.support.order
    }

    fn set_bean_factory(&self, factory: &Arc<DefaultListableBeanFactory>) -> ContainerResult<()> {
        self.support.bind(factory)
    }

    fn post_process_after_initialization(&self, bean: BeanObject, bean_name: &str) -> ContainerResult<BeanObject> {
        self.support
            .wrap_if_necessary(self.name(), bean, bean_name, |factory, key, class, methods| {
                let advisors = self.find_eligible_advisors(factory, key, class, methods)?;
                Ok((!advisors.is_empty()).then_some(advisors))
            })
            .map_err(ContainerError::from)
    }

    fn reset_bean_definition(&self, bean_name: &str) {
        self.support.forget(bean_name);
    }
}

fn create_infrastructure_creator(definition: &BeanDefinition) -> ContainerResult<Arc<dyn BeanPostProcessor>> {
    Ok(Arc::new(AdvisorAutoProxyCreator::from_definition(CreatorKind::Infrastructure, definition)))
}

fn create_advisor_creator(definition: &BeanDefinition) -> ContainerResult<Arc<dyn BeanPostProcessor>> {
    Ok(Arc::new(AdvisorAutoProxyCreator::from_definition(CreatorKind::Advisor, definition)))
}

fn create_aspect_aware_creator(definition: &BeanDefinition) -> ContainerResult<Arc<dyn BeanPostProcessor>> {
    Ok(Arc::new(AdvisorAutoProxyCreator::from_definition(CreatorKind::AspectAware, definition)))
}

fn create_bean_name_creator(definition: &BeanDefinition) -> ContainerResult<Arc<dyn BeanPostProcessor>> {
    Ok(Arc::new(BeanNameAutoProxyCreator::from_definition(definition)))
}

inventory::submit! {
    PostProcessorRegistration {
        class_name: crate::config_utils::INFRASTRUCTURE_CREATOR_TYPE,
        create: create_infrastructure_creator,
    }
}

inventory::submit! {
    PostProcessorRegistration {
        class_name: crate::config_utils::ADVISOR_CREATOR_TYPE,
        create: create_advisor_creator,
    }
}

inventory::submit! {
    PostProcessorRegistration {
        class_name: crate::config_utils::ASPECT_AWARE_CREATOR_TYPE,
        create: create_aspect_aware_creator,
    }
}

inventory::submit! {
    PostProcessorRegistration {
        class_name: BEAN_NAME_CREATOR_TYPE,
        create: create_bean_name_creator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect::Aspect;
    use crate::config_utils::{force_auto_proxy_creator_to_expose_proxy, register_auto_proxy_creator_if_necessary};
    use crate::joinpoint::{JoinPoint, MethodInvocation};
    use crate::pointcut::PointcutExpression;
    use lattice_core::config::Environment;
    use lattice_core::context::ApplicationContext;
    use lattice_core::metadata::{arg, ClassIndex, ConstructorMetadata, MethodMetadata};
    use lattice_core::resource::StaticResourceLoader;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct UserService;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: String,
        log: Log,
    }

    impl MethodInterceptor for Recording {
        fn name(&self) -> &str {
            &self.name
        }

        fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Option<BeanObject>> {
            self.log.lock().push(self.name.clone());
            invocation.proceed()
        }
    }

    struct Counting(AtomicUsize);

    impl MethodInterceptor for Counting {
        fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Option<BeanObject>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            invocation.proceed()
        }
    }

    fn classes() -> ClassIndex {
        ClassIndex::with_classes([
            ClassMetadata::new("app::UserService")
                .with_constructor(ConstructorMetadata::default_of::<UserService>())
                .with_method(MethodMetadata::new("find_user").shared::<UserService>(|_, args| {
                    let id = arg::<u32>(&args, 0)?;
                    Ok(Some(Arc::new(format!("user:{}", id)) as BeanObject))
                }))
                .with_method(MethodMetadata::new("save_user").shared::<UserService>(|_, _| Ok(None)))
                .with_method(MethodMetadata::new("whoami").shared::<UserService>(|_, _| {
                    let join_point = ExposeInvocationInterceptor::current_join_point()
                        .ok_or_else(|| anyhow::anyhow!("no invocation exposed"))?;
                    Ok(Some(Arc::new(join_point.signature()) as BeanObject))
                })),
            ClassMetadata::new("app::Plain")
                .with_constructor(ConstructorMetadata::default_of::<UserService>())
                .with_method(MethodMetadata::new("noop").shared::<UserService>(|_, _| Ok(None))),
        ])
    }

    fn factory() -> Arc<DefaultListableBeanFactory> {
        Arc::new(DefaultListableBeanFactory::new(Arc::new(classes()), Arc::new(Environment::new())))
    }

    fn advisor_definition(name: &str, pointcut: PointcutExpression, order: Option<i32>, log: &Log) -> BeanDefinition {
        let name = name.to_string();
        let log = Arc::clone(log);
        BeanDefinition::from_supplier(ADVISOR_TYPE_NAME, move || {
            let interceptor = Arc::new(Recording {
                name: name.clone(),
                log: Arc::clone(&log),
            });
            let advisor = DefaultPointcutAdvisor::new(name.clone(), Arc::new(pointcut.clone()), interceptor);
            Ok(match order {
                Some(order) => advisor.with_order(order).into_bean(),
                None => advisor.into_bean(),
            })
        })
    }

    fn advisor_names(proxy: &AopProxy) -> Vec<String> {
        proxy.advisors().iter().map(|a| a.name().to_string()).collect()
    }

    #[test]
    fn test_bean_name_patterns_and_aliases() {
        let creator = BeanNameAutoProxyCreator::new(&["userService*"], &[]);
        assert!(creator.is_match("userServiceImpl", &[], false));
        assert!(!creator.is_match("impluserService", &[], false));
        assert!(creator.is_match("primary", &["userService2".to_string()], false));

        let by_factory = BeanNameAutoProxyCreator::new(&["&toolFactory"], &[]);
        assert!(by_factory.is_match("toolFactory", &[], true));
        assert!(!by_factory.is_match("toolFactory", &[], false));

        let by_product = BeanNameAutoProxyCreator::new(&["tool*"], &[]);
        assert!(!by_product.is_match("toolFactory", &[], true));
        assert!(by_product.is_match("toolFactory", &[], false));
    }

    #[test]
    fn test_bean_name_creator_applies_common_interceptors() {
        let factory = factory();
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        factory
            .register_singleton(
                "counting",
                "lattice_aop::MethodInterceptor",
                Arc::new(counting.clone() as Arc<dyn MethodInterceptor>),
            )
            .unwrap();
        factory
            .register_bean_definition("userServiceImpl", BeanDefinition::for_class("app::UserService"))
            .unwrap();
        factory
            .register_bean_definition("orderService", BeanDefinition::for_class("app::UserService"))
            .unwrap();

        let creator = Arc::new(BeanNameAutoProxyCreator::new(&["userService*"], &["counting"]));
        creator.set_bean_factory(&factory).unwrap();
        factory.add_bean_post_processor(creator);

        let proxy = factory.get_bean_typed::<AopProxy>("userServiceImpl").unwrap();
        let user = proxy.invoke("find_user", vec![Some(Arc::new(5u32))]).unwrap().unwrap();
        assert_eq!(user.downcast_ref::<String>().unwrap(), "user:5");
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);

        assert!(factory.get_bean_typed::<UserService>("orderService").is_ok());
    }

    #[test]
    fn test_advisor_creator_orders_and_filters() {
        let factory = factory();
        let log: Log = Arc::default();
        let definitions = [
            ("thirty", PointcutExpression::All, Some(30)),
            ("plain", PointcutExpression::All, None),
            ("ten", PointcutExpression::All, Some(10)),
            ("deleter", PointcutExpression::MethodPattern("delete*".into()), Some(1)),
        ];
        for (name, pointcut, order) in definitions {
            factory
                .register_bean_definition(name, advisor_definition(name, pointcut, order, &log))
                .unwrap();
        }
        factory
            .register_bean_definition("userService", BeanDefinition::for_class("app::UserService"))
            .unwrap();

        let creator = Arc::new(AdvisorAutoProxyCreator::new(CreatorKind::Advisor));
        creator.set_bean_factory(&factory).unwrap();
        factory.add_bean_post_processor(creator);

        let proxy = factory.get_bean_typed::<AopProxy>("userService").unwrap();
        assert_eq!(advisor_names(&proxy), vec!["ten", "thirty", "plain"]);

        proxy.invoke("save_user", vec![]).unwrap();
        assert_eq!(*log.lock(), vec!["ten", "thirty", "plain"]);

        // Advisor 自身不会被代理
        let advisor = factory.get_bean("ten").unwrap();
        assert!(advisor.downcast_ref::<Arc<dyn Advisor>>().is_some());
    }

    #[test]
    fn test_infrastructure_creator_ignores_application_advisors() {
        let factory = factory();
        let log: Log = Arc::default();
        factory
            .register_bean_definition(
                "appAdvisor",
                advisor_definition("appAdvisor", PointcutExpression::All, None, &log),
            )
            .unwrap();
        factory
            .register_bean_definition(
                "infraAdvisor",
                advisor_definition("infraAdvisor", PointcutExpression::MethodPattern("save*".into()), None, &log)
                    .with_role(Role::Infrastructure),
            )
            .unwrap();
        factory
            .register_bean_definition("userService", BeanDefinition::for_class("app::UserService"))
            .unwrap();
        factory
            .register_bean_definition("plain", BeanDefinition::for_class("app::Plain"))
            .unwrap();

        let creator = Arc::new(AdvisorAutoProxyCreator::new(CreatorKind::Infrastructure));
        creator.set_bean_factory(&factory).unwrap();
        factory.add_bean_post_processor(creator);

        let proxy = factory.get_bean_typed::<AopProxy>("userService").unwrap();
        assert_eq!(advisor_names(&proxy), vec!["infraAdvisor"]);
        assert!(factory.get_bean_typed::<UserService>("plain").is_ok());
    }

    #[test]
    fn test_currently_proxied_marker_is_scoped_to_filtering() {
        let factory = factory();
        let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
        let recorder = Arc::clone(&seen);
        let pointcut = PointcutExpression::custom(move |_, _| {
            recorder.lock().push(currently_proxied_bean_name());
            true
        });
        factory
            .register_singleton(
                "marker",
                ADVISOR_TYPE_NAME,
                DefaultPointcutAdvisor::new(
                    "marker",
                    Arc::new(pointcut),
                    Arc::new(Counting(AtomicUsize::new(0))),
                )
                .into_bean(),
            )
            .unwrap();
        factory
            .register_bean_definition("userService", BeanDefinition::for_class("app::UserService"))
            .unwrap();

        let creator = Arc::new(AdvisorAutoProxyCreator::new(CreatorKind::Advisor));
        creator.set_bean_factory(&factory).unwrap();
        factory.add_bean_post_processor(creator);

        factory.get_bean_typed::<AopProxy>("userService").unwrap();
        assert_eq!(seen.lock().first().cloned().flatten().as_deref(), Some("userService"));
        assert_eq!(currently_proxied_bean_name(), None);
    }

    #[test]
    fn test_missing_bean_factory_is_fatal() {
        let creator = AdvisorAutoProxyCreator::new(CreatorKind::Advisor);
        let err = creator
            .post_process_after_initialization(Arc::new(UserService), "userService")
            .unwrap_err();
        match err {
            ContainerError::Other(inner) => assert!(matches!(
                inner.downcast_ref::<AopError>(),
                Some(AopError::MissingBeanFactory(_))
            )),
            other => panic!("unexpected error: {}", other),
        }

        let advisor = DefaultPointcutAdvisor::for_all("any", Arc::new(Counting(AtomicUsize::new(0)))).into_bean();
        assert!(creator.post_process_after_initialization(advisor, "any").is_ok());
    }

    struct AuditAspect {
        pointcut: PointcutExpression,
        log: Log,
    }

    impl Aspect for AuditAspect {
        fn name(&self) -> &str {
            "audit"
        }

        fn pointcut(&self) -> &PointcutExpression {
            &self.pointcut
        }

        fn before(&self, join_point: &JoinPoint) {
            self.log.lock().push(format!("before {}", join_point.method_name));
        }

        fn after(&self, join_point: &JoinPoint) {
            self.log.lock().push(format!("after {}", join_point.method_name));
        }
    }

    #[test]
    fn test_aspect_aware_creator_through_context() {
        let context = ApplicationContext::new(
            Arc::new(classes()),
            Arc::new(Environment::new()),
            Arc::new(StaticResourceLoader::new()),
        );
        let factory = Arc::clone(context.bean_factory());
        register_auto_proxy_creator_if_necessary(&*factory, CreatorKind::Infrastructure).unwrap();
        register_auto_proxy_creator_if_necessary(&*factory, CreatorKind::AspectAware).unwrap();
        force_auto_proxy_creator_to_expose_proxy(&*factory).unwrap();

        let log: Log = Arc::default();
        let aspect: Arc<dyn Aspect> = Arc::new(AuditAspect {
            pointcut: PointcutExpression::execution("* UserService.*(..)"),
            log: Arc::clone(&log),
        });
        factory
            .register_singleton("audit", ASPECT_TYPE_NAME, Arc::new(aspect))
            .unwrap();
        context
            .register_bean_definition("userService", BeanDefinition::for_class("app::UserService"))
            .unwrap();
        context.refresh().unwrap();

        let proxy = context.get_bean_typed::<AopProxy>("userService").unwrap();
        assert!(proxy.is_expose_proxy());
        assert_eq!(advisor_names(&proxy), vec!["exposeInvocation", "audit"]);

        let signature = proxy.invoke("whoami", vec![]).unwrap().unwrap();
        assert_eq!(signature.downcast_ref::<String>().unwrap(), "app::UserService::whoami");
        assert_eq!(*log.lock(), vec!["before whoami", "after whoami"]);
    }
}
