//! AOP 代理
//!
//! 没有运行时字节码生成：[`AopProxy`] 是一个按方法名分派的装饰器，
//! 持有目标实例、目标类元数据和有序的 Advisor，调用时为方法组装拦截器链。

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use lattice_core::bean::BeanObject;
use lattice_core::metadata::{ClassMetadata, MetadataReader, MethodMetadata};
use parking_lot::RwLock;

use crate::advice::MethodInterceptor;
use crate::advisor::{Advisor, DefaultPointcutAdvisor};
use crate::error::{AopError, AopResult};
use crate::joinpoint::MethodInvocation;

type InterceptorChain = Arc<[Arc<dyn MethodInterceptor>]>;

thread_local! {
    static CURRENT_PROXY: RefCell<Vec<Arc<AopProxy>>> = const { RefCell::new(Vec::new()) };
}

/// 访问当前线程上正在执行的代理
pub struct AopContext;

impl AopContext {
    /// 在被代理的方法内部取得代理本身，用于自调用也经过拦截器
    ///
    /// 只有 `expose_proxy` 打开时可用
    pub fn current_proxy() -> AopResult<Arc<AopProxy>> {
        CURRENT_PROXY
            .with(|stack| stack.borrow().last().cloned())
            .ok_or(AopError::ProxyNotExposed)
    }
}

struct ExposedProxy;

impl ExposedProxy {
    fn enter(proxy: Arc<AopProxy>) -> Self {
        CURRENT_PROXY.with(|stack| stack.borrow_mut().push(proxy));
        ExposedProxy
    }
}

impl Drop for ExposedProxy {
    fn drop(&mut self) {
        CURRENT_PROXY.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// 类、父类和接口上的全部方法，子类覆盖的方法在前，按签名去重
pub fn class_methods(reader: &dyn MetadataReader, class_name: &str) -> Vec<MethodMetadata> {
    let mut methods: Vec<MethodMetadata> = Vec::new();
    let mut signatures = HashSet::new();
    let mut interfaces = Vec::new();

    for class in reader.superclass_chain(class_name).iter().rev() {
        for method in &class.methods {
            if !method.is_static && signatures.insert(method.signature()) {
                methods.push(method.clone());
            }
        }
        interfaces.extend(class.interfaces.iter().cloned());
    }

    for interface in interface_closure(reader, interfaces) {
        let Some(metadata) = reader.class_metadata(&interface) else {
            continue;
        };
        for method in &metadata.methods {
            if !method.is_static && signatures.insert(method.signature()) {
                methods.push(method.clone());
            }
        }
    }
    methods
}

/// 接口及其父接口，按发现顺序
fn interface_closure(reader: &dyn MetadataReader, roots: Vec<String>) -> Vec<String> {
    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut pending = roots;
    pending.reverse();
    while let Some(interface) = pending.pop() {
        if !visited.insert(interface.clone()) {
            continue;
        }
        if let Some(metadata) = reader.class_metadata(&interface) {
            pending.extend(metadata.interfaces.iter().rev().cloned());
        }
        result.push(interface);
    }
    result
}

fn all_interfaces(reader: &dyn MetadataReader, class_name: &str) -> Vec<String> {
    let roots: Vec<String> = reader
        .superclass_chain(class_name)
        .iter()
        .rev()
        .flat_map(|class| class.interfaces.iter().cloned())
        .collect();
    interface_closure(reader, roots)
}

/// AOP 代理
pub struct AopProxy {
    bean_name: String,
    target: BeanObject,
    target_class: Arc<ClassMetadata>,
    interfaces: Vec<String>,
    methods: HashMap<String, MethodMetadata>,
    /// 接口代理时对外暴露的方法名
    interface_methods: HashSet<String>,
    advisors: Vec<Arc<dyn Advisor>>,
    proxy_target_class: bool,
    expose_proxy: bool,
    chain_cache: RwLock<HashMap<String, InterceptorChain>>,
    self_ref: Weak<AopProxy>,
}

impl AopProxy {
    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }

    pub fn target(&self) -> &BeanObject {
        &self.target
    }

    /// 目标实例的具体类型
    pub fn target_as<T: std::any::Any>(&self) -> Option<&T> {
        self.target.downcast_ref::<T>()
    }

    pub fn target_class(&self) -> &ClassMetadata {
        &self.target_class
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn advisors(&self) -> &[Arc<dyn Advisor>] {
        &self.advisors
    }

    pub fn is_proxy_target_class(&self) -> bool {
        self.proxy_target_class
    }

    pub fn is_expose_proxy(&self) -> bool {
        self.expose_proxy
    }

    /// 是否按接口代理
    pub fn is_interface_proxy(&self) -> bool {
        !self.proxy_target_class && !self.interfaces.is_empty()
    }

    /// 代理对外提供的方法
    pub fn exposes(&self, method: &str) -> bool {
        if self.is_interface_proxy() {
            self.interface_methods.contains(method)
        } else {
            self.methods.contains_key(method)
        }
    }

    /// 通过拦截器链调用目标方法
    pub fn invoke(&self, method: &str, args: Vec<Option<BeanObject>>) -> anyhow::Result<Option<BeanObject>> {
        if self.is_interface_proxy() && !self.interface_methods.contains(method) {
            return Err(AopError::MethodNotExposed {
                bean_name: self.bean_name.clone(),
                method: method.to_string(),
            }
            .into());
        }
        let metadata = self.methods.get(method).ok_or_else(|| AopError::NoSuchMethod {
            class_name: self.target_class.name.clone(),
            method: method.to_string(),
        })?;

        let chain = self.interceptor_chain(metadata);
        let _exposed = if self.expose_proxy {
            self.self_ref.upgrade().map(ExposedProxy::enter)
        } else {
            None
        };

        tracing::trace!(
            "Invoking {}::{} on '{}' through {} interceptor(s)",
            self.target_class.simple_name(),
            method,
            self.bean_name,
            chain.len()
        );
        let mut invocation = MethodInvocation::new(
            &self.bean_name,
            &self.target,
            &self.target_class,
            metadata,
            args,
            &chain,
        );
        invocation.proceed()
    }

    /// 方法对应的拦截器链，按方法签名缓存
    pub fn interceptor_chain(&self, method: &MethodMetadata) -> InterceptorChain {
        let key = method.signature();
        if let Some(chain) = self.chain_cache.read().get(&key) {
            return Arc::clone(chain);
        }

        let chain: InterceptorChain = self
            .advisors
            .iter()
            .filter(|advisor| {
                let pointcut = advisor.pointcut();
                pointcut.matches_class(&self.target_class) && pointcut.matches_method(method, &self.target_class)
            })
            .map(|advisor| advisor.interceptor())
            .collect::<Vec<_>>()
            .into();

        let mut cache = self.chain_cache.write();
        Arc::clone(cache.entry(key).or_insert(chain))
    }
}

impl fmt::Debug for AopProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopProxy")
            .field("bean_name", &self.bean_name)
            .field("target_class", &self.target_class.name)
            .field("interfaces", &self.interfaces)
            .field("advisors", &self.advisors.iter().map(|a| a.name().to_string()).collect::<Vec<_>>())
            .field("proxy_target_class", &self.proxy_target_class)
            .field("expose_proxy", &self.expose_proxy)
            .finish()
    }
}

/// 代理工厂
///
/// ```ignore
/// let proxy = ProxyFactory::new(reader, "userService", target, "app::UserService")
///     .add_advisor(advisor)
///     .expose_proxy(true)
///     .get_proxy()?;
/// ```
pub struct ProxyFactory {
    reader: Arc<dyn MetadataReader>,
    bean_name: String,
    target: BeanObject,
    target_class: String,
    advisors: Vec<Arc<dyn Advisor>>,
    proxy_target_class: bool,
    expose_proxy: bool,
}

impl ProxyFactory {
    pub fn new(
        reader: Arc<dyn MetadataReader>,
        bean_name: impl Into<String>,
        target: BeanObject,
        target_class: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            bean_name: bean_name.into(),
            target,
            target_class: target_class.into(),
            advisors: Vec::new(),
            proxy_target_class: false,
            expose_proxy: false,
        }
    }

    pub fn add_advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        self.advisors.push(advisor);
        self
    }

    pub fn add_advisors(mut self, advisors: impl IntoIterator<Item = Arc<dyn Advisor>>) -> Self {
        self.advisors.extend(advisors);
        self
    }

    /// 拦截所有方法的拦截器
    pub fn add_interceptor(self, interceptor: Arc<dyn MethodInterceptor>) -> Self {
        let name = interceptor.name().to_string();
        self.add_advisor(Arc::new(DefaultPointcutAdvisor::for_all(name, interceptor)))
    }

    pub fn proxy_target_class(mut self, proxy_target_class: bool) -> Self {
        self.proxy_target_class = proxy_target_class;
        self
    }

    pub fn expose_proxy(mut self, expose_proxy: bool) -> Self {
        self.expose_proxy = expose_proxy;
        self
    }

    pub fn get_proxy(self) -> AopResult<Arc<AopProxy>> {
        let target_class = self.reader.require(&self.target_class)?;
        let reader = &*self.reader;
        let interfaces = all_interfaces(reader, &self.target_class);

        let mut methods = HashMap::new();
        for method in class_methods(reader, &self.target_class) {
            methods.entry(method.name.clone()).or_insert(method);
        }
        let interface_methods: HashSet<String> = interfaces
            .iter()
            .filter_map(|name| reader.class_metadata(name))
            .flat_map(|interface| interface.methods.iter().map(|m| m.name.clone()).collect::<Vec<_>>())
            .collect();

        tracing::debug!(
            "Creating {} proxy for bean '{}' with {} advisor(s)",
            if !self.proxy_target_class && !interfaces.is_empty() {
                "interface"
            } else {
                "class"
            },
            self.bean_name,
            self.advisors.len()
        );

        Ok(Arc::new_cyclic(|self_ref| AopProxy {
            bean_name: self.bean_name,
            target: self.target,
            target_class,
            interfaces,
            methods,
            interface_methods,
            advisors: self.advisors,
            proxy_target_class: self.proxy_target_class,
            expose_proxy: self.expose_proxy,
            chain_cache: RwLock::new(HashMap::new()),
            self_ref: self_ref.clone(),
        }))
    }
}
