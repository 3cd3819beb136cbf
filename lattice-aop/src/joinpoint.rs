//! 连接点（JoinPoint）定义
//!
//! 连接点表示一次被拦截的方法调用

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use lattice_core::bean::BeanObject;
use lattice_core::metadata::{ClassMetadata, MethodMetadata, Receiver};

use crate::advice::MethodInterceptor;

/// 连接点信息
///
/// 方法调用的只读快照，交给切面的通知方法
#[derive(Clone)]
pub struct JoinPoint {
    /// 被代理的 Bean 名称
    pub bean_name: String,

    /// 目标类型名称
    pub target_type: String,

    pub method_name: String,

    pub args: Vec<Option<BeanObject>>,

    /// 调用时间戳
    pub timestamp: Instant,
}

impl JoinPoint {
    pub fn new(bean_name: impl Into<String>, target_type: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            bean_name: bean_name.into(),
            target_type: target_type.into(),
            method_name: method_name.into(),
            args: Vec::new(),
            timestamp: Instant::now(),
        }
    }

    pub fn with_args(mut self, args: Vec<Option<BeanObject>>) -> Self {
        self.args = args;
        self
    }

    /// 获取完整的方法签名
    pub fn signature(&self) -> String {
        format!("{}::{}", self.target_type, self.method_name)
    }

    /// 第 `index` 个参数，类型不符或缺失时返回 `None`
    pub fn arg<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        self.args.get(index).cloned().flatten()?.downcast::<T>().ok()
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("bean_name", &self.bean_name)
            .field("signature", &self.signature())
            .field("args", &self.args.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// 可以继续执行的方法调用
///
/// 每次 `proceed` 调用链上的下一个拦截器，链走完之后调用目标方法
pub struct MethodInvocation<'a> {
    bean_name: &'a str,
    target: &'a BeanObject,
    target_class: &'a ClassMetadata,
    method: &'a MethodMetadata,
    args: Vec<Option<BeanObject>>,
    interceptors: &'a [Arc<dyn MethodInterceptor>],
    index: usize,
    timestamp: Instant,
}

impl<'a> MethodInvocation<'a> {
    pub fn new(
        bean_name: &'a str,
        target: &'a BeanObject,
        target_class: &'a ClassMetadata,
        method: &'a MethodMetadata,
        args: Vec<Option<BeanObject>>,
        interceptors: &'a [Arc<dyn MethodInterceptor>],
    ) -> Self {
        Self {
            bean_name,
            target,
            target_class,
            method,
            args,
            interceptors,
            index: 0,
            timestamp: Instant::now(),
        }
    }

    /// 调用下一个拦截器，或者目标方法
    pub fn proceed(&mut self) -> anyhow::Result<Option<BeanObject>> {
        match self.interceptors.get(self.index) {
            Some(interceptor) => {
                let interceptor = Arc::clone(interceptor);
                self.index += 1;
                let result = interceptor.invoke(self);
                self.index -= 1;
                result
            }
            None => self.method.invoke(Receiver::Shared(self.target), self.args.clone()),
        }
    }

    pub fn bean_name(&self) -> &str {
        self.bean_name
    }

    pub fn target(&self) -> &BeanObject {
        self.target
    }

    /// 目标类的元数据
    pub fn target_class(&self) -> &'a ClassMetadata {
        self.target_class
    }

    pub fn method(&self) -> &'a MethodMetadata {
        self.method
    }

    pub fn arguments(&self) -> &[Option<BeanObject>] {
        &self.args
    }

    /// 替换参数，后续拦截器和目标方法看到新参数
    pub fn set_arguments(&mut self, args: Vec<Option<BeanObject>>) {
        self.args = args;
    }

    pub fn started_at(&self) -> Instant {
        self.timestamp
    }

    pub fn join_point(&self) -> JoinPoint {
        JoinPoint {
            bean_name: self.bean_name.to_string(),
            target_type: self.target_class.name.clone(),
            method_name: self.method.name.clone(),
            args: self.args.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl fmt::Debug for MethodInvocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("bean_name", &self.bean_name)
            .field("method", &format!("{}::{}", self.target_class.name, self.method.name))
            .field("position", &self.index)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
