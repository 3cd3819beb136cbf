//! Lattice AOP - 面向切面编程支持
//!
//! - 切点表达式与 Advisor
//! - 切面（before / after / after_returning / after_throwing / around）
//! - 按方法分派的 AOP 代理，支持暴露当前代理
//! - 作为 BeanPostProcessor 工作的自动代理创建器，按能力等级升级

pub mod advice;
pub mod advisor;
pub mod aspect;
pub mod config_utils;
pub mod creator;
pub mod error;
pub mod error_info;
pub mod joinpoint;
pub mod pointcut;
pub mod proxy;

// 重新导出核心类型
pub use advice::{ExposeInvocationInterceptor, MethodInterceptor};
pub use advisor::{Advisor, DefaultPointcutAdvisor, ADVISOR_TYPE_NAME};
pub use aspect::{Aspect, AspectAdvisor, AspectRegistration, LoggingAspect, PerformanceAspect, ASPECT_TYPE_NAME};
pub use config_utils::{
    force_auto_proxy_creator_to_expose_proxy, force_auto_proxy_creator_to_use_class_proxying,
    register_auto_proxy_creator_if_necessary, CreatorKind, AUTO_PROXY_CREATOR_BEAN_NAME,
};
pub use creator::{currently_proxied_bean_name, AdvisorAutoProxyCreator, BeanNameAutoProxyCreator};
pub use error::{AopError, AopResult};
pub use error_info::ErrorInfo;
pub use joinpoint::{JoinPoint, MethodInvocation};
pub use pointcut::{Pointcut, PointcutExpression};
pub use proxy::{AopContext, AopProxy, ProxyFactory};

// 导出 inventory 供切面注册使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::*;
    pub use crate::advisor::{Advisor, DefaultPointcutAdvisor, ADVISOR_TYPE_NAME};
    pub use crate::aspect::{Aspect, AspectRegistration, LoggingAspect, PerformanceAspect, ASPECT_TYPE_NAME};
    pub use crate::config_utils::{register_auto_proxy_creator_if_necessary, CreatorKind};
    pub use crate::error_info::ErrorInfo;
    pub use crate::joinpoint::{JoinPoint, MethodInvocation};
    pub use crate::pointcut::{Pointcut, PointcutExpression};
    pub use crate::proxy::{AopContext, AopProxy, ProxyFactory};
}
