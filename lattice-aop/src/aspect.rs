//! 切面（Aspect）定义
//!
//! 切面是横切关注点的模块化。切面本身不是拦截器：由 [`AspectAdvisor`] 适配成 Advisor，
//! 再由支持切面的自动代理创建器应用到匹配的 Bean 上。

use std::sync::Arc;

use lattice_core::bean::BeanObject;

use crate::advice::MethodInterceptor;
use crate::advisor::Advisor;
use crate::error_info::ErrorInfo;
use crate::joinpoint::{JoinPoint, MethodInvocation};
use crate::pointcut::{Pointcut, PointcutExpression};

/// 切面 Bean 的类型名
pub const ASPECT_TYPE_NAME: &str = "lattice_aop::Aspect";

/// 切面 Trait
///
/// 通知的执行顺序：before → around → after_returning / after_throwing → after
pub trait Aspect: Send + Sync {
    /// 切面名称
    fn name(&self) -> &str;

    /// 切点表达式
    fn pointcut(&self) -> &PointcutExpression;

    fn order(&self) -> Option<i32> {
        None
    }

    /// 前置通知
    fn before(&self, _join_point: &JoinPoint) {}

    /// 后置通知，无论成功失败
    fn after(&self, _join_point: &JoinPoint) {}

    /// 返回后通知
    fn after_returning(&self, _join_point: &JoinPoint, _result: Option<&BeanObject>) {}

    /// 异常通知
    fn after_throwing(&self, _join_point: &JoinPoint, _error: &ErrorInfo) {}

    /// 环绕通知，默认直接继续
    fn around(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Option<BeanObject>> {
        invocation.proceed()
    }
}

/// 切面注册器
///
/// 通过 `inventory::submit!` 提交，支持切面的代理创建器会自动收集
pub struct AspectRegistration {
    pub name: &'static str,

    /// 创建切面实例的函数
    pub create: fn() -> Arc<dyn Aspect>,
}

impl AspectRegistration {
    pub const fn new(name: &'static str, create: fn() -> Arc<dyn Aspect>) -> Self {
        Self { name, create }
    }

    pub fn create_instance(&self) -> Arc<dyn Aspect> {
        (self.create)()
    }
}

inventory::collect!(AspectRegistration);

/// 所有通过 inventory 提交的切面
pub fn registered_aspects() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>.into_iter()
}

/// 把切面的各类通知组合成一个拦截器
pub struct AspectInterceptor {
    aspect: Arc<dyn Aspect>,
}

impl AspectInterceptor {
    pub fn new(aspect: Arc<dyn Aspect>) -> Self {
        Self { aspect }
    }
}

impl MethodInterceptor for AspectInterceptor {
    fn name(&self) -> &str {
        self.aspect.name()
    }

    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Option<BeanObject>> {
        let join_point = invocation.join_point();
        self.aspect.before(&join_point);

        let result = self.aspect.around(invocation);
        match &result {
            Ok(value) => self.aspect.after_returning(&join_point, value.as_ref()),
            Err(error) => self.aspect.after_throwing(&join_point, &ErrorInfo::from_error(error)),
        }

        self.aspect.after(&join_point);
        result
    }
}

/// 切面到 Advisor 的适配
pub struct AspectAdvisor {
    aspect: Arc<dyn Aspect>,
    interceptor: Arc<dyn MethodInterceptor>,
}

impl AspectAdvisor {
    pub fn new(aspect: Arc<dyn Aspect>) -> Self {
        let interceptor: Arc<dyn MethodInterceptor> = Arc::new(AspectInterceptor::new(Arc::clone(&aspect)));
        Self { aspect, interceptor }
    }

    pub fn aspect(&self) -> &Arc<dyn Aspect> {
        &self.aspect
    }
}

impl Advisor for AspectAdvisor {
    fn name(&self) -> &str {
        self.aspect.name()
    }

    fn pointcut(&self) -> &dyn Pointcut {
        self.aspect.pointcut()
    }

    fn interceptor(&self) -> Arc<dyn MethodInterceptor> {
        Arc::clone(&self.interceptor)
    }

    fn order(&self) -> Option<i32> {
        self.aspect.order()
    }
}

// ============================================================================
// 预定义的常用切面
// ============================================================================

/// 日志切面 - 记录方法调用
pub struct LoggingAspect {
    log_args: bool,
    log_result: bool,
    pointcut: PointcutExpression,
}

impl LoggingAspect {
    pub fn new(pointcut: PointcutExpression) -> Self {
        Self {
            log_args: false,
            log_result: false,
            pointcut,
        }
    }

    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }

    pub fn with_result(mut self) -> Self {
        self.log_result = true;
        self
    }
}

impl Aspect for LoggingAspect {
    fn name(&self) -> &str {
        "LoggingAspect"
    }

    fn pointcut(&self) -> &PointcutExpression {
        &self.pointcut
    }

    fn before(&self, join_point: &JoinPoint) {
        if self.log_args {
            tracing::info!(
                "→ Entering: {} on '{}' with {} argument(s)",
                join_point.signature(),
                join_point.bean_name,
                join_point.args.len()
            );
        } else {
            tracing::info!("→ Entering: {}", join_point.signature());
        }
    }

    fn after_returning(&self, join_point: &JoinPoint, result: Option<&BeanObject>) {
        if self.log_result {
            tracing::info!(
                "{} returned {}",
                join_point.signature(),
                if result.is_some() { "a value" } else { "nothing" }
            );
        }
    }

    fn after_throwing(&self, join_point: &JoinPoint, error: &ErrorInfo) {
        tracing::error!("Exception in {}: {}", join_point.signature(), error.full_description());
    }

    fn after(&self, join_point: &JoinPoint) {
        let elapsed = join_point.timestamp.elapsed();
        tracing::info!("← Exiting: {} (took {:?})", join_point.signature(), elapsed);
    }
}

/// 性能监控切面
pub struct PerformanceAspect {
    threshold_ms: u128,
    pointcut: PointcutExpression,
}

impl PerformanceAspect {
    pub fn new(threshold_ms: u128, pointcut: PointcutExpression) -> Self {
        Self {
            threshold_ms,
            pointcut,
        }
    }

    pub fn is_slow(&self, join_point: &JoinPoint) -> bool {
        join_point.timestamp.elapsed().as_millis() > self.threshold_ms
    }
}

impl Aspect for PerformanceAspect {
    fn name(&self) -> &str {
        "PerformanceAspect"
    }

    fn pointcut(&self) -> &PointcutExpression {
        &self.pointcut
    }

    fn after(&self, join_point: &JoinPoint) {
        if self.is_slow(join_point) {
            tracing::warn!(
                "Slow method detected: {} took {}ms (threshold: {}ms)",
                join_point.signature(),
                join_point.timestamp.elapsed().as_millis(),
                self.threshold_ms
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::metadata::{arg, ClassMetadata, MethodMetadata};
    use parking_lot::Mutex;

    struct Greeter;

    struct RecordingAspect {
        events: Mutex<Vec<String>>,
        pointcut: PointcutExpression,
    }

    impl RecordingAspect {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                pointcut: PointcutExpression::All,
            }
        }
    }

    impl Aspect for RecordingAspect {
        fn name(&self) -> &str {
            "recording"
        }

        fn pointcut(&self) -> &PointcutExpression {
            &self.pointcut
        }

        fn before(&self, join_point: &JoinPoint) {
            self.events.lock().push(format!("before {}", join_point.method_name));
        }

        fn after_returning(&self, _join_point: &JoinPoint, result: Option<&BeanObject>) {
            let value = result.and_then(|r| r.downcast_ref::<String>()).cloned().unwrap_or_default();
            self.events.lock().push(format!("returned {}", value));
        }

        fn after_throwing(&self, _join_point: &JoinPoint, error: &ErrorInfo) {
            self.events.lock().push(format!("threw {}", error.message));
        }

        fn after(&self, _join_point: &JoinPoint) {
            self.events.lock().push("after".to_string());
        }
    }

    fn greet() -> MethodMetadata {
        MethodMetadata::new("greet").shared::<Greeter>(|_, args| {
            let name = arg::<String>(&args, 0)?;
            Ok(Some(Arc::new(format!("hi {}", name)) as BeanObject))
        })
    }

    #[test]
    fn test_advice_order_on_success_and_failure() {
        let aspect = Arc::new(RecordingAspect::new());
        let interceptors: Vec<Arc<dyn MethodInterceptor>> =
            vec![Arc::new(AspectInterceptor::new(aspect.clone() as Arc<dyn Aspect>))];
        let target: BeanObject = Arc::new(Greeter);
        let method = greet();
        let class = ClassMetadata::new("app::Greeter");

        let args: Vec<Option<BeanObject>> = vec![Some(Arc::new("bob".to_string()))];
        let mut invocation = MethodInvocation::new("greeter", &target, &class, &method, args, &interceptors);
        let result = invocation.proceed().unwrap().unwrap();
        assert_eq!(result.downcast_ref::<String>().unwrap(), "hi bob");
        assert_eq!(*aspect.events.lock(), vec!["before greet", "returned hi bob", "after"]);

        aspect.events.lock().clear();
        let mut missing_arg = MethodInvocation::new("greeter", &target, &class, &method, vec![], &interceptors);
        assert!(missing_arg.proceed().is_err());
        assert_eq!(
            *aspect.events.lock(),
            vec!["before greet", "threw argument 0 is missing", "after"]
        );
    }

    #[test]
    fn test_aspect_advisor_uses_aspect_pointcut_and_order() {
        struct Ordered(PointcutExpression);

        impl Aspect for Ordered {
            fn name(&self) -> &str {
                "ordered"
            }

            fn pointcut(&self) -> &PointcutExpression {
                &self.0
            }

            fn order(&self) -> Option<i32> {
                Some(5)
            }
        }

        let advisor = AspectAdvisor::new(Arc::new(Ordered(PointcutExpression::MethodPattern("save*".into()))));
        let class = ClassMetadata::new("app::UserService");
        assert_eq!(advisor.order(), Some(5));
        assert_eq!(advisor.name(), "ordered");
        assert!(advisor.pointcut().matches_method(&MethodMetadata::new("save_user"), &class));
        assert!(!advisor.pointcut().matches_method(&MethodMetadata::new("find_user"), &class));
    }
}
