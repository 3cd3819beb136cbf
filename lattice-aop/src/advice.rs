//! 通知（Advice）定义
//!
//! 所有通知最终都表示为 [`MethodInterceptor`]，按顺序组成拦截器链

use std::cell::RefCell;

use lattice_core::bean::BeanObject;

use crate::joinpoint::{JoinPoint, MethodInvocation};

/// 方法拦截器
///
/// 环绕一次方法调用；调用 `invocation.proceed()` 继续执行，不调用则短路
pub trait MethodInterceptor: Send + Sync {
    fn name(&self) -> &str {
        "MethodInterceptor"
    }

    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Option<BeanObject>>;
}

thread_local! {
    static CURRENT_INVOCATION: RefCell<Vec<JoinPoint>> = const { RefCell::new(Vec::new()) };
}

/// 把当前调用暴露到线程局部变量，放在链的最前面
#[derive(Debug, Default, Clone, Copy)]
pub struct ExposeInvocationInterceptor;

impl ExposeInvocationInterceptor {
    /// 当前线程上正在执行的调用
    pub fn current_join_point() -> Option<JoinPoint> {
        CURRENT_INVOCATION.with(|stack| stack.borrow().last().cloned())
    }
}

struct ExposedInvocation;

impl Drop for ExposedInvocation {
    fn drop(&mut self) {
        CURRENT_INVOCATION.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl MethodInterceptor for ExposeInvocationInterceptor {
    fn name(&self) -> &str {
        "ExposeInvocationInterceptor"
    }

    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> anyhow::Result<Option<BeanObject>> {
        let join_point = invocation.join_point();
        CURRENT_INVOCATION.with(|stack| stack.borrow_mut().push(join_point));
        let _exposed = ExposedInvocation;
        invocation.proceed()
    }
}
