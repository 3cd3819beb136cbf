//! Advisor：切点 + 拦截器
//!
//! 容器里的 Advisor Bean 以 `Arc<dyn Advisor>` 存放，类型名为 [`ADVISOR_TYPE_NAME`]

use std::fmt;
use std::sync::Arc;

use lattice_core::bean::BeanObject;
use lattice_core::metadata::{ClassMetadata, MethodMetadata};

use crate::advice::MethodInterceptor;
use crate::pointcut::{Pointcut, PointcutExpression};

/// Advisor Bean 的类型名，用于按类型查找
pub const ADVISOR_TYPE_NAME: &str = "lattice_aop::Advisor";

pub trait Advisor: Send + Sync {
    fn name(&self) -> &str;

    fn pointcut(&self) -> &dyn Pointcut;

    fn interceptor(&self) -> Arc<dyn MethodInterceptor>;

    /// `None` 表示无序，排在所有有序 Advisor 之后
    fn order(&self) -> Option<i32> {
        None
    }
}

impl fmt::Debug for dyn Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("name", &self.name())
            .field("order", &self.order())
            .field("pointcut", &self.pointcut())
            .finish()
    }
}

/// 通用的 Advisor 实现
pub struct DefaultPointcutAdvisor {
    name: String,
    pointcut: Arc<dyn Pointcut>,
    interceptor: Arc<dyn MethodInterceptor>,
    order: Option<i32>,
}

impl DefaultPointcutAdvisor {
    pub fn new(name: impl Into<String>, pointcut: Arc<dyn Pointcut>, interceptor: Arc<dyn MethodInterceptor>) -> Self {
        Self {
            name: name.into(),
            pointcut,
            interceptor,
            order: None,
        }
    }

    /// 匹配所有方法
    pub fn for_all(name: impl Into<String>, interceptor: Arc<dyn MethodInterceptor>) -> Self {
        Self::new(name, Arc::new(PointcutExpression::All), interceptor)
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// 转换为容器中存放的形式
    pub fn into_bean(self) -> BeanObject {
        Arc::new(Arc::new(self) as Arc<dyn Advisor>)
    }
}

impl Advisor for DefaultPointcutAdvisor {
    fn name(&self) -> &str {
        &self.name
    }

    fn pointcut(&self) -> &dyn Pointcut {
        &*self.pointcut
    }

    fn interceptor(&self) -> Arc<dyn MethodInterceptor> {
        Arc::clone(&self.interceptor)
    }

    fn order(&self) -> Option<i32> {
        self.order
    }
}

/// Advisor 能否作用于该类：类过滤通过，且至少有一个方法匹配
pub fn can_apply(advisor: &dyn Advisor, class: &ClassMetadata, methods: &[MethodMetadata]) -> bool {
    let pointcut = advisor.pointcut();
    pointcut.matches_class(class) && methods.iter().any(|m| pointcut.matches_method(m, class))
}

/// 过滤出能作用于该类的 Advisor，保持原有顺序
pub fn find_advisors_that_can_apply(
    candidates: &[Arc<dyn Advisor>],
    class: &ClassMetadata,
    methods: &[MethodMetadata],
) -> Vec<Arc<dyn Advisor>> {
    candidates
        .iter()
        .filter(|advisor| can_apply(&***advisor, class, methods))
        .cloned()
        .collect()
}

/// 有序的按 order 升序，无序的排在后面，保持原有相对顺序
pub fn sort_advisors(advisors: &mut [Arc<dyn Advisor>]) {
    advisors.sort_by_key(|advisor| match advisor.order() {
        Some(order) => (0, order),
        None => (1, 0),
    });
}
