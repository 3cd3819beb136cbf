//! 切点（Pointcut）表达式系统
//!
//! 先按类过滤，再逐个方法匹配。类过滤无法判断的表达式（只涉及方法的）在类级别放行。

use std::fmt;
use std::sync::Arc;

use lattice_core::metadata::{ClassMetadata, MethodMetadata};
use lattice_core::utils::pattern::simple_match;
use regex::Regex;

/// 切点
pub trait Pointcut: Send + Sync + fmt::Debug {
    /// 类级别过滤
    fn matches_class(&self, _class: &ClassMetadata) -> bool {
        true
    }

    /// 方法级别匹配
    fn matches_method(&self, method: &MethodMetadata, class: &ClassMetadata) -> bool;
}

type ClassPredicate = Arc<dyn Fn(&ClassMetadata) -> bool + Send + Sync>;
type MethodPredicate = Arc<dyn Fn(&MethodMetadata, &ClassMetadata) -> bool + Send + Sync>;

/// 切点表达式
#[derive(Clone)]
pub enum PointcutExpression {
    /// 匹配所有方法
    All,

    /// 匹配类型，完整路径或简单类名，支持 `*` 通配
    /// 例如：TypePattern("*Service")
    TypePattern(String),

    /// 匹配方法名
    MethodPattern(String),

    /// 例如：execution(* UserService.get_user(..))
    Execution {
        type_pattern: String,
        method_pattern: String,
    },

    TypeRegex(Regex),

    MethodRegex(Regex),

    /// 类上的条件，例如某个注解
    ClassMatches(ClassPredicate),

    /// 自定义方法匹配函数
    Custom(MethodPredicate),

    And(Box<PointcutExpression>, Box<PointcutExpression>),

    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    /// 完整匹配：类和方法
    pub fn matches(&self, method: &MethodMetadata, class: &ClassMetadata) -> bool {
        match self {
            PointcutExpression::All => true,
            PointcutExpression::TypePattern(pattern) => Self::type_matches(pattern, class),
            PointcutExpression::MethodPattern(pattern) => simple_match(pattern, &method.name),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => Self::type_matches(type_pattern, class) && simple_match(method_pattern, &method.name),
            PointcutExpression::TypeRegex(regex) => regex.is_match(&class.name),
            PointcutExpression::MethodRegex(regex) => regex.is_match(&method.name),
            PointcutExpression::ClassMatches(predicate) => predicate(class),
            PointcutExpression::Custom(predicate) => predicate(method, class),
            PointcutExpression::And(left, right) => left.matches(method, class) && right.matches(method, class),
            PointcutExpression::Or(left, right) => left.matches(method, class) || right.matches(method, class),
            PointcutExpression::Not(expr) => !expr.matches(method, class),
        }
    }

    /// 类级别的预判；`false` 表示该类的任何方法都不可能匹配
    pub fn could_match_class(&self, class: &ClassMetadata) -> bool {
        match self {
            PointcutExpression::TypePattern(pattern) => Self::type_matches(pattern, class),
            PointcutExpression::Execution { type_pattern, .. } => Self::type_matches(type_pattern, class),
            PointcutExpression::TypeRegex(regex) => regex.is_match(&class.name),
            PointcutExpression::ClassMatches(predicate) => predicate(class),
            PointcutExpression::And(left, right) => left.could_match_class(class) && right.could_match_class(class),
            PointcutExpression::Or(left, right) => left.could_match_class(class) || right.could_match_class(class),
            _ => true,
        }
    }

    fn type_matches(pattern: &str, class: &ClassMetadata) -> bool {
        simple_match(pattern, &class.name) || simple_match(pattern, class.simple_name())
    }

    /// 创建 execution 表达式
    ///
    /// 格式：`返回类型 类型名.方法名(参数)`，只使用类型名和方法名
    pub fn execution(expression: &str) -> Self {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        let Some(method_part) = parts.get(1) else {
            return PointcutExpression::All;
        };
        let method_part = method_part.split('(').next().unwrap_or(method_part);

        match method_part.rsplit_once('.') {
            Some((type_pattern, method_pattern)) => PointcutExpression::Execution {
                type_pattern: type_pattern.to_string(),
                method_pattern: method_pattern.to_string(),
            },
            None => PointcutExpression::MethodPattern(method_part.to_string()),
        }
    }

    pub fn class_matches(predicate: impl Fn(&ClassMetadata) -> bool + Send + Sync + 'static) -> Self {
        PointcutExpression::ClassMatches(Arc::new(predicate))
    }

    pub fn custom(predicate: impl Fn(&MethodMetadata, &ClassMetadata) -> bool + Send + Sync + 'static) -> Self {
        PointcutExpression::Custom(Arc::new(predicate))
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    pub fn negate(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }
}

impl Pointcut for PointcutExpression {
    fn matches_class(&self, class: &ClassMetadata) -> bool {
        self.could_match_class(class)
    }

    fn matches_method(&self, method: &MethodMetadata, class: &ClassMetadata) -> bool {
        self.matches(method, class)
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointcutExpression::All => write!(f, "All"),
            PointcutExpression::TypePattern(p) => write!(f, "TypePattern({})", p),
            PointcutExpression::MethodPattern(p) => write!(f, "MethodPattern({})", p),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => write!(f, "Execution({}.{})", type_pattern, method_pattern),
            PointcutExpression::TypeRegex(r) => write!(f, "TypeRegex({})", r.as_str()),
            PointcutExpression::MethodRegex(r) => write!(f, "MethodRegex({})", r.as_str()),
            PointcutExpression::ClassMatches(_) => write!(f, "ClassMatches(...)"),
            PointcutExpression::Custom(_) => write!(f, "Custom(...)"),
            PointcutExpression::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            PointcutExpression::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::metadata::Annotation;

    fn class() -> ClassMetadata {
        ClassMetadata::new("app::service::UserService").with_annotation(Annotation::Component(None))
    }

    #[test]
    fn test_execution_expression() {
        let expr = PointcutExpression::execution("* UserService.get_*(..)");
        assert!(expr.matches(&MethodMetadata::new("get_user"), &class()));
        assert!(!expr.matches(&MethodMetadata::new("save_user"), &class()));
        assert!(!expr.could_match_class(&ClassMetadata::new("app::OrderService")));

        let qualified = PointcutExpression::execution("* app::service::UserService.save(..)");
        assert!(qualified.matches(&MethodMetadata::new("save"), &class()));
    }

    #[test]
    fn test_combinators() {
        let expr = PointcutExpression::TypePattern("*Service".into())
            .and(PointcutExpression::MethodPattern("find*".into()).negate());
        assert!(expr.matches(&MethodMetadata::new("save"), &class()));
        assert!(!expr.matches(&MethodMetadata::new("find_all"), &class()));

        let components = PointcutExpression::class_matches(|c| c.annotations.iter().any(|a| a.is_component_marker()));
        assert!(components.could_match_class(&class()));
        assert!(!components.could_match_class(&ClassMetadata::new("app::Plain")));

        let method_only = PointcutExpression::MethodRegex(Regex::new("^load").unwrap());
        assert!(method_only.could_match_class(&ClassMetadata::new("app::Plain")));
        assert!(method_only.matches(&MethodMetadata::new("load_all"), &class()));
    }
}
