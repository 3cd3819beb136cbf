//! 配置问题收集
//!
//! 配置类解析期间的问题先记录下来，解析结束后一次性报告。

use std::fmt;

use crate::error::{ContainerError, ContainerResult};

/// 问题的种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProblemKind {
    /// 循环导入
    CircularImport,
    /// 配置类本身不合法
    InvalidConfiguration,
}

/// 配置问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub kind: ProblemKind,
    pub message: String,
    /// 出问题的配置类
    pub class_name: String,
}

impl Problem {
    pub fn new(kind: ProblemKind, message: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            class_name: class_name.into(),
        }
    }

    /// `importing` 试图导入已在导入栈中的 `imported`
    pub fn circular_import(importing: &str, imported: &str, stack: &[String]) -> Self {
        Self::new(
            ProblemKind::CircularImport,
            format!(
                "A circular import has been detected: illegal attempt by configuration class '{}' to import class '{}' as '{}' is already present in the current import stack [{}]",
                importing,
                imported,
                imported,
                stack.join("->")
            ),
            importing,
        )
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (in [{}])", self.message, self.class_name)
    }
}

/// 问题收集器
#[derive(Debug, Default)]
pub struct ProblemReporter {
    problems: Vec<Problem>,
}

impl ProblemReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, problem: Problem) {
        tracing::error!("Configuration problem: {}", problem);
        self.problems.push(problem);
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn has_problems(&self) -> bool {
        !self.problems.is_empty()
    }

    /// 有问题时转换为 [`ContainerError::Configuration`]
    pub fn check(&self) -> ContainerResult<()> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::Configuration(self.problems.clone()))
        }
    }
}
