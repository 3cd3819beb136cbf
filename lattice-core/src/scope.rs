use std::fmt;

/// Bean 的作用域
///
/// 只有单例会被容器缓存，其余作用域只记录名称
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// 单例模式 - 容器中只有一个实例
    #[default]
    Singleton,
    /// 原型模式 - 每次获取都创建新实例
    Prototype,
    /// 自定义作用域（仅记录名称）
    Custom(String),
}

impl Scope {
    pub fn from_name(name: &str) -> Self {
        match name {
            "" | "singleton" => Scope::Singleton,
            "prototype" => Scope::Prototype,
            other => Scope::Custom(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Scope::Singleton => "singleton",
            Scope::Prototype => "prototype",
            Scope::Custom(name) => name,
        }
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, Scope::Singleton)
    }

    pub fn is_prototype(&self) -> bool {
        matches!(self, Scope::Prototype)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 作用域代理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopedProxyMode {
    /// 沿用上层配置（通常等于 No）
    #[default]
    Default,
    No,
    Interfaces,
    TargetClass,
}

impl ScopedProxyMode {
    /// Default 落到 No
    pub fn resolve(self, fallback: ScopedProxyMode) -> ScopedProxyMode {
        match self {
            ScopedProxyMode::Default => match fallback {
                ScopedProxyMode::Default => ScopedProxyMode::No,
                other => other,
            },
            other => other,
        }
    }
}
