use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{ContainerError, ContainerResult};

/// 配置值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    /// 转换为字符串
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 标量值转换为字符串形式
    pub fn to_plain_string(&self) -> Option<String> {
        match self {
            ConfigValue::String(s) => Some(s.clone()),
            ConfigValue::Int(i) => Some(i.to_string()),
            ConfigValue::Float(f) => Some(f.to_string()),
            ConfigValue::Bool(b) => Some(b.to_string()),
            ConfigValue::Array(values) => Some(
                values
                    .iter()
                    .filter_map(ConfigValue::to_plain_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            ConfigValue::Object(_) => None,
        }
    }

    /// 转换为整数
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 转换为浮点数
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 转换为布尔值
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Some(true),
                "false" | "no" | "0" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 转换为 TOML 值，字符串形式的布尔和数字会被还原
    fn to_toml(&self) -> toml::Value {
        match self {
            ConfigValue::String(s) => {
                if let Ok(b) = s.parse::<bool>() {
                    toml::Value::Boolean(b)
                } else if let Ok(i) = s.parse::<i64>() {
                    toml::Value::Integer(i)
                } else {
                    toml::Value::String(s.clone())
                }
            }
            ConfigValue::Int(i) => toml::Value::Integer(*i),
            ConfigValue::Float(f) => toml::Value::Float(*f),
            ConfigValue::Bool(b) => toml::Value::Boolean(*b),
            ConfigValue::Array(values) => toml::Value::Array(values.iter().map(Self::to_toml).collect()),
            ConfigValue::Object(map) => toml::Value::Table(
                map.iter().map(|(k, v)| (k.clone(), v.to_toml())).collect(),
            ),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_plain_string() {
            Some(s) => f.write_str(&s),
            None => write!(f, "{:?}", self),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    /// 获取配置源名称
    fn name(&self) -> &str;

    /// 获取配置值
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 获取所有配置键
    fn keys(&self) -> Vec<String>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// 有序的配置源列表，排在前面的优先
#[derive(Default, Clone)]
pub struct MutablePropertySources {
    sources: Vec<Arc<dyn PropertySource>>,
}

impl MutablePropertySources {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以最高优先级加入，同名的旧配置源被移除
    pub fn add_first(&mut self, source: Arc<dyn PropertySource>) {
        self.remove(source.name());
        self.sources.insert(0, source);
    }

    /// 以最低优先级加入，同名的旧配置源被移除
    pub fn add_last(&mut self, source: Arc<dyn PropertySource>) {
        self.remove(source.name());
        self.sources.push(source);
    }

    /// 加在 `relative` 之前（优先级高于它）
    pub fn add_before(&mut self, relative: &str, source: Arc<dyn PropertySource>) -> ContainerResult<()> {
        if relative == source.name() {
            return Err(ContainerError::IllegalState(format!(
                "PropertySource named '{}' cannot be added relative to itself",
                relative
            )));
        }
        self.remove(source.name());
        let index = self.index_of(relative).ok_or_else(|| {
            ContainerError::IllegalState(format!("PropertySource named '{}' does not exist", relative))
        })?;
        self.sources.insert(index, source);
        Ok(())
    }

    /// 加在 `relative` 之后（优先级低于它）
    pub fn add_after(&mut self, relative: &str, source: Arc<dyn PropertySource>) -> ContainerResult<()> {
        if relative == source.name() {
            return Err(ContainerError::IllegalState(format!(
                "PropertySource named '{}' cannot be added relative to itself",
                relative
            )));
        }
        self.remove(source.name());
        let index = self.index_of(relative).ok_or_else(|| {
            ContainerError::IllegalState(format!("PropertySource named '{}' does not exist", relative))
        })?;
        self.sources.insert(index + 1, source);
        Ok(())
    }

    /// 原位替换同名配置源
    pub fn replace(&mut self, name: &str, source: Arc<dyn PropertySource>) -> ContainerResult<()> {
        let index = self.index_of(name).ok_or_else(|| {
            ContainerError::IllegalState(format!("PropertySource named '{}' does not exist", name))
        })?;
        self.sources[index] = source;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn PropertySource>> {
        self.index_of(name).map(|index| self.sources.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PropertySource>> {
        self.index_of(name).map(|index| Arc::clone(&self.sources[index]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PropertySource>> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.name() == name)
    }
}

impl fmt::Debug for MutablePropertySources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// 属性解析器
///
/// 配置类解析只依赖这个接口；只有 [`Environment`] 这类可配置的实现才接受新的配置源
pub trait PropertyResolver: Send + Sync {
    fn get_property(&self, key: &str) -> Option<String>;

    fn contains_property(&self, key: &str) -> bool {
        self.get_property(key).is_some()
    }

    /// 解析 `${...}` 占位符，无法解析的保持原样
    fn resolve_placeholders(&self, text: &str) -> String;

    /// 解析 `${...}` 占位符，无法解析且没有默认值时报错
    fn resolve_required_placeholders(&self, text: &str) -> ContainerResult<String>;

    /// 给定的 profile 表达式是否被接受，支持 `!name` 取反
    fn accepts_profiles(&self, profiles: &[String]) -> bool;

    /// 可配置的环境
    fn as_configurable(&self) -> Option<&Environment> {
        None
    }
}

const PLACEHOLDER_PREFIX: &str = "${";
const PLACEHOLDER_SUFFIX: &str = "}";
const VALUE_SEPARATOR: char = ':';

/// 激活 profile 的配置键
pub const ACTIVE_PROFILES_PROPERTY: &str = "lattice.profiles.active";

/// Environment - 配置管理器
///
/// 统一的配置访问入口：有序配置源、profile 和占位符解析
pub struct Environment {
    /// 配置源列表（排在前面的优先）
    sources: RwLock<MutablePropertySources>,

    /// 当前激活的 profile
    active_profiles: RwLock<Vec<String>>,

    /// 没有激活 profile 时使用的 profile
    default_profiles: RwLock<Vec<String>>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("active_profiles", &self.active_profiles.read())
            .field("sources", &*self.sources.read())
            .finish()
    }
}

impl Environment {
    /// 创建新的环境
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(MutablePropertySources::new()),
            active_profiles: RwLock::new(Vec::new()),
            default_profiles: RwLock::new(vec!["default".to_string()]),
        }
    }

    /// 以最低优先级添加配置源
    pub fn add_property_source(&self, source: Arc<dyn PropertySource>) {
        self.sources.write().add_last(source);
    }

    /// 修改配置源列表
    pub fn with_property_sources<R>(&self, f: impl FnOnce(&mut MutablePropertySources) -> R) -> R {
        f(&mut self.sources.write())
    }

    pub fn property_source_names(&self) -> Vec<String> {
        self.sources.read().names()
    }

    /// 获取配置值
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        for source in sources.iter() {
            if let Some(value) = source.get(key) {
                tracing::trace!("Config '{}' found in source '{}'", key, source.name());
                return Some(value);
            }
        }
        tracing::trace!("Config '{}' not found in any source", key);
        None
    }

    /// 所有配置源中的键（去重）
    pub fn property_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for source in self.sources.read().iter() {
            for key in source.keys() {
                if seen.insert(key.clone()) {
                    names.push(key);
                }
            }
        }
        names.sort();
        names
    }

    /// 获取字符串配置
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get_property(key)
    }

    /// 获取字符串配置（带默认值）
    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// 获取整数配置
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// 获取整数配置（带默认值）
    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_i64(key).unwrap_or(default)
    }

    /// 获取浮点数配置
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    /// 获取布尔值配置
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// 获取布尔值配置（带默认值）
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// 获取字符串数组配置
    /// 支持两种格式:
    /// 1. TOML数组: key = ["a", "b", "c"]
    /// 2. 逗号分隔字符串: key = "a, b, c"
    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            ConfigValue::Array(arr) => Some(arr.iter().filter_map(ConfigValue::to_plain_string).collect()),
            ConfigValue::String(s) => Some(
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// 设置激活的 profile
    pub fn set_active_profiles(&self, profiles: Vec<String>) {
        *self.active_profiles.write() = profiles;
    }

    pub fn add_active_profile(&self, profile: impl Into<String>) {
        let profile = profile.into();
        let mut active = self.active_profiles.write();
        if !active.contains(&profile) {
            active.push(profile);
        }
    }

    /// 获取激活的 profile，未显式设置时读取 `lattice.profiles.active`
    pub fn get_active_profiles(&self) -> Vec<String> {
        let active = self.active_profiles.read().clone();
        if !active.is_empty() {
            return active;
        }
        self.get_string_array(ACTIVE_PROFILES_PROPERTY).unwrap_or_default()
    }

    pub fn set_default_profiles(&self, profiles: Vec<String>) {
        *self.default_profiles.write() = profiles;
    }

    pub fn get_default_profiles(&self) -> Vec<String> {
        self.default_profiles.read().clone()
    }

    fn is_profile_active(&self, profile: &str) -> bool {
        let active = self.get_active_profiles();
        if active.is_empty() {
            self.default_profiles.read().iter().any(|p| p == profile)
        } else {
            active.iter().any(|p| p == profile)
        }
    }

    fn resolve(&self, text: &str, ignore_unresolvable: bool) -> ContainerResult<String> {
        let lookup = |key: &str| self.get(key).and_then(|v| v.to_plain_string());
        let mut visited = HashSet::new();
        parse_placeholders(text, &lookup, ignore_unresolvable, &mut visited)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyResolver for Environment {
    fn get_property(&self, key: &str) -> Option<String> {
        let raw = self.get(key)?.to_plain_string()?;
        Some(self.resolve_placeholders(&raw))
    }

    fn resolve_placeholders(&self, text: &str) -> String {
        self.resolve(text, true).unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            text.to_string()
        })
    }

    fn resolve_required_placeholders(&self, text: &str) -> ContainerResult<String> {
        self.resolve(text, false)
    }

    fn accepts_profiles(&self, profiles: &[String]) -> bool {
        profiles.iter().any(|profile| match profile.strip_prefix('!') {
            Some(negated) => !self.is_profile_active(negated.trim()),
            None => self.is_profile_active(profile.trim()),
        })
    }

    fn as_configurable(&self) -> Option<&Environment> {
        Some(self)
    }
}

/// 找到与 `${` 配对的 `}`，支持嵌套
fn find_placeholder_end(text: &str, start: usize) -> Option<usize> {
    let mut index = start + PLACEHOLDER_PREFIX.len();
    let mut depth = 0;
    while index < text.len() {
        let rest = &text[index..];
        if rest.starts_with(PLACEHOLDER_PREFIX) {
            depth += 1;
            index += PLACEHOLDER_PREFIX.len();
        } else if rest.starts_with(PLACEHOLDER_SUFFIX) {
            if depth == 0 {
                return Some(index);
            }
            depth -= 1;
            index += PLACEHOLDER_SUFFIX.len();
        } else {
            index += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    None
}

fn parse_placeholders(
    text: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
    ignore_unresolvable: bool,
    visited: &mut HashSet<String>,
) -> ContainerResult<String> {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(PLACEHOLDER_PREFIX) {
        let Some(end) = find_placeholder_end(rest, start) else {
            break;
        };
        result.push_str(&rest[..start]);
        let original = &rest[start + PLACEHOLDER_PREFIX.len()..end];

        if !visited.insert(original.to_string()) {
            return Err(ContainerError::PlaceholderResolution {
                placeholder: original.to_string(),
                value: format!("circular placeholder reference in \"{}\"", text),
            });
        }

        // 占位符本身可能嵌套
        let placeholder = parse_placeholders(original, lookup, ignore_unresolvable, visited)?;
        let (key, default) = match placeholder.split_once(VALUE_SEPARATOR) {
            Some((key, default)) => (key.to_string(), Some(default.to_string())),
            None => (placeholder.clone(), None),
        };

        let value = lookup(&placeholder).or_else(|| {
            if default.is_some() {
                lookup(&key).or(default)
            } else {
                None
            }
        });

        match value {
            Some(value) => {
                let resolved = parse_placeholders(&value, lookup, ignore_unresolvable, visited)?;
                result.push_str(&resolved);
            }
            None if ignore_unresolvable => {
                result.push_str(&rest[start..end + PLACEHOLDER_SUFFIX.len()]);
            }
            None => {
                return Err(ContainerError::PlaceholderResolution {
                    placeholder: placeholder.clone(),
                    value: text.to_string(),
                });
            }
        }

        visited.remove(original);
        rest = &rest[end + PLACEHOLDER_SUFFIX.len()..];
    }

    result.push_str(rest);
    Ok(result)
}

// ========== Property Sources ==========

/// 环境变量配置源
pub struct EnvironmentPropertySource {
    prefix: String,
}

impl EnvironmentPropertySource {
    /// 创建环境变量配置源
    ///
    /// # 参数
    /// * `prefix` - 环境变量前缀，例如 "APP_"
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// 将环境变量名转换为配置键
    /// 例如: APP_DATABASE_URL -> database.url
    fn env_to_key(&self, env_key: &str) -> String {
        let stripped = env_key.strip_prefix(&self.prefix).unwrap_or(env_key);
        stripped.to_lowercase().replace('_', ".")
    }

    /// 将配置键转换为环境变量名
    /// 例如: database.url -> APP_DATABASE_URL
    fn key_to_env(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.replace(['.', '-'], "_").to_uppercase())
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "systemEnvironment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key)).ok().map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, _)| self.env_to_key(&k))
            .collect()
    }
}

/// TOML 文件配置源
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
}

impl TomlPropertySource {
    /// 从文件加载 TOML 配置
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ContainerError::ResourceLoading {
            location: path.display().to_string(),
            message: e.to_string(),
        })?;

        Self::from_toml_str(&content, path.to_string_lossy().to_string())
    }

    /// 从字符串解析 TOML 配置
    pub fn from_toml_str(content: &str, name: impl Into<String>) -> ContainerResult<Self> {
        let name = name.into();
        let value: toml::Value = toml::from_str(content).map_err(|e| ContainerError::ResourceLoading {
            location: name.clone(),
            message: format!("Failed to parse TOML: {}", e),
        })?;

        let mut properties = HashMap::new();
        Self::flatten_toml(&value, String::new(), &mut properties);

        Ok(Self { name, properties })
    }

    /// 展平 TOML 结构
    /// 例如: { database: { url: "xxx" } } -> { "database.url": "xxx" }
    fn flatten_toml(value: &toml::Value, prefix: String, result: &mut HashMap<String, ConfigValue>) {
        match value {
            toml::Value::Table(table) => {
                for (key, val) in table {
                    let new_prefix = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten_toml(val, new_prefix, result);
                }
            }
            other => {
                result.insert(prefix, Self::toml_value_to_config(other));
            }
        }
    }

    /// 转换 TOML 值为 ConfigValue
    fn toml_value_to_config(value: &toml::Value) -> ConfigValue {
        match value {
            toml::Value::String(s) => ConfigValue::String(s.clone()),
            toml::Value::Integer(i) => ConfigValue::Int(*i),
            toml::Value::Float(f) => ConfigValue::Float(*f),
            toml::Value::Boolean(b) => ConfigValue::Bool(*b),
            toml::Value::Array(arr) => ConfigValue::Array(arr.iter().map(Self::toml_value_to_config).collect()),
            toml::Value::Table(table) => ConfigValue::Object(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::toml_value_to_config(v)))
                    .collect(),
            ),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }
}

/// 内存配置源（用于测试或运行时配置）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }
}

/// 组合配置源：多个配置源以一个名称出现，靠前的成员优先
pub struct CompositePropertySource {
    name: String,
    sources: Vec<Arc<dyn PropertySource>>,
}

impl CompositePropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
        }
    }

    pub fn add_property_source(&mut self, source: Arc<dyn PropertySource>) {
        self.sources.push(source);
    }

    pub fn add_first_property_source(&mut self, source: Arc<dyn PropertySource>) {
        self.sources.insert(0, source);
    }

    pub fn member_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }
}

impl PropertySource for CompositePropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.sources.iter().find_map(|s| s.get(key))
    }

    fn keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.sources
            .iter()
            .flat_map(|s| s.keys())
            .filter(|k| seen.insert(k.clone()))
            .collect()
    }
}

/// 容器级设置，读取 `lattice.*` 配置键
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ContainerSettings {
    /// 是否允许同名 Bean 定义覆盖
    pub allow_bean_definition_overriding: bool,
    /// 自动代理默认使用类代理
    pub proxy_target_class: bool,
    /// 自动代理默认暴露当前代理
    pub expose_proxy: bool,
    /// 所有单例延迟初始化
    pub lazy_initialization: bool,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            allow_bean_definition_overriding: true,
            proxy_target_class: false,
            expose_proxy: false,
            lazy_initialization: false,
        }
    }
}

impl ContainerSettings {
    pub const PREFIX: &'static str = "lattice";

    pub fn from_environment(env: &Environment) -> ContainerResult<Self> {
        let prefix = format!("{}.", Self::PREFIX);
        let mut table = toml::map::Map::new();
        for key in env.property_names() {
            let Some(field) = key.strip_prefix(&prefix) else {
                continue;
            };
            if field.contains('.') {
                continue;
            }
            if let Some(value) = env.get(&key) {
                table.insert(field.replace('_', "-"), value.to_toml());
            }
        }

        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ContainerError::IllegalState(format!("Invalid container settings: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(props: &[(&str, &str)]) -> Environment {
        let env = Environment::new();
        let mut source = MapPropertySource::new("test");
        for (k, v) in props {
            source = source.with_property(*k, *v);
        }
        env.add_property_source(Arc::new(source));
        env
    }

    #[test]
    fn test_placeholder_with_default_and_nesting() {
        let env = env_with(&[("app.name", "lattice"), ("app.greeting", "hello ${app.name}"), ("which", "name")]);

        assert_eq!(env.resolve_placeholders("${app.greeting}!"), "hello lattice!");
        assert_eq!(env.resolve_placeholders("${app.port:8080}"), "8080");
        assert_eq!(env.resolve_placeholders("${app.${which}}"), "lattice");
        assert_eq!(env.resolve_placeholders("${missing}"), "${missing}");
        assert!(env.resolve_required_placeholders("${missing}").is_err());
    }

    #[test]
    fn test_circular_placeholder_is_an_error() {
        let env = env_with(&[("a", "${b}"), ("b", "${a}")]);
        assert!(matches!(
            env.resolve_required_placeholders("${a}"),
            Err(ContainerError::PlaceholderResolution { .. })
        ));
    }

    #[test]
    fn test_source_ordering() {
        let env = Environment::new();
        env.add_property_source(Arc::new(MapPropertySource::new("first").with_property("key", "first")));
        env.add_property_source(Arc::new(MapPropertySource::new("second").with_property("key", "second")));
        assert_eq!(env.get_string("key").as_deref(), Some("first"));

        env.with_property_sources(|sources| {
            sources.add_first(Arc::new(MapPropertySource::new("override").with_property("key", "override")))
        });
        assert_eq!(env.get_string("key").as_deref(), Some("override"));

        env.with_property_sources(|sources| {
            sources
                .add_before("second", Arc::new(MapPropertySource::new("between")))
                .unwrap();
            sources
                .replace("first", Arc::new(MapPropertySource::new("first").with_property("key", "replaced")))
                .unwrap();
            sources.remove("override");
        });
        assert_eq!(env.property_source_names(), vec!["first", "between", "second"]);
        assert_eq!(env.get_string("key").as_deref(), Some("replaced"));
    }

    #[test]
    fn test_profiles() {
        let env = Environment::new();
        assert!(env.accepts_profiles(&["default".to_string()]));

        env.set_active_profiles(vec!["dev".to_string()]);
        assert!(env.accepts_profiles(&["dev".to_string()]));
        assert!(!env.accepts_profiles(&["prod".to_string()]));
        assert!(env.accepts_profiles(&["!prod".to_string()]));
        assert!(!env.accepts_profiles(&["default".to_string()]));
    }

    #[test]
    fn test_toml_source_flattens_tables() {
        let source = TomlPropertySource::from_toml_str(
            "[database]\nurl = \"postgres://localhost\"\npool = 8\n",
            "app.toml",
        )
        .unwrap();
        assert_eq!(source.get("database.url").unwrap().as_str(), Some("postgres://localhost"));
        assert_eq!(source.get("database.pool").unwrap().as_i64(), Some(8));
    }

    #[test]
    fn test_composite_prefers_earlier_members() {
        let mut composite = CompositePropertySource::new("composite");
        composite.add_property_source(Arc::new(MapPropertySource::new("a").with_property("k", "a")));
        composite.add_first_property_source(Arc::new(MapPropertySource::new("b").with_property("k", "b")));
        assert_eq!(composite.get("k").unwrap().as_str(), Some("b"));
        assert_eq!(composite.member_names(), vec!["b", "a"]);
    }

    #[test]
    fn test_container_settings_from_environment() {
        let env = env_with(&[
            ("lattice.allow-bean-definition-overriding", "false"),
            ("lattice.proxy-target-class", "true"),
        ]);
        let settings = ContainerSettings::from_environment(&env).unwrap();
        assert!(!settings.allow_bean_definition_overriding);
        assert!(settings.proxy_target_class);
        assert!(!settings.expose_proxy);
    }
}
