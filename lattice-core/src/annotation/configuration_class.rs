//! 配置类模型

use std::fmt;
use std::sync::Arc;

use crate::annotation::imports::ImportBeanDefinitionRegistrar;
use crate::metadata::{ClassMetadata, MethodMetadata};

/// 配置类中的 bean 方法
#[derive(Debug, Clone)]
pub struct BeanMethod {
    pub method: MethodMetadata,
    /// 声明方法的类（可能是父类或接口）
    pub declaring_class: String,
}

impl BeanMethod {
    pub fn new(method: MethodMetadata, declaring_class: impl Into<String>) -> Self {
        Self {
            method,
            declaring_class: declaring_class.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.method.name
    }
}

/// 导入的外部定义资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedResource {
    pub location: String,
    /// 读取器类型，`None` 时按扩展名选择
    pub reader: Option<String>,
}

/// 配置类：一个声明式配置的来源，按类名判等
pub struct ConfigurationClass {
    class: Arc<ClassMetadata>,
    bean_name: Option<String>,
    /// 导入它的配置类（按导入顺序）
    imported_by: Vec<String>,
    bean_methods: Vec<BeanMethod>,
    imported_resources: Vec<ImportedResource>,
    registrars: Vec<Box<dyn ImportBeanDefinitionRegistrar>>,
    resource: String,
}

impl ConfigurationClass {
    /// 注册表中已有定义的配置类
    pub fn new(class: Arc<ClassMetadata>, bean_name: impl Into<String>) -> Self {
        let bean_name = bean_name.into();
        let resource = format!("bean definition '{}'", bean_name);
        Self {
            class,
            bean_name: Some(bean_name),
            imported_by: Vec::new(),
            bean_methods: Vec::new(),
            imported_resources: Vec::new(),
            registrars: Vec::new(),
            resource,
        }
    }

    /// 被另一个配置类导入（或作为嵌套类发现）的配置类
    pub fn imported(class: Arc<ClassMetadata>, imported_by: &str) -> Self {
        Self {
            class,
            bean_name: None,
            imported_by: vec![imported_by.to_string()],
            bean_methods: Vec::new(),
            imported_resources: Vec::new(),
            registrars: Vec::new(),
            resource: format!("imported by [{}]", imported_by),
        }
    }

    pub fn class(&self) -> &Arc<ClassMetadata> {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.class.name
    }

    pub fn bean_name(&self) -> Option<&str> {
        self.bean_name.as_deref()
    }

    pub fn set_bean_name(&mut self, name: impl Into<String>) {
        self.bean_name = Some(name.into());
    }

    pub fn is_imported(&self) -> bool {
        !self.imported_by.is_empty()
    }

    pub fn imported_by(&self) -> &[String] {
        &self.imported_by
    }

    /// 同一个类再次被导入时合并导入来源
    pub fn merge_imported_by(&mut self, other: &ConfigurationClass) {
        for importer in &other.imported_by {
            if !self.imported_by.contains(importer) {
                self.imported_by.push(importer.clone());
            }
        }
    }

    pub fn add_bean_method(&mut self, method: BeanMethod) {
        self.bean_methods.push(method);
    }

    pub fn bean_methods(&self) -> &[BeanMethod] {
        &self.bean_methods
    }

    pub fn add_imported_resource(&mut self, location: impl Into<String>, reader: Option<String>) {
        self.imported_resources.push(ImportedResource {
            location: location.into(),
            reader,
        });
    }

    pub fn imported_resources(&self) -> &[ImportedResource] {
        &self.imported_resources
    }

    pub fn add_registrar(&mut self, registrar: Box<dyn ImportBeanDefinitionRegistrar>) {
        self.registrars.push(registrar);
    }

    pub fn registrars(&self) -> &[Box<dyn ImportBeanDefinitionRegistrar>] {
        &self.registrars
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl PartialEq for ConfigurationClass {
    fn eq(&self, other: &Self) -> bool {
        self.class.name == other.class.name
    }
}

impl Eq for ConfigurationClass {}

impl fmt::Debug for ConfigurationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationClass")
            .field("class", &self.class.name)
            .field("bean_name", &self.bean_name)
            .field("imported_by", &self.imported_by)
            .field("bean_methods", &self.bean_methods.len())
            .field("imported_resources", &self.imported_resources)
            .field("registrars", &self.registrars.len())
            .finish()
    }
}

impl fmt::Display for ConfigurationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigurationClass: beanName '{}', {}", self.bean_name.as_deref().unwrap_or(""), self.class.name)
    }
}
