//! 配置类候选判断
//!
//! full：标注了 `Configuration`；lite：组件、扫描 / 导入指令，或者声明了 bean 方法。

use crate::bean::BeanDefinition;
use crate::constants::{CONFIGURATION_CLASS_ATTRIBUTE, CONFIGURATION_CLASS_FULL, CONFIGURATION_CLASS_LITE, ORDER_ATTRIBUTE};
use crate::metadata::{find_merged, has_merged, Annotation, ClassMetadata, MetadataReader};

/// 配置类的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationKind {
    Full,
    Lite,
}

impl ConfigurationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigurationKind::Full => CONFIGURATION_CLASS_FULL,
            ConfigurationKind::Lite => CONFIGURATION_CLASS_LITE,
        }
    }
}

/// 判断类属于哪种配置类
pub fn configuration_kind(reader: &dyn MetadataReader, class: &ClassMetadata) -> Option<ConfigurationKind> {
    if class.is_interface() || class.is_annotation() {
        return None;
    }
    if has_merged(reader, &class.annotations, &|a| matches!(a, Annotation::Configuration)) {
        return Some(ConfigurationKind::Full);
    }
    if is_lite_configuration_candidate(reader, class) {
        return Some(ConfigurationKind::Lite);
    }
    None
}

fn is_lite_configuration_candidate(reader: &dyn MetadataReader, class: &ClassMetadata) -> bool {
    let indicator = has_merged(reader, &class.annotations, &|a| {
        matches!(
            a,
            Annotation::Component(_) | Annotation::ComponentScan(_) | Annotation::Import(_) | Annotation::ImportResource { .. }
        )
    });
    indicator || class.has_bean_methods()
}

/// 类能否作为配置类处理（被导入、被扫描或嵌套）
pub fn is_configuration_candidate(reader: &dyn MetadataReader, class: &ClassMetadata) -> bool {
    configuration_kind(reader, class).is_some()
}

/// 检查定义是否为配置类候选，是则在定义上记录种类和排序值
pub fn check_configuration_class_candidate(reader: &dyn MetadataReader, definition: &mut BeanDefinition) -> bool {
    if definition.is_factory_method() || definition.instance_supplier.is_some() {
        return false;
    }
    let Some(class) = definition
        .bean_class_name
        .as_deref()
        .and_then(|name| reader.class_metadata(name))
    else {
        return false;
    };

    let Some(kind) = configuration_kind(reader, &class) else {
        return false;
    };
    definition
        .attributes
        .insert(CONFIGURATION_CLASS_ATTRIBUTE.to_string(), kind.as_str().to_string());

    if let Some(order) = find_merged(reader, &class.annotations, &|a| match a {
        Annotation::Order(order) => Some(*order),
        _ => None,
    }) {
        definition
            .attributes
            .insert(ORDER_ATTRIBUTE.to_string(), order.to_string());
    }
    true
}

pub fn is_full_configuration(definition: &BeanDefinition) -> bool {
    definition.attributes.get(CONFIGURATION_CLASS_ATTRIBUTE).map(String::as_str) == Some(CONFIGURATION_CLASS_FULL)
}

/// 定义上记录的排序值
pub fn order_of(definition: &BeanDefinition) -> Option<i32> {
    definition
        .attributes
        .get(ORDER_ATTRIBUTE)
        .and_then(|v| v.parse().ok())
}
