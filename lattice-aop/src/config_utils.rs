//! 自动代理创建器的注册
//!
//! 容器里最多只有一个自动代理创建器，注册在 [`AUTO_PROXY_CREATOR_BEAN_NAME`] 下。
//! 多个子系统都请求注册时，按能力等级原地升级，等级只升不降。

use lattice_core::bean::{BeanDefinition, BeanOrigin, Role};
use lattice_core::registry::BeanDefinitionRegistry;

use crate::error::{AopError, AopResult};

/// 自动代理创建器的内部 Bean 名称
pub const AUTO_PROXY_CREATOR_BEAN_NAME: &str = "lattice.internalAutoProxyCreator";

/// 定义属性：强制类代理
pub const PROXY_TARGET_CLASS_ATTRIBUTE: &str = "proxyTargetClass";

/// 定义属性：暴露当前代理
pub const EXPOSE_PROXY_ATTRIBUTE: &str = "exposeProxy";

/// 定义属性：公共拦截器的 Bean 名称，逗号分隔
pub const INTERCEPTOR_NAMES_ATTRIBUTE: &str = "interceptorNames";

/// 定义属性：按名称代理的模式，逗号分隔
pub const BEAN_NAMES_ATTRIBUTE: &str = "beanNames";

pub const INFRASTRUCTURE_CREATOR_TYPE: &str = "lattice_aop::InfrastructureAdvisorAutoProxyCreator";
pub const ADVISOR_CREATOR_TYPE: &str = "lattice_aop::AdvisorAutoProxyCreator";
pub const ASPECT_AWARE_CREATOR_TYPE: &str = "lattice_aop::AspectAwareAdvisorAutoProxyCreator";
pub const BEAN_NAME_CREATOR_TYPE: &str = "lattice_aop::BeanNameAutoProxyCreator";

/// 基于 Advisor 的自动代理创建器种类，按能力从低到高
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CreatorKind {
    /// 只应用基础设施角色的 Advisor
    Infrastructure,
    /// 应用所有 Advisor
    Advisor,
    /// 应用所有 Advisor 和切面
    AspectAware,
}

impl CreatorKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            CreatorKind::Infrastructure => INFRASTRUCTURE_CREATOR_TYPE,
            CreatorKind::Advisor => ADVISOR_CREATOR_TYPE,
            CreatorKind::AspectAware => ASPECT_AWARE_CREATOR_TYPE,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            CreatorKind::Infrastructure => 0,
            CreatorKind::Advisor => 1,
            CreatorKind::AspectAware => 2,
        }
    }

    pub fn from_type_name(type_name: &str) -> Option<Self> {
        [CreatorKind::Infrastructure, CreatorKind::Advisor, CreatorKind::AspectAware]
            .into_iter()
            .find(|kind| kind.type_name() == type_name)
    }
}

/// 注册自动代理创建器，已存在时按等级决定是否升级
///
/// 返回生效的创建器种类
pub fn register_auto_proxy_creator_if_necessary(
    registry: &dyn BeanDefinitionRegistry,
    kind: CreatorKind,
) -> AopResult<CreatorKind> {
    if registry.contains_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME) {
        let existing = registry.get_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME)?;
        let existing_class = existing.bean_class_name.clone().unwrap_or_default();
        let current =
            CreatorKind::from_type_name(&existing_class).ok_or_else(|| AopError::UnknownCreator(existing_class))?;

        if kind.rank() <= current.rank() {
            return Ok(current);
        }

        tracing::debug!(
            "Escalating auto-proxy creator from {:?} to {:?}",
            current,
            kind
        );
        update_definition(registry, |definition| {
            definition.bean_class_name = Some(kind.type_name().to_string());
        })?;
        return Ok(kind);
    }

    let definition = BeanDefinition::for_class(kind.type_name())
        .with_role(Role::Infrastructure)
        .with_origin(BeanOrigin::Infrastructure)
        .with_autowire_candidate(false);
    registry.register_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME, definition)?;
    tracing::debug!("Registered auto-proxy creator {:?}", kind);
    Ok(kind)
}

/// 让已注册的自动代理创建器使用类代理
pub fn force_auto_proxy_creator_to_use_class_proxying(registry: &dyn BeanDefinitionRegistry) -> AopResult<()> {
    if registry.contains_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME) {
        update_definition(registry, |definition| {
            definition
                .attributes
                .insert(PROXY_TARGET_CLASS_ATTRIBUTE.to_string(), "true".to_string());
        })?;
    }
    Ok(())
}

/// 让已注册的自动代理创建器暴露当前代理
pub fn force_auto_proxy_creator_to_expose_proxy(registry: &dyn BeanDefinitionRegistry) -> AopResult<()> {
    if registry.contains_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME) {
        update_definition(registry, |definition| {
            definition
                .attributes
                .insert(EXPOSE_PROXY_ATTRIBUTE.to_string(), "true".to_string());
        })?;
    }
    Ok(())
}

fn update_definition(
    registry: &dyn BeanDefinitionRegistry,
    update: impl FnOnce(&mut BeanDefinition),
) -> AopResult<()> {
    let mut definition = registry.remove_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME)?;
    update(&mut definition);
    registry.register_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME, definition)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::registry::SimpleBeanDefinitionRegistry;

    fn creator_class(registry: &SimpleBeanDefinitionRegistry) -> String {
        registry
            .get_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME)
            .unwrap()
            .bean_class_name
            .unwrap()
    }

    #[test]
    fn test_escalation_only_moves_up() {
        let registry = SimpleBeanDefinitionRegistry::new();

        assert_eq!(
            register_auto_proxy_creator_if_necessary(&registry, CreatorKind::Infrastructure).unwrap(),
            CreatorKind::Infrastructure
        );
        force_auto_proxy_creator_to_use_class_proxying(&registry).unwrap();

        assert_eq!(
            register_auto_proxy_creator_if_necessary(&registry, CreatorKind::AspectAware).unwrap(),
            CreatorKind::AspectAware
        );
        assert_eq!(
            register_auto_proxy_creator_if_necessary(&registry, CreatorKind::Advisor).unwrap(),
            CreatorKind::AspectAware
        );

        assert_eq!(creator_class(&registry), ASPECT_AWARE_CREATOR_TYPE);
        assert_eq!(registry.bean_definition_names(), vec![AUTO_PROXY_CREATOR_BEAN_NAME.to_string()]);

        let definition = registry.get_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME).unwrap();
        assert_eq!(definition.role, Role::Infrastructure);
        assert!(!definition.autowire_candidate);
        assert_eq!(
            definition.attributes.get(PROXY_TARGET_CLASS_ATTRIBUTE).map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn test_unknown_registered_creator_is_an_error() {
        let registry = SimpleBeanDefinitionRegistry::new();
        registry
            .register_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME, BeanDefinition::for_class("app::MyCreator"))
            .unwrap();
        assert!(matches!(
            register_auto_proxy_creator_if_necessary(&registry, CreatorKind::Advisor),
            Err(AopError::UnknownCreator(name)) if name == "app::MyCreator"
        ));
    }

    #[test]
    fn test_force_flags_without_creator_is_a_no_op() {
        let registry = SimpleBeanDefinitionRegistry::new();
        force_auto_proxy_creator_to_expose_proxy(&registry).unwrap();
        assert!(!registry.contains_bean_definition(AUTO_PROXY_CREATOR_BEAN_NAME));
    }
}
