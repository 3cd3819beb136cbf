/// 容器内部组件常量定义
///
/// 基础设施 Bean 的名称和类型名集中放在这里，配置类处理、自动代理和缓存
/// 模块都通过这些常量互相查找，避免各处硬编码

/// Environment 相关常量
pub const ENVIRONMENT_BEAN_NAME: &str = "environment";
pub const ENVIRONMENT_TYPE_NAME: &str = "lattice_core::config::Environment";

/// 配置类后处理器
pub const CONFIGURATION_CLASS_POST_PROCESSOR_BEAN_NAME: &str =
    "lattice.internalConfigurationClassPostProcessor";

/// 注解驱动的依赖注入处理器
pub const AUTOWIRED_ANNOTATION_PROCESSOR_BEAN_NAME: &str =
    "lattice.internalAutowiredAnnotationProcessor";
pub const AUTOWIRED_ANNOTATION_PROCESSOR_TYPE_NAME: &str =
    "lattice_core::injection::AutowiredAnnotationBeanPostProcessor";

/// 处理器映射注册表
pub const MAPPING_REGISTRY_BEAN_NAME: &str = "lattice.internalMappingRegistry";

/// 定义属性：Bean 是否为配置类（full / lite）
pub const CONFIGURATION_CLASS_ATTRIBUTE: &str = "configurationClass";
pub const CONFIGURATION_CLASS_FULL: &str = "full";
pub const CONFIGURATION_CLASS_LITE: &str = "lite";

/// 定义属性：工厂方法的返回类型，用于按类型匹配
pub const FACTORY_METHOD_RETURN_TYPE_ATTRIBUTE: &str = "factoryMethodReturnType";

/// 定义属性：处理器的排序值
pub const ORDER_ATTRIBUTE: &str = "order";

/// 所有基础设施 Bean 名称的前缀
pub const INTERNAL_BEAN_PREFIX: &str = "lattice.internal";

/// 检查给定的 Bean 名称是否为容器内部组件
///
/// # Example
/// ```
/// use lattice_core::constants::is_internal_bean_name;
///
/// assert!(is_internal_bean_name("lattice.internalAutoProxyCreator"));
/// assert!(!is_internal_bean_name("userService"));
/// ```
pub fn is_internal_bean_name(name: &str) -> bool {
    name.starts_with(INTERNAL_BEAN_PREFIX) || name == ENVIRONMENT_BEAN_NAME
}
