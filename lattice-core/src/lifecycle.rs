//! 容器扩展点
//!
//! [`BeanPostProcessor`] 在单个 Bean 的创建过程中介入，
//! [`BeanFactoryPostProcessor`] 在定义全部注册后、实例化之前介入。

use std::any::Any;
use std::sync::Arc;

use crate::bean::{BeanDefinition, BeanObject};
use crate::bean_factory::DefaultListableBeanFactory;
use crate::error::ContainerResult;
use crate::metadata::ClassMetadata;
use crate::registry::BeanDefinitionRegistry;

/// BeanPostProcessor trait
///
/// 在 Bean 创建的不同阶段提供钩子，允许自定义修改 Bean 实例
///
/// 使用场景：
/// - 构造函数选择
/// - 字段和方法注入
/// - AOP 代理创建
pub trait BeanPostProcessor: Send + Sync {
    /// 获取处理器的名称（用于日志和调试）
    fn name(&self) -> &str {
        "BeanPostProcessor"
    }

    /// 获取处理器的优先级（数字越小优先级越高）
    ///
    /// 默认为 1000，可以通过重写此方法来调整优先级
    fn order(&self) -> i32 {
        1000
    }

    /// 处理器加入工厂时调用
    fn set_bean_factory(&self, _factory: &Arc<DefaultListableBeanFactory>) -> ContainerResult<()> {
        Ok(())
    }

    /// 返回候选构造函数在 `class.constructors` 中的下标
    ///
    /// `None` 表示没有意见，由工厂使用默认策略
    fn determine_candidate_constructors(
        &self,
        _class: &ClassMetadata,
        _bean_name: &str,
    ) -> ContainerResult<Option<Vec<usize>>> {
        Ok(None)
    }

    /// 实例化之后、初始化之前填充属性
    fn post_process_properties(
        &self,
        _bean: &mut (dyn Any + Send + Sync),
        _class: &ClassMetadata,
        _bean_name: &str,
    ) -> ContainerResult<()> {
        Ok(())
    }

    /// 在 Bean 初始化回调（init）之前调用
    ///
    /// 返回处理后的 Bean 实例（可以是原始 Bean，也可以是包装后的 Bean）
    fn post_process_before_initialization(&self, bean: BeanObject, _bean_name: &str) -> ContainerResult<BeanObject> {
        Ok(bean)
    }

    /// 在 Bean 初始化回调（init）之后调用
    ///
    /// # 典型用途
    /// - 创建 AOP 代理
    /// - 包装 Bean
    fn post_process_after_initialization(&self, bean: BeanObject, _bean_name: &str) -> ContainerResult<BeanObject> {
        Ok(bean)
    }

    /// 合并后的定义发生变化，清理按 Bean 名称缓存的状态
    fn reset_bean_definition(&self, _bean_name: &str) {}
}

/// BeanFactoryPostProcessor trait
///
/// 在所有定义加载完成、任何 Bean 实例化之前修改注册表
pub trait BeanFactoryPostProcessor: Send + Sync {
    fn name(&self) -> &str {
        "BeanFactoryPostProcessor"
    }

    fn order(&self) -> i32 {
        1000
    }

    /// 注册表阶段：可以注册新的定义
    fn post_process_bean_definition_registry(&self, _registry: &dyn BeanDefinitionRegistry) -> ContainerResult<()> {
        Ok(())
    }

    /// 工厂阶段：所有注册表阶段完成之后
    fn post_process_bean_factory(&self, _factory: &Arc<DefaultListableBeanFactory>) -> ContainerResult<()> {
        Ok(())
    }
}

/// 由基础设施定义创建 BeanPostProcessor 的函数
pub type PostProcessorFactory = fn(&BeanDefinition) -> ContainerResult<Arc<dyn BeanPostProcessor>>;

/// BeanPostProcessor 注册项 - 用于 inventory 收集
///
/// 定义的类名与 `class_name` 相同时，上下文在刷新时用 `create` 创建处理器
pub struct PostProcessorRegistration {
    pub class_name: &'static str,
    pub create: PostProcessorFactory,
}

inventory::collect!(PostProcessorRegistration);

/// 查找通过 inventory 提交的处理器工厂
pub fn find_post_processor_factory(class_name: &str) -> Option<PostProcessorFactory> {
    inventory::iter::<PostProcessorRegistration>
        .into_iter()
        .find(|r| r.class_name == class_name)
        .map(|r| r.create)
}
