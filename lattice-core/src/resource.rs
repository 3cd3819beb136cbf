//! 资源加载
//!
//! 属性源和外部 Bean 定义文件都通过 [`ResourceLoader`] 读取，位置字符串支持
//! `classpath:` 与 `file:` 前缀。

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{PropertySource, TomlPropertySource};
use crate::error::{ContainerError, ContainerResult};

pub const CLASSPATH_URL_PREFIX: &str = "classpath:";
pub const FILE_URL_PREFIX: &str = "file:";

/// 资源加载器
pub trait ResourceLoader: Send + Sync {
    /// 读取资源的全部文本
    fn load(&self, location: &str) -> ContainerResult<String>;

    fn exists(&self, location: &str) -> bool;
}

/// 去掉位置前缀后的路径
pub fn strip_location_prefix(location: &str) -> &str {
    location
        .strip_prefix(CLASSPATH_URL_PREFIX)
        .or_else(|| location.strip_prefix(FILE_URL_PREFIX))
        .unwrap_or(location)
        .trim_start_matches('/')
}

/// 文件系统资源加载器
///
/// `classpath:` 和无前缀的位置相对于基础目录，`file:` 位置按原样解析
#[derive(Debug, Clone)]
pub struct FileSystemResourceLoader {
    base_dir: PathBuf,
}

impl Default for FileSystemResourceLoader {
    fn default() -> Self {
        Self::new(".")
    }
}

impl FileSystemResourceLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn resolve_path(&self, location: &str) -> PathBuf {
        match location.strip_prefix(FILE_URL_PREFIX) {
            Some(path) => PathBuf::from(path),
            None => self.base_dir.join(strip_location_prefix(location)),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl ResourceLoader for FileSystemResourceLoader {
    fn load(&self, location: &str) -> ContainerResult<String> {
        let path = self.resolve_path(location);
        tracing::debug!("Loading resource '{}' from {:?}", location, path);
        fs::read_to_string(&path).map_err(|e| ContainerError::ResourceLoading {
            location: location.to_string(),
            message: e.to_string(),
        })
    }

    fn exists(&self, location: &str) -> bool {
        self.resolve_path(location).is_file()
    }
}

/// 内存资源加载器（用于测试或嵌入式配置）
#[derive(Debug, Default)]
pub struct StaticResourceLoader {
    resources: RwLock<HashMap<String, String>>,
}

impl StaticResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(self, location: &str, content: impl Into<String>) -> Self {
        self.add_resource(location, content);
        self
    }

    pub fn add_resource(&self, location: &str, content: impl Into<String>) {
        self.resources
            .write()
            .insert(strip_location_prefix(location).to_string(), content.into());
    }
}

impl ResourceLoader for StaticResourceLoader {
    fn load(&self, location: &str) -> ContainerResult<String> {
        self.resources
            .read()
            .get(strip_location_prefix(location))
            .cloned()
            .ok_or_else(|| ContainerError::ResourceLoading {
                location: location.to_string(),
                message: "resource not found".to_string(),
            })
    }

    fn exists(&self, location: &str) -> bool {
        self.resources.read().contains_key(strip_location_prefix(location))
    }
}

/// 把一个位置加载为 TOML 属性源
pub fn load_property_source(
    loader: &dyn ResourceLoader,
    location: &str,
    name: Option<&str>,
) -> ContainerResult<Arc<dyn PropertySource>> {
    let content = loader.load(location)?;
    let name = name.map(str::to_string).unwrap_or_else(|| location.to_string());
    Ok(Arc::new(TomlPropertySource::from_toml_str(&content, name)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_loader_ignores_prefixes() {
        let loader = StaticResourceLoader::new().with_resource("classpath:app.toml", "name = \"demo\"");
        assert!(loader.exists("app.toml"));
        assert!(loader.exists("classpath:/app.toml"));
        assert!(loader.load("missing.toml").is_err());

        let source = load_property_source(&loader, "classpath:app.toml", Some("app")).unwrap();
        assert_eq!(source.name(), "app");
        assert_eq!(source.get("name").unwrap().as_str(), Some("demo"));
    }

    #[test]
    fn test_file_system_loader_paths() {
        let loader = FileSystemResourceLoader::new("/etc/lattice");
        assert_eq!(loader.resolve_path("classpath:app.toml"), PathBuf::from("/etc/lattice/app.toml"));
        assert_eq!(loader.resolve_path("file:/tmp/app.toml"), PathBuf::from("/tmp/app.toml"));
        assert!(loader.load("classpath:definitely-missing.toml").is_err());
    }
}
