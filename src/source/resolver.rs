use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::DocumentSource;
use crate::config::ViewerConfig;

/// 外部传入的文档引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceReference {
    /// 外部提供的内容（比如别的应用分享过来的文件）
    Content(PathBuf),
    /// 随程序打包的资源名
    Asset(String),
}

/// 把外部引用变成稳定的本地字节来源；失败时返回 None
pub trait SourceResolver {
    fn resolve(&self, reference: &SourceReference) -> Option<DocumentSource>;
}

/// 把文档复制到缓存目录后再交给会话
#[derive(Debug, Clone)]
pub struct CacheDirResolver {
    cache_dir: PathBuf,
    asset_dir: PathBuf,
}

impl CacheDirResolver {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(cache_dir: P, asset_dir: Q) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            asset_dir: asset_dir.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new(&config.cache_dir, &config.asset_dir)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn materialize_content(&self, path: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir)?;
        let target = self.cache_dir.join(content_file_name(path));
        fs::copy(path, &target)?;
        info!("[Resolver] Copied {:?} -> {:?}", path, target);
        Ok(target)
    }

    fn materialize_asset(&self, name: &str) -> io::Result<PathBuf> {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty asset name"))?;
        let target = self.cache_dir.join(file_name);
        if target.is_file() {
            debug!("[Resolver] Asset already cached: {:?}", target);
            return Ok(target);
        }

        fs::create_dir_all(&self.cache_dir)?;
        let asset = self.asset_dir.join(file_name);
        fs::copy(&asset, &target)?;
        info!("[Resolver] Copied asset {:?} -> {:?}", asset, target);
        Ok(target)
    }
}

impl SourceResolver for CacheDirResolver {
    fn resolve(&self, reference: &SourceReference) -> Option<DocumentSource> {
        let result = match reference {
            SourceReference::Content(path) => self.materialize_content(path),
            SourceReference::Asset(name) => self.materialize_asset(name),
        };

        match result {
            Ok(path) => Some(DocumentSource::File(path)),
            Err(e) => {
                warn!("[Resolver] Failed to resolve {:?}: {}", reference, e);
                None
            }
        }
    }
}

// 生成简单hash用于缓存文件名，同一个来源总是落到同一个文件
fn content_file_name(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("shared-{:016x}.pdf", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_content_into_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let incoming = dir.path().join("incoming.pdf");
        fs::write(&incoming, b"shared bytes").unwrap();

        let resolver = CacheDirResolver::new(dir.path().join("cache"), dir.path().join("assets"));
        let source = resolver
            .resolve(&SourceReference::Content(incoming.clone()))
            .unwrap();

        let DocumentSource::File(path) = &source else {
            panic!("expected a file source");
        };
        assert!(path.starts_with(resolver.cache_dir()));
        assert_ne!(path, &incoming);
        assert_eq!(&*source.read_bytes().unwrap(), b"shared bytes");
    }

    #[test]
    fn asset_is_copied_once() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("sample.pdf"), b"v1").unwrap();

        let resolver = CacheDirResolver::new(dir.path().join("cache"), &assets);
        let reference = SourceReference::Asset("sample.pdf".to_string());
        let first = resolver.resolve(&reference).unwrap();
        assert_eq!(&*first.read_bytes().unwrap(), b"v1");

        // 缓存里已有副本时不再覆盖
        fs::write(assets.join("sample.pdf"), b"v2").unwrap();
        let second = resolver.resolve(&reference).unwrap();
        assert_eq!(first, second);
        assert_eq!(&*second.read_bytes().unwrap(), b"v1");
    }

    #[test]
    fn missing_inputs_resolve_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CacheDirResolver::new(dir.path().join("cache"), dir.path().join("assets"));

        assert!(resolver
            .resolve(&SourceReference::Asset("missing.pdf".to_string()))
            .is_none());
        assert!(resolver
            .resolve(&SourceReference::Content(dir.path().join("gone.pdf")))
            .is_none());
        assert!(resolver
            .resolve(&SourceReference::Asset(String::new()))
            .is_none());
    }
}
