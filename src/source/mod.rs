pub mod resolver;

pub use resolver::{CacheDirResolver, SourceReference, SourceResolver};

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 不可变的 PDF 字节来源，用户换文档时整体替换
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// 已经落地到本地的文件
    File(PathBuf),
    /// 内存中的字节
    Memory { name: String, bytes: Arc<[u8]> },
}

impl DocumentSource {
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        DocumentSource::File(path.as_ref().to_path_buf())
    }

    pub fn memory(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        DocumentSource::Memory {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// 读出全部字节；文件句柄在返回前关闭
    pub fn read_bytes(&self) -> io::Result<Arc<[u8]>> {
        match self {
            DocumentSource::File(path) => Ok(Arc::from(fs::read(path)?)),
            DocumentSource::Memory { bytes, .. } => Ok(Arc::clone(bytes)),
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            DocumentSource::File(path) => path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            DocumentSource::Memory { name, .. } => name.clone(),
        }
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::File(path) => f.debug_tuple("File").field(path).finish(),
            DocumentSource::Memory { name, bytes } => f
                .debug_struct("Memory")
                .field("name", name)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}
