// 内容指纹比较
//
// 判断一次同步是否可以跳过：
// 1. 计算本地文件完整内容的 MD5
// 2. 读取远程对象上传时写入的指纹元数据
// 3. 两者一致则无需传输
//
// 远程对象存在但没有指纹元数据（历史上传），视为不一致，强制重新传输。

use crate::error::SyncError;
use crate::store::ObjectStore;
use base64::Engine;
use hex::FromHex;
use md5::Context as Md5Context;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 文件内容指纹（MD5）
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// 从十六进制字符串解析（大小写不敏感，允许两侧引号）
    pub fn from_hex(value: &str) -> Option<Self> {
        let value = value.trim().trim_matches('"');
        <[u8; 16]>::from_hex(value.to_ascii_lowercase()).ok().map(Self)
    }

    /// 计算内存数据的指纹
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    /// 计算文件完整内容的指纹
    ///
    /// 文件 I/O 在阻塞线程池中执行
    pub async fn compute(path: &Path) -> Result<Self, SyncError> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::compute_sync(&owned))
            .await
            .unwrap_or_else(|e| Err(std::io::Error::new(std::io::ErrorKind::Other, e)))
            .map_err(|source| SyncError::LocalIo {
                path: path.to_path_buf(),
                source,
            })
    }

    fn compute_sync(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);
        let mut hasher = Md5Context::new();
        let mut buffer = [0u8; 65536];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.consume(&buffer[..bytes_read]);
        }

        let fingerprint = Self(hasher.compute().0);
        debug!("fingerprint computed: path={:?}, md5={}", path, fingerprint);
        Ok(fingerprint)
    }

    /// 十六进制表示
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// `Content-MD5` 头使用的 base64 表示
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// 指纹比较器
pub struct FingerprintComparator {
    store: Arc<dyn ObjectStore>,
}

impl FingerprintComparator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// 上传方向：远程对象是否需要更新
    ///
    /// # 返回
    /// - 远程对象不存在：true
    /// - 远程对象没有指纹元数据：true
    /// - 否则：本地指纹与远程指纹是否不同
    pub async fn needs_update(&self, local_path: &Path, key: &str) -> Result<bool, SyncError> {
        let remote = match self.store.head_object(key).await? {
            Some(remote) => remote,
            None => {
                info!("remote_object=absent, key={}", key);
                return Ok(true);
            }
        };

        let local = Fingerprint::compute(local_path).await?;
        info!("local_signature={}", local);

        match remote.fingerprint {
            Some(remote_fingerprint) => {
                info!("remote_signature={}", remote_fingerprint);
                Ok(local != remote_fingerprint)
            }
            None => {
                info!(
                    "remote_signature=absent, key={}, etag={}",
                    key,
                    remote.e_tag.as_deref().unwrap_or("-")
                );
                Ok(true)
            }
        }
    }

    /// 下载方向：本地文件是否需要拉取
    ///
    /// 本地文件不存在时直接返回 true，否则与上传方向比较方式相同
    pub async fn needs_fetch(&self, local_path: &Path, key: &str) -> Result<bool, SyncError> {
        let exists = tokio::fs::try_exists(local_path)
            .await
            .map_err(|source| SyncError::LocalIo {
                path: local_path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("local_file=absent, path={:?}", local_path);
            return Ok(true);
        }

        self.needs_update(local_path, key).await
    }
}
