// 传输请求定义

use crate::error::SyncError;
use crate::sync::chunk::MIN_CHUNK_SIZE;
use clap::ValueEnum;
use std::fmt;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

/// 同步模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncMode {
    /// 总是传输，按大小选择单次/分片上传
    Auto,
    /// 内容指纹一致时跳过
    Sync,
    /// 总是传输，且强制单次上传
    #[value(alias = "simple-upload")]
    SinglePartUpload,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Auto => "auto",
            SyncMode::Sync => "sync",
            SyncMode::SinglePartUpload => "single-part-upload",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 本地 -> 存储
    Upload,
    /// 存储 -> 本地
    Download,
}

/// 一次同步的全部参数，构造时校验，之后不可变
#[derive(Debug, Clone)]
pub struct TransferRequest {
    bucket: String,
    local_path: PathBuf,
    key: String,
    mode: SyncMode,
    chunk_size: NonZeroU64,
    multipart_threshold: u64,
}

impl TransferRequest {
    /// 创建传输请求
    ///
    /// # 参数
    /// * `bucket` - bucket 名称
    /// * `local_path` - 本地文件路径
    /// * `key` - 对象键，缺省时使用本地路径
    /// * `mode` - 同步模式
    /// * `chunk_size` - 分片大小（字节），不小于 5MB
    /// * `multipart_threshold` - 分片上传阈值（字节）
    pub fn new(
        bucket: impl Into<String>,
        local_path: impl Into<PathBuf>,
        key: Option<String>,
        mode: SyncMode,
        chunk_size: u64,
        multipart_threshold: u64,
    ) -> Result<Self, SyncError> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(SyncError::Config("bucket name must not be empty".to_string()));
        }

        if chunk_size < MIN_CHUNK_SIZE {
            return Err(SyncError::Config(format!(
                "chunk size {} bytes is below the minimum of {} bytes (5 MiB)",
                chunk_size, MIN_CHUNK_SIZE
            )));
        }
        let chunk_size = NonZeroU64::new(chunk_size)
            .ok_or_else(|| SyncError::Config("chunk size must not be zero".to_string()))?;

        let local_path = local_path.into();
        let key = match key {
            Some(key) if !key.is_empty() => key,
            _ => local_path.to_string_lossy().into_owned(),
        };

        Ok(Self {
            bucket,
            local_path,
            key,
            mode,
            chunk_size,
            multipart_threshold,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn chunk_size(&self) -> NonZeroU64 {
        self.chunk_size
    }

    pub fn multipart_threshold(&self) -> u64 {
        self.multipart_threshold
    }
}
