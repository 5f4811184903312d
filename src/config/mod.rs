// 配置管理模块

pub mod credentials;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

pub use credentials::Credentials;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/s3sync.toml";

const MB: u64 = 1024 * 1024;

/// 应用配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 传输配置
    #[serde(default)]
    pub transfer: TransferConfig,
    /// 对象存储配置
    #[serde(default)]
    pub store: StoreConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 传输配置
///
/// 命令行参数优先于这里的值
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// 分片大小 (MB)，最小 5
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,
    /// 分片上传阈值 (MB)，文件大小严格超过时分片上传
    #[serde(default = "default_multipart_threshold_mb")]
    pub multipart_threshold_mb: u64,
}

fn default_chunk_size_mb() -> u64 {
    5
}

fn default_multipart_threshold_mb() -> u64 {
    10
}

impl TransferConfig {
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb.saturating_mul(MB)
    }

    pub fn multipart_threshold_bytes(&self) -> u64 {
        self.multipart_threshold_mb.saturating_mul(MB)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_mb: default_chunk_size_mb(),
            multipart_threshold_mb: default_multipart_threshold_mb(),
        }
    }
}

/// 对象存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// 区域
    #[serde(default = "default_region")]
    pub region: String,
    /// 自定义端点（S3 兼容存储）
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// 使用路径风格访问（多数 S3 兼容存储需要）
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 是否同时写入日志文件
    #[serde(default)]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        Ok(config)
    }

    /// 加载配置，文件不存在或无法解析时使用默认配置
    ///
    /// 不会回写默认配置文件
    pub async fn load_or_default(path: &Path) -> Self {
        match fs::try_exists(path).await {
            Ok(true) => {}
            _ => {
                tracing::debug!("配置文件不存在，使用默认配置: {:?}", path);
                return Self::default();
            }
        }

        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::debug!("配置文件加载成功: {:?}", path);
                config
            }
            Err(e) => {
                // 此时日志系统尚未初始化
                eprintln!("配置文件加载失败，使用默认配置: {:#}", e);
                Self::default()
            }
        }
    }
}
