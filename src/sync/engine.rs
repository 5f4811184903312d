// 同步引擎（传输调度）
//
// 单次调用的状态流转，不循环：
//   START -> DECIDE_NEED -> (SKIP | DECIDE_STRATEGY) -> (SINGLE_PART | MULTI_PART) -> DONE
//
// - DECIDE_NEED 只在 sync 模式下执行；auto / single-part-upload 总是传输
// - DECIDE_STRATEGY 只在上传方向执行：超过阈值且模式不是 single-part-upload 时分片上传
// - 下载方向总是整体拉取，先写临时文件，成功后重命名到目标路径
// - SKIP 不发出任何修改存储的请求
// - 分片数超限属于配置错误，由 preflight 在连接存储之前检查

use crate::error::SyncError;
use crate::store::ObjectStore;
use crate::sync::chunk::{should_use_multipart, ChunkPlan};
use crate::sync::fingerprint::{Fingerprint, FingerprintComparator};
use crate::sync::multipart::MultipartOrchestrator;
use crate::sync::part::PartRetryPolicy;
use crate::sync::request::{Direction, SyncMode, TransferRequest};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 下载临时文件后缀
const DOWNLOAD_TEMP_SUFFIX: &str = ".s3sync.tmp";

/// 上传策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    SinglePart,
    MultiPart,
}

impl fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStrategy::SinglePart => f.write_str("single_part"),
            UploadStrategy::MultiPart => f.write_str("multi_part"),
        }
    }
}

/// 一次同步的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// 内容一致，未传输
    Skipped,
    /// 已上传
    Uploaded {
        strategy: UploadStrategy,
        bytes: u64,
        parts: usize,
    },
    /// 已下载
    Downloaded { bytes: u64 },
}

/// 选择上传策略
///
/// 空文件总是单次上传；超过阈值且未强制单次上传时分片上传
pub fn decide_strategy(file_size: u64, request: &TransferRequest) -> UploadStrategy {
    if file_size == 0 || request.mode() == SyncMode::SinglePartUpload {
        return UploadStrategy::SinglePart;
    }

    if should_use_multipart(file_size, request.multipart_threshold()) {
        UploadStrategy::MultiPart
    } else {
        UploadStrategy::SinglePart
    }
}

/// 检查上传所需分片数是否超过存储限制
///
/// 只有选择分片上传时才会检查
pub fn check_part_limit(file_size: u64, request: &TransferRequest) -> Result<(), SyncError> {
    match decide_strategy(file_size, request) {
        UploadStrategy::SinglePart => Ok(()),
        UploadStrategy::MultiPart => {
            ChunkPlan::new(file_size, request.chunk_size()).ensure_within_part_limit()
        }
    }
}

/// 连接存储之前的本地检查
///
/// 上传方向读取本地文件大小并检查分片数；下载方向无需检查
pub async fn preflight(direction: Direction, request: &TransferRequest) -> Result<(), SyncError> {
    match direction {
        Direction::Upload => {
            let file_size = local_file_size(request.local_path()).await?;
            check_part_limit(file_size, request)
        }
        Direction::Download => Ok(()),
    }
}

/// 同步引擎
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    comparator: FingerprintComparator,
    orchestrator: MultipartOrchestrator,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_retry_policy(store, PartRetryPolicy::default())
    }

    pub fn with_retry_policy(store: Arc<dyn ObjectStore>, policy: PartRetryPolicy) -> Self {
        Self {
            comparator: FingerprintComparator::new(store.clone()),
            orchestrator: MultipartOrchestrator::with_retry_policy(store.clone(), policy),
            store,
        }
    }

    /// 按方向执行一次同步，并记录最终结果
    pub async fn run(
        &self,
        direction: Direction,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, SyncError> {
        info!(
            "sync_mode={}, direction={:?}, bucket={}, key={}, file={:?}",
            request.mode(),
            direction,
            self.store.bucket(),
            request.key(),
            request.local_path()
        );

        let result = match direction {
            Direction::Upload => self.sync_to_store(request).await,
            Direction::Download => self.sync_from_store(request).await,
        };

        match (&result, direction) {
            (Ok(TransferOutcome::Skipped), _) => info!("Sync skipped, content unchanged"),
            (Ok(_), Direction::Upload) => info!("Upload completed successfully"),
            (Ok(_), Direction::Download) => info!("Download completed successfully"),
            (Err(e), Direction::Upload) => error!("Upload failed: {}", e),
            (Err(e), Direction::Download) => error!("Download failed: {}", e),
        }

        result
    }

    /// 上传方向
    pub async fn sync_to_store(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, SyncError> {
        let local_path = request.local_path();
        let file_size = local_file_size(local_path).await?;

        if request.mode() == SyncMode::Sync {
            let needed = self
                .comparator
                .needs_update(local_path, request.key())
                .await?;
            info!("upload_needed={}", needed);
            if !needed {
                return Ok(TransferOutcome::Skipped);
            }
        }

        let strategy = decide_strategy(file_size, request);
        info!("payload_mode={}, size={}", strategy, file_size);

        match strategy {
            UploadStrategy::SinglePart => {
                self.upload_single_part(local_path, request.key()).await?;
                Ok(TransferOutcome::Uploaded {
                    strategy,
                    bytes: file_size,
                    parts: 1,
                })
            }
            UploadStrategy::MultiPart => {
                let summary = self
                    .orchestrator
                    .upload(local_path, request.key(), request.chunk_size())
                    .await?;
                Ok(TransferOutcome::Uploaded {
                    strategy,
                    bytes: summary.total_size,
                    parts: summary.part_count,
                })
            }
        }
    }

    /// 下载方向
    pub async fn sync_from_store(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, SyncError> {
        let local_path = request.local_path();

        if request.mode() == SyncMode::Sync {
            let needed = self
                .comparator
                .needs_fetch(local_path, request.key())
                .await?;
            info!("download_needed={}", needed);
            if !needed {
                return Ok(TransferOutcome::Skipped);
            }
        }

        let bytes = self.download(local_path, request.key()).await?;
        Ok(TransferOutcome::Downloaded { bytes })
    }

    /// 单次上传：计算指纹并作为元数据写入
    async fn upload_single_part(&self, local_path: &Path, key: &str) -> Result<(), SyncError> {
        let fingerprint = Fingerprint::compute(local_path).await?;
        info!("local_signature={}", fingerprint);

        self.store.put_object(key, local_path, &fingerprint).await
    }

    /// 整体下载到临时文件，成功后替换目标文件
    async fn download(&self, local_path: &Path, key: &str) -> Result<u64, SyncError> {
        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SyncError::LocalIo {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let temp_path = download_temp_path(local_path);
        let bytes = match self.store.get_object(key, &temp_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_temp_file(&temp_path).await;
                return Err(e);
            }
        };

        if let Err(source) = tokio::fs::rename(&temp_path, local_path).await {
            remove_temp_file(&temp_path).await;
            return Err(SyncError::LocalIo {
                path: local_path.to_path_buf(),
                source,
            });
        }

        info!("downloaded: key={}, path={:?}, bytes={}", key, local_path, bytes);
        Ok(bytes)
    }
}

async fn local_file_size(path: &Path) -> Result<u64, SyncError> {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|source| SyncError::LocalIo {
            path: path.to_path_buf(),
            source,
        })
}

/// 删除下载临时文件，失败只记录日志
async fn remove_temp_file(temp_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("removing temp file {:?} failed: {}", temp_path, e);
        }
    }
}

fn download_temp_path(local_path: &Path) -> PathBuf {
    let mut name = local_path.as_os_str().to_owned();
    name.push(DOWNLOAD_TEMP_SUFFIX);
    PathBuf::from(name)
}
