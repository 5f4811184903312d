// 同步操作错误
//
// 分类：
// - Config: 配置错误（分片过小、缺少凭证等），启动阶段直接退出
// - LocalIo: 本地文件不可读/不可写
// - Store: 决策阶段、单次传输、发起/放弃会话时的存储错误，不重试
// - PartExhausted: 单个分片重试耗尽
// - IncompleteParts: 存储确认的分片与计划不一致
// - Completion: 完成分片上传失败

use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("local file {path:?}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("part {part_number} failed after {attempts} attempts: {source}")]
    PartExhausted {
        part_number: i32,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("store acknowledged {acknowledged} of {expected} parts")]
    IncompleteParts { expected: usize, acknowledged: usize },

    #[error("completing multipart upload failed: {0}")]
    Completion(#[source] StoreError),
}

impl SyncError {
    /// 是否为配置错误（进程以非零状态退出，且不会发出任何远程请求）
    pub fn is_config(&self) -> bool {
        matches!(self, SyncError::Config(_))
    }
}
