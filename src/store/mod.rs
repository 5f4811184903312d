// 对象存储抽象
//
// 同步引擎只依赖这里定义的 ObjectStore trait：
// - s3: 基于 aws-sdk-s3 的实现（生产环境）
// - memory: 内存实现，带调用记录与故障注入（仅测试）
//
// 内容指纹以用户元数据的形式写入对象，键名见 FINGERPRINT_METADATA_KEY。
// 存储自身的 ETag 在单片/分片上传下组成方式不同，不能作为内容标识。
//
// put_object / get_object 同时读写本地文件，返回 SyncError：
// 本地文件失败为 LocalIo，存储失败为 Store。

#[cfg(test)]
pub mod memory;
pub mod s3;

use crate::error::SyncError;
use crate::sync::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub use s3::S3Store;

/// 内容指纹元数据键（S3 上表现为 `x-amz-meta-s3sync-md5`）
pub const FINGERPRINT_METADATA_KEY: &str = "s3sync-md5";

/// 存储错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// 对象或上传会话不存在
    NotFound,
    /// 网络错误（连接失败、DNS 等）
    Network,
    /// 请求超时
    Timeout,
    /// 服务端返回错误
    Service,
    /// 未知错误
    Unknown,
}

/// 对象存储调用失败
#[derive(Debug, Clone, Error)]
#[error("{operation} failed ({kind:?}): {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub operation: &'static str,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            message: message.into(),
        }
    }
}

/// 远程对象的元信息（HEAD 结果）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// 对象大小
    pub size: u64,
    /// 存储的传输校验值，仅用于日志
    pub e_tag: Option<String>,
    /// 上传时写入的内容指纹；历史对象可能没有
    pub fingerprint: Option<Fingerprint>,
}

/// 存储确认的分片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcknowledgedPart {
    /// 分片编号（从 1 开始）
    pub part_number: i32,
    /// 存储返回的分片 ETag，完成上传时需要回传
    pub e_tag: String,
}

/// 同步引擎使用的对象存储操作
///
/// 每个实例绑定一个 bucket，key 均为 bucket 内的对象键。
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// bucket 名称
    fn bucket(&self) -> &str;

    /// 查询对象元信息，对象不存在时返回 `Ok(None)`
    async fn head_object(&self, key: &str) -> Result<Option<RemoteObject>, StoreError>;

    /// 单次请求上传整个文件，并写入内容指纹元数据
    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        fingerprint: &Fingerprint,
    ) -> Result<(), SyncError>;

    /// 发起分片上传会话，返回 upload id
    async fn create_multipart_upload(
        &self,
        key: &str,
        fingerprint: &Fingerprint,
    ) -> Result<String, StoreError>;

    /// 上传一个分片
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<AcknowledgedPart, StoreError>;

    /// 列出会话中存储已确认的分片编号（升序）
    async fn list_parts(&self, key: &str, upload_id: &str) -> Result<Vec<i32>, StoreError>;

    /// 完成分片上传，存储按分片编号顺序拼接
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<AcknowledgedPart>,
    ) -> Result<(), StoreError>;

    /// 放弃分片上传，释放已上传分片占用的空间
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StoreError>;

    /// 下载整个对象到本地路径，返回写入字节数
    async fn get_object(&self, key: &str, destination: &Path) -> Result<u64, SyncError>;
}
