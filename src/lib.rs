// AWS S3 single-file sync library
// 单文件与 S3 对象同步：指纹比较跳过、单次/分片上传、分片重试

// 命令行入口
pub mod cli;

// 配置管理模块
pub mod config;

// 错误类型
pub mod error;

// 日志系统
pub mod logging;

// 对象存储抽象与 S3 实现
pub mod store;

// 同步核心
pub mod sync;

// 导出常用类型
pub use config::{AppConfig, Credentials};
pub use error::SyncError;
pub use store::{ObjectStore, S3Store, StoreError, StoreErrorKind};
pub use sync::{
    Direction, Fingerprint, SyncEngine, SyncMode, TransferOutcome, TransferRequest,
    UploadStrategy,
};
