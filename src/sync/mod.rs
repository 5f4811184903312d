// 同步核心模块

pub mod chunk;
pub mod engine;
pub mod fingerprint;
pub mod multipart;
pub mod part;
pub mod request;

pub use chunk::{should_use_multipart, ChunkPart, ChunkPlan, ChunkReader};
pub use engine::{
    check_part_limit, decide_strategy, preflight, SyncEngine, TransferOutcome, UploadStrategy,
};
pub use fingerprint::{Fingerprint, FingerprintComparator};
pub use multipart::{MultipartOrchestrator, MultipartSession, MultipartSummary};
pub use part::{PartReceipt, PartRetryPolicy, PartUploader};
pub use request::{Direction, SyncMode, TransferRequest};
