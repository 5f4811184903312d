// 命令行入口
//
// 两个可执行文件共用同一组参数，只有传输方向不同。
// 退出码：0 成功或跳过；1 传输失败；2 配置错误（在任何远程请求之前）

use crate::config::{AppConfig, Credentials, DEFAULT_CONFIG_PATH};
use crate::error::SyncError;
use crate::logging;
use crate::store::{ObjectStore, S3Store};
use crate::sync::{preflight, Direction, SyncEngine, SyncMode, TransferOutcome, TransferRequest};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

const MB: u64 = 1024 * 1024;

/// 传输失败
pub const EXIT_TRANSFER_FAILED: u8 = 1;
/// 配置错误
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// 同步单个文件与 S3 对象
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// S3 bucket
    #[arg(short = 'b', long)]
    pub bucket: String,

    /// 本地文件路径
    #[arg(short = 'f', long = "file_path", alias = "file-path")]
    pub file_path: PathBuf,

    /// 对象键，缺省与 file_path 相同
    #[arg(short = 'k', long)]
    pub key: Option<String>,

    /// 同步模式
    #[arg(short = 'm', long, value_enum, default_value_t = SyncMode::Auto)]
    pub mode: SyncMode,

    /// 分片大小 (MB)，最小 5
    #[arg(long = "chunk_size", alias = "chunk-size")]
    pub chunk_size: Option<u64>,

    /// 分片上传阈值 (MB)
    #[arg(long = "multipart_threshold", alias = "multipart-threshold")]
    pub multipart_threshold: Option<u64>,

    /// 配置文件路径
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// 输出 debug 日志
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// 合并命令行参数与配置文件，构造传输请求
    pub fn to_request(&self, config: &AppConfig) -> Result<TransferRequest, SyncError> {
        let chunk_size = self
            .chunk_size
            .map(|mb| mb.saturating_mul(MB))
            .unwrap_or_else(|| config.transfer.chunk_size_bytes());
        let multipart_threshold = self
            .multipart_threshold
            .map(|mb| mb.saturating_mul(MB))
            .unwrap_or_else(|| config.transfer.multipart_threshold_bytes());

        TransferRequest::new(
            self.bucket.clone(),
            self.file_path.clone(),
            self.key.clone(),
            self.mode,
            chunk_size,
            multipart_threshold,
        )
    }
}

/// 解析命令行并执行一次同步
pub async fn run(direction: Direction) -> ExitCode {
    let args = Args::parse();
    let config = AppConfig::load_or_default(&args.config).await;
    let _log_guard = logging::init_logging(&config.log, args.verbose);

    let request = match args.to_request(&config) {
        Ok(request) => request,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    // 分片数超限等本地问题在连接存储之前报告
    if let Err(e) = preflight(direction, &request).await {
        error!("{}", e);
        return ExitCode::from(exit_code_for(&e));
    }

    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let store = match S3Store::connect(&config.store, &credentials, request.bucket()).await {
        Ok(store) => store,
        Err(e) => {
            error!("s3_connection=failed, bucket={}: {}", request.bucket(), e);
            return ExitCode::from(EXIT_TRANSFER_FAILED);
        }
    };

    let store: Arc<dyn ObjectStore> = Arc::new(store);
    let engine = SyncEngine::new(store);

    match engine.run(direction, &request).await {
        Ok(outcome) => {
            report(&outcome);
            ExitCode::SUCCESS
        }
        Err(e) => ExitCode::from(exit_code_for(&e)),
    }
}

fn exit_code_for(err: &SyncError) -> u8 {
    if err.is_config() {
        EXIT_CONFIG_ERROR
    } else {
        EXIT_TRANSFER_FAILED
    }
}

fn report(outcome: &TransferOutcome) {
    match outcome {
        TransferOutcome::Skipped => info!("outcome=skipped"),
        TransferOutcome::Uploaded {
            strategy,
            bytes,
            parts,
        } => info!(
            "outcome=uploaded, payload_mode={}, bytes={}, parts={}",
            strategy, bytes, parts
        ),
        TransferOutcome::Downloaded { bytes } => info!("outcome=downloaded, bytes={}", bytes),
    }
}
