//! 日志系统配置
//!
//! 控制台输出总是开启；配置启用时同时写入 `log_dir` 下按启动时间命名的日志文件

use crate::config::LogConfig;
use chrono::Local;
use std::fs;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 时间戳格式
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 日志系统守卫
/// 必须保持存活，否则日志写入线程会终止
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 日志文件名：aws-s3sync.YYYY-MM-DD-HHMMSS.log
fn log_file_name(start_timestamp: &str) -> String {
    format!("aws-s3sync.{}.log", start_timestamp)
}

/// 构造过滤器：`--verbose` 强制 debug，否则优先 RUST_LOG，最后使用配置的级别
fn build_filter(config: &LogConfig, verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// 初始化日志系统
///
/// # 参数
/// * `config` - 日志配置
/// * `verbose` - 是否输出 debug 日志
///
/// # 返回
/// 日志守卫，需要保持存活直到程序结束
pub fn init_logging(config: &LogConfig, verbose: bool) -> LogGuard {
    let env_filter = build_filter(config, verbose);

    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_ansi(true);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return LogGuard { _file_guard: None };
    }

    if let Err(e) = fs::create_dir_all(&config.log_dir) {
        eprintln!("创建日志目录失败: {:?}, 错误: {}, 回退到仅控制台输出", config.log_dir, e);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return LogGuard { _file_guard: None };
    }

    let start_timestamp = Local::now().format("%Y-%m-%d-%H%M%S").to_string();
    let file_appender =
        tracing_appender::rolling::never(&config.log_dir, log_file_name(&start_timestamp));
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    // 文件输出层（不带 ANSI 颜色）
    let file_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "日志文件: {:?}",
        config.log_dir.join(log_file_name(&start_timestamp))
    );

    LogGuard {
        _file_guard: Some(file_guard),
    }
}
