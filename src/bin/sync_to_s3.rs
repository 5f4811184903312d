// 上传：本地文件 -> S3 对象

use aws_s3sync::cli;
use aws_s3sync::sync::Direction;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    cli::run(Direction::Upload).await
}
