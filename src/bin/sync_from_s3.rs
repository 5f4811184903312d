// 下载：S3 对象 -> 本地文件

use aws_s3sync::cli;
use aws_s3sync::sync::Direction;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    cli::run(Direction::Download).await
}
