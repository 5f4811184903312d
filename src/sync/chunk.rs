// 分片规划
//
// 规则：
// - 文件大小 > 阈值：分片上传；等于阈值仍走单次上传
// - 分片数 = ceil(文件大小 / 分片大小)，最后一片取余数
// - 空文件不做分片（没有意义的零长度分片上传），走单次上传
//
// S3 分片上传限制：除最后一片外每片至少 5MB，最多 10000 片

use crate::error::SyncError;
use std::num::NonZeroU64;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

const MB: u64 = 1024 * 1024;

/// 最小分片大小: 5MB
pub const MIN_CHUNK_SIZE: u64 = 5 * MB;

/// 默认分片大小: 5MB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * MB;

/// 默认分片上传阈值: 10MB
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 10 * MB;

/// 单次分片上传允许的最大分片数
pub const MAX_PART_COUNT: usize = 10_000;

/// 是否使用分片上传（严格大于阈值）
pub fn should_use_multipart(file_size: u64, threshold: u64) -> bool {
    file_size > threshold
}

/// 一个分片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPart {
    /// 分片编号（从 1 开始）
    pub part_number: i32,
    /// 字节范围
    pub range: Range<u64>,
}

impl ChunkPart {
    /// 分片起始偏移
    pub fn offset(&self) -> u64 {
        self.range.start
    }

    /// 分片大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }
}

/// 分片计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    parts: Vec<ChunkPart>,
}

impl ChunkPlan {
    /// 计算分片计划
    ///
    /// # 参数
    /// * `total_size` - 文件总大小
    /// * `chunk_size` - 分片大小
    pub fn new(total_size: u64, chunk_size: NonZeroU64) -> Self {
        let chunk_size = chunk_size.get();
        let mut parts = Vec::with_capacity(total_size.div_ceil(chunk_size) as usize);
        let mut offset = 0u64;
        let mut part_number = 1i32;

        while offset < total_size {
            let end = std::cmp::min(offset.saturating_add(chunk_size), total_size);
            parts.push(ChunkPart {
                part_number,
                range: offset..end,
            });
            offset = end;
            part_number += 1;
        }

        Self {
            total_size,
            chunk_size,
            parts,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn parts(&self) -> &[ChunkPart] {
        &self.parts
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// 检查分片数是否在存储限制内
    pub fn ensure_within_part_limit(&self) -> Result<(), SyncError> {
        if self.part_count() > MAX_PART_COUNT {
            return Err(SyncError::Config(format!(
                "file of {} bytes needs {} parts at chunk size {} bytes, limit is {}",
                self.total_size,
                self.part_count(),
                self.chunk_size,
                MAX_PART_COUNT
            )));
        }
        Ok(())
    }
}

/// 按分片读取本地文件
///
/// 整个上传过程持有同一个只读句柄，每次读取前都显式定位到分片起点，
/// 失败重试时读到的一定是同一段字节。
pub struct ChunkReader {
    path: PathBuf,
    file: File,
}

impl ChunkReader {
    pub async fn open(path: &Path) -> Result<Self, SyncError> {
        let file = File::open(path).await.map_err(|source| SyncError::LocalIo {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// 读取分片数据
    pub async fn read_part(&mut self, part: &ChunkPart) -> Result<Vec<u8>, SyncError> {
        let mut buffer = vec![0u8; part.size() as usize];
        let result = async {
            self.file
                .seek(std::io::SeekFrom::Start(part.offset()))
                .await?;
            self.file.read_exact(&mut buffer).await
        }
        .await;

        result.map_err(|source| SyncError::LocalIo {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            "read part #{}: bytes={}-{}, size={}",
            part.part_number,
            part.range.start,
            part.range.end.saturating_sub(1),
            buffer.len()
        );

        Ok(buffer)
    }
}
