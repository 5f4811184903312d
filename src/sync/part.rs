// 分片上传（带重试）
//
// 重试策略：固定间隔，不做指数退避
// - 每个分片最多尝试 5 次
// - 每次失败后固定等待 30 秒，第 5 次失败后同样等待，再判定耗尽
// - 单个分片最坏停顿 5 x 30s = 2.5 分钟，之后整个上传判定失败
//
// 每次尝试前都重新定位并读取分片数据（见 ChunkReader），
// 上一次失败的读写即使推进了文件游标，也不会影响重试的数据。
//
// 重试耗尽时只返回错误，放弃会话由 MultipartOrchestrator 负责。

use crate::error::SyncError;
use crate::store::{AcknowledgedPart, ObjectStore};
use crate::sync::chunk::{ChunkPart, ChunkReader};
use crate::sync::multipart::MultipartSession;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 默认最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// 默认重试间隔
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// 分片重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 两次尝试之间的固定等待时间
    pub delay: Duration,
}

impl Default for PartRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// 单个分片的上传结果
#[derive(Debug, Clone)]
pub struct PartReceipt {
    pub part: AcknowledgedPart,
    /// 实际尝试次数
    pub attempts: u32,
}

/// 分片上传器
pub struct PartUploader {
    store: Arc<dyn ObjectStore>,
    policy: PartRetryPolicy,
}

impl PartUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_policy(store, PartRetryPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn ObjectStore>, policy: PartRetryPolicy) -> Self {
        Self { store, policy }
    }

    /// 上传一个分片
    ///
    /// # 参数
    /// * `reader` - 本地文件读取器
    /// * `session` - 分片上传会话
    /// * `part` - 待上传的分片
    ///
    /// # 返回
    /// 存储确认的分片；本地读取失败立即返回，存储失败重试耗尽后返回 `PartExhausted`
    pub async fn upload_part(
        &self,
        reader: &mut ChunkReader,
        session: &MultipartSession,
        part: &ChunkPart,
    ) -> Result<PartReceipt, SyncError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            let data = reader.read_part(part).await?;
            debug!(
                "upload part: key={}, part={}, attempt={}/{}, size={}",
                session.key(),
                part.part_number,
                attempt,
                max_attempts,
                data.len()
            );

            match self
                .store
                .upload_part(session.key(), session.upload_id(), part.part_number, data)
                .await
            {
                Ok(acknowledged) => {
                    if attempt > 1 {
                        info!(
                            "part={} succeeded after {} attempts",
                            part.part_number, attempt
                        );
                    }
                    return Ok(PartReceipt {
                        part: acknowledged,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!(
                        "part={} upload failed, retrying in {}s (attempt={}/{}, kind={:?}): {}",
                        part.part_number,
                        self.policy.delay.as_secs(),
                        attempt,
                        max_attempts,
                        e.kind,
                        e
                    );
                    tokio::time::sleep(self.policy.delay).await;

                    if attempt >= max_attempts {
                        warn!(
                            "part={} retries exhausted after {} attempts",
                            part.part_number, attempt
                        );
                        return Err(SyncError::PartExhausted {
                            part_number: part.part_number,
                            attempts: attempt,
                            source: e,
                        });
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::sync::chunk::ChunkPlan;
    use crate::sync::fingerprint::Fingerprint;
    use std::io::Write;
    use std::num::NonZeroU64;
    use tempfile::NamedTempFile;
    use tokio::time::Instant;

    const CONTENT: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

    async fn setup(store: &Arc<MemoryStore>) -> (NamedTempFile, ChunkPlan, MultipartSession) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CONTENT).unwrap();
        file.flush().unwrap();

        let fingerprint = Fingerprint::of_bytes(CONTENT);
        let upload_id = store
            .create_multipart_upload("key", &fingerprint)
            .await
            .unwrap();
        let session = MultipartSession::new("key", upload_id, fingerprint);
        let plan = ChunkPlan::new(CONTENT.len() as u64, NonZeroU64::new(10).unwrap());
        (file, plan, session)
    }

    #[test]
    fn test_default_policy() {
        let policy = PartRetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_fifth_attempt() {
        let store = Arc::new(MemoryStore::new("bucket"));
        let (file, plan, session) = setup(&store).await;
        store.fail_part(2, 4);

        let uploader = PartUploader::new(store.clone());
        let mut reader = ChunkReader::open(file.path()).await.unwrap();

        let started = Instant::now();
        let receipt = uploader
            .upload_part(&mut reader, &session, &plan.parts()[1])
            .await
            .unwrap();

        assert_eq!(receipt.attempts, 5);
        assert_eq!(receipt.part.part_number, 2);
        assert_eq!(store.part_attempts(2).len(), 5);
        // 4 次失败对应 4 次 30 秒等待
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(120), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(150), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_five_attempts() {
        let store = Arc::new(MemoryStore::new("bucket"));
        let (file, plan, session) = setup(&store).await;
        store.fail_part(1, 5);

        let uploader = PartUploader::new(store.clone());
        let mut reader = ChunkReader::open(file.path()).await.unwrap();

        let started = Instant::now();
        let result = uploader
            .upload_part(&mut reader, &session, &plan.parts()[0])
            .await;

        match result {
            Err(SyncError::PartExhausted {
                part_number,
                attempts,
                ..
            }) => {
                assert_eq!(part_number, 1);
                assert_eq!(attempts, 5);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(store.part_attempts(1).len(), 5);
        // 5 次失败对应 5 次等待，第 5 次失败后同样等待
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(150), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(180), "elapsed {:?}", elapsed);
        // 放弃会话不是分片上传器的职责
        assert_eq!(store.abort_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_rereads_same_range() {
        let store = Arc::new(MemoryStore::new("bucket"));
        let (file, plan, session) = setup(&store).await;
        store.fail_part(3, 2);

        let uploader = PartUploader::new(store.clone());
        let mut reader = ChunkReader::open(file.path()).await.unwrap();
        uploader
            .upload_part(&mut reader, &session, &plan.parts()[2])
            .await
            .unwrap();

        let attempts = store.part_attempts(3);
        assert_eq!(attempts.len(), 3);
        for data in attempts {
            assert_eq!(data, b"uvwxyz");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_policy_single_attempt() {
        let store = Arc::new(MemoryStore::new("bucket"));
        let (file, plan, session) = setup(&store).await;
        store.fail_part(1, 1);

        let uploader = PartUploader::with_policy(
            store.clone(),
            PartRetryPolicy {
                max_attempts: 1,
                delay: Duration::from_secs(30),
            },
        );
        let mut reader = ChunkReader::open(file.path()).await.unwrap();
        let result = uploader
            .upload_part(&mut reader, &session, &plan.parts()[0])
            .await;

        assert!(matches!(
            result,
            Err(SyncError::PartExhausted { attempts: 1, .. })
        ));
        assert_eq!(store.part_attempts(1).len(), 1);
    }
}
