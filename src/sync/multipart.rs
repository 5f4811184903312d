// 分片上传编排
//
// 流程（成功时每一步都会执行，顺序固定）：
// 1. 计算整个文件的内容指纹，发起分片上传会话并写入指纹元数据
// 2. 计算分片计划
// 3. 按分片编号顺序逐个上传（无并发），每个分片由 PartUploader 负责重试
// 4. 查询存储已确认的分片，全部到齐后完成会话
//
// 会话只有两种结局：全部分片确认后完成，或者放弃。
// 任何一个分片重试耗尽、确认列表不完整、完成请求失败，都会放弃会话（只放弃一次）。
// 进程在上传中途被杀死时会话会残留在存储上，这里不做处理。

use crate::error::SyncError;
use crate::store::{AcknowledgedPart, ObjectStore};
use crate::sync::chunk::{ChunkPlan, ChunkReader};
use crate::sync::fingerprint::Fingerprint;
use crate::sync::part::{PartRetryPolicy, PartUploader};
use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// 分片上传会话
///
/// 由 MultipartOrchestrator 独占，完成或放弃时被消费
#[derive(Debug)]
pub struct MultipartSession {
    key: String,
    upload_id: String,
    fingerprint: Fingerprint,
    completed: BTreeMap<i32, AcknowledgedPart>,
}

impl MultipartSession {
    pub fn new(key: impl Into<String>, upload_id: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            key: key.into(),
            upload_id: upload_id.into(),
            fingerprint,
            completed: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// 记录已确认的分片
    pub fn record(&mut self, part: AcknowledgedPart) {
        self.completed.insert(part.part_number, part);
    }

    /// 计划中的每个分片是否都已在本地记录并被存储确认
    pub fn covers(&self, plan: &ChunkPlan, acknowledged: &[i32]) -> bool {
        plan.parts().iter().all(|part| {
            self.completed.contains_key(&part.part_number)
                && acknowledged.contains(&part.part_number)
        })
    }

    /// 按分片编号排序的分片列表，用于完成会话
    fn into_parts(self) -> Vec<AcknowledgedPart> {
        self.completed.into_values().collect()
    }
}

/// 分片上传结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartSummary {
    pub fingerprint: Fingerprint,
    pub total_size: u64,
    pub part_count: usize,
    /// 所有分片的尝试次数之和
    pub total_attempts: u32,
}

/// 分片上传编排器
pub struct MultipartOrchestrator {
    store: Arc<dyn ObjectStore>,
    uploader: PartUploader,
}

impl MultipartOrchestrator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_retry_policy(store, PartRetryPolicy::default())
    }

    pub fn with_retry_policy(store: Arc<dyn ObjectStore>, policy: PartRetryPolicy) -> Self {
        let uploader = PartUploader::with_policy(store.clone(), policy);
        Self { store, uploader }
    }

    /// 执行分片上传
    ///
    /// # 参数
    /// * `local_path` - 本地文件路径
    /// * `key` - 对象键
    /// * `chunk_size` - 分片大小
    pub async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        chunk_size: NonZeroU64,
    ) -> Result<MultipartSummary, SyncError> {
        let fingerprint = Fingerprint::compute(local_path).await?;
        let total_size = tokio::fs::metadata(local_path)
            .await
            .map_err(|source| SyncError::LocalIo {
                path: local_path.to_path_buf(),
                source,
            })?
            .len();

        let plan = ChunkPlan::new(total_size, chunk_size);
        plan.ensure_within_part_limit()?;

        let upload_id = self
            .store
            .create_multipart_upload(key, &fingerprint)
            .await
            .map_err(|e| {
                error!("multipart initiation failed: key={}, error={}", key, e);
                SyncError::Store(e)
            })?;

        let mut session = MultipartSession::new(key, upload_id, fingerprint);

        info!(
            "multipart session started: key={}, upload_id={}, size={}, chunk_size={}, parts={}, fingerprint={}",
            session.key(),
            session.upload_id(),
            total_size,
            plan.chunk_size(),
            plan.part_count(),
            session.fingerprint()
        );

        let total_attempts = match self.upload_parts(local_path, &plan, &mut session).await {
            Ok(attempts) => attempts,
            Err(e) => {
                error!("multipart upload failed: key={}, error={}", key, e);
                self.abort(session).await;
                return Err(e);
            }
        };

        let acknowledged = match self
            .store
            .list_parts(session.key(), session.upload_id())
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                error!("listing acknowledged parts failed: key={}, error={}", key, e);
                self.abort(session).await;
                return Err(SyncError::Store(e));
            }
        };

        if !session.covers(&plan, &acknowledged) {
            let acknowledged_count = plan
                .parts()
                .iter()
                .filter(|p| acknowledged.contains(&p.part_number))
                .count();
            error!(
                "multipart upload incomplete: key={}, acknowledged={}/{}",
                key,
                acknowledged_count,
                plan.part_count()
            );
            self.abort(session).await;
            return Err(SyncError::IncompleteParts {
                expected: plan.part_count(),
                acknowledged: acknowledged_count,
            });
        }

        let key_owned = session.key().to_string();
        let upload_id = session.upload_id().to_string();
        let parts = session.into_parts();

        if let Err(e) = self
            .store
            .complete_multipart_upload(&key_owned, &upload_id, parts)
            .await
        {
            error!("multipart completion failed: key={}, error={}", key, e);
            self.abort_by_id(&key_owned, &upload_id).await;
            return Err(SyncError::Completion(e));
        }

        info!(
            "multipart session completed: key={}, parts={}",
            key,
            plan.part_count()
        );

        Ok(MultipartSummary {
            fingerprint,
            total_size,
            part_count: plan.part_count(),
            total_attempts,
        })
    }

    /// 按顺序上传所有分片，返回尝试次数之和
    async fn upload_parts(
        &self,
        local_path: &Path,
        plan: &ChunkPlan,
        session: &mut MultipartSession,
    ) -> Result<u32, SyncError> {
        let mut reader = ChunkReader::open(local_path).await?;
        let part_count = plan.part_count();
        let mut total_attempts = 0u32;

        for part in plan.parts() {
            info!("part={}/{}, size={}", part.part_number, part_count, part.size());
            let receipt = self.uploader.upload_part(&mut reader, session, part).await?;
            total_attempts += receipt.attempts;
            session.record(receipt.part);
        }

        Ok(total_attempts)
    }

    /// 放弃会话
    ///
    /// 放弃请求本身失败时不重试，只记录日志；调用方返回触发放弃的原始错误
    async fn abort(&self, session: MultipartSession) {
        self.abort_by_id(session.key(), session.upload_id()).await;
    }

    async fn abort_by_id(&self, key: &str, upload_id: &str) {
        match self.store.abort_multipart_upload(key, upload_id).await {
            Ok(()) => info!("multipart session aborted: key={}, upload_id={}", key, upload_id),
            Err(e) => error!(
                "aborting multipart session failed, parts may remain on the store: key={}, upload_id={}, error={}",
                key, upload_id, e
            ),
        }
    }
}
