// 内存对象存储（测试用）
//
// 记录每一次调用，并支持按操作注入故障

use super::{AcknowledgedPart, ObjectStore, RemoteObject, StoreError, StoreErrorKind};
use crate::error::SyncError;
use crate::sync::fingerprint::Fingerprint;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// 已记录的存储调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Head { key: String },
    Put { key: String },
    CreateMultipart { key: String },
    UploadPart { part_number: i32, data: Vec<u8>, ok: bool },
    ListParts,
    Complete { parts: Vec<i32> },
    Abort,
    Get { key: String },
}

impl StoreCall {
    /// 是否会修改存储状态
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            StoreCall::Put { .. }
                | StoreCall::CreateMultipart { .. }
                | StoreCall::UploadPart { .. }
                | StoreCall::Complete { .. }
                | StoreCall::Abort
        )
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub fingerprint: Option<Fingerprint>,
}

struct PendingUpload {
    key: String,
    fingerprint: Fingerprint,
    parts: BTreeMap<i32, Vec<u8>>,
}

#[derive(Default)]
struct Faults {
    head: bool,
    put: bool,
    create: bool,
    complete: bool,
    abort: bool,
    get: bool,
    /// 分片编号 -> 剩余失败次数
    part_failures: HashMap<i32, u32>,
    /// 上传成功但不出现在 list_parts 中的分片
    unlisted_parts: HashSet<i32>,
}

#[derive(Default)]
struct State {
    objects: HashMap<String, StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    next_upload_id: u64,
    calls: Vec<StoreCall>,
    faults: Faults,
}

pub struct MemoryStore {
    bucket: String,
    state: Mutex<State>,
}

fn injected(operation: &'static str) -> StoreError {
    StoreError::new(StoreErrorKind::Network, operation, "injected failure")
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn insert_object(&self, key: &str, data: Vec<u8>, fingerprint: Option<Fingerprint>) {
        self.state
            .lock()
            .objects
            .insert(key.to_string(), StoredObject { data, fingerprint });
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state.lock().objects.get(key).cloned()
    }

    pub fn fail_head(&self) {
        self.state.lock().faults.head = true;
    }

    pub fn fail_put(&self) {
        self.state.lock().faults.put = true;
    }

    pub fn fail_create(&self) {
        self.state.lock().faults.create = true;
    }

    pub fn fail_complete(&self) {
        self.state.lock().faults.complete = true;
    }

    pub fn fail_abort(&self) {
        self.state.lock().faults.abort = true;
    }

    pub fn fail_get(&self) {
        self.state.lock().faults.get = true;
    }

    /// 让指定分片的前 `times` 次上传失败
    pub fn fail_part(&self, part_number: i32, times: u32) {
        self.state
            .lock()
            .faults
            .part_failures
            .insert(part_number, times);
    }

    pub fn hide_part_from_listing(&self, part_number: i32) {
        self.state.lock().faults.unlisted_parts.insert(part_number);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&StoreCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn head_count(&self) -> usize {
        self.count(|c| matches!(c, StoreCall::Head { .. }))
    }

    pub fn abort_count(&self) -> usize {
        self.count(|c| matches!(c, StoreCall::Abort))
    }

    pub fn complete_count(&self) -> usize {
        self.count(|c| matches!(c, StoreCall::Complete { .. }))
    }

    pub fn mutating_count(&self) -> usize {
        self.count(StoreCall::is_mutating)
    }

    /// 某个分片的所有上传尝试携带的数据
    pub fn part_attempts(&self, part_number: i32) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                StoreCall::UploadPart {
                    part_number: n,
                    data,
                    ..
                } if *n == part_number => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn pending_upload_count(&self) -> usize {
        self.state.lock().uploads.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_object(&self, key: &str) -> Result<Option<RemoteObject>, StoreError> {
        let mut state = self.state.lock();
        state.calls.push(StoreCall::Head {
            key: key.to_string(),
        });
        if state.faults.head {
            return Err(injected("head_object"));
        }

        Ok(state.objects.get(key).map(|object| RemoteObject {
            size: object.data.len() as u64,
            e_tag: Some(format!("\"{}\"", Fingerprint::of_bytes(&object.data))),
            fingerprint: object.fingerprint,
        }))
    }

    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        fingerprint: &Fingerprint,
    ) -> Result<(), SyncError> {
        let data = tokio::fs::read(source)
            .await
            .map_err(|e| SyncError::LocalIo {
                path: source.to_path_buf(),
                source: e,
            })?;

        let mut state = self.state.lock();
        state.calls.push(StoreCall::Put {
            key: key.to_string(),
        });
        if state.faults.put {
            return Err(injected("put_object").into());
        }

        state.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                fingerprint: Some(*fingerprint),
            },
        );
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        fingerprint: &Fingerprint,
    ) -> Result<String, StoreError> {
        let mut state = self.state.lock();
        state.calls.push(StoreCall::CreateMultipart {
            key: key.to_string(),
        });
        if state.faults.create {
            return Err(injected("create_multipart_upload"));
        }

        state.next_upload_id += 1;
        let upload_id = format!("upload-{}", state.next_upload_id);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                fingerprint: *fingerprint,
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<AcknowledgedPart, StoreError> {
        let mut state = self.state.lock();

        let should_fail = match state.faults.part_failures.get_mut(&part_number) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };

        state.calls.push(StoreCall::UploadPart {
            part_number,
            data: data.clone(),
            ok: !should_fail,
        });
        if should_fail {
            return Err(injected("upload_part"));
        }

        let upload = state.uploads.get_mut(upload_id).ok_or_else(|| {
            StoreError::new(StoreErrorKind::NotFound, "upload_part", "no such upload")
        })?;
        let e_tag = format!("\"{}\"", Fingerprint::of_bytes(&data));
        upload.parts.insert(part_number, data);

        Ok(AcknowledgedPart { part_number, e_tag })
    }

    async fn list_parts(&self, _key: &str, upload_id: &str) -> Result<Vec<i32>, StoreError> {
        let mut state = self.state.lock();
        state.calls.push(StoreCall::ListParts);

        let upload = state.uploads.get(upload_id).ok_or_else(|| {
            StoreError::new(StoreErrorKind::NotFound, "list_parts", "no such upload")
        })?;
        Ok(upload
            .parts
            .keys()
            .copied()
            .filter(|n| !state.faults.unlisted_parts.contains(n))
            .collect())
    }

    async fn complete_multipart_upload(
        &self,
        _key: &str,
        upload_id: &str,
        parts: Vec<AcknowledgedPart>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.calls.push(StoreCall::Complete {
            parts: parts.iter().map(|p| p.part_number).collect(),
        });
        if state.faults.complete {
            return Err(injected("complete_multipart_upload"));
        }

        let upload = state.uploads.remove(upload_id).ok_or_else(|| {
            StoreError::new(StoreErrorKind::NotFound, "complete_multipart_upload", "no such upload")
        })?;

        let mut data = Vec::new();
        for part in &parts {
            let bytes = upload.parts.get(&part.part_number).ok_or_else(|| {
                StoreError::new(
                    StoreErrorKind::Service,
                    "complete_multipart_upload",
                    format!("part {} was never uploaded", part.part_number),
                )
            })?;
            data.extend_from_slice(bytes);
        }

        state.objects.insert(
            upload.key,
            StoredObject {
                data,
                fingerprint: Some(upload.fingerprint),
            },
        );
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.calls.push(StoreCall::Abort);
        if state.faults.abort {
            return Err(injected("abort_multipart_upload"));
        }

        state
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| {
                StoreError::new(StoreErrorKind::NotFound, "abort_multipart_upload", "no such upload")
            })
    }

    async fn get_object(&self, key: &str, destination: &Path) -> Result<u64, SyncError> {
        let data = {
            let mut state = self.state.lock();
            state.calls.push(StoreCall::Get {
                key: key.to_string(),
            });
            if state.faults.get {
                return Err(injected("get_object").into());
            }
            state
                .objects
                .get(key)
                .map(|o| o.data.clone())
                .ok_or_else(|| StoreError::new(StoreErrorKind::NotFound, "get_object", "no such key"))?
        };

        tokio::fs::write(destination, &data)
            .await
            .map_err(|e| SyncError::LocalIo {
                path: destination.to_path_buf(),
                source: e,
            })?;
        Ok(data.len() as u64)
    }
}
