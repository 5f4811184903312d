// AWS S3 对象存储实现
//
// 基于 aws-sdk-s3，一个实例绑定一个 bucket。
// SDK 内部自带的重试保持默认；本层不做额外重试，分片级重试见 sync::part。

use super::{
    AcknowledgedPart, ObjectStore, RemoteObject, StoreError, StoreErrorKind,
    FINGERPRINT_METADATA_KEY,
};
use crate::config::credentials::Credentials;
use crate::config::StoreConfig;
use crate::error::SyncError;
use crate::sync::fingerprint::Fingerprint;
use async_trait::async_trait;
use aws_credential_types::Credentials as AwsCredentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use aws_types::region::Region;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// 把 SDK 错误归类为存储错误
fn sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let kind = match &err {
        SdkError::TimeoutError(_) => StoreErrorKind::Timeout,
        SdkError::DispatchFailure(failure) if failure.is_timeout() => StoreErrorKind::Timeout,
        SdkError::DispatchFailure(_) => StoreErrorKind::Network,
        SdkError::ResponseError(_) | SdkError::ServiceError(_) => StoreErrorKind::Service,
        _ => StoreErrorKind::Unknown,
    };
    StoreError::new(kind, operation, DisplayErrorContext(&err).to_string())
}

/// S3 存储
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// 连接 S3 并校验 bucket 可访问
    ///
    /// # 参数
    /// * `config` - 存储配置（区域、自定义端点）
    /// * `credentials` - 访问凭证
    /// * `bucket` - bucket 名称
    pub async fn connect(
        config: &StoreConfig,
        credentials: &Credentials,
        bucket: &str,
    ) -> Result<Self, StoreError> {
        let provider = AwsCredentials::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            credentials.session_token().map(str::to_string),
            None,
            "aws-s3sync",
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(provider)
            .load()
            .await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style);
        if let Some(endpoint_url) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        let store = Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
        };

        store
            .client
            .head_bucket()
            .bucket(&store.bucket)
            .send()
            .await
            .map_err(|e| sdk_error("head_bucket", e))?;

        info!(
            "s3_connection=established, bucket={}, region={}",
            store.bucket, config.region
        );
        Ok(store)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_object(&self, key: &str) -> Result<Option<RemoteObject>, StoreError> {
        let output = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().map(|s| s.is_not_found()).unwrap_or(false) => {
                debug!("head_object: key={} not found", key);
                return Ok(None);
            }
            Err(e) => return Err(sdk_error("head_object", e)),
        };

        let fingerprint = output
            .metadata()
            .and_then(|metadata| metadata.get(FINGERPRINT_METADATA_KEY))
            .and_then(|value| Fingerprint::from_hex(value));

        Ok(Some(RemoteObject {
            size: output.content_length().unwrap_or(0).max(0) as u64,
            e_tag: output.e_tag().map(str::to_string),
            fingerprint,
        }))
    }

    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        fingerprint: &Fingerprint,
    ) -> Result<(), SyncError> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| SyncError::LocalIo {
                path: source.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_md5(fingerprint.to_base64())
            .metadata(FINGERPRINT_METADATA_KEY, fingerprint.to_hex())
            .send()
            .await
            .map_err(|e| sdk_error("put_object", e))?;

        debug!("put_object: key={}, md5={}", key, fingerprint);
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        fingerprint: &Fingerprint,
    ) -> Result<String, StoreError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .metadata(FINGERPRINT_METADATA_KEY, fingerprint.to_hex())
            .send()
            .await
            .map_err(|e| sdk_error("create_multipart_upload", e))?;

        output.upload_id().map(str::to_string).ok_or_else(|| {
            StoreError::new(
                StoreErrorKind::Service,
                "create_multipart_upload",
                "response carried no upload id",
            )
        })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<AcknowledgedPart, StoreError> {
        let content_md5 = Fingerprint::of_bytes(&data).to_base64();

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_md5(content_md5)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| sdk_error("upload_part", e))?;

        let e_tag = output.e_tag().map(str::to_string).ok_or_else(|| {
            StoreError::new(
                StoreErrorKind::Service,
                "upload_part",
                format!("part {} acknowledged without an ETag", part_number),
            )
        })?;

        Ok(AcknowledgedPart { part_number, e_tag })
    }

    async fn list_parts(&self, key: &str, upload_id: &str) -> Result<Vec<i32>, StoreError> {
        let mut part_numbers = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_parts()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .set_part_number_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("list_parts", e))?;

            part_numbers.extend(output.parts().iter().filter_map(|part| part.part_number()));

            match output.next_part_number_marker() {
                Some(next) if output.is_truncated().unwrap_or(false) => {
                    marker = Some(next.to_string());
                }
                _ => break,
            }
        }

        part_numbers.sort_unstable();
        Ok(part_numbers)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<AcknowledgedPart>,
    ) -> Result<(), StoreError> {
        let completed_parts = parts
            .into_iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(part.e_tag)
                    .build()
            })
            .collect::<Vec<_>>();

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| sdk_error("complete_multipart_upload", e))?;

        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| sdk_error("abort_multipart_upload", e))?;

        Ok(())
    }

    async fn get_object(&self, key: &str, destination: &Path) -> Result<u64, SyncError> {
        let local_error = |source: std::io::Error| SyncError::LocalIo {
            path: destination.to_path_buf(),
            source,
        };

        let mut output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("get_object", e))?;

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(local_error)?;
        let mut written = 0u64;

        while let Some(bytes) = output.body.try_next().await.map_err(|e| {
            StoreError::new(
                StoreErrorKind::Network,
                "get_object",
                DisplayErrorContext(&e).to_string(),
            )
        })? {
            file.write_all(&bytes).await.map_err(local_error)?;
            written += bytes.len() as u64;
        }

        file.flush().await.map_err(local_error)?;
        Ok(written)
    }
}
