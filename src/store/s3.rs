//! S3 object store backend
//!
//! Thin wrapper over aws-sdk-s3. One instance serves one bucket; the
//! client itself holds no filesystem state.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{ObjectMeta, ObjectStore};

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::Client;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

// CopyObject wants the source percent-encoded; everything outside the
// unreserved set goes, but `/` stays as the bucket/key separator.
const COPY_SOURCE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

fn encode_copy_source(bucket: &str, key: &str) -> String {
    format!(
        "{}/{}",
        bucket,
        utf8_percent_encode(key, COPY_SOURCE_SET)
    )
}

/// S3-backed implementation of [`ObjectStore`]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build the SDK client from static credentials and connect it to `config.bucket`.
    ///
    /// Custom endpoints (MinIO and friends) get path-style addressing, since
    /// virtual-hosted style needs DNS the endpoint usually cannot provide.
    pub async fn connect(config: &Config) -> Result<Self> {
        let credentials = Credentials::new(
            config.credentials.access_key.clone(),
            config.credentials.secret_key.clone(),
            None,
            None,
            "s3fuse",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if config.endpoint.is_some() {
            builder = builder.force_path_style(true);
        }

        let client = Client::from_conf(builder.build());
        debug!("S3 client ready, bucket={}", config.bucket);

        Ok(S3Store {
            client,
            bucket: config.bucket.clone(),
        })
    }

    fn to_system_time(dt: &DateTime) -> SystemTime {
        if dt.secs() >= 0 {
            UNIX_EPOCH + Duration::new(dt.secs() as u64, dt.subsec_nanos())
        } else {
            UNIX_EPOCH
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|s| s.is_not_found()) == Some(true) {
                    Ok(false)
                } else {
                    warn!("Head bucket failed: {}", e);
                    Err(Error::Store(format!("head bucket: {}", e)))
                }
            }
        }
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => {
                let size = resp.content_length().unwrap_or(0).max(0) as u64;
                let last_modified = resp
                    .last_modified()
                    .map(Self::to_system_time)
                    .unwrap_or_else(SystemTime::now);
                Ok(Some(ObjectMeta {
                    size,
                    last_modified,
                }))
            }
            Err(e) => {
                if e.as_service_error().map(|s| s.is_not_found()) == Some(true) {
                    Ok(None)
                } else {
                    warn!("Head object {} failed: {}", key, e);
                    Err(Error::Store(format!("head object {}: {}", key, e)))
                }
            }
        }
    }

    async fn list_objects(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| Error::Store(format!("list objects: {}", e)))?;

            for object in resp.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match resp.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        // S3 ranges are inclusive on both ends
        let range = format!("bytes={}-{}", offset, offset + len - 1);

        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(range)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                if e.as_service_error().map(|s| s.is_no_such_key()) == Some(true) {
                    return Err(Error::NotFound(key.to_string()));
                }
                warn!("Get object {} failed: {}", key, e);
                return Err(Error::Store(format!("get object {}: {}", key, e)));
            }
        };

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| Error::Store(format!("read body of {}: {}", key, e)))?;

        Ok(data.into_bytes().to_vec())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                warn!("Put object {} failed: {}", key, e);
                Error::Store(format!("put object {}: {}", key, e))
            })?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                warn!("Delete object {} failed: {}", key, e);
                Error::Store(format!("delete object {}: {}", key, e))
            })?;
        Ok(())
    }

    async fn copy_object(&self, src: &str, dst: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(dst)
            .copy_source(encode_copy_source(&self.bucket, src))
            .send()
            .await
            .map_err(|e| {
                warn!("Copy object {} -> {} failed: {}", src, dst, e);
                Error::Store(format!("copy object {}: {}", src, e))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_source_escapes_reserved_key_bytes() {
        assert_eq!(
            encode_copy_source("bucket", "plain-file_1.txt"),
            "bucket/plain-file_1.txt"
        );
        assert_eq!(
            encode_copy_source("bucket", "a file+100%.txt"),
            "bucket/a%20file%2B100%25.txt"
        );
    }
}
