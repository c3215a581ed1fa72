// ai
//! 🪣📡 S3 Store: the layover airport between Postgres and Redshift.
//!
//! COLD OPEN: EXT. US-EAST-1, 3:51 AM
//!
//! A gzip chunk lands in the bucket. It will sit there, alone, until Redshift comes to
//! collect it. It doesn't mind. It's been compressed. It's used to tight spaces.
//!
//! 🧠 Knowledge graph:
//! - `ObjectStoreConfig`: bucket, region, keys or IAM role, export prefix, optional endpoint
//! - `S3Store`: an `aws_sdk_s3::Client` with retries DISABLED. We fail fast and loud.
//! - `delete` → `DeleteObjects` with one key, `put` → `PutObject` from a file on disk,
//!   `list` → `ListObjectsV2`, following continuation tokens up to `max_keys`
//! - every SDK error gets sorted into `Retryable` or `Fatal` by `failed`
//!
//! ⚠️ The IAM role in the config is for Redshift's COPY, not for us. We use the keys if
//! they're there and the default AWS credential chain if they aren't.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::backends::common_config::ConfigSecret;
use crate::backends::{ObjectStore, StoreOutcome};
use crate::common::ObjectSummary;

/// 📄 ListObjectsV2 never returns more than this per page.
const LIST_PAGE_SIZE: i32 = 1000;

/// 🪣 The bucket, and everything needed to get in.
#[derive(Debug, Deserialize, Clone)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    /// 🌎 defaults to us-east-1, the Florida of AWS regions. Everyone ends up there eventually.
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<ConfigSecret>,
    /// 🎩 when set, Redshift's COPY authenticates with this role instead of the keys
    #[serde(default)]
    pub iam_role: Option<String>,
    #[serde(default = "default_export_prefix")]
    pub export_prefix: String,
    /// 🧪 MinIO, LocalStack, a wiremock in a test. Anything that speaks S3.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_export_prefix() -> String {
    "export".to_string()
}

/// 🪣 The S3 gateway.
#[derive(Debug, Clone)]
pub(crate) struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// 🔧 Build the client. No network call happens here; the first request finds out if we were right.
    pub(crate) async fn new(config: &ObjectStoreConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .retry_config(RetryConfig::disabled());

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id.clone(),
                secret_access_key.expose().to_string(),
                None,
                None,
                "pgshift-static",
            ));
        }

        let the_sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&the_sdk_config)
            .force_path_style(config.force_path_style);
        if let Some(endpoint_url) = &config.endpoint_url {
            debug!("🧪 S3 endpoint override: {endpoint_url}");
            builder = builder.endpoint_url(endpoint_url);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }
}

/// 🗂️ Sort an SDK failure into the two piles.
///
/// With a response in hand, the status decides: 5xx and 429 might clear up, anything
/// else won't. Without one, timeouts and dispatch failures (DNS, refused, reset) are
/// retryable. Request construction failures are not.
fn failed<T, E>(err: &SdkError<E, HttpResponse>) -> StoreOutcome<T>
where
    E: std::error::Error + 'static,
{
    let the_reason = DisplayErrorContext(err).to_string();
    let retryable = match err.raw_response() {
        Some(response) => {
            let status = response.status().as_u16();
            status >= 500 || status == 429
        }
        None => matches!(
            err,
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)
        ),
    };
    if retryable {
        StoreOutcome::Retryable(the_reason)
    } else {
        StoreOutcome::Fatal(the_reason)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn delete(&self, key: &str) -> StoreOutcome<bool> {
        let the_delete = ObjectIdentifier::builder()
            .key(key)
            .build()
            .and_then(|object| Delete::builder().objects(object).quiet(false).build());
        let the_delete = match the_delete {
            Ok(delete) => delete,
            Err(err) => return StoreOutcome::Fatal(format!("could not build delete request: {err}")),
        };

        match self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(the_delete)
            .send()
            .await
        {
            Ok(output) => {
                if let Some(problem) = output.errors().first() {
                    warn!(
                        "🗑️ s3://{}/{}: delete reported an error: {}",
                        self.bucket,
                        key,
                        problem.message().unwrap_or("no message")
                    );
                }
                StoreOutcome::Success(output.deleted().len() == 1)
            }
            Err(err) => {
                let the_outcome = failed(&err);
                warn!("🗑️ s3://{}/{}: delete failed: {:?}", self.bucket, key, the_outcome);
                the_outcome
            }
        }
    }

    async fn put(&self, key: &str, body: &Path) -> StoreOutcome<String> {
        let the_body = match ByteStream::from_path(body).await {
            Ok(stream) => stream,
            Err(err) => {
                error!("💀 s3://{}/{}: could not read {}: {err}", self.bucket, key, body.display());
                return StoreOutcome::Fatal(format!("could not read upload body {}: {err}", body.display()));
            }
        };

        match self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(the_body)
            .content_type("application/gzip")
            .send()
            .await
        {
            Ok(output) => match output.e_tag() {
                Some(etag) => StoreOutcome::Success(etag.to_string()),
                None => {
                    error!("💀 s3://{}/{}: upload acknowledged without an ETag", self.bucket, key);
                    StoreOutcome::Fatal(format!("s3://{}/{} acknowledged without an ETag", self.bucket, key))
                }
            },
            Err(err) => {
                let the_outcome = failed(&err);
                error!("💀 s3://{}/{}: upload failed: {:?}", self.bucket, key, the_outcome);
                the_outcome
            }
        }
    }

    async fn list(&self, prefix: Option<&str>, max_keys: i32) -> Result<Vec<ObjectSummary>> {
        let mut the_objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        while (the_objects.len() as i32) < max_keys {
            let remaining = max_keys - the_objects.len() as i32;
            let the_page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(prefix.map(str::to_string))
                .max_keys(remaining.min(LIST_PAGE_SIZE))
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|err| anyhow::anyhow!("{}", DisplayErrorContext(&err)))
                .context(format!(
                    "💀 Could not list s3://{}/{}",
                    self.bucket,
                    prefix.unwrap_or("")
                ))?;

            the_objects.extend(the_page.contents().iter().filter_map(|object| {
                object.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default(),
                })
            }));

            match (the_page.is_truncated(), the_page.next_continuation_token()) {
                (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        the_objects.truncate(max_keys.max(0) as usize);
        Ok(the_objects)
    }
}
