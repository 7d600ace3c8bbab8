//! AWS implementation of the image and archive storage backends.
//!
//! Images are exported with EC2 store image tasks, which write
//! `<image id>.bin` to the bucket root, and restored with restore image
//! tasks reading that object back into a new image. Metadata documents and
//! retention sweeps use S3 directly.

mod convert;
mod error;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::{Filter, S3ObjectTag, Tag};
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_http_client::proxy::ProxyConfig;
use aws_smithy_http_client::tls;
use tracing::{debug, warn};

use crate::backend::{
    ArchiveStorage, BackendFuture, ExportRequest, ImageBackend, ImportRequest, PutObject,
    StoredObject,
};
use crate::config::VaultConfig;
use crate::image::{ImageRecord, ImageTag};
use crate::task::{
    ArchiveLocation, ArchiveTask, LaunchedTask, TaskDirection, TaskSnapshot, TaskState,
};

pub use error::AwsBackendError;

/// Store image tasks accept at most this many object tags.
const MAX_OBJECT_TAGS: usize = 10;
const CREDENTIALS_PROVIDER_NAME: &str = "ami-vault";

/// Backend talking to EC2 and S3 in one region and one bucket.
#[derive(Clone, Debug)]
pub struct AwsBackend {
    ec2: aws_sdk_ec2::Client,
    s3: aws_sdk_s3::Client,
    bucket: String,
}

impl AwsBackend {
    /// Builds SDK clients from configuration.
    ///
    /// Static credentials are used when both keys are configured; otherwise
    /// the default provider chain resolves them. A configured proxy is
    /// passed to the HTTP client directly.
    ///
    /// # Errors
    ///
    /// Returns [`AwsBackendError::Config`] when validation fails or the
    /// proxy URL is unusable.
    pub async fn connect(config: &VaultConfig) -> Result<Self, AwsBackendError> {
        config.validate()?;
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some((access_key_id, secret_access_key)) = config.static_credentials() {
            loader = loader.credentials_provider(aws_sdk_ec2::config::Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                CREDENTIALS_PROVIDER_NAME,
            ));
        }
        if let Some(proxy_url) = config.proxy_url.as_deref() {
            let proxy = ProxyConfig::all(proxy_url).map_err(|err| {
                AwsBackendError::Config(format!("invalid proxy_url `{proxy_url}`: {err}"))
            })?;
            let http_client = aws_smithy_http_client::Builder::new()
                .tls_provider(tls::Provider::Rustls(tls::rustls_provider::CryptoMode::AwsLc))
                .proxy_config(proxy)
                .build_https();
            loader = loader.http_client(http_client);
        }
        let shared = loader.load().await;
        debug!(region = %config.region, bucket = %config.bucket, "AWS clients configured");

        Ok(Self {
            ec2: aws_sdk_ec2::Client::new(&shared),
            s3: aws_sdk_s3::Client::new(&shared),
            bucket: config.bucket.trim().to_owned(),
        })
    }

    async fn poll_store_task(&self, task: &ArchiveTask) -> Result<TaskSnapshot, AwsBackendError> {
        let output = self
            .ec2
            .describe_store_image_tasks()
            .image_ids(&task.image_id)
            .send()
            .await
            .map_err(|err| AwsBackendError::ec2("DescribeStoreImageTasks", &err))?;
        let current = convert::current_store_result(
            output.store_image_task_results(),
            &task.location,
            task.started_at,
        );
        // Newly created store tasks can take a moment to become visible.
        Ok(current.map_or_else(
            || TaskSnapshot::new(TaskState::Pending),
            convert::store_snapshot,
        ))
    }

    /// Restore tasks are identified by the image they create; the task is
    /// done when that image is available.
    async fn poll_restored_image(
        &self,
        task: &ArchiveTask,
    ) -> Result<TaskSnapshot, AwsBackendError> {
        match self.ec2.describe_images().image_ids(&task.id).send().await {
            Ok(output) => Ok(output
                .images()
                .iter()
                .find(|image| image.image_id() == Some(task.id.as_str()))
                .map_or_else(|| TaskSnapshot::new(TaskState::Pending), convert::restore_snapshot)),
            Err(err) if is_missing_image(err.code()) => Ok(TaskSnapshot::new(TaskState::Pending)),
            Err(err) => Err(AwsBackendError::ec2("DescribeImages", &err)),
        }
    }
}

fn is_missing_image(code: Option<&str>) -> bool {
    code.is_some_and(|code| code.starts_with("InvalidAMIID"))
}

impl ImageBackend for AwsBackend {
    type Error = AwsBackendError;

    fn list_images(&self) -> BackendFuture<'_, Vec<ImageRecord>, Self::Error> {
        Box::pin(async move {
            let output = self
                .ec2
                .describe_images()
                .owners("self")
                .filters(Filter::builder().name("state").values("available").build())
                .send()
                .await
                .map_err(|err| AwsBackendError::ec2("DescribeImages", &err))?;
            let images: Vec<ImageRecord> = output
                .images()
                .iter()
                .filter_map(convert::image_from_sdk)
                .collect();
            debug!(count = images.len(), "images listed");
            Ok(images)
        })
    }

    fn describe_image<'a>(
        &'a self,
        image_id: &'a str,
    ) -> BackendFuture<'a, Option<ImageRecord>, Self::Error> {
        Box::pin(async move {
            match self.ec2.describe_images().image_ids(image_id).send().await {
                Ok(output) => Ok(output.images().iter().find_map(convert::image_from_sdk)),
                Err(err) if is_missing_image(err.code()) => Ok(None),
                Err(err) => Err(AwsBackendError::ec2("DescribeImages", &err)),
            }
        })
    }

    fn start_export<'a>(
        &'a self,
        request: ExportRequest<'a>,
    ) -> BackendFuture<'a, LaunchedTask, Self::Error> {
        Box::pin(async move {
            if !request.prefix.is_empty() {
                warn!(
                    prefix = request.prefix,
                    "store image tasks write to the bucket root; archive prefix ignored"
                );
            }
            let (pairs, rewritten) = convert::object_tags(request.tags.to_pairs());
            if rewritten > 0 {
                warn!(
                    image_id = request.image_id,
                    rewritten,
                    "tag text rejected by object storage was replaced"
                );
            }
            if pairs.len() > MAX_OBJECT_TAGS {
                warn!(
                    image_id = request.image_id,
                    dropped = pairs.len() - MAX_OBJECT_TAGS,
                    "object tag limit reached; trailing tags dropped"
                );
            }
            let tags: Vec<S3ObjectTag> = pairs
                .into_iter()
                .take(MAX_OBJECT_TAGS)
                .map(|(key, value)| S3ObjectTag::builder().key(key).value(value).build())
                .collect();

            let output = self
                .ec2
                .create_store_image_task()
                .image_id(request.image_id)
                .bucket(request.bucket)
                .set_s3_object_tags(Some(tags))
                .send()
                .await
                .map_err(|err| AwsBackendError::ec2("CreateStoreImageTask", &err))?;
            let key = output
                .object_key()
                .ok_or(AwsBackendError::MissingField {
                    operation: "CreateStoreImageTask",
                    field: "ObjectKey",
                })?
                .to_owned();
            Ok(LaunchedTask {
                task_id: key.clone(),
                location: ArchiveLocation {
                    bucket: request.bucket.to_owned(),
                    key,
                },
            })
        })
    }

    fn start_import<'a>(
        &'a self,
        request: ImportRequest<'a>,
    ) -> BackendFuture<'a, LaunchedTask, Self::Error> {
        Box::pin(async move {
            let output = self
                .ec2
                .create_restore_image_task()
                .bucket(&request.source.bucket)
                .object_key(&request.source.key)
                .name(request.name)
                .send()
                .await
                .map_err(|err| AwsBackendError::ec2("CreateRestoreImageTask", &err))?;
            let image_id = output
                .image_id()
                .ok_or(AwsBackendError::MissingField {
                    operation: "CreateRestoreImageTask",
                    field: "ImageId",
                })?
                .to_owned();
            Ok(LaunchedTask {
                task_id: image_id,
                location: request.source.clone(),
            })
        })
    }

    fn describe_task<'a>(
        &'a self,
        task: &'a ArchiveTask,
    ) -> BackendFuture<'a, TaskSnapshot, Self::Error> {
        Box::pin(async move {
            match task.direction {
                TaskDirection::Export => self.poll_store_task(task).await,
                TaskDirection::Import => self.poll_restored_image(task).await,
            }
        })
    }

    fn tag_resource<'a>(
        &'a self,
        resource_id: &'a str,
        tags: &'a [ImageTag],
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let sdk_tags: Vec<Tag> = tags
                .iter()
                .map(|tag| Tag::builder().key(&tag.key).value(&tag.value).build())
                .collect();
            self.ec2
                .create_tags()
                .resources(resource_id)
                .set_tags(Some(sdk_tags))
                .send()
                .await
                .map_err(|err| AwsBackendError::ec2("CreateTags", &err))?;
            Ok(())
        })
    }
}

impl ArchiveStorage for AwsBackend {
    fn list_objects<'a>(
        &'a self,
        prefix: &'a str,
    ) -> BackendFuture<'a, Vec<StoredObject>, Self::Error> {
        Box::pin(async move {
            let mut objects = Vec::new();
            let mut continuation: Option<String> = None;
            loop {
                let page = self
                    .s3
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix)
                    .set_continuation_token(continuation.take())
                    .send()
                    .await
                    .map_err(|err| AwsBackendError::s3("ListObjectsV2", &err))?;
                objects.extend(page.contents().iter().filter_map(|object| {
                    Some(StoredObject {
                        key: object.key()?.to_owned(),
                        last_modified: object.last_modified().and_then(convert::smithy_instant),
                    })
                }));
                match page.next_continuation_token() {
                    Some(token) if page.is_truncated().unwrap_or(false) => {
                        continuation = Some(token.to_owned());
                    }
                    _ => break,
                }
            }
            debug!(prefix, count = objects.len(), "objects listed");
            Ok(objects)
        })
    }

    fn get_object<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Vec<u8>>, Self::Error> {
        Box::pin(async move {
            let output = match self.s3.get_object().bucket(&self.bucket).key(key).send().await {
                Ok(output) => output,
                Err(err) => {
                    let service = err.into_service_error();
                    if service.is_no_such_key() {
                        return Ok(None);
                    }
                    return Err(AwsBackendError::s3("GetObject", &service));
                }
            };
            let body = output
                .body
                .collect()
                .await
                .map_err(|err| AwsBackendError::s3("GetObject", &err))?;
            Ok(Some(body.into_bytes().to_vec()))
        })
    }

    fn put_object<'a>(&'a self, object: PutObject<'a>) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let (tags, rewritten) = convert::object_tags(object.tags.to_vec());
            if rewritten > 0 {
                warn!(key = object.key, rewritten, "tag text rejected by object storage was replaced");
            }
            self.s3
                .put_object()
                .bucket(&self.bucket)
                .key(object.key)
                .content_type(object.content_type)
                .set_tagging(convert::tagging_query(&tags))
                .body(ByteStream::from(object.body))
                .send()
                .await
                .map_err(|err| AwsBackendError::s3("PutObject", &err))?;
            Ok(())
        })
    }

    fn delete_object<'a>(&'a self, key: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.s3
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| AwsBackendError::s3("DeleteObject", &err))?;
            Ok(())
        })
    }
}
