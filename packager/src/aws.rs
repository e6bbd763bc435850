//! AWS-backed implementations of the packaging services.
//!
//! All clients share one [`SdkConfig`]. When a role ARN is configured the
//! credentials come from STS `AssumeRole`, otherwise from the default
//! provider chain (task role, environment, profile).

use crate::notification::Notification;
use crate::services::{
    parameter_key, Notifier, PackageStore, ParameterStore, ServiceError, ServiceResult,
};
use async_trait::async_trait;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_sns::types::MessageAttributeValue;
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

const SESSION_NAME: &str = "digitized-image-packaging";

/// Files above this size are sent with a multipart upload.
pub const MULTIPART_THRESHOLD: u64 = 25 * 1024 * 1024;
pub const MULTIPART_CHUNK_SIZE: usize = 25 * 1024 * 1024;

fn describe<E: Error + 'static>(err: &E) -> String {
    aws_sdk_s3::error::DisplayErrorContext(err).to_string()
}

/// Shared SDK configuration for one job
pub struct AwsContext {
    config: SdkConfig,
}

impl AwsContext {
    pub async fn load(region: &str, role_arn: Option<&str>) -> Self {
        let region = Region::new(region.to_string());
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(region.clone())
            .load()
            .await;

        let Some(role_arn) = role_arn else {
            debug!("Using default AWS credentials");
            return Self { config: base };
        };

        let provider = AssumeRoleProvider::builder(role_arn)
            .session_name(SESSION_NAME)
            .region(region.clone())
            .configure(&base)
            .build()
            .await;
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(provider)
            .load()
            .await;
        info!("Using credentials from assumed role {}", role_arn);
        Self { config }
    }

    pub fn parameter_store(&self) -> SsmParameterStore {
        SsmParameterStore {
            client: aws_sdk_ssm::Client::new(&self.config),
        }
    }

    pub fn package_store(&self, bucket: impl Into<String>) -> S3PackageStore {
        S3PackageStore {
            client: aws_sdk_s3::Client::new(&self.config),
            bucket: bucket.into(),
        }
    }

    pub fn notifier(&self, topic_arn: impl Into<String>) -> SnsNotifier {
        SnsNotifier {
            client: aws_sdk_sns::Client::new(&self.config),
            topic_arn: topic_arn.into(),
        }
    }
}

pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn parameters_by_path(&self, path: &str) -> ServiceResult<HashMap<String, String>> {
        let mut parameters = HashMap::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .get_parameters_by_path()
                .path(path)
                .recursive(false)
                .with_decryption(true)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|err| ServiceError::ParameterStore {
                    message: describe(&err),
                })?;

            for parameter in output.parameters() {
                if let (Some(name), Some(value)) = (parameter.name(), parameter.value()) {
                    parameters.insert(parameter_key(name).to_string(), value.to_string());
                }
            }

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!("Loaded {} parameters from {}", parameters.len(), path);
        Ok(parameters)
    }
}

pub struct S3PackageStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3PackageStore {
    async fn put(&self, path: &Path, key: &str, content_type: &str) -> ServiceResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|err| ServiceError::Storage {
                message: describe(&err),
            })?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|err| ServiceError::Storage {
                message: describe(&err),
            })?;
        Ok(())
    }

    async fn multipart_put(&self, path: &Path, key: &str, content_type: &str) -> ServiceResult<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| ServiceError::Storage {
                message: describe(&err),
            })?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| ServiceError::Storage {
                message: format!("No upload id returned for {}", key),
            })?
            .to_string();

        match self.upload_parts(path, key, &upload_id).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|err| ServiceError::Storage {
                        message: describe(&err),
                    })?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        "Failed to abort multipart upload {}: {}",
                        upload_id,
                        describe(&abort_err)
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        path: &Path,
        key: &str,
        upload_id: &str,
    ) -> ServiceResult<Vec<CompletedPart>> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut parts = Vec::new();
        let mut part_number = 1;

        loop {
            let mut chunk = Vec::with_capacity(MULTIPART_CHUNK_SIZE);
            (&mut file)
                .take(MULTIPART_CHUNK_SIZE as u64)
                .read_to_end(&mut chunk)
                .await?;
            if chunk.is_empty() {
                break;
            }

            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|err| ServiceError::Storage {
                    message: describe(&err),
                })?;
            debug!("Uploaded part {} of {}", part_number, key);

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            part_number += 1;
        }

        Ok(parts)
    }
}

#[async_trait]
impl PackageStore for S3PackageStore {
    async fn upload(&self, path: &Path, key: &str, content_type: &str) -> ServiceResult<()> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > MULTIPART_THRESHOLD {
            self.multipart_put(path, key, content_type).await?;
        } else {
            self.put(path, key, content_type).await?;
        }
        info!("Uploaded {} ({} bytes) to s3://{}/{}", path.display(), size, self.bucket, key);
        Ok(())
    }

    fn destination(&self) -> &str {
        &self.bucket
    }
}

pub struct SnsNotifier {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish(&self, notification: &Notification) -> ServiceResult<()> {
        let mut request = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(&notification.message);

        for (name, value) in &notification.attributes {
            let attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map_err(|err| ServiceError::Notification {
                    message: err.to_string(),
                })?;
            request = request.message_attributes(name, attribute);
        }

        request.send().await.map_err(|err| ServiceError::Notification {
            message: describe(&err),
        })?;
        debug!("Published notification to {}", self.topic_arn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadOutput;
    use aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadOutput;
    use aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadOutput;
    use aws_sdk_s3::operation::put_object::PutObjectOutput;
    use aws_sdk_s3::operation::upload_part::{UploadPartError, UploadPartOutput};
    use aws_sdk_sns::operation::publish::PublishOutput;
    use aws_sdk_ssm::operation::get_parameters_by_path::GetParametersByPathOutput;
    use aws_sdk_ssm::types::Parameter;
    use aws_smithy_mocks::{mock, mock_client, RuleMode};
    use std::path::PathBuf;
    use tempfile::TempDir;

    const BUCKET: &str = "destination";
    const KEY: &str = "b90862f3baceaae3b7418c78f9d50d52.tar.gz";

    fn parameter(name: &str, value: &str) -> Parameter {
        Parameter::builder().name(name).value(value).build()
    }

    fn package_file() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(KEY);
        std::fs::write(&path, b"compressed bag").unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_parameters_by_path_follows_pages() {
        let first_page = mock!(aws_sdk_ssm::Client::get_parameters_by_path)
            .match_requests(|req| {
                req.path() == Some("/dev/digitized_image_packaging")
                    && req.recursive() == Some(false)
                    && req.with_decryption() == Some(true)
                    && req.next_token().is_none()
            })
            .then_output(|| {
                GetParametersByPathOutput::builder()
                    .parameters(parameter(
                        "/dev/digitized_image_packaging/AS_BASEURL",
                        "http://localhost:8089",
                    ))
                    .parameters(parameter("/dev/digitized_image_packaging/AS_REPO", "2"))
                    .next_token("page-2")
                    .build()
            });
        let second_page = mock!(aws_sdk_ssm::Client::get_parameters_by_path)
            .match_requests(|req| req.next_token() == Some("page-2"))
            .then_output(|| {
                GetParametersByPathOutput::builder()
                    .parameters(parameter(
                        "/dev/digitized_image_packaging/AS_PASSWORD",
                        "secret",
                    ))
                    .build()
            });
        let store = SsmParameterStore {
            client: mock_client!(aws_sdk_ssm, RuleMode::Sequential, [&first_page, &second_page]),
        };

        let parameters = store
            .parameters_by_path("/dev/digitized_image_packaging")
            .await
            .unwrap();

        let expected: HashMap<String, String> = [
            ("AS_BASEURL", "http://localhost:8089"),
            ("AS_REPO", "2"),
            ("AS_PASSWORD", "secret"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(parameters, expected);
        assert_eq!(first_page.num_calls(), 1);
        assert_eq!(second_page.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_small_upload_uses_put_object() {
        let put = mock!(aws_sdk_s3::Client::put_object)
            .match_requests(|req| {
                req.bucket() == Some(BUCKET)
                    && req.key() == Some(KEY)
                    && req.content_type() == Some("application/gzip")
            })
            .then_output(|| PutObjectOutput::builder().build());
        let store = S3PackageStore {
            client: mock_client!(aws_sdk_s3, [&put]),
            bucket: BUCKET.to_string(),
        };
        let (_dir, path) = package_file();

        store.upload(&path, KEY, "application/gzip").await.unwrap();
        assert_eq!(put.num_calls(), 1);
        assert_eq!(store.destination(), BUCKET);
    }

    #[tokio::test]
    async fn test_multipart_upload_completes_parts() {
        let create = mock!(aws_sdk_s3::Client::create_multipart_upload)
            .match_requests(|req| req.content_type() == Some("application/gzip"))
            .then_output(|| {
                CreateMultipartUploadOutput::builder()
                    .upload_id("upload-1")
                    .build()
            });
        let part = mock!(aws_sdk_s3::Client::upload_part)
            .match_requests(|req| {
                req.upload_id() == Some("upload-1") && req.part_number() == Some(1)
            })
            .then_output(|| UploadPartOutput::builder().e_tag("etag-1").build());
        let complete = mock!(aws_sdk_s3::Client::complete_multipart_upload)
            .match_requests(|req| {
                req.multipart_upload().is_some_and(|upload| {
                    upload.parts().len() == 1 && upload.parts()[0].e_tag() == Some("etag-1")
                })
            })
            .then_output(|| CompleteMultipartUploadOutput::builder().build());
        let abort = mock!(aws_sdk_s3::Client::abort_multipart_upload)
            .then_output(|| AbortMultipartUploadOutput::builder().build());
        let store = S3PackageStore {
            client: mock_client!(aws_sdk_s3, [&create, &part, &complete, &abort]),
            bucket: BUCKET.to_string(),
        };
        let (_dir, path) = package_file();

        store
            .multipart_put(&path, KEY, "application/gzip")
            .await
            .unwrap();
        assert_eq!(complete.num_calls(), 1);
        assert_eq!(abort.num_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_part_aborts_multipart_upload() {
        let create = mock!(aws_sdk_s3::Client::create_multipart_upload).then_output(|| {
            CreateMultipartUploadOutput::builder()
                .upload_id("upload-1")
                .build()
        });
        let part = mock!(aws_sdk_s3::Client::upload_part).then_error(|| {
            UploadPartError::generic(
                ErrorMetadata::builder()
                    .code("AccessDenied")
                    .message("Access Denied")
                    .build(),
            )
        });
        let complete = mock!(aws_sdk_s3::Client::complete_multipart_upload)
            .then_output(|| CompleteMultipartUploadOutput::builder().build());
        let abort = mock!(aws_sdk_s3::Client::abort_multipart_upload)
            .match_requests(|req| {
                req.bucket() == Some(BUCKET)
                    && req.key() == Some(KEY)
                    && req.upload_id() == Some("upload-1")
            })
            .then_output(|| AbortMultipartUploadOutput::builder().build());
        let store = S3PackageStore {
            client: mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&create, &part, &complete, &abort]),
            bucket: BUCKET.to_string(),
        };
        let (_dir, path) = package_file();

        let err = store
            .multipart_put(&path, KEY, "application/gzip")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage { .. }));
        assert!(err.to_string().contains("AccessDenied"));
        assert_eq!(abort.num_calls(), 1);
        assert_eq!(complete.num_calls(), 0);
    }

    #[tokio::test]
    async fn test_publish_sends_string_attributes() {
        let publish = mock!(aws_sdk_sns::Client::publish)
            .match_requests(|req| {
                let attribute = |name: &str| {
                    req.message_attributes()
                        .and_then(|attributes| attributes.get(name))
                        .filter(|value| value.data_type() == "String")
                        .and_then(|value| value.string_value())
                };
                req.topic_arn() == Some("topic")
                    && req.message() == Some("Package abc successfully packaged.")
                    && attribute("outcome") == Some("SUCCESS")
                    && attribute("refid") == Some("abc")
                    && attribute("service") == Some("digitized_image_packaging")
            })
            .then_output(|| PublishOutput::builder().message_id("message-1").build());
        let notifier = SnsNotifier {
            client: mock_client!(aws_sdk_sns, [&publish]),
            topic_arn: "topic".to_string(),
        };

        notifier
            .publish(&Notification::success("abc"))
            .await
            .unwrap();
        assert_eq!(publish.num_calls(), 1);
    }
}
