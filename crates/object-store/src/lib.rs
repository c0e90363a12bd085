use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::presigning::PresigningConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("object {object_key:?} not found")]
    NotFound { object_key: String },
    #[error("access denied during {operation}: {message}")]
    AccessDenied { operation: String, message: String },
    #[error("{operation} failed for {object_key:?} ({code}): {message}")]
    Operation {
        operation: String,
        object_key: String,
        code: String,
        message: String,
    },
    #[error("batch delete failed for {0} objects")]
    BatchDelete(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// ObjectStore is the gateway to uploaded document blobs. The S3 client is
/// the production implementation; tests substitute an in-memory fake.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// A presigned PUT URL for a pending upload, typed by file extension.
    async fn presigned_upload_url(&self, object_key: &str, file_name: &str)
        -> Result<String, Error>;

    async fn object_exists(&self, object_key: &str) -> Result<bool, Error>;

    /// Download an object to a unique path under the system temp directory,
    /// preserving the object's extension. The caller removes the file.
    async fn download_to_temp(&self, object_key: &str) -> Result<PathBuf, Error>;

    /// Delete one object. A key that is already absent counts as deleted.
    async fn delete_object(&self, object_key: &str) -> Result<(), Error>;

    async fn delete_objects(&self, object_keys: &[String]) -> Result<(), Error>;
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    presign_lifetime: Duration,
}

impl S3ObjectStore {
    pub fn new(
        client: aws_sdk_s3::Client,
        bucket: String,
        presign_lifetime: Duration,
    ) -> Self {
        Self {
            client,
            bucket,
            presign_lifetime,
        }
    }

    fn classify<E>(operation: &str, object_key: &str, err: &E) -> Error
    where
        E: ProvideErrorMetadata,
    {
        let code = err.code().unwrap_or("Unknown").to_string();
        let message = err.message().unwrap_or_default().to_string();

        match code.as_str() {
            "AccessDenied" => Error::AccessDenied {
                operation: operation.to_string(),
                message,
            },
            "NoSuchKey" | "NotFound" | "404" => Error::NotFound {
                object_key: object_key.to_string(),
            },
            _ => Error::Operation {
                operation: operation.to_string(),
                object_key: object_key.to_string(),
                code,
                message,
            },
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presigned_upload_url(
        &self,
        object_key: &str,
        file_name: &str,
    ) -> Result<String, Error> {
        let presigning = PresigningConfig::expires_in(self.presign_lifetime).map_err(|err| {
            Error::Operation {
                operation: "presign".to_string(),
                object_key: object_key.to_string(),
                code: "InvalidExpiry".to_string(),
                message: err.to_string(),
            }
        })?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key);

        if let Some(content_type) = models::content_type_for(file_name) {
            request = request.content_type(content_type);
        }

        let presigned = request
            .presigned(presigning)
            .await
            .map_err(|err| Self::classify("presign", object_key, &err))?;

        Ok(presigned.uri().to_string())
    }

    async fn object_exists(&self, object_key: &str) -> Result<bool, Error> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or_default()
                {
                    return Ok(false);
                }
                Err(Self::classify("head", object_key, &err))
            }
        }
    }

    async fn download_to_temp(&self, object_key: &str) -> Result<PathBuf, Error> {
        let extension = models::extension_of(object_key).unwrap_or_default();
        let path =
            std::env::temp_dir().join(format!("{}{extension}", uuid::Uuid::new_v4()));

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|err| Self::classify("download", object_key, &err))?;

        let body = response.body.collect().await.map_err(|err| Error::Operation {
            operation: "download".to_string(),
            object_key: object_key.to_string(),
            code: "BodyRead".to_string(),
            message: err.to_string(),
        })?;
        tokio::fs::write(&path, body.into_bytes()).await?;

        tracing::debug!(object_key, path = %path.display(), "downloaded object");
        Ok(path)
    }

    async fn delete_object(&self, object_key: &str) -> Result<(), Error> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            // An absent object is an acceptable outcome of deletion.
            Err(err) => match Self::classify("delete", object_key, &err) {
                Error::NotFound { object_key } => {
                    tracing::warn!(object_key, "object was already absent");
                    Ok(())
                }
                other => Err(other),
            },
        }
    }

    async fn delete_objects(&self, object_keys: &[String]) -> Result<(), Error> {
        if object_keys.is_empty() {
            return Ok(());
        }

        let objects: Vec<_> = object_keys
            .iter()
            .map(|key| {
                aws_sdk_s3::types::ObjectIdentifier::builder()
                    .key(key)
                    .build()
                    .map_err(|err| Error::Operation {
                        operation: "batch delete".to_string(),
                        object_key: key.clone(),
                        code: "BuildError".to_string(),
                        message: err.to_string(),
                    })
            })
            .collect::<Result<_, _>>()?;

        let delete = aws_sdk_s3::types::Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .map_err(|err| Error::Operation {
                operation: "batch delete".to_string(),
                object_key: String::new(),
                code: "BuildError".to_string(),
                message: err.to_string(),
            })?;

        let response = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|err| Self::classify("batch delete", "", &err))?;

        let errors = response.errors();
        if !errors.is_empty() {
            for error in errors {
                tracing::error!(
                    key = error.key().unwrap_or_default(),
                    code = error.code().unwrap_or_default(),
                    message = error.message().unwrap_or_default(),
                    "object deletion failed within batch"
                );
            }
            return Err(Error::BatchDelete(errors.len()));
        }

        tracing::info!(
            deleted = response.deleted().len(),
            "batch object deletion completed"
        );
        Ok(())
    }
}
