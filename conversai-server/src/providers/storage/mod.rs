pub mod cloudinary;

pub use cloudinary::CloudinaryClient;

use async_trait::async_trait;
use bytes::Bytes;

use super::ProviderError;

/// A file received from a client, ready to be stored.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Where an uploaded file ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, file: UploadFile) -> Result<StoredObject, ProviderError>;
}
