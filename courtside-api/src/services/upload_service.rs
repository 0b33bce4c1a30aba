use serde::Serialize;

use courtside_shared::clients::storage::{extension_for, StorageClient, UploadedObject};
use courtside_shared::errors::{AppError, AppResult, ErrorCode};

/// One file part read from a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub filename: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttachmentKind {
    Image,
    Video,
    File,
}

impl AttachmentKind {
    pub fn from_mime(content_type: &str) -> Self {
        if content_type.starts_with("image/") {
            AttachmentKind::Image
        } else if content_type.starts_with("video/") {
            AttachmentKind::Video
        } else {
            AttachmentKind::File
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::Image => "IMAGE",
            AttachmentKind::Video => "VIDEO",
            AttachmentKind::File => "FILE",
        }
    }

    pub fn chat_folder(self) -> &'static str {
        match self {
            AttachmentKind::Image => "chat/images",
            AttachmentKind::Video => "chat/videos",
            AttachmentKind::File => "chat/files",
        }
    }
}

pub async fn store(storage: &StorageClient, folder: &str, file: UploadedFile) -> AppResult<UploadedObject> {
    let ext = extension_for(file.filename.as_deref(), &file.content_type);
    storage
        .upload(folder, &ext, file.data, &file.content_type)
        .await
        .map_err(|e| {
            tracing::error!(folder = %folder, error = %e, "upload failed");
            AppError::new(ErrorCode::UploadFailed, "File upload failed")
        })
}

/// Uploads every file into `folder`, returning their public urls in order.
/// Objects already stored are removed again if a later upload fails.
pub async fn store_all(storage: &StorageClient, folder: &str, files: Vec<UploadedFile>) -> AppResult<Vec<String>> {
    let mut urls = Vec::with_capacity(files.len());
    for file in files {
        match store(storage, folder, file).await {
            Ok(object) => urls.push(object.url),
            Err(e) => {
                for url in &urls {
                    storage.delete_quietly(url).await;
                }
                return Err(e);
            }
        }
    }
    Ok(urls)
}

/// Passes `result` through, first removing the freshly stored `urls` when it is an error.
pub async fn discard_on_error<T>(storage: &StorageClient, urls: &[String], result: AppResult<T>) -> AppResult<T> {
    if result.is_err() {
        for url in urls {
            storage.delete_quietly(url).await;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtside_shared::clients::storage::StorageSettings;

    fn storage() -> StorageClient {
        StorageClient::new(&StorageSettings {
            endpoint: Some("http://127.0.0.1:9".into()),
            region: "us-east-1".into(),
            bucket: "courtside-test".into(),
            access_key: "k".into(),
            secret_key: "s".into(),
            public_url: Some("http://cdn.test".into()),
        })
    }

    #[tokio::test]
    async fn failed_write_keeps_its_error_after_cleanup() {
        // foreign urls resolve to no key, so cleanup never leaves the process
        let urls = vec!["https://elsewhere.test/posts/images/a.jpg".to_string()];
        let failed: AppResult<()> = Err(AppError::bad_request("write failed"));

        let err = discard_on_error(&storage(), &urls, failed).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::BadRequest);
    }

    #[tokio::test]
    async fn successful_write_is_returned_untouched() {
        let urls = vec!["http://cdn.test/posts/images/a.jpg".to_string()];
        let kept = discard_on_error(&storage(), &urls, Ok(7)).await.unwrap();
        assert_eq!(kept, 7);
    }

    #[test]
    fn attachment_kind_follows_mime_prefix() {
        assert_eq!(AttachmentKind::from_mime("image/png"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::from_mime("video/mp4"), AttachmentKind::Video);
        assert_eq!(AttachmentKind::from_mime("application/pdf"), AttachmentKind::File);
        assert_eq!(AttachmentKind::Video.chat_folder(), "chat/videos");
        assert_eq!(serde_json::to_value(AttachmentKind::File).unwrap(), "FILE");
    }
}
