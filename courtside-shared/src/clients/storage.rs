use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::Client as S3Client;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Custom endpoint for S3-compatible stores. `None` targets AWS.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Base URL objects are served from. Defaults to the virtual-hosted AWS URL.
    pub public_url: Option<String>,
}

#[derive(Clone)]
pub struct StorageClient {
    client: S3Client,
    bucket: String,
    public_base: String,
}

impl StorageClient {
    pub fn new(settings: &StorageSettings) -> Self {
        let credentials = Credentials::new(
            &settings.access_key,
            &settings.secret_key,
            None,
            None,
            "courtside",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = S3Client::from_conf(builder.build());

        tracing::info!(bucket = %settings.bucket, region = %settings.region, "object storage client initialized");

        Self {
            client,
            bucket: settings.bucket.clone(),
            public_base: public_base(settings),
        }
    }

    /// Uploads under `{folder}/{uuid}.{ext}` and returns the public URL.
    pub async fn upload(
        &self,
        folder: &str,
        ext: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadedObject, String> {
        let key = format!("{folder}/{}.{ext}", Uuid::new_v4());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body.into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| format!("upload failed: {e}"))?;

        let url = self.url_for(&key);
        tracing::debug!(key = %key, "object uploaded");
        Ok(UploadedObject { key, url })
    }

    pub async fn delete(&self, key: &str) -> Result<(), String> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| format!("delete failed: {e}"))?;

        Ok(())
    }

    pub async fn delete_by_url(&self, url: &str) -> Result<(), String> {
        let key = self
            .key_from_url(url)
            .ok_or_else(|| format!("url does not belong to bucket {}", self.bucket))?;
        self.delete(key).await
    }

    /// Deletes and only logs on failure. Used when cleanup must not fail the request.
    pub async fn delete_quietly(&self, url: &str) {
        if let Err(e) = self.delete_by_url(url).await {
            tracing::warn!(url = %url, error = %e, "failed to delete stored object");
        }
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base)
    }

    pub fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        strip_base(&self.public_base, url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub key: String,
    pub url: String,
}

fn public_base(settings: &StorageSettings) -> String {
    match &settings.public_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => format!("https://{}.s3.{}.amazonaws.com", settings.bucket, settings.region),
    }
}

fn strip_base<'a>(base: &str, url: &'a str) -> Option<&'a str> {
    url.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|key| !key.is_empty())
}

/// File extension from an uploaded filename, falling back to the mime subtype.
pub fn extension_for(filename: Option<&str>, content_type: &str) -> String {
    filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .unwrap_or_else(|| {
            content_type
                .split_once('/')
                .map(|(_, sub)| sub.split(';').next().unwrap_or("bin").to_string())
                .unwrap_or_else(|| "bin".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(public_url: Option<&str>) -> StorageSettings {
        StorageSettings {
            endpoint: None,
            region: "us-east-1".into(),
            bucket: "courtside".into(),
            access_key: "k".into(),
            secret_key: "s".into(),
            public_url: public_url.map(str::to_string),
        }
    }

    #[test]
    fn default_base_is_virtual_hosted() {
        assert_eq!(public_base(&settings(None)), "https://courtside.s3.us-east-1.amazonaws.com");
        assert_eq!(public_base(&settings(Some("http://cdn.local/"))), "http://cdn.local");
    }

    #[test]
    fn key_is_recovered_from_url() {
        let base = "https://courtside.s3.us-east-1.amazonaws.com";
        assert_eq!(
            strip_base(base, "https://courtside.s3.us-east-1.amazonaws.com/posts/images/a.jpg"),
            Some("posts/images/a.jpg")
        );
        assert_eq!(strip_base(base, "https://elsewhere.com/a.jpg"), None);
        assert_eq!(strip_base(base, &format!("{base}/")), None);
    }

    #[test]
    fn extension_prefers_filename() {
        assert_eq!(extension_for(Some("clip.MOV"), "video/quicktime"), "mov");
        assert_eq!(extension_for(None, "image/png"), "png");
        assert_eq!(extension_for(Some("noext"), "application/pdf"), "pdf");
    }
}
