use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Client for the external video merge service.
///
/// The service concatenates the given clips in order, stores the result in
/// the same bucket, and answers with the merged object's URL.
#[derive(Clone)]
pub struct MediaClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct MergeRequest<'a> {
    clips: Vec<MergeClip<'a>>,
    output_folder: &'a str,
}

#[derive(Debug, Serialize)]
struct MergeClip<'a> {
    key: &'a str,
    order: i32,
}

#[derive(Debug, Deserialize)]
struct MergeResponse {
    url: String,
}

impl MediaClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Merges `(s3_key, order)` pairs, lowest order first.
    pub async fn merge(&self, clips: &[(String, i32)], output_folder: &str) -> Result<String, String> {
        let mut ordered: Vec<MergeClip<'_>> = clips
            .iter()
            .map(|(key, order)| MergeClip { key, order: *order })
            .collect();
        ordered.sort_by_key(|c| c.order);

        let response = self.client
            .post(format!("{}/merge", self.base_url))
            .json(&MergeRequest { clips: ordered, output_folder })
            .send()
            .await
            .map_err(|e| format!("merge request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("merge service returned {status}: {body}"));
        }

        let merged: MergeResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid merge response: {e}"))?;

        tracing::info!(clips = clips.len(), url = %merged.url, "clips merged");
        Ok(merged.url)
    }
}
