use std::collections::HashMap;

use axum::extract::Multipart;

use courtside_shared::errors::{AppError, AppResult, ErrorCode};

use crate::services::upload_service::UploadedFile;

/// A multipart body split into text fields and file parts.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, Vec<String>>,
    files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::new(ErrorCode::ValidationError, format!("multipart error: {e}")))?
        {
            let name = field.name().unwrap_or("").to_string();

            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::new(ErrorCode::ValidationError, format!("failed to read file: {e}")))?;
                    if data.is_empty() {
                        continue;
                    }
                    form.files.push(UploadedFile {
                        field: name,
                        filename: Some(filename),
                        content_type,
                        data: data.to_vec(),
                    });
                }
                None => {
                    let value = field.text().await.unwrap_or_default();
                    form.fields.entry(name).or_default().push(value);
                }
            }
        }

        Ok(form)
    }

    /// First non-blank value of a text field.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)?
            .iter()
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// All values of a repeated field. A single JSON array value is expanded.
    pub fn list(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .map(|values| values.iter().flat_map(|v| expand_list_value(v)).collect())
            .unwrap_or_default()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Removes and returns the file parts sent under `name`.
    pub fn take_files(&mut self, name: &str) -> Vec<UploadedFile> {
        let (taken, rest) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|f| f.field == name);
        self.files = rest;
        taken
    }
}

fn expand_list_value(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return items;
        }
    }
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)], files: &[&str]) -> MultipartForm {
        let mut f = MultipartForm::default();
        for (k, v) in fields {
            f.fields.entry(k.to_string()).or_default().push(v.to_string());
        }
        for name in files {
            f.files.push(UploadedFile {
                field: name.to_string(),
                filename: Some(format!("{name}.png")),
                content_type: "image/png".into(),
                data: vec![1, 2, 3],
            });
        }
        f
    }

    #[test]
    fn text_skips_blank_values() {
        let f = form(&[("caption", "  "), ("caption", " hello ")], &[]);
        assert_eq!(f.text("caption").as_deref(), Some("hello"));
        assert_eq!(f.text("missing"), None);
    }

    #[test]
    fn list_accepts_repeated_and_json_values() {
        let repeated = form(&[("kept_image_urls", "a"), ("kept_image_urls", "b")], &[]);
        assert_eq!(repeated.list("kept_image_urls"), ["a", "b"]);

        let json = form(&[("kept_image_urls", r#"["x","y"]"#)], &[]);
        assert_eq!(json.list("kept_image_urls"), ["x", "y"]);

        let empty = form(&[("kept_image_urls", "")], &[]);
        assert!(empty.list("kept_image_urls").is_empty());
        assert!(empty.has_field("kept_image_urls"));
    }

    #[test]
    fn take_files_filters_by_field() {
        let mut f = form(&[], &["images", "clips", "images"]);
        assert_eq!(f.take_files("images").len(), 2);
        assert_eq!(f.take_files("images").len(), 0);
        assert_eq!(f.take_files("clips").len(), 1);
    }
}
