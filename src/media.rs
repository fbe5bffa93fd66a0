use crate::http::build_client;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;

// Every upload is stretched to a fixed square; aspect ratio is not kept.
const TRANSFORMATION: &str = "c_fill,h_1000,w_1000";

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Pushes images to the hosting service and hands back secure URLs.
/// Failures are logged and collapse to `None`; nothing is raised.
#[derive(Clone)]
pub struct MediaUploader {
    http: Client,
    config: CloudinaryConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl MediaUploader {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    pub async fn upload(&self, source: &str) -> Option<String> {
        self.upload_as(source, "image").await
    }

    /// Normalize an image source to a hosted URL. Data-URI sources are
    /// decoded and uploaded as bytes; anything else is treated as a local
    /// file path, uploaded, and the file removed on success.
    pub async fn upload_as(&self, source: &str, resource_kind: &str) -> Option<String> {
        if source.starts_with("data:image") {
            let bytes = match decode_data_uri(source) {
                Some(bytes) => bytes,
                None => {
                    warn!(target = "catalog.media", "inline image payload is not valid base64");
                    return None;
                }
            };
            return self.upload_bytes(bytes, resource_kind).await;
        }

        let path = Path::new(source);
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target = "catalog.media", source, error = %err, "media_read_failed");
                return None;
            }
        };
        let url = self.upload_bytes(bytes, resource_kind).await?;
        if let Err(err) = tokio::fs::remove_file(path).await {
            warn!(target = "catalog.media", source, error = %err, "media_cleanup_failed");
        }
        Some(url)
    }

    async fn upload_bytes(&self, bytes: Vec<u8>, resource_kind: &str) -> Option<String> {
        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign_upload(timestamp, TRANSFORMATION, &self.config.api_secret);
        let form = Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("transformation", TRANSFORMATION)
            .text("signature", signature)
            .part("file", Part::bytes(bytes).file_name("upload"));

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/{}/upload",
            self.config.cloud_name, resource_kind
        );
        let response = match self.http.post(url).multipart(form).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(target = "catalog.media", error = %err, "media_upload_failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(
                target = "catalog.media",
                status = %response.status(),
                "media_upload_rejected"
            );
            return None;
        }
        match response.json::<UploadResponse>().await {
            Ok(body) => Some(body.secure_url),
            Err(err) => {
                warn!(target = "catalog.media", error = %err, "media_upload_unparsable");
                None
            }
        }
    }
}

fn decode_data_uri(source: &str) -> Option<Vec<u8>> {
    // "data:image/png;base64,AAAA" -> payload after the first comma
    let payload = source
        .split_once(',')
        .map(|(_, payload)| payload)
        .unwrap_or(source);
    BASE64.decode(payload).ok()
}

// Cloudinary signs the alphabetically-sorted parameter string with the
// account secret appended; `file` and `api_key` are excluded.
fn sign_upload(timestamp: i64, transformation: &str, secret: &str) -> String {
    let to_sign = format!("timestamp={timestamp}&transformation={transformation}{secret}");
    hex::encode(Sha256::digest(to_sign.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_data_uri_strips_prefix() {
        let encoded = BASE64.encode(b"fake image bytes");
        let source = format!("data:image/png;base64,{encoded}");
        assert_eq!(
            decode_data_uri(&source).expect("decode"),
            b"fake image bytes"
        );
    }

    #[test]
    fn decode_data_uri_accepts_bare_base64() {
        let encoded = BASE64.encode(b"raw");
        assert_eq!(decode_data_uri(&encoded).expect("decode"), b"raw");
    }

    #[test]
    fn decode_data_uri_rejects_garbage() {
        assert!(decode_data_uri("data:image/png;base64,!!not-base64!!").is_none());
    }

    #[test]
    fn sign_upload_is_deterministic_per_secret() {
        let a = sign_upload(1_700_000_000, TRANSFORMATION, "secret-a");
        let b = sign_upload(1_700_000_000, TRANSFORMATION, "secret-a");
        let c = sign_upload(1_700_000_000, TRANSFORMATION, "secret-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn transformation_is_fixed_square_fill() {
        assert_eq!(TRANSFORMATION, "c_fill,h_1000,w_1000");
    }
}
