use crate::http::build_client;
use crate::media::MediaUploader;
use once_cell::sync::Lazy;
use reqwest::{Client, Url, header};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub static POST_ENDPOINT_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("INSTAGRAM_BASE_URL").unwrap_or_else(|_| "https://www.instagram.com".to_string())
});

// The web endpoint refuses requests without a browser-shaped agent.
const FETCH_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid instagram post url")]
    InvalidUrl,
    #[error("post fetch failed: {0}")]
    Fetch(String),
    #[error("media download failed: {0}")]
    Download(String),
}

/// Caption plus hosted media URLs in post order. Consumed immediately by
/// the attribute extractor; never persisted.
#[derive(Debug, Clone)]
pub struct IngestedPost {
    pub caption: String,
    pub media_urls: Vec<String>,
}

/// Extract the shortcode from a post URL. Accepted shapes are
/// `…/p/<code>/` and `…/<username>/p/<code>/`, with or without a query
/// string; everything else is rejected.
pub fn parse_shortcode(url: &str) -> Result<String, IngestError> {
    let parsed = Url::parse(url).map_err(|_| IngestError::InvalidUrl)?;
    let segments: Vec<&str> = parsed
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    match segments.as_slice() {
        [.., "p", code] => Ok((*code).to_string()),
        _ => Err(IngestError::InvalidUrl),
    }
}

#[derive(Debug, Deserialize)]
struct PostPayload {
    #[serde(default)]
    graphql: Option<GraphqlEnvelope>,
}

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    #[serde(default)]
    shortcode_media: Option<ShortcodeMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShortcodeMedia {
    #[serde(default)]
    pub display_url: Option<String>,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub edge_media_to_caption: CaptionEdges,
    #[serde(default)]
    pub edge_sidecar_to_children: SidecarEdges,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptionEdges {
    #[serde(default)]
    pub edges: Vec<CaptionEdge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptionEdge {
    pub node: CaptionNode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptionNode {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SidecarEdges {
    #[serde(default)]
    pub edges: Vec<SidecarEdge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SidecarEdge {
    pub node: SidecarNode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SidecarNode {
    #[serde(default)]
    pub display_url: Option<String>,
    #[serde(default)]
    pub is_video: bool,
}

impl ShortcodeMedia {
    pub fn caption(&self) -> String {
        self.edge_media_to_caption
            .edges
            .first()
            .map(|edge| edge.node.text.clone())
            .unwrap_or_default()
    }

    /// Image URLs in post order. Sidecar children drive the order for
    /// carousel posts; single-media posts fall back to the top-level
    /// display URL. Videos are skipped.
    pub fn image_urls(&self) -> Vec<String> {
        let children = &self.edge_sidecar_to_children.edges;
        if !children.is_empty() {
            return children
                .iter()
                .filter(|edge| !edge.node.is_video)
                .filter_map(|edge| edge.node.display_url.clone())
                .collect();
        }
        if self.is_video {
            return Vec::new();
        }
        self.display_url.clone().into_iter().collect()
    }
}

/// Long-lived scraping session; constructed once at startup and shared
/// read-only by every request.
#[derive(Clone)]
pub struct InstagramClient {
    http: Client,
}

impl InstagramClient {
    pub fn new() -> Self {
        Self {
            http: build_client(),
        }
    }

    /// Fetch a post, mirror its images through the media host, and hand
    /// back the caption plus hosted URLs in post order. The scratch
    /// directory is removed before returning, success or failure.
    pub async fn ingest(
        &self,
        url: &str,
        scratch_dir: &Path,
        uploader: &MediaUploader,
    ) -> Result<IngestedPost, IngestError> {
        let result = self.ingest_inner(url, scratch_dir, uploader).await;
        clean_up_dir(scratch_dir).await;
        result
    }

    async fn ingest_inner(
        &self,
        url: &str,
        scratch_dir: &Path,
        uploader: &MediaUploader,
    ) -> Result<IngestedPost, IngestError> {
        let shortcode = parse_shortcode(url)?;
        let media = self.fetch_post(&shortcode).await?;
        let caption = media.caption();
        let files = self
            .download_media(&shortcode, &media.image_urls(), scratch_dir)
            .await?;

        let mut media_urls = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            if !is_image_file(file) {
                continue;
            }
            match uploader.upload(&file.to_string_lossy()).await {
                Some(hosted) => media_urls.push(hosted),
                None => {
                    warn!(
                        target = "catalog.social",
                        shortcode, index, "media_upload_skipped"
                    );
                }
            }
        }

        info!(
            target = "catalog.social",
            shortcode,
            media_count = media_urls.len(),
            "post_ingested"
        );
        Ok(IngestedPost {
            caption,
            media_urls,
        })
    }

    async fn fetch_post(&self, shortcode: &str) -> Result<ShortcodeMedia, IngestError> {
        let url = format!("{}/p/{shortcode}/?__a=1&__d=dis", *POST_ENDPOINT_ROOT);
        let response = self
            .http
            .get(url)
            .header(header::USER_AGENT, FETCH_USER_AGENT)
            .send()
            .await
            .map_err(|err| IngestError::Fetch(err.to_string()))?;
        if !response.status().is_success() {
            return Err(IngestError::Fetch(format!("HTTP {}", response.status())));
        }
        let payload: PostPayload = response
            .json()
            .await
            .map_err(|err| IngestError::Fetch(err.to_string()))?;
        payload
            .graphql
            .and_then(|envelope| envelope.shortcode_media)
            .ok_or_else(|| IngestError::Fetch("post payload missing media".into()))
    }

    /// Download post media into the scratch directory, one index-stamped
    /// file per media URL so the post order survives on disk.
    async fn download_media(
        &self,
        shortcode: &str,
        urls: &[String],
        scratch_dir: &Path,
    ) -> Result<Vec<PathBuf>, IngestError> {
        tokio::fs::create_dir_all(scratch_dir)
            .await
            .map_err(|err| IngestError::Download(err.to_string()))?;

        let mut files = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|err| IngestError::Download(err.to_string()))?;
            if !response.status().is_success() {
                return Err(IngestError::Download(format!(
                    "HTTP {} for media {index}",
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|err| IngestError::Download(err.to_string()))?;
            let path = scratch_dir.join(media_file_name(shortcode, index, url));
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|err| IngestError::Download(err.to_string()))?;
            files.push(path);
        }
        Ok(files)
    }
}

fn media_file_name(shortcode: &str, index: usize, url: &str) -> String {
    let extension = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path()
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
        })
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| "jpg".to_string());
    format!("{shortcode}_{index:02}.{extension}")
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

async fn clean_up_dir(dir: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(dir).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(
                target = "catalog.social",
                dir = %dir.display(),
                error = %err,
                "scratch_cleanup_failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::CloudinaryConfig;
    use serde_json::json;

    #[test]
    fn shortcode_from_bare_post_url() {
        assert_eq!(
            parse_shortcode("https://www.instagram.com/p/C6dV6ujNa1a/").expect("shortcode"),
            "C6dV6ujNa1a"
        );
    }

    #[test]
    fn shortcode_from_username_url_with_query() {
        assert_eq!(
            parse_shortcode("https://www.instagram.com/someuser/p/ABC123/?hl=en&img_index=1")
                .expect("shortcode"),
            "ABC123"
        );
    }

    #[test]
    fn shortcode_rejects_reels_and_junk() {
        assert!(matches!(
            parse_shortcode("https://www.instagram.com/reel/ABC123/"),
            Err(IngestError::InvalidUrl)
        ));
        assert!(matches!(
            parse_shortcode("https://www.instagram.com/p/"),
            Err(IngestError::InvalidUrl)
        ));
        assert!(matches!(
            parse_shortcode("not a url"),
            Err(IngestError::InvalidUrl)
        ));
    }

    #[test]
    fn carousel_media_keeps_post_order_and_skips_videos() {
        let media: ShortcodeMedia = serde_json::from_value(json!({
            "display_url": "https://cdn.example.com/cover.jpg",
            "edge_media_to_caption": {"edges": [{"node": {"text": "new drop #sale"}}]},
            "edge_sidecar_to_children": {"edges": [
                {"node": {"display_url": "https://cdn.example.com/1.jpg", "is_video": false}},
                {"node": {"display_url": "https://cdn.example.com/clip.mp4", "is_video": true}},
                {"node": {"display_url": "https://cdn.example.com/2.jpg", "is_video": false}}
            ]}
        }))
        .expect("deserialize");
        assert_eq!(media.caption(), "new drop #sale");
        assert_eq!(
            media.image_urls(),
            vec![
                "https://cdn.example.com/1.jpg".to_string(),
                "https://cdn.example.com/2.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn single_image_post_uses_display_url() {
        let media: ShortcodeMedia = serde_json::from_value(json!({
            "display_url": "https://cdn.example.com/only.jpg",
            "is_video": false
        }))
        .expect("deserialize");
        assert_eq!(media.caption(), "");
        assert_eq!(
            media.image_urls(),
            vec!["https://cdn.example.com/only.jpg".to_string()]
        );
    }

    #[test]
    fn video_post_without_children_has_no_images() {
        let media: ShortcodeMedia = serde_json::from_value(json!({
            "display_url": "https://cdn.example.com/clip.mp4",
            "is_video": true
        }))
        .expect("deserialize");
        assert!(media.image_urls().is_empty());
    }

    #[test]
    fn media_file_names_are_index_stamped() {
        assert_eq!(
            media_file_name("ABC", 0, "https://cdn.example.com/x/photo.jpg?sig=1"),
            "ABC_00.jpg"
        );
        assert_eq!(
            media_file_name("ABC", 3, "https://cdn.example.com/x/photo.PNG"),
            "ABC_03.png"
        );
        // unknown extensions fall back to jpg
        assert_eq!(
            media_file_name("ABC", 1, "https://cdn.example.com/x/stream"),
            "ABC_01.jpg"
        );
    }

    #[test]
    fn image_file_filter_matches_extensions() {
        assert!(is_image_file(Path::new("media/a_00.jpg")));
        assert!(is_image_file(Path::new("media/a_01.JPEG")));
        assert!(!is_image_file(Path::new("media/a_02.mp4")));
        assert!(!is_image_file(Path::new("media/a_03")));
    }

    #[tokio::test]
    async fn scratch_dir_is_removed_even_when_ingest_fails() {
        let base = tempfile::tempdir().expect("tempdir");
        let scratch = base.path().join("ingest-scratch");
        tokio::fs::create_dir_all(&scratch).await.expect("mkdir");
        tokio::fs::write(scratch.join("stale.jpg"), b"stale")
            .await
            .expect("write");

        let client = InstagramClient::new();
        let uploader = MediaUploader::new(CloudinaryConfig {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
        });
        let result = client
            .ingest("https://www.instagram.com/reel/ABC123/", &scratch, &uploader)
            .await;

        assert!(matches!(result, Err(IngestError::InvalidUrl)));
        assert!(!scratch.exists());
    }
}
