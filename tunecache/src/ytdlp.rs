//! Fetcher par défaut : `yt-dlp` pour lister les formats, `reqwest` pour le transfert

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tokio::process::Command;

use crate::error::{CacheError, Result};
use crate::fetcher::{AudioFetcher, AudioFormat, ByteStream};

/// Programme lancé par défaut
pub const DEFAULT_PROGRAM: &str = "yt-dlp";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    formats: Vec<AudioFormat>,
}

/// Fetcher qui interroge `yt-dlp -J` puis télécharge le flux choisi
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: String,
    client: reqwest::Client,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl YtDlpFetcher {
    pub fn new(program: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            program: program.into(),
            client,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn headers(format: &AudioFormat) -> HeaderMap {
        format
            .http_headers
            .iter()
            .filter_map(|(k, v)| {
                let name = HeaderName::from_bytes(k.as_bytes()).ok()?;
                let value = HeaderValue::from_str(v).ok()?;
                Some((name, value))
            })
            .collect()
    }
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn formats(&self, url: &str) -> Result<Vec<AudioFormat>> {
        tracing::debug!(program = %self.program, url = %url, "Listing stream formats");

        let output = Command::new(&self.program)
            .args(["-J", "--no-playlist", "--no-warnings", url])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CacheError::Fetch(format!("cannot run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CacheError::Fetch(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let info: VideoInfo = serde_json::from_slice(&output.stdout)?;
        Ok(info.formats)
    }

    async fn open(&self, format: &AudioFormat) -> Result<ByteStream> {
        let response = self
            .client
            .get(&format.url)
            .headers(Self::headers(format))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes_stream().map_err(CacheError::from).boxed())
    }
}
