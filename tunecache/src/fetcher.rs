//! Source des octets audio
//!
//! Le cache ne sait pas d'où viennent les pistes : il demande à un
//! [`AudioFetcher`] la liste des formats disponibles pour une URL, choisit
//! le meilleur format audio seul, puis ouvre un flux d'octets sur ce format.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use serde::Deserialize;

use crate::error::Result;

/// Flux d'octets d'un format audio
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Un format de flux proposé par la source
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AudioFormat {
    /// Identifiant du format chez la source
    pub format_id: String,
    /// URL directe du flux
    #[serde(default)]
    pub url: String,
    /// Codec audio (`"none"` si absent)
    #[serde(default)]
    pub acodec: Option<String>,
    /// Codec vidéo (`"none"` si absent)
    #[serde(default)]
    pub vcodec: Option<String>,
    /// Débit audio moyen en kbit/s
    #[serde(default)]
    pub abr: Option<f64>,
    /// Extension du conteneur
    #[serde(default)]
    pub ext: Option<String>,
    /// En-têtes HTTP à renvoyer avec la requête
    #[serde(default)]
    pub http_headers: HashMap<String, String>,
}

fn codec_present(codec: &Option<String>) -> bool {
    matches!(codec.as_deref(), Some(c) if !c.is_empty() && c != "none")
}

impl AudioFormat {
    /// Vrai si le format porte de l'audio et aucune piste vidéo
    pub fn is_audio_only(&self) -> bool {
        codec_present(&self.acodec) && !codec_present(&self.vcodec)
    }

    fn bitrate(&self) -> f64 {
        self.abr.unwrap_or(0.0)
    }
}

/// Choisit le format audio seul de plus haut débit
///
/// À débit égal, le premier format de la liste gagne.
pub fn select_best_audio(formats: &[AudioFormat]) -> Option<&AudioFormat> {
    formats
        .iter()
        .filter(|f| f.is_audio_only() && !f.url.is_empty())
        .fold(None, |best: Option<&AudioFormat>, candidate| match best {
            Some(b) if b.bitrate() >= candidate.bitrate() => Some(b),
            _ => Some(candidate),
        })
}

/// Fournisseur de flux audio
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Liste les formats disponibles pour une URL de piste
    async fn formats(&self, url: &str) -> Result<Vec<AudioFormat>>;

    /// Ouvre un flux d'octets sur un format
    async fn open(&self, format: &AudioFormat) -> Result<ByteStream>;
}
