//! Types d'erreurs du cache audio

use thiserror::Error;

/// Erreurs du cache audio
#[derive(Error, Debug)]
pub enum CacheError {
    /// Erreur d'entrée/sortie sur le répertoire du cache
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur de l'index SQLite
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Erreur HTTP pendant le transfert
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Réponse de yt-dlp illisible
    #[error("Invalid format listing: {0}")]
    Json(#[from] serde_json::Error),

    /// Le fetcher n'a pas pu lister ou ouvrir la source
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Aucun format audio seul disponible pour cette URL
    #[error("No audio-only format available for {0}")]
    NoAudioFormat(String),

    /// Échec d'un téléchargement partagé (message repris pour chaque appelant)
    #[error("Download failed: {0}")]
    DownloadFailed(String),
}

/// Type Result spécialisé pour tunecache
pub type Result<T> = std::result::Result<T, CacheError>;
