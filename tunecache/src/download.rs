use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use crate::error::{CacheError, Result};
use crate::fetcher::{select_best_audio, AudioFetcher};

/// Résultat partagé d'un téléchargement (chemin final ou message d'erreur)
type Outcome = Option<std::result::Result<PathBuf, String>>;

/// Objet représentant un téléchargement en cours
///
/// Il n'existe qu'entre la première demande d'une URL et la fin du
/// transfert. Tous les appelants qui demandent la même URL pendant ce
/// temps attendent le même objet et reçoivent le même résultat.
#[derive(Debug)]
pub struct Download {
    pk: String,
    source_url: String,
    /// Chemin final du fichier dans le cache
    path: PathBuf,
    /// Octets écrits jusqu'ici
    written: AtomicU64,
    outcome: watch::Sender<Outcome>,
}

impl Download {
    pub(crate) fn new(pk: &str, source_url: &str, path: PathBuf) -> Arc<Self> {
        let (outcome, _) = watch::channel(None);
        Arc::new(Self {
            pk: pk.to_string(),
            source_url: source_url.to_string(),
            path,
            written: AtomicU64::new(0),
            outcome,
        })
    }

    /// Clé de cache de la piste
    pub fn pk(&self) -> &str {
        &self.pk
    }

    /// URL demandée
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Chemin final du fichier
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Chemin du fichier partiel pendant le transfert
    pub fn part_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".part");
        PathBuf::from(name)
    }

    /// Nombre d'octets déjà écrits sur disque
    pub fn written_bytes(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Indique si le téléchargement est terminé (succès ou échec)
    pub fn finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Publie le résultat pour tous les appelants en attente
    pub(crate) fn finish(&self, outcome: std::result::Result<PathBuf, String>) {
        self.outcome.send_replace(Some(outcome));
    }

    /// Attend que le téléchargement soit complètement terminé
    pub async fn wait_until_finished(&self) -> Result<PathBuf> {
        let mut rx = self.outcome.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CacheError::DownloadFailed("download abandoned".to_string()))?;

        match &*outcome {
            Some(Ok(path)) => Ok(path.clone()),
            Some(Err(message)) => Err(CacheError::DownloadFailed(message.clone())),
            None => Err(CacheError::DownloadFailed("download abandoned".to_string())),
        }
    }

    /// Télécharge la piste dans le fichier partiel puis le renomme
    ///
    /// En cas d'échec le fichier partiel est supprimé.
    pub(crate) async fn run(&self, fetcher: &dyn AudioFetcher) -> Result<PathBuf> {
        let part = self.part_path();
        match self.transfer(fetcher, &part).await {
            Ok(()) => {
                tokio::fs::rename(&part, &self.path).await?;
                Ok(self.path.clone())
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %part.display(), error = %rm, "Failed to remove partial file");
                    }
                }
                Err(e)
            }
        }
    }

    async fn transfer(&self, fetcher: &dyn AudioFetcher, part: &Path) -> Result<()> {
        let formats = fetcher.formats(&self.source_url).await?;
        let format = select_best_audio(&formats)
            .ok_or_else(|| CacheError::NoAudioFormat(self.source_url.clone()))?;

        tracing::debug!(
            pk = %self.pk,
            format = %format.format_id,
            abr = ?format.abr,
            "Selected audio format"
        );

        let mut stream = fetcher.open(format).await?;
        let mut file = tokio::fs::File::create(part).await?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            self.written.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }

        file.flush().await?;
        file.sync_all().await?;

        if self.written_bytes() == 0 {
            return Err(CacheError::Fetch(format!(
                "empty stream for {}",
                self.source_url
            )));
        }
        Ok(())
    }
}
