use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use sha1::{Digest, Sha1};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::{CacheEntry, DB};
use crate::download::Download;
use crate::error::Result;
use crate::fetcher::AudioFetcher;

/// Extension des fichiers audio en cache
pub const DEFAULT_EXTENSION: &str = "opus";

/// Durée de vie d'un fichier en cache
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

const TABLE_NAME: &str = "audio_cache";
const DB_FILE: &str = "cache.db";
const PART_SUFFIX: &str = ".part";

type Downloads = Arc<Mutex<HashMap<String, Arc<Download>>>>;

/// Génère la clé de cache d'une URL (SHA1 hexadécimal)
///
/// ```
/// let pk = tunecache::pk_from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
/// assert_eq!(pk.len(), 40);
/// ```
pub fn pk_from_url(url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

fn lock(downloads: &Downloads) -> MutexGuard<'_, HashMap<String, Arc<Download>>> {
    downloads.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache audio sur disque
///
/// Conçu pour être partagé derrière un `Arc<AudioCache>`. La map des
/// téléchargements en cours est protégée par un `Mutex` synchrone : la
/// vérification et l'enregistrement d'un téléchargement se font sous le
/// même verrou, sans point de suspension entre les deux.
pub struct AudioCache {
    dir: PathBuf,
    extension: String,
    ttl: Duration,
    db: Arc<DB>,
    fetcher: Arc<dyn AudioFetcher>,
    downloads: Downloads,
}

impl std::fmt::Debug for AudioCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCache")
            .field("dir", &self.dir)
            .field("extension", &self.extension)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl AudioCache {
    /// Crée un cache dans `dir` avec l'extension et le TTL par défaut
    pub fn new(dir: impl Into<PathBuf>, fetcher: Arc<dyn AudioFetcher>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let db = DB::init(&dir.join(DB_FILE), TABLE_NAME)?;

        Ok(Self {
            dir,
            extension: DEFAULT_EXTENSION.to_string(),
            ttl: DEFAULT_TTL,
            db: Arc::new(db),
            fetcher,
            downloads: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn db(&self) -> Arc<DB> {
        Arc::clone(&self.db)
    }

    /// Chemin du fichier d'une clé
    pub fn file_path(&self, pk: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", pk, self.extension))
    }

    /// Chemin du fichier d'une URL, qu'il existe ou non
    pub fn path_for_url(&self, url: &str) -> PathBuf {
        self.file_path(&pk_from_url(url))
    }

    /// Indique si l'URL est déjà matérialisée sur disque
    pub fn contains(&self, url: &str) -> bool {
        self.path_for_url(url).exists()
    }

    /// Entrée d'index d'une URL
    pub fn entry(&self, url: &str) -> Result<Option<CacheEntry>> {
        Ok(self.db.get(&pk_from_url(url))?)
    }

    /// Toutes les entrées de l'index
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.db.get_all()?)
    }

    /// Retourne un fichier audio local pour l'URL
    ///
    /// - fichier présent : retour immédiat, sans réseau
    /// - téléchargement déjà en cours : attend et partage son résultat
    /// - sinon : lance le téléchargement et l'attend
    ///
    /// N appels concurrents pour la même URL ne produisent qu'un seul
    /// téléchargement. Si l'appelant abandonne, le téléchargement continue
    /// et remplit le cache.
    pub async fn materialize(&self, url: &str) -> Result<PathBuf> {
        let pk = pk_from_url(url);
        let path = self.file_path(&pk);

        let (download, owner) = {
            let mut downloads = lock(&self.downloads);
            if let Some(existing) = downloads.get(&pk) {
                debug!(pk = %pk, "Download already in progress, waiting for it");
                (Arc::clone(existing), false)
            } else if path.exists() {
                drop(downloads);
                debug!(pk = %pk, "Cache hit");
                self.touch(&pk);
                return Ok(path);
            } else {
                let download = Download::new(&pk, url, path);
                downloads.insert(pk.clone(), Arc::clone(&download));
                (download, true)
            }
        };

        if owner {
            self.spawn_download(Arc::clone(&download));
        }

        download.wait_until_finished().await
    }

    fn spawn_download(&self, download: Arc<Download>) {
        let fetcher = Arc::clone(&self.fetcher);
        let downloads = Arc::clone(&self.downloads);
        let db = Arc::clone(&self.db);

        info!(pk = %download.pk(), url = %download.source_url(), "Starting download");

        tokio::spawn(async move {
            let outcome = download.run(fetcher.as_ref()).await;

            match &outcome {
                Ok(path) => {
                    if let Err(e) = db.add(download.pk(), download.source_url()) {
                        warn!(pk = %download.pk(), error = %e, "Failed to index cached file");
                    }
                    info!(
                        pk = %download.pk(),
                        bytes = download.written_bytes(),
                        path = %path.display(),
                        "Download finished"
                    );
                }
                Err(e) => {
                    warn!(pk = %download.pk(), url = %download.source_url(), error = %e, "Download failed");
                }
            }

            // Retrait et publication sous le même verrou
            let mut map = lock(&downloads);
            map.remove(download.pk());
            download.finish(outcome.map_err(|e| e.to_string()));
        });
    }

    fn touch(&self, pk: &str) {
        if let Err(e) = self.db.update_hit(pk) {
            warn!(pk = %pk, error = %e, "Failed to record cache hit");
        }
    }

    /// Téléchargements en cours
    pub fn in_flight(&self) -> Vec<Arc<Download>> {
        lock(&self.downloads).values().cloned().collect()
    }

    /// Téléchargement en cours pour une URL
    pub fn get_download(&self, url: &str) -> Option<Arc<Download>> {
        lock(&self.downloads).get(&pk_from_url(url)).cloned()
    }

    /// Lance en arrière-plan la matérialisation de plusieurs URLs
    ///
    /// Ne bloque pas ; les échecs sont seulement journalisés.
    pub fn preload<I, S>(self: &Arc<Self>, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for url in urls {
            let url = url.into();
            let cache = Arc::clone(self);
            tokio::spawn(async move {
                match cache.materialize(&url).await {
                    Ok(_) => debug!(url = %url, "Preloaded"),
                    Err(e) => warn!(url = %url, error = %e, "Preload failed"),
                }
            });
        }
    }

    /// Supprime les fichiers plus vieux que le TTL
    pub fn sweep(&self) -> Result<usize> {
        self.sweep_at(SystemTime::now())
    }

    /// Purge avec une horloge explicite
    ///
    /// Un fichier est supprimé si `now - mtime` dépasse strictement le TTL.
    /// Les fichiers partiels des téléchargements en cours sont conservés.
    pub fn sweep_at(&self, now: SystemTime) -> Result<usize> {
        let suffix = format!(".{}", self.extension);
        let part_suffix = format!("{suffix}{PART_SUFFIX}");
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();

            let (pk, partial) = if let Some(pk) = name.strip_suffix(&part_suffix) {
                (pk.to_string(), true)
            } else if let Some(pk) = name.strip_suffix(&suffix) {
                (pk.to_string(), false)
            } else {
                continue;
            };

            if partial && lock(&self.downloads).contains_key(&pk) {
                continue;
            }

            let modified = entry.metadata()?.modified()?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= self.ttl {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    removed += 1;
                    debug!(file = %name, age_secs = age.as_secs(), "Evicted from cache");
                    if !partial {
                        self.db.delete(&pk)?;
                    }
                }
                Err(e) => warn!(file = %name, error = %e, "Failed to evict cached file"),
            }
        }

        if removed > 0 {
            info!(removed, dir = %self.dir.display(), "Cache sweep done");
        }
        Ok(removed)
    }

    /// Lance la purge périodique
    ///
    /// Le premier passage a lieu après `period` : la purge au démarrage
    /// est à la charge de l'appelant.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Err(e) = cache.sweep() {
                    warn!(error = %e, "Cache sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pk_is_stable_and_distinct() {
        let a = pk_from_url("https://youtu.be/a");
        assert_eq!(a, pk_from_url("https://youtu.be/a"));
        assert_ne!(a, pk_from_url("https://youtu.be/b"));
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
