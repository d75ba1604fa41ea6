//! Index SQLite des pistes en cache
//!
//! Les fichiers audio restent la source de vérité : une entrée n'est
//! ajoutée qu'après un téléchargement réussi et supprimée par la purge
//! en même temps que le fichier.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Entrée de cache représentant une piste téléchargée
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CacheEntry {
    /// Clé primaire (hash SHA1 de l'URL)
    pub pk: String,
    /// URL source de la piste
    pub source_url: String,
    /// Nombre de réutilisations du fichier
    pub hits: i64,
    /// Date d'ajout (RFC3339)
    pub created_at: String,
    /// Date du dernier accès (RFC3339)
    pub last_used: Option<String>,
}

impl CacheEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            pk: row.get(0)?,
            source_url: row.get(1)?,
            hits: row.get(2)?,
            created_at: row.get(3)?,
            last_used: row.get(4)?,
        })
    }
}

/// Base de données SQLite du cache
#[derive(Debug)]
pub struct DB {
    conn: Mutex<Connection>,
    table_name: String,
}

impl DB {
    /// Ouvre (ou crée) la base et sa table
    ///
    /// ```rust,no_run
    /// use tunecache::db::DB;
    /// use std::path::Path;
    ///
    /// let db = DB::init(Path::new("cache.db"), "audio_cache").unwrap();
    /// ```
    pub fn init(path: &Path, table_name: &str) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    pk TEXT PRIMARY KEY,
                    source_url TEXT NOT NULL,
                    hits INTEGER DEFAULT 0,
                    created_at TEXT NOT NULL,
                    last_used TEXT
                )"
            ),
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            table_name: table_name.to_string(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ajoute ou remplace l'entrée d'une piste
    ///
    /// Un nouveau téléchargement remet le compteur d'accès à zéro.
    pub fn add(&self, pk: &str, url: &str) -> rusqlite::Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            &format!(
                "INSERT INTO {} (pk, source_url, hits, created_at, last_used)
                 VALUES (?1, ?2, 0, ?3, ?3)
                 ON CONFLICT(pk) DO UPDATE SET
                     source_url = excluded.source_url,
                     hits = 0,
                     created_at = excluded.created_at,
                     last_used = excluded.last_used",
                self.table_name
            ),
            params![pk, url, now],
        )?;
        Ok(())
    }

    /// Récupère une entrée par sa clé
    pub fn get(&self, pk: &str) -> rusqlite::Result<Option<CacheEntry>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT pk, source_url, hits, created_at, last_used FROM {} WHERE pk = ?1",
                    self.table_name
                ),
                [pk],
                CacheEntry::from_row,
            )
            .optional()
    }

    /// Met à jour le compteur d'accès et la date du dernier accès
    pub fn update_hit(&self, pk: &str) -> rusqlite::Result<()> {
        self.conn().execute(
            &format!(
                "UPDATE {} SET hits = hits + 1, last_used = ?1 WHERE pk = ?2",
                self.table_name
            ),
            params![Utc::now().to_rfc3339(), pk],
        )?;
        Ok(())
    }

    /// Supprime une entrée
    pub fn delete(&self, pk: &str) -> rusqlite::Result<()> {
        self.conn()
            .execute(&format!("DELETE FROM {} WHERE pk = ?1", self.table_name), [pk])?;
        Ok(())
    }

    /// Toutes les entrées, les plus utilisées d'abord
    pub fn get_all(&self) -> rusqlite::Result<Vec<CacheEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT pk, source_url, hits, created_at, last_used FROM {} ORDER BY hits DESC",
            self.table_name
        ))?;

        let entries = stmt
            .query_map([], CacheEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Nombre total d'entrées
    pub fn count(&self) -> rusqlite::Result<usize> {
        let count: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table_name),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_add_get_hit_delete() {
        let dir = TempDir::new().unwrap();
        let db = DB::init(&dir.path().join("cache.db"), "audio_cache").unwrap();

        db.add("abc", "https://youtu.be/abc").unwrap();
        db.update_hit("abc").unwrap();
        db.update_hit("abc").unwrap();

        let entry = db.get("abc").unwrap().unwrap();
        assert_eq!(entry.source_url, "https://youtu.be/abc");
        assert_eq!(entry.hits, 2);
        assert_eq!(db.count().unwrap(), 1);

        // Un nouveau téléchargement repart de zéro
        db.add("abc", "https://youtu.be/abc").unwrap();
        assert_eq!(db.get("abc").unwrap().unwrap().hits, 0);

        db.delete("abc").unwrap();
        assert!(db.get("abc").unwrap().is_none());
        assert!(db.get_all().unwrap().is_empty());
    }
}
