//! Miroir disque d'un catalogue distant
//!
//! Chaque élément du catalogue est stocké dans son propre fichier JSON,
//! `{mirror_dir}/{catalog}/{key}.json`. La présence des fichiers fait office
//! de manifeste : il n'existe aucun index à maintenir.

use crate::download::{DownloadProgress, DownloadReport, ProgressCallback};
use crate::error::{MirrorError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extension des entrées du miroir
const ENTRY_EXTENSION: &str = "json";
/// Suffixe des fichiers en cours d'écriture
const TEMP_SUFFIX: &str = ".tmp";
/// Nombre de tentatives de purge par défaut
pub const DEFAULT_PURGE_ATTEMPTS: u32 = 3;

/// Élément d'un catalogue pouvant être stocké dans le miroir
///
/// L'enregistrement sérialisé doit suffire à afficher l'élément hors ligne.
pub trait MirrorItem: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifiant stable attribué par le serveur
    fn mirror_key(&self) -> &str;
}

/// Vérifie qu'une clé peut servir de nom de fichier sans échappement
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MirrorError::InvalidKey(key.to_string()))
    }
}

/// Miroir d'un catalogue nommé
pub struct ContentMirror<T: MirrorItem> {
    catalog: String,
    dir: PathBuf,
    purge_attempts: u32,
    /// Génération de purge ; toute écriture d'entrée se fait sous ce verrou
    generation: Mutex<u64>,
    /// Nombre de suppressions à faire échouer
    #[cfg(test)]
    failing_removals: std::sync::atomic::AtomicU32,
    _marker: PhantomData<fn() -> T>,
}

impl<T: MirrorItem> ContentMirror<T> {
    /// Crée un miroir pour le catalogue `catalog` sous `root`
    ///
    /// Le répertoire n'est créé qu'à la première écriture : un miroir jamais
    /// téléchargé est simplement vide.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use lbmirror::{ContentMirror, MirrorItem};
    /// use serde::{Deserialize, Serialize};
    ///
    /// #[derive(Serialize, Deserialize)]
    /// struct Song { id: String, title: String }
    ///
    /// impl MirrorItem for Song {
    ///     fn mirror_key(&self) -> &str { &self.id }
    /// }
    ///
    /// let mirror = ContentMirror::<Song>::new(".lyricbase/mirror", "songs")?;
    /// # Ok::<(), lbmirror::MirrorError>(())
    /// ```
    pub fn new<P: AsRef<Path>>(root: P, catalog: &str) -> Result<Self> {
        validate_key(catalog)?;
        Ok(Self {
            catalog: catalog.to_string(),
            dir: root.as_ref().join(catalog),
            purge_attempts: DEFAULT_PURGE_ATTEMPTS,
            generation: Mutex::new(0),
            #[cfg(test)]
            failing_removals: std::sync::atomic::AtomicU32::new(0),
            _marker: PhantomData,
        })
    }

    /// Définit le nombre de tentatives de suppression lors d'une purge
    pub fn with_purge_attempts(mut self, attempts: u32) -> Self {
        self.purge_attempts = attempts.max(1);
        self
    }

    /// Nom du catalogue
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    /// Répertoire contenant les entrées
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    /// Retourne la clé d'un fichier d'entrée, `None` pour tout autre fichier
    fn key_of(path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        if name.starts_with('.') || name.ends_with(TEMP_SUFFIX) {
            return None;
        }
        let key = name.strip_suffix(ENTRY_EXTENSION)?.strip_suffix('.')?;
        validate_key(key).ok()?;
        Some(key.to_string())
    }

    /// Liste les clés présentes, triées
    ///
    /// Un répertoire absent correspond à un miroir vide.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(key) = Self::key_of(&entry.path()) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Lit toutes les entrées du miroir
    ///
    /// Les entrées illisibles sont ignorées (avec un avertissement) ; seules
    /// les erreurs d'accès au répertoire sont remontées.
    pub async fn list(&self) -> Result<Vec<T>> {
        let keys = self.keys().await?;
        let mut items = Vec::with_capacity(keys.len());

        for key in keys {
            match self.read(&key).await {
                Ok(item) => items.push(item),
                // supprimée par une purge concurrente
                Err(MirrorError::NotFound(_)) => {}
                Err(MirrorError::Corrupt { key, source }) => {
                    warn!(catalog = %self.catalog, key = %key, error = %source, "Skipping corrupt mirror entry");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(catalog = %self.catalog, count = items.len(), "Listed mirror entries");
        Ok(items)
    }

    /// Lit une entrée par sa clé
    pub async fn read(&self, key: &str) -> Result<T> {
        validate_key(key)?;
        let path = self.entry_path(key);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MirrorError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|source| MirrorError::Corrupt {
            key: key.to_string(),
            source,
        })
    }

    /// Vérifie si une entrée est présente sur disque
    pub async fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(fs::try_exists(self.entry_path(key)).await?)
    }

    /// Indique si l'élément `key` peut être lu sans réseau
    ///
    /// Toute erreur (clé invalide, accès disque) est traitée comme une absence.
    pub async fn is_available_offline(&self, key: &str) -> bool {
        match self.contains(key).await {
            Ok(present) => present,
            Err(e) => {
                debug!(catalog = %self.catalog, key, error = %e, "Offline availability check failed");
                false
            }
        }
    }

    /// Nombre d'entrées présentes
    pub async fn count(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    /// Indique si le miroir ne contient aucune entrée
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.count().await? == 0)
    }

    /// Taille totale des entrées en octets
    pub async fn size(&self) -> Result<u64> {
        let mut total = 0u64;
        for key in self.keys().await? {
            match fs::metadata(self.entry_path(&key)).await {
                Ok(metadata) => total += metadata.len(),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    /// Écrit une entrée : fichier temporaire synchronisé puis renommage
    ///
    /// L'appelant doit tenir le verrou de génération.
    async fn write_entry(&self, key: &str, item: &T) -> Result<()> {
        let json = serde_json::to_vec(item)?;
        fs::create_dir_all(&self.dir).await?;

        let final_path = self.entry_path(key);
        let temp_path = self
            .dir
            .join(format!(".{}.{}{}", key, uuid::Uuid::new_v4(), TEMP_SUFFIX));

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &final_path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Télécharge le catalogue complet dans le miroir
    ///
    /// Le `fetcher` est appelé une seule fois ; chaque élément retourné est
    /// ensuite écrit comme une entrée indépendante. L'opération n'est pas
    /// atomique : une interruption laisse un miroir partiel, mais jamais une
    /// entrée partielle. Les éléments de même clé sont fusionnés (le dernier
    /// l'emporte) et ceux dont la clé est invalide sont ignorés.
    ///
    /// L'annulation est vérifiée entre deux écritures. Une purge démarrée
    /// pendant le téléchargement l'interrompt.
    pub async fn download_all<F, Fut, E>(
        &self,
        fetcher: F,
        on_progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Vec<T>, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let generation = *self.generation.lock().await;

        if cancel.is_cancelled() {
            let mut report = DownloadReport::new(0);
            report.cancelled = true;
            return Ok(report);
        }

        info!(catalog = %self.catalog, "Fetching catalog for offline mirror");
        let fetched = fetcher()
            .await
            .map_err(|e| MirrorError::Fetch(Box::new(e)))?;

        let items = dedup_by_key(fetched, &self.catalog);
        let total = items.len();
        let mut report = DownloadReport::new(total);

        let notify = |written: usize| {
            if let Some(callback) = &on_progress {
                callback(DownloadProgress { written, total });
            }
        };
        notify(0);

        for (key, item) in &items {
            if cancel.is_cancelled() {
                info!(catalog = %self.catalog, written = report.written, total, "Mirror download cancelled");
                report.cancelled = true;
                return Ok(report);
            }

            let current = self.generation.lock().await;
            if *current != generation {
                info!(catalog = %self.catalog, written = report.written, total, "Mirror download interrupted by purge");
                report.interrupted = true;
                return Ok(report);
            }
            self.write_entry(key, item).await?;
            drop(current);

            report.written += 1;
            notify(report.written);
        }

        info!(catalog = %self.catalog, written = report.written, "Mirror download complete");
        Ok(report)
    }

    /// Supprime l'intégralité du miroir
    ///
    /// Les téléchargements en cours s'arrêtent avant leur prochaine écriture.
    /// La suppression est retentée jusqu'à ce que le répertoire ait disparu ;
    /// au-delà du nombre de tentatives configuré, `MirrorError::Purge` est
    /// retournée avec le nombre d'entrées restantes.
    pub async fn purge(&self) -> Result<()> {
        let mut generation = self.generation.lock().await;
        *generation += 1;

        for attempt in 1..=self.purge_attempts {
            match self.remove_directory().await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(catalog = %self.catalog, attempt, error = %e, "Mirror purge attempt failed");
                }
            }

            if !fs::try_exists(&self.dir).await.unwrap_or(true) {
                info!(catalog = %self.catalog, "Mirror purged");
                return Ok(());
            }

            tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
        }

        let remaining = self.keys().await.map(|keys| keys.len()).unwrap_or(0);
        if remaining == 0 {
            // il ne reste que des fichiers étrangers au miroir
            warn!(catalog = %self.catalog, directory = %self.dir.display(), "Mirror directory not removed but holds no entries");
            return Ok(());
        }
        Err(MirrorError::Purge { remaining })
    }

    async fn remove_directory(&self) -> std::io::Result<()> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            let failing = self.failing_removals.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_removals.store(failing - 1, Ordering::SeqCst);
                return Err(std::io::Error::new(ErrorKind::PermissionDenied, "directory busy"));
            }
        }
        fs::remove_dir_all(&self.dir).await
    }
}

/// Fusionne les éléments de même clé en conservant l'ordre de première apparition
fn dedup_by_key<T: MirrorItem>(items: Vec<T>, catalog: &str) -> Vec<(String, T)> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut unique: Vec<(String, T)> = Vec::with_capacity(items.len());

    for item in items {
        let key = item.mirror_key().to_string();
        if let Err(e) = validate_key(&key) {
            warn!(catalog, error = %e, "Skipping catalog item");
            continue;
        }
        match positions.get(&key) {
            Some(&index) => unique[index].1 = item,
            None => {
                positions.insert(key.clone(), unique.len());
                unique.push((key, item));
            }
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Entry {
        id: String,
        value: i32,
    }

    impl MirrorItem for Entry {
        fn mirror_key(&self) -> &str {
            &self.id
        }
    }

    fn entry(id: &str, value: i32) -> Entry {
        Entry {
            id: id.to_string(),
            value,
        }
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("64b7f0a1c2d3").is_ok());
        assert!(validate_key("song_1-a").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("a.json").is_err());
    }

    #[test]
    fn test_key_of_ignores_foreign_files() {
        type M = ContentMirror<Entry>;
        assert_eq!(M::key_of(Path::new("/m/abc.json")), Some("abc".to_string()));
        assert_eq!(M::key_of(Path::new("/m/.abc.1234.tmp")), None);
        assert_eq!(M::key_of(Path::new("/m/abc.txt")), None);
        assert_eq!(M::key_of(Path::new("/m/.hidden.json")), None);
    }

    #[test]
    fn test_dedup_keeps_last_value_in_first_position() {
        let items = vec![entry("a", 1), entry("b", 2), entry("a", 3), entry("bad key", 4)];
        let unique = dedup_by_key(items, "test");
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].0, "a");
        assert_eq!(unique[0].1.value, 3);
        assert_eq!(unique[1].0, "b");
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_empty_mirror() {
        let dir = tempdir().unwrap();
        let mirror = ContentMirror::<Entry>::new(dir.path(), "songs").unwrap();

        assert!(mirror.list().await.unwrap().is_empty());
        assert_eq!(mirror.count().await.unwrap(), 0);
        assert!(!mirror.is_available_offline("a").await);
        assert!(matches!(
            mirror.read("a").await,
            Err(MirrorError::NotFound(_))
        ));
    }

    fn fail_removals(mirror: &ContentMirror<Entry>, count: u32) {
        mirror
            .failing_removals
            .store(count, std::sync::atomic::Ordering::SeqCst);
    }

    #[tokio::test]
    async fn test_purge_retries_after_failed_removal() {
        let dir = tempdir().unwrap();
        let mirror = ContentMirror::<Entry>::new(dir.path(), "songs").unwrap();

        let lock = mirror.generation.lock().await;
        mirror.write_entry("a", &entry("a", 1)).await.unwrap();
        drop(lock);

        fail_removals(&mirror, 2);
        mirror.purge().await.unwrap();
        assert!(!mirror.directory().exists());
    }

    #[tokio::test]
    async fn test_purge_reports_remaining_entries() {
        let dir = tempdir().unwrap();
        let mirror = ContentMirror::<Entry>::new(dir.path(), "songs")
            .unwrap()
            .with_purge_attempts(2);

        let lock = mirror.generation.lock().await;
        mirror.write_entry("a", &entry("a", 1)).await.unwrap();
        mirror.write_entry("b", &entry("b", 2)).await.unwrap();
        drop(lock);

        fail_removals(&mirror, u32::MAX);
        let result = mirror.purge().await;
        assert!(matches!(result, Err(MirrorError::Purge { remaining: 2 })));
        assert_eq!(mirror.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_purge_ignores_leftover_foreign_files() {
        let dir = tempdir().unwrap();
        let mirror = ContentMirror::<Entry>::new(dir.path(), "songs")
            .unwrap()
            .with_purge_attempts(2);

        std::fs::create_dir_all(mirror.directory()).unwrap();
        std::fs::write(mirror.directory().join("notes.txt"), b"kept").unwrap();
        std::fs::write(mirror.directory().join(".a.1234.tmp"), b"{").unwrap();

        fail_removals(&mirror, u32::MAX);
        mirror.purge().await.unwrap();
        assert!(mirror.directory().exists());
        assert!(mirror.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let mirror = ContentMirror::<Entry>::new(dir.path(), "songs").unwrap();

        let lock = mirror.generation.lock().await;
        mirror.write_entry("a", &entry("a", 7)).await.unwrap();
        drop(lock);

        assert_eq!(mirror.read("a").await.unwrap(), entry("a", 7));
        assert!(mirror.is_available_offline("a").await);
        assert!(mirror.size().await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_skipped_by_list() {
        let dir = tempdir().unwrap();
        let mirror = ContentMirror::<Entry>::new(dir.path(), "songs").unwrap();

        let lock = mirror.generation.lock().await;
        mirror.write_entry("good", &entry("good", 1)).await.unwrap();
        drop(lock);
        std::fs::write(mirror.directory().join("broken.json"), b"{not json").unwrap();

        let items = mirror.list().await.unwrap();
        assert_eq!(items, vec![entry("good", 1)]);
        assert!(matches!(
            mirror.read("broken").await,
            Err(MirrorError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_invalid_catalog_name() {
        assert!(ContentMirror::<Entry>::new("/tmp", "../songs").is_err());
    }
}
