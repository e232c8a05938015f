//! Client principal pour interagir avec Lyricbase
//!
//! Ce module assemble le pipeline de requêtes, le miroir hors ligne des
//! chansons, le moniteur de connectivité et l'aiguillage entre les deux
//! sources de données.

use crate::api::{ApiSettings, LyricbaseApi};
use crate::config_ext::LyricbaseConfigExt;
use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::error::Result;
use crate::models::Song;
use crate::selector::{DataSourceSelector, Query, ResourceKind, Selection};
use lbconfig::Config;
use lbmirror::{ContentMirror, DownloadHandle, DownloadReport, ProgressCallback};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Nom du catalogue des chansons dans le miroir
pub const SONGS_CATALOG: &str = "songs";

/// Client Lyricbase haut-niveau
pub struct LyricbaseClient {
    api: Arc<LyricbaseApi>,
    mirror: Arc<ContentMirror<Song>>,
    connectivity: ConnectivityMonitor,
    selector: DataSourceSelector,
    probe_path: String,
    probe_interval: Duration,
}

impl LyricbaseClient {
    /// Assemble un client à partir de ses composants
    pub fn new(
        api: Arc<LyricbaseApi>,
        mirror: Arc<ContentMirror<Song>>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let selector = DataSourceSelector::new(
            Arc::clone(&api),
            Arc::clone(&mirror),
            connectivity.clone(),
        );

        Self {
            api,
            mirror,
            connectivity,
            selector,
            probe_path: "/".to_string(),
            probe_interval: Duration::from_secs(15),
        }
    }

    /// Crée un client en utilisant la configuration globale de lbconfig
    ///
    /// # Exemple
    ///
    /// ```rust,no_run
    /// use lbclient::LyricbaseClient;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let client = LyricbaseClient::from_config()?;
    ///     let songs = client.api().songs().await?;
    ///     println!("{} songs", songs.len());
    ///     Ok(())
    /// }
    /// ```
    pub fn from_config() -> Result<Self> {
        let config = lbconfig::get_config();
        Self::from_config_obj(config.as_ref())
    }

    /// Crée un client depuis un objet Config spécifique
    pub fn from_config_obj(config: &Config) -> Result<Self> {
        let settings: ApiSettings = config.get_api_settings()?;
        info!("Creating Lyricbase client for {}", settings.base_url);

        let store: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::new(config.get_session_dir()?));
        let api = Arc::new(LyricbaseApi::new(settings, store)?);
        let mirror = Arc::new(ContentMirror::from_config(config, SONGS_CATALOG)?);

        let mut client = Self::new(api, mirror, ConnectivityMonitor::new(Connectivity::Online));
        client.probe_path = config.get_connectivity_probe_path()?;
        client.probe_interval = config.get_connectivity_probe_interval()?;
        Ok(client)
    }

    pub fn api(&self) -> &Arc<LyricbaseApi> {
        &self.api
    }

    /// Miroir hors ligne des chansons
    pub fn mirror(&self) -> &Arc<ContentMirror<Song>> {
        &self.mirror
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn selector(&self) -> &DataSourceSelector {
        &self.selector
    }

    /// Lit une ressource depuis l'API ou le miroir selon la connectivité
    pub async fn read(&self, kind: &ResourceKind, query: &Query) -> Result<Selection> {
        self.selector.read(kind, query).await
    }

    /// Lance la sonde de connectivité configurée
    pub fn start_probe(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let url = crate::api::join_url(self.api.base_url(), &self.probe_path);
        self.connectivity.spawn_probe(
            self.api.http_client().clone(),
            url,
            self.probe_interval,
            cancel,
        )
    }

    // ============ Miroir hors ligne ============

    /// Télécharge le catalogue des chansons dans le miroir
    pub async fn download_songs(
        &self,
        on_progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport> {
        let api = Arc::clone(&self.api);
        let report = self
            .mirror
            .download_all(
                move || async move { api.download_catalog().await },
                on_progress,
                cancel,
            )
            .await?;
        info!(
            written = report.written,
            total = report.total,
            "Song catalog mirrored"
        );
        Ok(report)
    }

    /// Lance le téléchargement du catalogue en tâche de fond
    pub fn spawn_song_download(&self) -> DownloadHandle {
        let api = Arc::clone(&self.api);
        self.mirror
            .spawn_download(move || async move { api.download_catalog().await })
    }

    /// Supprime toutes les chansons téléchargées
    pub async fn purge_downloads(&self) -> Result<()> {
        self.mirror.purge().await?;
        Ok(())
    }

    /// La chanson est disponible hors ligne
    pub async fn is_available_offline(&self, key: &str) -> bool {
        self.mirror.is_available_offline(key).await
    }

    /// Lit une chanson du miroir
    pub async fn read_mirrored(&self, key: &str) -> Result<Song> {
        self.selector.read_mirrored(key).await
    }
}
