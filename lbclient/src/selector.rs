//! Choix de la source de données : API en ligne ou miroir hors ligne
//!
//! La décision est prise au moment de l'appel, d'après l'état courant du
//! [`ConnectivityMonitor`]. Une requête déjà partie n'est pas affectée par
//! une transition ultérieure.

use crate::api::LyricbaseApi;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{LyricbaseError, Result};
use crate::models::{ApiMessage, Artist, Playlist, PlaylistDraft, Song, SongRequest};
use lbmirror::{ContentMirror, MirrorError};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Type de ressource lue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Songs,
    Artists,
    /// Chansons d'un artiste donné
    ArtistSongs(String),
    Playlists,
    SavedPlaylists,
}

/// Sélection dans une ressource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    All,
    ById(String),
    /// Recherche textuelle
    Search(String),
}

/// Provenance des éléments renvoyés
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Live,
    Mirror,
}

/// Éléments lus
#[derive(Debug, Clone, PartialEq)]
pub enum Items {
    Songs(Vec<Song>),
    Artists(Vec<Artist>),
    Playlists(Vec<Playlist>),
}

impl Items {
    pub fn len(&self) -> usize {
        match self {
            Items::Songs(v) => v.len(),
            Items::Artists(v) => v.len(),
            Items::Playlists(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chansons, si la ressource en contient
    pub fn into_songs(self) -> Option<Vec<Song>> {
        match self {
            Items::Songs(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_artists(self) -> Option<Vec<Artist>> {
        match self {
            Items::Artists(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_playlists(self) -> Option<Vec<Playlist>> {
        match self {
            Items::Playlists(v) => Some(v),
            _ => None,
        }
    }
}

/// Résultat d'une lecture, marqué de sa provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub origin: Origin,
    pub items: Items,
}

impl Selection {
    fn live(items: Items) -> Self {
        Self {
            origin: Origin::Live,
            items,
        }
    }

    fn mirror(items: Items) -> Self {
        Self {
            origin: Origin::Mirror,
            items,
        }
    }
}

/// Aiguillage des lectures et écritures
#[derive(Clone)]
pub struct DataSourceSelector {
    api: Arc<LyricbaseApi>,
    mirror: Arc<ContentMirror<Song>>,
    connectivity: ConnectivityMonitor,
}

impl DataSourceSelector {
    pub fn new(
        api: Arc<LyricbaseApi>,
        mirror: Arc<ContentMirror<Song>>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            api,
            mirror,
            connectivity,
        }
    }

    /// Lit une ressource depuis la source adaptée à la connectivité courante
    pub async fn read(&self, kind: &ResourceKind, query: &Query) -> Result<Selection> {
        if self.connectivity.is_online() {
            debug!(?kind, ?query, "Reading from API");
            self.read_live(kind, query).await.map(Selection::live)
        } else {
            debug!(?kind, ?query, "Reading from mirror");
            self.read_mirror(kind, query).await.map(Selection::mirror)
        }
    }

    async fn read_live(&self, kind: &ResourceKind, query: &Query) -> Result<Items> {
        match kind {
            ResourceKind::Songs => {
                let songs = match query {
                    Query::All => self.api.songs().await?,
                    Query::ById(id) => vec![self.api.song(id).await?],
                    Query::Search(text) => self.api.search_songs(text).await?,
                };
                Ok(Items::Songs(songs))
            }
            ResourceKind::Artists => {
                let artists = self.api.artists().await?;
                Ok(Items::Artists(filter_artists(artists, query)))
            }
            ResourceKind::ArtistSongs(name) => {
                let songs = self.api.artist_songs(name).await?;
                Ok(Items::Songs(filter_songs(songs, query)))
            }
            ResourceKind::Playlists => {
                let playlists = match query {
                    Query::ById(id) => vec![self.api.playlist(id).await?],
                    _ => self.api.playlists().await?,
                };
                Ok(Items::Playlists(filter_playlists(playlists, query)))
            }
            ResourceKind::SavedPlaylists => {
                let playlists = self.api.saved_playlists().await?;
                Ok(Items::Playlists(filter_playlists(playlists, query)))
            }
        }
    }

    async fn read_mirror(&self, kind: &ResourceKind, query: &Query) -> Result<Items> {
        match kind {
            ResourceKind::Songs => {
                let songs = match query {
                    Query::ById(id) => vec![self.read_mirrored(id).await?],
                    _ => filter_songs(self.mirror.list().await?, query),
                };
                Ok(Items::Songs(songs))
            }
            ResourceKind::Artists => {
                let songs = self.mirror.list().await?;
                Ok(Items::Artists(filter_artists(derive_artists(&songs), query)))
            }
            ResourceKind::ArtistSongs(name) => {
                let songs = self
                    .mirror
                    .list()
                    .await?
                    .into_iter()
                    .filter(|song| song.is_by(name))
                    .collect();
                Ok(Items::Songs(filter_songs(songs, query)))
            }
            ResourceKind::Playlists => Err(LyricbaseError::NotAvailableOffline(
                "playlists".to_string(),
            )),
            ResourceKind::SavedPlaylists => Err(LyricbaseError::NotAvailableOffline(
                "saved playlists".to_string(),
            )),
        }
    }

    /// Lit une chanson du miroir
    pub async fn read_mirrored(&self, key: &str) -> Result<Song> {
        self.mirror.read(key).await.map_err(|e| match e {
            MirrorError::InvalidKey(key) => LyricbaseError::NotFound(key),
            other => other.into(),
        })
    }

    /// La chanson est disponible dans le miroir
    pub async fn is_available_offline(&self, key: &str) -> bool {
        self.mirror.is_available_offline(key).await
    }

    fn ensure_online(&self) -> Result<()> {
        if self.connectivity.is_online() {
            Ok(())
        } else {
            debug!("Write rejected while offline");
            Err(LyricbaseError::OfflineWriteRejected)
        }
    }

    /// Requête générique ; les écritures sont refusées hors ligne
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        if method != Method::GET && method != Method::HEAD {
            self.ensure_online()?;
        }
        self.api.request(method, path, body).await
    }

    pub async fn create_playlist(&self, draft: &PlaylistDraft) -> Result<Value> {
        self.ensure_online()?;
        self.api.create_playlist(draft).await
    }

    pub async fn update_playlist(&self, id: &str, draft: &PlaylistDraft) -> Result<Value> {
        self.ensure_online()?;
        self.api.update_playlist(id, draft).await
    }

    pub async fn delete_playlist(&self, id: &str) -> Result<()> {
        self.ensure_online()?;
        self.api.delete_playlist(id).await
    }

    pub async fn save_playlist(&self, id: &str) -> Result<Value> {
        self.ensure_online()?;
        self.api.save_playlist(id).await
    }

    pub async fn unsave_playlist(&self, id: &str) -> Result<()> {
        self.ensure_online()?;
        self.api.unsave_playlist(id).await
    }

    pub async fn request_song(&self, request: &SongRequest) -> Result<ApiMessage> {
        self.ensure_online()?;
        self.api.request_song(request).await
    }
}

/// Artistes distincts des chansons, triés par nom
fn derive_artists(songs: &[Song]) -> Vec<Artist> {
    songs
        .iter()
        .map(|song| song.artist.trim())
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(Artist::named)
        .collect()
}

fn filter_songs(songs: Vec<Song>, query: &Query) -> Vec<Song> {
    match query {
        Query::All => songs,
        Query::ById(id) => songs.into_iter().filter(|s| &s.id == id).collect(),
        Query::Search(text) => songs.into_iter().filter(|s| s.matches(text)).collect(),
    }
}

fn filter_artists(artists: Vec<Artist>, query: &Query) -> Vec<Artist> {
    match query {
        Query::All => artists,
        Query::ById(id) => artists
            .into_iter()
            .filter(|a| a.id.as_deref() == Some(id.as_str()) || a.name.eq_ignore_ascii_case(id))
            .collect(),
        Query::Search(text) => {
            let needle = text.trim().to_lowercase();
            artists
                .into_iter()
                .filter(|a| a.name.to_lowercase().contains(&needle))
                .collect()
        }
    }
}

fn filter_playlists(playlists: Vec<Playlist>, query: &Query) -> Vec<Playlist> {
    match query {
        Query::All => playlists,
        Query::ById(id) => playlists.into_iter().filter(|p| &p.id == id).collect(),
        Query::Search(text) => {
            let needle = text.trim().to_lowercase();
            playlists
                .into_iter()
                .filter(|p| p.title.to_lowercase().contains(&needle))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn song(id: &str, title: &str, artist: &str) -> Song {
        serde_json::from_value(json!({"_id": id, "title": title, "artist": artist})).unwrap()
    }

    #[test]
    fn test_derive_artists_distinct_sorted() {
        let songs = vec![
            song("1", "Oceans", "Hillsong United"),
            song("2", "Amazing Grace", "John Newton"),
            song("3", "So Will I", "Hillsong United"),
            song("4", "Untitled", " "),
        ];

        let names: Vec<String> = derive_artists(&songs).into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Hillsong United", "John Newton"]);
    }

    #[test]
    fn test_search_filter() {
        let songs = vec![
            song("1", "Oceans", "Hillsong United"),
            song("2", "Amazing Grace", "John Newton"),
        ];

        let found = filter_songs(songs.clone(), &Query::Search("grace".into()));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "2");

        let by_artist = filter_songs(songs, &Query::Search("hillsong".into()));
        assert_eq!(by_artist[0].id, "1");
    }
}
