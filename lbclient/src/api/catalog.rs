//! Module d'accès au catalogue (chansons, accords, artistes)

use super::{encode_segment, LyricbaseApi, RequestOptions};
use crate::error::Result;
use crate::models::{Artist, Song};
use serde_json::Value;
use tracing::debug;

impl LyricbaseApi {
    /// Liste toutes les chansons
    pub async fn songs(&self) -> Result<Vec<Song>> {
        self.get_json("/songs/", &RequestOptions::default()).await
    }

    /// Récupère une chanson par son identifiant
    pub async fn song(&self, id: &str) -> Result<Song> {
        debug!("Fetching song {}", id);
        self.get_json(
            &format!("/songs/song/{}", encode_segment(id)),
            &RequestOptions::default(),
        )
        .await
    }

    /// Récupère les accords d'une chanson (document libre)
    pub async fn song_chords(&self, id: &str) -> Result<Value> {
        self.get_json(
            &format!("/songs/song/{}/chords", encode_segment(id)),
            &RequestOptions::default(),
        )
        .await
    }

    /// Recherche des chansons par titre
    pub async fn search_songs(&self, text: &str) -> Result<Vec<Song>> {
        debug!("Searching songs for '{}'", text);
        let opts = RequestOptions::new()
            .query("search", text)
            .query("filter", "name");
        self.get_json("/songs/song", &opts).await
    }

    /// Nombre de chansons du catalogue
    pub async fn song_count(&self) -> Result<u64> {
        self.get_json("/songs/songCount", &RequestOptions::default())
            .await
    }

    /// Catalogue complet destiné au miroir hors ligne
    pub async fn download_catalog(&self) -> Result<Vec<Song>> {
        let songs: Vec<Song> = self
            .get_json("/songs/download", &RequestOptions::default())
            .await?;
        debug!("Downloaded catalog of {} songs", songs.len());
        Ok(songs)
    }

    /// Liste les artistes
    pub async fn artists(&self) -> Result<Vec<Artist>> {
        self.get_json("/artists/", &RequestOptions::default()).await
    }

    /// Chansons d'un artiste
    pub async fn artist_songs(&self, name: &str) -> Result<Vec<Song>> {
        self.get_json(
            &format!("/artists/{}", encode_segment(name)),
            &RequestOptions::default(),
        )
        .await
    }
}
