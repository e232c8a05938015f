//! Module de gestion des playlists de l'utilisateur

use super::{encode_segment, LyricbaseApi, RequestOptions};
use crate::error::Result;
use crate::models::{Playlist, PlaylistDraft};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

#[derive(Serialize)]
struct SavePlaylistRequest<'a> {
    #[serde(rename = "playlistId")]
    playlist_id: &'a str,
}

impl LyricbaseApi {
    /// Playlists de l'utilisateur
    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        self.get_json("/playlists/", &RequestOptions::default())
            .await
    }

    /// Récupère une playlist
    pub async fn playlist(&self, id: &str) -> Result<Playlist> {
        self.get_json(
            &format!("/playlists/{}", encode_segment(id)),
            &RequestOptions::default(),
        )
        .await
    }

    /// Playlists d'autres utilisateurs enregistrées par l'utilisateur
    pub async fn saved_playlists(&self) -> Result<Vec<Playlist>> {
        self.get_json("/playlists/saved", &RequestOptions::default())
            .await
    }

    /// Crée une playlist
    pub async fn create_playlist(&self, draft: &PlaylistDraft) -> Result<Value> {
        info!("Creating playlist '{}' ({} songs)", draft.title, draft.songs.len());
        let body = serde_json::to_value(draft)?;
        self.request(Method::POST, "/playlists/", Some(&body)).await
    }

    /// Remplace le titre et les chansons d'une playlist
    pub async fn update_playlist(&self, id: &str, draft: &PlaylistDraft) -> Result<Value> {
        info!("Updating playlist {}", id);
        let body = serde_json::to_value(draft)?;
        self.request(
            Method::PUT,
            &format!("/playlists/{}", encode_segment(id)),
            Some(&body),
        )
        .await
    }

    /// Supprime une playlist de l'utilisateur
    pub async fn delete_playlist(&self, id: &str) -> Result<()> {
        info!("Deleting playlist {}", id);
        self.delete(&format!("/playlists/{}", encode_segment(id)))
            .await
    }

    /// Enregistre la playlist d'un autre utilisateur
    pub async fn save_playlist(&self, id: &str) -> Result<Value> {
        let body = serde_json::to_value(SavePlaylistRequest { playlist_id: id })?;
        self.request(Method::POST, "/playlists/save", Some(&body))
            .await
    }

    /// Retire une playlist des playlists enregistrées
    pub async fn unsave_playlist(&self, id: &str) -> Result<()> {
        self.delete(&format!("/playlists/saved/{}", encode_segment(id)))
            .await
    }
}
