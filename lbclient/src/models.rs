//! Modèles de données pour l'API Lyricbase

use chrono::{DateTime, Utc};
use lbmirror::MirrorItem;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Désérialise un ID qui peut être soit un nombre soit une chaîne
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::custom("ID must be a string or number")),
    }
}

/// Variante optionnelle de [`deserialize_id`]
pub(crate) fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(Error::custom("ID must be a string or number")),
    }
}

/// Représente une chanson du catalogue
///
/// Les champs inconnus sont conservés dans `extra`, de sorte qu'une chanson
/// écrite dans le miroir se suffit à elle-même.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Song {
    /// Identifiant attribué par le serveur
    #[serde(rename = "_id", alias = "id", deserialize_with = "deserialize_id")]
    pub id: String,
    /// Titre de la chanson
    pub title: String,
    /// Nom de l'artiste
    #[serde(default)]
    pub artist: String,
    /// Clé du PDF des accords
    #[serde(rename = "pdfKey", default, skip_serializing_if = "Option::is_none")]
    pub pdf_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chords: Option<Value>,
    /// Champs supplémentaires renvoyés par le serveur
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Song {
    /// Vérifie si la chanson correspond à une recherche textuelle
    ///
    /// La comparaison ignore la casse et porte sur le titre et l'artiste.
    pub fn matches(&self, text: &str) -> bool {
        let needle = text.trim().to_lowercase();
        needle.is_empty()
            || self.title.to_lowercase().contains(&needle)
            || self.artist.to_lowercase().contains(&needle)
    }

    /// Vérifie si la chanson est de l'artiste donné (casse ignorée)
    pub fn is_by(&self, artist: &str) -> bool {
        self.artist.trim().eq_ignore_ascii_case(artist.trim())
    }
}

impl MirrorItem for Song {
    fn mirror_key(&self) -> &str {
        &self.id
    }
}

/// Représente un artiste
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artist {
    /// Identifiant (absent pour les artistes déduits du miroir)
    #[serde(
        rename = "_id",
        alias = "id",
        default,
        deserialize_with = "deserialize_opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Nom de l'artiste
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Artist {
    /// Crée un artiste connu seulement par son nom
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// Propriétaire d'une playlist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistOwner {
    #[serde(rename = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Élément d'une playlist : chanson complète ou simple identifiant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PlaylistEntry {
    Song(Song),
    Id(String),
}

impl PlaylistEntry {
    /// Identifiant de la chanson référencée
    pub fn song_id(&self) -> &str {
        match self {
            PlaylistEntry::Song(song) => &song.id,
            PlaylistEntry::Id(id) => id,
        }
    }
}

/// Représente une playlist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Playlist {
    #[serde(rename = "_id", alias = "id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub songs: Vec<PlaylistEntry>,
    /// Créateur de la playlist
    #[serde(rename = "userPlay", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<PlaylistOwner>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Playlist {
    /// Identifiants des chansons, dans l'ordre de la playlist
    pub fn song_ids(&self) -> Vec<String> {
        self.songs.iter().map(|s| s.song_id().to_string()).collect()
    }
}

/// Corps des requêtes de création et de modification de playlist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistDraft {
    pub title: String,
    /// Identifiants des chansons
    pub songs: Vec<String>,
}

impl PlaylistDraft {
    pub fn new(title: impl Into<String>, songs: Vec<String>) -> Self {
        Self {
            title: title.into(),
            songs,
        }
    }
}

/// Utilisateur connecté, tel que renvoyé par la connexion et l'inscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedInUser {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(rename = "expiresAt", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Réponse simple `{ "message": ... }` des endpoints d'authentification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ApiMessage {
    #[serde(default)]
    pub message: String,
}

/// Demande d'ajout d'une chanson au catalogue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SongRequest {
    #[serde(rename = "songName")]
    pub song_name: String,
    pub description: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_song_keeps_unknown_fields() {
        let song: Song = serde_json::from_value(json!({
            "_id": "64f1",
            "title": "Amazing Grace",
            "artist": "John Newton",
            "pdfKey": "grace.pdf",
            "genre": "hymn"
        }))
        .unwrap();

        assert_eq!(song.mirror_key(), "64f1");
        assert_eq!(song.pdf_key.as_deref(), Some("grace.pdf"));
        assert_eq!(song.extra.get("genre"), Some(&json!("hymn")));

        let back = serde_json::to_value(&song).unwrap();
        assert_eq!(back["_id"], "64f1");
        assert_eq!(back["genre"], "hymn");
    }

    #[test]
    fn test_numeric_id() {
        let artist: Artist = serde_json::from_value(json!({"id": 12, "name": "Hillsong"})).unwrap();
        assert_eq!(artist.id.as_deref(), Some("12"));
    }

    #[test]
    fn test_song_matches() {
        let song: Song =
            serde_json::from_value(json!({"_id": "1", "title": "Oceans", "artist": "Hillsong United"}))
                .unwrap();
        assert!(song.matches("ocean"));
        assert!(song.matches("HILLSONG"));
        assert!(!song.matches("grace"));
        assert!(song.is_by("hillsong united"));
    }

    #[test]
    fn test_playlist_mixed_entries() {
        let playlist: Playlist = serde_json::from_value(json!({
            "_id": "p1",
            "title": "Sunday",
            "songs": [{"_id": "s1", "title": "A", "artist": "X"}, "s2"],
            "userPlay": {"_id": "u1", "name": "Ana"}
        }))
        .unwrap();

        assert_eq!(playlist.song_ids(), vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(playlist.owner.unwrap().name, "Ana");
    }
}
