//! Module des actions utilisateur

use super::LyricbaseApi;
use crate::error::Result;
use crate::models::{ApiMessage, SongRequest};
use tracing::info;

impl LyricbaseApi {
    /// Demande l'ajout d'une chanson au catalogue
    pub async fn request_song(&self, request: &SongRequest) -> Result<ApiMessage> {
        info!("Requesting song '{}'", request.song_name);
        self.post_json("/users/requestSong", request).await
    }
}
