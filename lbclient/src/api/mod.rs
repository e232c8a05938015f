//! Couche d'accès à l'API REST Lyricbase
//!
//! [`LyricbaseApi`] est le pipeline de requêtes : il attache le token d'accès
//! courant, envoie la requête et, sur un 401, demande un rafraîchissement au
//! [`RefreshCoordinator`] puis renvoie la requête une seule fois.

pub mod auth;
pub mod catalog;
pub mod playlists;
pub mod refresh;
pub mod user;

use crate::credentials::{CredentialPair, CredentialStore};
use crate::error::{LyricbaseError, Result};
use crate::session::{SessionEvent, SessionEvents};
use refresh::{HttpTokenRefresher, RefreshCoordinator, TokenRefresher};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// URL de base par défaut de l'API
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Paramètres du client HTTP
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Marge avant expiration déclenchant un rafraîchissement anticipé
    pub refresh_skew: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            refresh_skew: Duration::from_secs(30),
        }
    }
}

impl ApiSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Construit le client HTTP correspondant
    pub fn build_client(&self) -> Result<Client> {
        Ok(Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(concat!("lyricbase/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }
}

/// Options d'une requête
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Paramètres de query string
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute un paramètre de query string
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Concatène l'URL de base et un chemin absolu
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Encode un segment de chemin (identifiant, nom d'artiste)
pub(crate) fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Pipeline de requêtes authentifiées vers l'API Lyricbase
pub struct LyricbaseApi {
    client: Client,
    settings: ApiSettings,
    store: Arc<dyn CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    events: SessionEvents,
}

impl LyricbaseApi {
    /// Crée un pipeline avec l'échange de tokens HTTP standard
    pub fn new(settings: ApiSettings, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let client = settings.build_client()?;
        let refresher = Arc::new(HttpTokenRefresher::new(client.clone(), &settings.base_url));
        Ok(Self::with_refresher(client, settings, store, refresher))
    }

    /// Crée un pipeline avec un échangeur de tokens donné
    pub fn with_refresher(
        client: Client,
        settings: ApiSettings,
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let events = SessionEvents::new();
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            refresher,
            events.clone(),
        ));

        Self {
            client,
            settings,
            store,
            coordinator,
            events,
        }
    }

    /// URL de base de l'API
    pub fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    /// Client HTTP sous-jacent
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// S'abonne aux événements de session
    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Installe une nouvelle paire après connexion
    pub(crate) async fn install_session(&self, pair: &CredentialPair) -> Result<()> {
        self.coordinator.install(Some(pair)).await?;
        self.events.emit(SessionEvent::SignedIn);
        Ok(())
    }

    /// Termine la session courante
    pub(crate) async fn end_session(&self) -> Result<()> {
        self.coordinator.install(None).await?;
        self.events.emit(SessionEvent::SignedOut);
        Ok(())
    }

    /// Envoie une requête authentifiée
    ///
    /// Sur un 401, le token est rafraîchi et la requête renvoyée une seule
    /// fois ; un second 401 donne [`LyricbaseError::AuthenticationExpired`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        opts: &RequestOptions,
    ) -> Result<Response> {
        if self.coordinator.is_failed().await {
            debug!("Session ended, not sending {} {}", method, path);
            return Err(LyricbaseError::AuthenticationExpired);
        }

        let mut pair = self.store.load().await;

        if let Some(current) = &pair {
            let skew = chrono::Duration::from_std(self.settings.refresh_skew)
                .unwrap_or_else(|_| chrono::Duration::zero());
            if current.needs_refresh(skew) {
                debug!("Access token about to expire, refreshing first");
                match self.coordinator.refresh(Some(current.access_token.as_str())).await {
                    Ok(fresh) => pair = Some(fresh),
                    Err(e) if e.is_auth_error() => return Err(e),
                    Err(e) => warn!("Early refresh failed, using current token: {}", e),
                }
            }
        }

        let token = pair.as_ref().map(|p| p.access_token.as_str());
        let response = self.dispatch(&method, path, body, opts, token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        let rejected = match pair {
            Some(pair) => pair,
            None => return check_status(response).await,
        };

        // Une seule nouvelle tentative par requête
        debug!("{} {} got 401, refreshing", method, path);
        let fresh = self.coordinator.refresh(Some(rejected.access_token.as_str())).await?;
        let retried = self
            .dispatch(&method, path, body, opts, Some(&fresh.access_token))
            .await?;

        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!("{} {} rejected again after refresh", method, path);
            return Err(LyricbaseError::AuthenticationExpired);
        }
        check_status(retried).await
    }

    /// Envoie une requête sans credential ni rafraîchissement
    pub async fn send_anonymous(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        opts: &RequestOptions,
    ) -> Result<Response> {
        let response = self.dispatch(&method, path, body, opts, None).await?;
        check_status(response).await
    }

    /// Requête générique ; le corps de la réponse est renvoyé en JSON
    /// (`Value::Null` s'il est vide)
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let response = self
            .send(method, path, body, &RequestOptions::default())
            .await?;
        parse_optional(response).await
    }

    /// Effectue une requête GET et désérialise la réponse
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, opts: &RequestOptions) -> Result<T> {
        let response = self.send(Method::GET, path, None, opts).await?;
        parse_json(response).await
    }

    /// Effectue une requête POST JSON et désérialise la réponse
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let response = self
            .send(Method::POST, path, Some(&body), &RequestOptions::default())
            .await?;
        parse_json(response).await
    }

    /// Effectue une requête PUT JSON et désérialise la réponse
    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let response = self
            .send(Method::PUT, path, Some(&body), &RequestOptions::default())
            .await?;
        parse_json(response).await
    }

    /// Effectue une requête DELETE
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, None, &RequestOptions::default())
            .await?;
        Ok(())
    }

    /// Requête anonyme avec corps JSON
    pub(crate) async fn anonymous_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let response = self
            .send_anonymous(method, path, Some(&body), &RequestOptions::default())
            .await?;
        parse_json(response).await
    }

    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        opts: &RequestOptions,
        token: Option<&str>,
    ) -> Result<Response> {
        let url = join_url(&self.settings.base_url, path);
        debug!("{} {} with {} params", method, url, opts.query.len());

        let mut request = self.client.request(method.clone(), &url);
        if !opts.query.is_empty() {
            request = request.query(&opts.query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        Ok(request.send().await?)
    }
}

/// Transforme une réponse non-2xx en erreur
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    debug!("Response status: {}", status);

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("API error ({}): {}", status.as_u16(), body);
    Err(LyricbaseError::from_status_code(status.as_u16(), body))
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        warn!("Failed to parse response: {}", e);
        LyricbaseError::JsonParse(e)
    })
}

async fn parse_optional(response: Response) -> Result<Value> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h:3000/", "/songs/"), "http://h:3000/songs/");
        assert_eq!(join_url("http://h:3000", "songs"), "http://h:3000/songs");
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("Hillsong United"), "Hillsong%20United");
        assert_eq!(encode_segment("a/b"), "a%2Fb");
        assert_eq!(encode_segment("64f1-ab_c"), "64f1-ab_c");
    }

    #[test]
    fn test_request_options() {
        let opts = RequestOptions::new().query("search", "grace").query("filter", "name");
        assert_eq!(opts.query.len(), 2);
        assert_eq!(opts.query[1], ("filter".to_string(), "name".to_string()));
    }

    #[tokio::test]
    async fn test_api_creation() {
        let store = Arc::new(MemoryCredentialStore::new());
        let api = LyricbaseApi::new(ApiSettings::default(), store).unwrap();
        assert_eq!(api.base_url(), DEFAULT_BASE_URL);
        assert!(api.credentials().load().await.is_none());
        assert!(!api.coordinator().is_failed().await);
    }
}
