//! Module d'authentification pour l'API Lyricbase
//!
//! Ces endpoints sont appelés sans credential et sans rafraîchissement.

use super::LyricbaseApi;
use crate::credentials::CredentialPair;
use crate::error::Result;
use crate::models::{ApiMessage, SignedInUser};
use reqwest::Method;
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct OtpRequest<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    otp: Option<&'a str>,
}

impl LyricbaseApi {
    /// Connecte l'utilisateur et installe la nouvelle paire de credentials
    ///
    /// # Errors
    ///
    /// * `LyricbaseError::Http` - Credentials invalides (le corps contient le message du serveur)
    /// * `LyricbaseError::Persistence` - La paire n'a pas pu être enregistrée
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignedInUser> {
        info!("Signing in as {}", email);

        let user: SignedInUser = self
            .anonymous_json(Method::POST, "/auth/signin", &SignInRequest { email, password })
            .await?;
        self.install_session(&CredentialPair::from(&user)).await?;

        info!("Signed in");
        Ok(user)
    }

    /// Crée un compte ; l'utilisateur est connecté dans la foulée
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<SignedInUser> {
        info!("Signing up as {}", email);

        let user: SignedInUser = self
            .anonymous_json(
                Method::POST,
                "/auth/signup",
                &SignUpRequest {
                    name,
                    email,
                    password,
                },
            )
            .await?;
        self.install_session(&CredentialPair::from(&user)).await?;
        Ok(user)
    }

    /// Déconnecte l'utilisateur (suppression locale des credentials)
    pub async fn sign_out(&self) -> Result<()> {
        info!("Signing out");
        self.end_session().await
    }

    /// Envoie un code à usage unique par email (mot de passe oublié)
    pub async fn send_otp(&self, email: &str) -> Result<ApiMessage> {
        self.anonymous_json(
            Method::POST,
            "/auth/sendOtp",
            &OtpRequest { email, otp: None },
        )
        .await
    }

    /// Vérifie le code reçu par email
    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<ApiMessage> {
        self.anonymous_json(
            Method::POST,
            "/auth/verifyOtp",
            &OtpRequest {
                email,
                otp: Some(otp),
            },
        )
        .await
    }

    /// Définit un nouveau mot de passe après vérification du code
    pub async fn reset_password(&self, email: &str, password: &str) -> Result<ApiMessage> {
        self.anonymous_json(
            Method::PUT,
            "/auth/resetPassword",
            &SignInRequest { email, password },
        )
        .await
    }
}
