//! Welcome-mail building and sending.
//!
//! [`WelcomeMailHelper`] builds the templated welcome message for a freshly
//! provisioned admin user, optionally minting a password-reset token, and
//! dispatches it through the configured [`MailTransport`]. A user without a
//! mail address is not an error: the helper skips the send and reports
//! [`SendOutcome::SkippedNoEmail`].

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::host::{AppConfigStore, MailTransport, OutboundMail, SystemConfigStore, User};
use crate::jobs::post_setup::PUBLIC_URL_KEY;

/// App-config namespace holding per-user password-reset tokens.
const RESET_TOKEN_NAMESPACE: &str = "lostpassword";

const RESET_TOKEN_LEN: usize = 21;

/// Result of a welcome-mail attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The user has no email address on file; nothing was sent.
    SkippedNoEmail,
}

#[async_trait]
pub trait WelcomeMailSender: Send + Sync {
    async fn send_welcome_mail(
        &self,
        user: &User,
        generate_reset_token: bool,
    ) -> anyhow::Result<SendOutcome>;
}

pub struct WelcomeMailHelper {
    transport: Arc<dyn MailTransport>,
    app_config: Arc<dyn AppConfigStore>,
    system_config: Arc<dyn SystemConfigStore>,
    /// Daemon secret used to seal reset tokens at rest.
    secret: String,
}

impl WelcomeMailHelper {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        app_config: Arc<dyn AppConfigStore>,
        system_config: Arc<dyn SystemConfigStore>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            app_config,
            system_config,
            secret: secret.into(),
        }
    }

    /// Mint a fresh reset token, persist the sealed `timestamp:token` value
    /// against the user, and return the reset link for the mail body.
    async fn mint_reset_token(&self, user: &User, base_url: &str) -> anyhow::Result<String> {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RESET_TOKEN_LEN)
            .map(char::from)
            .collect();
        let value = format!("{}:{}", Utc::now().timestamp(), token);
        let sealed = self.seal(&value)?;
        self.app_config
            .set_string(RESET_TOKEN_NAMESPACE, &user.uid, &sealed)
            .await?;
        Ok(format!(
            "{}/reset/{}/{}",
            base_url.trim_end_matches('/'),
            user.uid,
            token
        ))
    }

    /// Encrypt a token value with the daemon secret (ChaCha20-Poly1305,
    /// random nonce prepended, base64 output).
    fn seal(&self, plaintext: &str) -> anyhow::Result<String> {
        let key = Sha256::digest(self.secret.as_bytes());
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| anyhow!("failed to encrypt reset token"))?;
        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    async fn build_template(&self, user: &User, reset_link: Option<&str>) -> Option<OutboundMail> {
        let email = user.email.as_deref()?;

        let base_url = self
            .system_config
            .get_system_value(PUBLIC_URL_KEY)
            .await
            .unwrap_or_default();
        let domain = self
            .system_config
            .get_system_value("mail_domain")
            .await
            .unwrap_or_else(|| "localhost".to_string());
        let from_local = self
            .system_config
            .get_system_value("mail_from_address")
            .await
            .unwrap_or_else(|| "no-reply".to_string());

        let mut body = format!(
            "Hello {},\n\nyour account has been created and your instance is ready.\n",
            user.display_name
        );
        if !base_url.is_empty() {
            body.push_str(&format!("\nYou can sign in at {base_url}\n"));
        }
        if let Some(link) = reset_link {
            body.push_str(&format!("\nTo set your password, follow this link:\n{link}\n"));
        }
        body.push_str("\nWelcome aboard!\n");

        Some(OutboundMail {
            to: email.to_string(),
            to_display_name: user.display_name.clone(),
            from_address: format!("{from_local}@{domain}"),
            subject: "Your account is ready".to_string(),
            body_text: body,
        })
    }
}

#[async_trait]
impl WelcomeMailSender for WelcomeMailHelper {
    async fn send_welcome_mail(
        &self,
        user: &User,
        generate_reset_token: bool,
    ) -> anyhow::Result<SendOutcome> {
        if user.email.is_none() {
            debug!(uid = %user.uid, "user has no email address, nothing to send");
            return Ok(SendOutcome::SkippedNoEmail);
        }

        let reset_link = if generate_reset_token {
            let base_url = self
                .system_config
                .get_system_value(PUBLIC_URL_KEY)
                .await
                .unwrap_or_default();
            match self.mint_reset_token(user, &base_url).await {
                Ok(link) => Some(link),
                // The welcome mail is still worth sending without the link.
                Err(e) => {
                    warn!(uid = %user.uid, error = %e, "failed to mint a password-reset token");
                    None
                }
            }
        } else {
            None
        };

        let Some(mail) = self.build_template(user, reset_link.as_deref()).await else {
            return Ok(SendOutcome::SkippedNoEmail);
        };
        self.transport.send(&mail).await?;
        Ok(SendOutcome::Sent)
    }
}
