//! lettre SMTP transport configured from the provisioned system mail settings.
//!
//! The `mail_*` system values are written by the installation listener, which
//! may happen after this transport is constructed — so the lettre transport is
//! built per send from the current system configuration.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::{MailTransport, OutboundMail, SystemConfigStore};

pub struct SmtpMailTransport {
    system_config: Arc<dyn SystemConfigStore>,
}

impl SmtpMailTransport {
    pub fn new(system_config: Arc<dyn SystemConfigStore>) -> Self {
        Self { system_config }
    }

    async fn build_transport(&self) -> anyhow::Result<AsyncSmtpTransport<Tokio1Executor>> {
        let host = self
            .system_config
            .get_system_value("mail_smtphost")
            .await
            .context("mail_smtphost is not configured")?;
        let port: u16 = self
            .system_config
            .get_system_value("mail_smtpport")
            .await
            .unwrap_or_else(|| "587".to_string())
            .parse()
            .context("mail_smtpport is not a valid port")?;
        let security = self
            .system_config
            .get_system_value("mail_smtpsecure")
            .await
            .unwrap_or_else(|| "tls".to_string());

        let mut builder = match security.as_str() {
            // Implicit TLS on connect.
            "ssl" => AsyncSmtpTransport::<Tokio1Executor>::relay(&host)?,
            // Plaintext, for test rigs and sealed networks.
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host),
            // STARTTLS upgrade (the provisioned default).
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)?,
        };
        builder = builder.port(port);

        let name = self
            .system_config
            .get_system_value("mail_smtpname")
            .await
            .unwrap_or_default();
        if !name.is_empty() {
            let password = self
                .system_config
                .get_system_value("mail_smtppassword")
                .await
                .unwrap_or_default();
            builder = builder.credentials(Credentials::new(name, password));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, mail: &OutboundMail) -> anyhow::Result<()> {
        let transport = self.build_transport().await?;

        let to_address: Address = mail.to.parse().context("invalid recipient address")?;
        let message = Message::builder()
            .from(mail.from_address.parse::<Mailbox>().context("invalid from address")?)
            .to(Mailbox::new(Some(mail.to_display_name.clone()), to_address))
            .subject(mail.subject.clone())
            .body(mail.body_text.clone())?;

        debug!(to = %mail.to, subject = %mail.subject, "dispatching mail via SMTP");
        transport.send(message).await?;
        Ok(())
    }
}
