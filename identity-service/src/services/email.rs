//! Email delivery collaborator.
//!
//! The service renders subject/body and hands them to the provider;
//! delivery mechanics live behind the trait.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use service_core::error::AppError;

use crate::config::SmtpConfig;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_magic_link(&self, to: &str, link_url: &str) -> Result<(), AppError>;

    async fn send_invitation(
        &self,
        to: &str,
        org_label: &str,
        link_url: &str,
    ) -> Result<(), AppError>;
}

/// SMTP-backed email provider.
pub struct SmtpEmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| AppError::EmailError(e.to_string()))?
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .build();

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid from address: {}", e)))?;

        Ok(Self { transport, from })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), AppError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_magic_link(&self, to: &str, link_url: &str) -> Result<(), AppError> {
        let body = format!(
            "Sign in with this link (valid for 24 hours, single use):\n\n{}\n",
            link_url
        );
        self.send(to, "Your sign-in link", body).await
    }

    async fn send_invitation(
        &self,
        to: &str,
        org_label: &str,
        link_url: &str,
    ) -> Result<(), AppError> {
        let body = format!(
            "You have been invited to join {}.\n\nAccept the invitation:\n\n{}\n",
            org_label, link_url
        );
        self.send(to, &format!("Invitation to {}", org_label), body)
            .await
    }
}

/// No-op email provider for tests.
pub struct MockEmailService;

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_magic_link(&self, to: &str, _link_url: &str) -> Result<(), AppError> {
        tracing::debug!(to, "Mock magic link email");
        Ok(())
    }

    async fn send_invitation(
        &self,
        to: &str,
        _org_label: &str,
        _link_url: &str,
    ) -> Result<(), AppError> {
        tracing::debug!(to, "Mock invitation email");
        Ok(())
    }
}
