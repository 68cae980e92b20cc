//! Invitation email delivery

use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::{Arc, Mutex};

type SendResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Email configuration
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
}

impl EmailConfig {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            smtp_host: std::env::var("SMTP_HOST").ok()?,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME").ok()?,
            smtp_password: std::env::var("SMTP_PASSWORD").ok()?,
            from_email: std::env::var("FROM_EMAIL").ok()?,
            from_name: std::env::var("FROM_NAME").unwrap_or_else(|_| "Cargo Hub".to_string()),
        })
    }
}

fn invitation_html(invite_link: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>You are invited</title>
</head>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1 style="color: #333;">You have been invited to Cargo Hub</h1>
    <p>Follow the link below to create your account:</p>
    <p style="text-align: center; margin: 30px 0;">
        <a href="{link}" style="background-color: #2196F3; color: white; padding: 14px 28px; text-decoration: none; border-radius: 4px; display: inline-block;">
            Register
        </a>
    </p>
    <p style="word-break: break-all; color: #666;">{link}</p>
    <p style="color: #999; font-size: 12px; margin-top: 30px;">
        This link expires in 5 minutes.
    </p>
</body>
</html>"#,
        link = invite_link
    )
}

/// SMTP email service
pub struct EmailService {
    config: EmailConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Result<Self, lettre::transport::smtp::Error> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self { config, mailer })
    }

    pub async fn send_invitation_email(&self, to_email: &str, invite_link: &str) -> SendResult {
        let email = Message::builder()
            .from(format!("{} <{}>", self.config.from_name, self.config.from_email).parse()?)
            .to(to_email.parse()?)
            .subject("Invitation to register - Cargo Hub")
            .header(ContentType::TEXT_HTML)
            .body(invitation_html(invite_link))?;

        self.mailer.send(email).await?;
        Ok(())
    }
}

/// Mock email service for development/testing; keeps what it "sent"
#[derive(Default)]
pub struct MockEmailService {
    outbox: Mutex<Vec<(String, String)>>,
    unreachable: bool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every send, like a relay that is down
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub async fn send_invitation_email(&self, to_email: &str, invite_link: &str) -> SendResult {
        if self.unreachable {
            return Err(format!("[MOCK EMAIL] relay unreachable, dropped mail to {}", to_email).into());
        }
        log::info!("[MOCK EMAIL] Invitation to {}: {}", to_email, invite_link);
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.push((to_email.to_string(), invite_link.to_string()));
        }
        Ok(())
    }

    /// `(recipient, link)` pairs in send order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

/// Real SMTP or logging mock, chosen at startup
#[derive(Clone)]
pub enum EmailSender {
    Real(Arc<EmailService>),
    Mock(Arc<MockEmailService>),
}

impl EmailSender {
    pub fn from_env() -> Self {
        match EmailConfig::from_env() {
            Some(config) => match EmailService::new(config) {
                Ok(service) => EmailSender::Real(Arc::new(service)),
                Err(e) => {
                    log::warn!("Failed to initialize email service: {}. Using mock.", e);
                    EmailSender::mock()
                }
            },
            None => {
                log::info!("Email not configured. Using mock email service.");
                EmailSender::mock()
            }
        }
    }

    pub fn mock() -> Self {
        EmailSender::Mock(Arc::new(MockEmailService::new()))
    }

    pub async fn send_invitation_email(&self, to_email: &str, invite_link: &str) -> SendResult {
        match self {
            EmailSender::Real(service) => service.send_invitation_email(to_email, invite_link).await,
            EmailSender::Mock(mock) => mock.send_invitation_email(to_email, invite_link).await,
        }
    }
}
