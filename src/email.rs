use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, client::Tls, client::TlsParametersBuilder},
};
use tracing::debug;

use crate::billing::{ConfirmationSender, ShowcaseConfirmation};

const BRAND: &str = "GoEducate Talent";

/// Returns "[STAGING] " for the staging environment, empty string otherwise
fn staging_prefix(environment: &str) -> &'static str {
    match environment {
        "staging" => "[STAGING] ",
        _ => "",
    }
}

/// Staging prefix for email subjects, from TALENT_ENV
fn get_staging_prefix() -> &'static str {
    staging_prefix(&std::env::var("TALENT_ENV").unwrap_or_default())
}

/// Create a properly formatted Mailbox with display name
fn create_mailbox(name: &str, email: &str) -> Result<Mailbox> {
    let address = email.parse()?;
    Ok(Mailbox::new(Some(name.to_string()), address))
}

/// Simple HTML escaping
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn format_starts_at(starts_at: Option<DateTime<Utc>>) -> String {
    starts_at
        .map(|t| t.format("%A, %B %-d, %Y at %-I:%M %p UTC").to_string())
        .unwrap_or_else(|| "TBD".to_string())
}

fn confirmation_subject(confirmation: &ShowcaseConfirmation, prefix: &str) -> String {
    format!(
        "{}Showcase registration confirmed: {}",
        prefix, confirmation.showcase_title
    )
}

fn build_confirmation_text(confirmation: &ShowcaseConfirmation) -> String {
    let mut lines = vec![
        format!("Hi {},", confirmation.full_name),
        format!("You are registered for: {}", confirmation.showcase_title),
        format!("When: {}", format_starts_at(confirmation.starts_at)),
    ];
    if let Some(location) = confirmation.location.as_deref().filter(|l| !l.is_empty()) {
        lines.push(format!("Where: {location}"));
    }
    lines.push(format!("Details: {}", confirmation.details_url));
    lines.push(BRAND.to_string());
    lines.join("\n")
}

fn build_confirmation_html(confirmation: &ShowcaseConfirmation) -> String {
    let location = confirmation
        .location
        .as_deref()
        .filter(|l| !l.is_empty())
        .map(|l| format!("<p><strong>Where:</strong> {}</p>", html_escape(l)))
        .unwrap_or_default();

    format!(
        r#"<div style="font-family: Arial, sans-serif; line-height: 1.5; color: #111827;">
  <h2 style="margin: 0 0 12px;">Registration confirmed</h2>
  <p>Hi {name},</p>
  <p>You are registered for <strong>{title}</strong>.</p>
  <p><strong>When:</strong> {when}</p>
  {location}
  <p><a href="{url}">View details</a></p>
  <p style="color: #6b7280;">{brand}</p>
</div>"#,
        name = html_escape(&confirmation.full_name),
        title = html_escape(&confirmation.showcase_title),
        when = html_escape(&format_starts_at(confirmation.starts_at)),
        location = location,
        url = html_escape(&confirmation.details_url),
        brand = BRAND,
    )
}

pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl EmailService {
    pub fn new() -> Result<Self> {
        let smtp_server = std::env::var("SMTP_SERVER")
            .map_err(|_| anyhow::anyhow!("SMTP_SERVER environment variable not set"))?;

        let smtp_port: u16 = std::env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid SMTP_PORT"))?;

        let from_email = std::env::var("FROM_EMAIL")
            .map_err(|_| anyhow::anyhow!("FROM_EMAIL environment variable not set"))?;

        let from_name = std::env::var("FROM_NAME").unwrap_or_else(|_| BRAND.to_string());

        // Configure SMTP transport based on port:
        // - Port 1025: Insecure (Mailpit for local testing), no credentials
        // - Port 465: Implicit TLS
        // - Anything else: STARTTLS
        let mailer = if smtp_port == 1025 {
            tracing::info!("Using insecure SMTP connection for port 1025 (Mailpit) without TLS");
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_server)
                .port(smtp_port)
                .tls(Tls::None)
                .build()
        } else {
            let smtp_username = std::env::var("SMTP_USERNAME")
                .map_err(|_| anyhow::anyhow!("SMTP_USERNAME environment variable not set"))?;
            let smtp_password = std::env::var("SMTP_PASSWORD")
                .map_err(|_| anyhow::anyhow!("SMTP_PASSWORD environment variable not set"))?;
            let creds = Credentials::new(smtp_username, smtp_password);

            let tls_params = TlsParametersBuilder::new(smtp_server.clone())
                .dangerous_accept_invalid_certs(true)
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to create TLS parameters: {}", e))?;
            let tls = if smtp_port == 465 {
                tracing::info!("Using implicit TLS (SMTPS) for port 465");
                Tls::Wrapper(tls_params)
            } else {
                tracing::info!("Using STARTTLS for port {}", smtp_port);
                Tls::Required(tls_params)
            };

            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp_server)?
                .port(smtp_port)
                .credentials(creds)
                .tls(tls)
                .build()
        };

        Ok(Self {
            mailer,
            from_email,
            from_name,
        })
    }
}

#[async_trait]
impl ConfirmationSender for EmailService {
    async fn send_showcase_confirmation(&self, confirmation: &ShowcaseConfirmation) -> Result<()> {
        let email = Message::builder()
            .from(create_mailbox(&self.from_name, &self.from_email)?)
            .to(create_mailbox(&confirmation.full_name, &confirmation.to_email)?)
            .subject(confirmation_subject(confirmation, get_staging_prefix()))
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(build_confirmation_text(confirmation)))
                    .singlepart(SinglePart::html(build_confirmation_html(confirmation))),
            )?;

        let response = self.mailer.send(email).await?;
        debug!(code = %response.code(), "SMTP accepted showcase confirmation");
        Ok(())
    }
}
