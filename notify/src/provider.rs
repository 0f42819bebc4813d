//! Per-channel delivery providers.
//!
//! Providers are a closed tagged variant with one `send` operation; new
//! kinds are added by extending the enum. A misconfigured provider degrades
//! to the logging stub instead of failing startup.

use crate::NotifyError;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde_json::json;
use std::time::Duration;
use tracing::info;

/// Provider call timeout.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Notification channels selected from event payload fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Sms,
    Email,
    Whatsapp,
    Push,
}

impl Channel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
            Self::Whatsapp => "whatsapp",
            Self::Push => "push",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SMTP settings for the email provider.
#[derive(Debug, Clone, Default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

/// Provider selection and settings, one kind string per channel plus the
/// transport-specific settings the kinds need.
#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    pub sms_kind: String,
    pub email_kind: String,
    pub whatsapp_kind: String,
    pub push_kind: String,
    /// `(channel, url, token)` rows for webhook-kind channels.
    pub webhooks: Vec<(String, String, Option<String>)>,
    pub smtp: Option<SmtpConfig>,
    pub sms_http_url: Option<String>,
    pub sms_http_token: Option<String>,
}

/// A delivery backend for one channel.
#[derive(Debug, Clone)]
pub enum Provider {
    /// Logs the message. Default and fallback for misconfiguration.
    Log { channel: Channel },
    /// Accepts silently.
    NoOp,
    /// Always fails; for exercising the retry and DLQ paths.
    Fail,
    /// Generic JSON webhook.
    Webhook {
        channel: Channel,
        url: String,
        token: Option<String>,
    },
    /// SMTP mail via lettre.
    Smtp(SmtpConfig),
    /// SMS gateway speaking the webhook shape.
    SmsHttp { url: String, token: Option<String> },
}

impl Provider {
    /// Resolve a kind string for one channel.
    ///
    /// Unknown kinds that look like URLs are treated as webhooks; anything
    /// else (including kinds missing their settings) falls back to logging.
    #[must_use]
    pub fn build(kind: &str, channel: Channel, config: &ProvidersConfig) -> Self {
        match kind.trim() {
            "" | "stub" | "log" => Self::Log { channel },
            "noop" => Self::NoOp,
            "fail" => Self::Fail,
            "webhook" => {
                let hit = config
                    .webhooks
                    .iter()
                    .find(|(ch, _, _)| ch == channel.as_str());
                match hit {
                    Some((_, url, token)) if !url.is_empty() => Self::Webhook {
                        channel,
                        url: url.clone(),
                        token: token.clone(),
                    },
                    _ => Self::Log { channel },
                }
            }
            "smtp" => match (&config.smtp, channel) {
                (Some(smtp), Channel::Email) if !smtp.host.is_empty() && !smtp.from.is_empty() => {
                    Self::Smtp(smtp.clone())
                }
                _ => Self::Log { channel },
            },
            "sms_http" => match (&config.sms_http_url, channel) {
                (Some(url), Channel::Sms) if !url.is_empty() => Self::SmsHttp {
                    url: url.clone(),
                    token: config.sms_http_token.clone(),
                },
                _ => Self::Log { channel },
            },
            other if other.starts_with("http://") || other.starts_with("https://") => {
                Self::Webhook {
                    channel,
                    url: other.to_string(),
                    token: None,
                }
            }
            _ => Self::Log { channel },
        }
    }

    /// Deliver one message.
    pub async fn send(
        &self,
        http: &reqwest::Client,
        recipient: &str,
        message: &str,
    ) -> Result<(), NotifyError> {
        match self {
            Self::Log { channel } => {
                info!(channel = %channel, recipient, message, "notification (log provider)");
                Ok(())
            }
            Self::NoOp => Ok(()),
            Self::Fail => Err(NotifyError::Provider("provider failure".to_string())),
            Self::Webhook {
                channel,
                url,
                token,
            } => post_webhook(http, url, token.as_deref(), channel.as_str(), recipient, message).await,
            Self::SmsHttp { url, token } => {
                post_webhook(
                    http,
                    url,
                    token.as_deref(),
                    Channel::Sms.as_str(),
                    recipient,
                    message,
                )
                .await
            }
            Self::Smtp(config) => send_smtp(config, recipient, message).await,
        }
    }
}

async fn post_webhook(
    http: &reqwest::Client,
    url: &str,
    token: Option<&str>,
    channel: &str,
    recipient: &str,
    message: &str,
) -> Result<(), NotifyError> {
    let body = json!({
        "channel": channel,
        "recipient": recipient,
        "message": message,
    });
    let mut request = http.post(url).timeout(SEND_TIMEOUT).json(&body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .map_err(|e| NotifyError::Provider(format!("webhook request: {e}")))?;
    if response.status().as_u16() >= 300 {
        return Err(NotifyError::Provider(format!(
            "webhook rejected request: {}",
            response.status()
        )));
    }
    Ok(())
}

async fn send_smtp(config: &SmtpConfig, recipient: &str, message: &str) -> Result<(), NotifyError> {
    let email = Message::builder()
        .from(
            config
                .from
                .parse()
                .map_err(|e| NotifyError::Provider(format!("invalid from address: {e}")))?,
        )
        .to(recipient
            .parse()
            .map_err(|e| NotifyError::Provider(format!("invalid to address: {e}")))?)
        .subject("Waitline notification")
        .header(ContentType::TEXT_PLAIN)
        .body(message.to_string())
        .map_err(|e| NotifyError::Provider(format!("failed to build email: {e}")))?;

    let mut builder = SmtpTransport::relay(&config.host)
        .map_err(|e| NotifyError::Provider(format!("smtp relay: {e}")))?
        .timeout(Some(SEND_TIMEOUT));
    if let Some(port) = config.port {
        builder = builder.port(port);
    }
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }
    let mailer = builder.build();

    // Lettre's SMTP transport is blocking.
    tokio::task::spawn_blocking(move || {
        mailer
            .send(&email)
            .map(|_| ())
            .map_err(|e| NotifyError::Provider(format!("smtp send: {e}")))
    })
    .await
    .map_err(|e| NotifyError::Provider(format!("smtp task: {e}")))?
}

/// One resolved provider per channel.
#[derive(Debug, Clone)]
pub struct ProviderSet {
    pub sms: Provider,
    pub email: Provider,
    pub whatsapp: Provider,
    pub push: Provider,
}

impl ProviderSet {
    /// Resolve every channel from the config.
    #[must_use]
    pub fn from_config(config: &ProvidersConfig) -> Self {
        Self {
            sms: Provider::build(&config.sms_kind, Channel::Sms, config),
            email: Provider::build(&config.email_kind, Channel::Email, config),
            whatsapp: Provider::build(&config.whatsapp_kind, Channel::Whatsapp, config),
            push: Provider::build(&config.push_kind, Channel::Push, config),
        }
    }

    #[must_use]
    pub const fn for_channel(&self, channel: Channel) -> &Provider {
        match channel {
            Channel::Sms => &self.sms,
            Channel::Email => &self.email,
            Channel::Whatsapp => &self.whatsapp,
            Channel::Push => &self.push,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_stub_kinds_build_the_log_provider() {
        let config = ProvidersConfig::default();
        for kind in ["", "stub", "log", "something-else"] {
            assert!(matches!(
                Provider::build(kind, Channel::Sms, &config),
                Provider::Log { channel: Channel::Sms }
            ));
        }
    }

    #[test]
    fn webhook_without_url_degrades_to_log() {
        let config = ProvidersConfig::default();
        assert!(matches!(
            Provider::build("webhook", Channel::Push, &config),
            Provider::Log { .. }
        ));

        let config = ProvidersConfig {
            webhooks: vec![(
                "push".to_string(),
                "https://push.example.com/send".to_string(),
                Some("secret".to_string()),
            )],
            ..ProvidersConfig::default()
        };
        assert!(matches!(
            Provider::build("webhook", Channel::Push, &config),
            Provider::Webhook { channel: Channel::Push, .. }
        ));
    }

    #[test]
    fn url_kinds_are_treated_as_webhooks() {
        let config = ProvidersConfig::default();
        match Provider::build("https://gateway.example.com/sms", Channel::Sms, &config) {
            Provider::Webhook { url, token, .. } => {
                assert_eq!(url, "https://gateway.example.com/sms");
                assert!(token.is_none());
            }
            other => panic!("expected webhook, got {other:?}"),
        }
    }

    #[test]
    fn smtp_is_email_only() {
        let config = ProvidersConfig {
            smtp: Some(SmtpConfig {
                host: "smtp.example.com".to_string(),
                from: "noreply@example.com".to_string(),
                ..SmtpConfig::default()
            }),
            ..ProvidersConfig::default()
        };
        assert!(matches!(
            Provider::build("smtp", Channel::Email, &config),
            Provider::Smtp(_)
        ));
        assert!(matches!(
            Provider::build("smtp", Channel::Sms, &config),
            Provider::Log { .. }
        ));
    }

    #[test]
    fn sms_http_requires_its_url() {
        let config = ProvidersConfig {
            sms_http_url: Some("https://sms.example.com".to_string()),
            ..ProvidersConfig::default()
        };
        assert!(matches!(
            Provider::build("sms_http", Channel::Sms, &config),
            Provider::SmsHttp { .. }
        ));
        assert!(matches!(
            Provider::build("sms_http", Channel::Email, &config),
            Provider::Log { .. }
        ));
    }

    #[tokio::test]
    async fn fail_provider_always_fails() {
        let http = reqwest::Client::new();
        let err = Provider::Fail
            .send(&http, "someone", "hello")
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("provider failure"));
    }

    #[tokio::test]
    async fn noop_and_log_always_succeed() {
        let http = reqwest::Client::new();
        Provider::NoOp.send(&http, "someone", "hello").await.expect("noop");
        Provider::Log { channel: Channel::Email }
            .send(&http, "someone", "hello")
            .await
            .expect("log");
    }
}
