// src/services/notifier.rs

//! DingTalk-style webhook delivery.
//!
//! Messages are posted as JSON to the robot endpoint. When a signing secret is
//! configured every request carries a fresh `timestamp` and an HMAC-SHA256
//! `sign` over `"{timestamp}\n{secret}"`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{AppError, Result};
use crate::models::{NotificationJob, WebhookConfig};
use crate::utils::http::HttpTransport;
use crate::utils::redact_url;
use crate::utils::retry::RetryPolicy;

type HmacSha256 = Hmac<Sha256>;

/// Application-level reply from the robot endpoint.
#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

pub struct WebhookNotifier {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    access_token: String,
    secret: Option<String>,
    retry: RetryPolicy,
}

impl WebhookNotifier {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &WebhookConfig, retry: RetryPolicy) -> Self {
        Self {
            transport,
            base_url: config.base_url.clone(),
            access_token: config.access_token.clone(),
            secret: config.secret.clone().filter(|s| !s.is_empty()),
            retry,
        }
    }

    /// Endpoint URL for a request made at `timestamp_ms`.
    pub fn webhook_url(&self, timestamp_ms: i64) -> Result<String> {
        let mut url = format!(
            "{}?access_token={}",
            self.base_url,
            urlencoding::encode(&self.access_token)
        );
        if let Some(secret) = &self.secret {
            let signature = sign(secret, timestamp_ms)?;
            url.push_str(&format!(
                "&timestamp={}&sign={}",
                timestamp_ms,
                urlencoding::encode(&signature)
            ));
        }
        Ok(url)
    }

    /// Deliver a job, retrying with backoff.
    ///
    /// Returns `true` once the endpoint accepts the message. Exhausted
    /// retries are logged and reported as `false`.
    pub async fn deliver(&self, job: &mut NotificationJob) -> bool {
        let body = match serde_json::to_value(&job.payload) {
            Ok(body) => body,
            Err(e) => {
                log::error!("Cannot encode {:?} notification: {e}", job.kind);
                return false;
            }
        };

        let attempts = AtomicU32::new(job.attempt);
        let label = format!("{:?} notification", job.kind);
        let result = self
            .retry
            .run(&label, |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                self.post_once(&body)
            })
            .await;
        job.attempt = attempts.load(Ordering::SeqCst);

        match result {
            Ok(()) => {
                log::info!(
                    "Delivered {:?} notification '{}' after {} attempt(s)",
                    job.kind,
                    job.payload.summary(),
                    job.attempt
                );
                true
            }
            Err(e) => {
                log::error!(
                    "Giving up on {:?} notification '{}' after {} attempt(s): {e}",
                    job.kind,
                    job.payload.summary(),
                    job.attempt
                );
                false
            }
        }
    }

    async fn post_once(&self, body: &serde_json::Value) -> Result<()> {
        let url = self.webhook_url(Utc::now().timestamp_millis())?;
        let response = self
            .transport
            .post_json(&url, body)
            .await?
            .error_for_status(&url)?;

        let reply: WebhookReply = response.json().map_err(|e| {
            AppError::parse(redact_url(&url), format!("unreadable webhook reply: {e}"))
        })?;
        if reply.errcode != 0 {
            return Err(AppError::webhook(reply.errcode, reply.errmsg));
        }
        Ok(())
    }

    /// Whether the endpoint is reachable at all.
    ///
    /// Any HTTP answer counts; no message is sent.
    pub async fn probe(&self) -> bool {
        match self.transport.get(&self.base_url).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Webhook connection test failed: {e}");
                false
            }
        }
    }
}

/// Base64 HMAC-SHA256 of `"{timestamp_ms}\n{secret}"` keyed by `secret`.
pub fn sign(secret: &str, timestamp_ms: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::config(format!("invalid webhook secret: {e}")))?;
    mac.update(format!("{timestamp_ms}\n{secret}").as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::{Mention, NotificationKind, WebhookPayload};
    use crate::utils::testing::{Reply, ScriptedTransport};

    const BASE: &str = "https://robot.example/send";

    fn config(secret: Option<&str>) -> WebhookConfig {
        WebhookConfig {
            base_url: BASE.into(),
            access_token: "tok".into(),
            secret: secret.map(String::from),
            ..WebhookConfig::default()
        }
    }

    fn notifier(transport: Arc<ScriptedTransport>, secret: Option<&str>) -> WebhookNotifier {
        WebhookNotifier::new(
            transport,
            &config(secret),
            RetryPolicy::exponential(3, Duration::ZERO),
        )
    }

    fn job() -> NotificationJob {
        NotificationJob::new(
            NotificationKind::System,
            WebhookPayload::text("hello", Mention::default()),
        )
    }

    #[test]
    fn test_unsigned_url() {
        let notifier = notifier(Arc::new(ScriptedTransport::new()), None);
        assert_eq!(
            notifier.webhook_url(1_700_000_000_000).unwrap(),
            "https://robot.example/send?access_token=tok"
        );
    }

    #[test]
    fn test_signed_url_carries_timestamp_and_encoded_sign() {
        let notifier = notifier(Arc::new(ScriptedTransport::new()), Some("SECabc"));
        let url = notifier.webhook_url(1_700_000_000_000).unwrap();

        let signature = sign("SECabc", 1_700_000_000_000).unwrap();
        let expected = format!(
            "https://robot.example/send?access_token=tok&timestamp=1700000000000&sign={}",
            urlencoding::encode(&signature)
        );
        assert_eq!(url, expected);
    }

    #[test]
    fn test_sign_is_base64_sha256_digest() {
        let first = sign("SECabc", 1).unwrap();
        assert_eq!(first, sign("SECabc", 1).unwrap());
        assert_ne!(first, sign("SECabc", 2).unwrap());
        assert_eq!(BASE64.decode(&first).unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_deliver_success() {
        let transport = Arc::new(
            ScriptedTransport::new().on(BASE, Reply::ok(r#"{"errcode":0,"errmsg":"ok"}"#)),
        );
        let notifier = notifier(Arc::clone(&transport), None);
        let mut job = job();

        assert!(notifier.deliver(&mut job).await);
        assert_eq!(job.attempt, 1);

        let posted = transport.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0]["msgtype"], "text");
        assert_eq!(posted[0]["text"]["content"], "hello");
    }

    #[tokio::test]
    async fn test_nonzero_errcode_is_retried() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on(BASE, Reply::ok(r#"{"errcode":130101,"errmsg":"send too fast"}"#))
                .on(BASE, Reply::ok(r#"{"errcode":0,"errmsg":"ok"}"#)),
        );
        let notifier = notifier(Arc::clone(&transport), None);
        let mut job = job();

        assert!(notifier.deliver(&mut job).await);
        assert_eq!(job.attempt, 2);
        assert_eq!(transport.calls_to(BASE), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_false() {
        let transport = Arc::new(ScriptedTransport::new().on(BASE, Reply::status(503)));
        let notifier = notifier(Arc::clone(&transport), None);
        let mut job = job();

        assert!(!notifier.deliver(&mut job).await);
        assert_eq!(job.attempt, 3);
        assert_eq!(transport.calls_to(BASE), 3);
    }

    #[tokio::test]
    async fn test_non_json_reply_is_failure() {
        let transport = Arc::new(ScriptedTransport::new().on(BASE, Reply::ok("<html>")));
        let notifier = notifier(Arc::clone(&transport), None);

        assert!(!notifier.deliver(&mut job()).await);
    }
}
