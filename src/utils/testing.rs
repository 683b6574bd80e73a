//! Test doubles shared by the module tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::utils::http::{HttpResponse, HttpTransport};

/// Canned outcome of one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(u16, String),
    /// Connection-level failure
    Refuse,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Respond(200, body.into())
    }

    pub fn status(status: u16) -> Self {
        Self::Respond(status, String::new())
    }
}

struct Route {
    prefix: String,
    replies: VecDeque<Reply>,
    last: Option<Reply>,
    delay: Duration,
}

/// A recorded request.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub body: Option<serde_json::Value>,
}

/// Transport that answers from per-prefix reply queues.
///
/// Replies for a prefix are consumed in order; the final reply repeats once
/// the queue is drained. Unmatched URLs are refused.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for URLs starting with `prefix`.
    pub fn on(self, prefix: &str, reply: Reply) -> Self {
        {
            let mut routes = self.routes.lock().unwrap();
            match routes.iter_mut().find(|r| r.prefix == prefix) {
                Some(route) => route.replies.push_back(reply),
                None => routes.push(Route {
                    prefix: prefix.to_string(),
                    replies: VecDeque::from([reply]),
                    last: None,
                    delay: Duration::ZERO,
                }),
            }
        }
        self
    }

    /// Hold every answer for `prefix` back by `delay`. Call after [`Self::on`].
    pub fn slow(self, prefix: &str, delay: Duration) -> Self {
        {
            let mut routes = self.routes.lock().unwrap();
            if let Some(route) = routes.iter_mut().find(|r| r.prefix == prefix) {
                route.delay = delay;
            }
        }
        self
    }

    /// Number of requests whose URL starts with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.url.starts_with(prefix))
            .count()
    }

    /// Every recorded request, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// JSON bodies of all POST requests, in order.
    pub fn posted(&self) -> Vec<serde_json::Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| c.body.clone())
            .collect()
    }

    async fn respond(&self, url: &str, body: Option<&serde_json::Value>) -> Result<HttpResponse> {
        let (delay, result) = self.answer(url, body);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    fn answer(&self, url: &str, body: Option<&serde_json::Value>) -> (Duration, Result<HttpResponse>) {
        self.calls.lock().unwrap().push(Call {
            url: url.to_string(),
            body: body.cloned(),
        });

        let (delay, reply) = {
            let mut routes = self.routes.lock().unwrap();
            match routes
                .iter_mut()
                .filter(|r| url.starts_with(&r.prefix))
                .max_by_key(|r| r.prefix.len())
            {
                Some(route) => {
                    if let Some(next) = route.replies.pop_front() {
                        route.last = Some(next.clone());
                    }
                    (route.delay, route.last.clone())
                }
                None => (Duration::ZERO, None),
            }
        };

        let result = match reply {
            Some(Reply::Respond(status, body)) => Ok(HttpResponse { status, body }),
            Some(Reply::Refuse) | None => Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("connection refused: {url}"),
            ))),
        };
        (delay, result)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.respond(url, None).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse> {
        self.respond(url, Some(body)).await
    }
}

/// Minimal Nitter timeline page with the given status ids, newest first.
pub fn nitter_page(username: &str, ids: &[&str]) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<div class="timeline-item">
                     <a class="tweet-link" href="/{username}/status/{id}#m"></a>
                     <a class="username" href="/{username}">@{username}</a>
                     <span class="tweet-date"><a href="/{username}/status/{id}#m" title="Jan 1, 2025 · 10:00 AM UTC">1h</a></span>
                     <div class="tweet-content media-body">tweet number {id}</div>
                   </div>"#
            )
        })
        .collect();
    format!(r#"<html><body><div class="timeline">{items}</div></body></html>"#)
}
