//! Utility functions and helpers.

pub mod http;
pub mod retry;
#[cfg(test)]
pub mod testing;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Strip the query string so credentials never reach the logs.
pub fn redact_url(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(mut url) => {
            url.set_query(None);
            url.to_string()
        }
        Err(_) => url_str.split('?').next().unwrap_or_default().to_string(),
    }
}

/// Join a mirror base URL and an account handle.
pub fn timeline_url(mirror: &str, username: &str) -> String {
    format!("{}/{}", mirror.trim_end_matches('/'), username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://nitter.example/jack").unwrap();
        assert_eq!(
            resolve_url(&base, "/pic/media%2Fabc.jpg"),
            "https://nitter.example/pic/media%2Fabc.jpg"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("https://oapi.dingtalk.com/robot/send?access_token=secret"),
            "https://oapi.dingtalk.com/robot/send"
        );
        assert_eq!(redact_url("not a url?token=1"), "not a url");
    }

    #[test]
    fn test_timeline_url() {
        assert_eq!(
            timeline_url("https://nitter.example/", "jack"),
            "https://nitter.example/jack"
        );
        assert_eq!(
            timeline_url("https://nitter.example", "jack"),
            "https://nitter.example/jack"
        );
    }
}
