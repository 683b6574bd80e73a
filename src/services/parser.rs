// src/services/parser.rs

//! Timeline page parsing.
//!
//! Turns a mirror's HTML into candidate [`TweetRecord`]s. The fetcher only
//! depends on [`PageParser`], so the scraper can be swapped for an API client
//! without touching the pipeline.

use std::collections::HashSet;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{TweetId, TweetRecord};
use crate::utils::resolve_url;

/// Extracts candidate records from a timeline page.
pub trait PageParser: Send + Sync {
    /// Parse `html` fetched from `page_url` for `username`.
    ///
    /// Items that cannot be turned into a record are skipped.
    fn parse(&self, html: &str, page_url: &str, username: &str) -> Vec<TweetRecord>;
}

/// Parser for Nitter timeline markup.
pub struct NitterParser {
    item: Selector,
    item_fallback: Selector,
    status_link: Selector,
    content: Selector,
    time: Selector,
    date_link: Selector,
    author: Selector,
    media: Selector,
    status_id: Regex,
}

impl NitterParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            item: parse_selector("div.timeline-item")?,
            item_fallback: parse_selector("div.tweet")?,
            status_link: parse_selector(r#"a[href*="/status/"]"#)?,
            content: parse_selector("div.tweet-content")?,
            time: parse_selector("time[datetime]")?,
            date_link: parse_selector(".tweet-date a[title]")?,
            author: parse_selector("a.username")?,
            media: parse_selector(".attachments img, .tweet-media img")?,
            status_id: Regex::new(r"/status/(\d+)")
                .map_err(|e| AppError::parse("status id pattern", e))?,
        })
    }

    fn parse_item(&self, item: &ElementRef, base: &Url, username: &str) -> Option<TweetRecord> {
        let href = item
            .select(&self.status_link)
            .filter_map(|a| a.value().attr("href"))
            .find(|href| self.status_id.is_match(href))?;
        let id = self
            .status_id
            .captures(href)
            .and_then(|caps| caps.get(1))
            .and_then(|m| TweetId::parse(m.as_str()))?;

        let content_elem = item.select(&self.content).next()?;
        let content = normalize_whitespace(&content_elem.text().collect::<String>());

        let published_at = item
            .select(&self.time)
            .find_map(|t| t.value().attr("datetime"))
            .or_else(|| {
                item.select(&self.date_link)
                    .find_map(|a| a.value().attr("title"))
            })
            .unwrap_or_default()
            .trim()
            .to_string();

        let author = item
            .select(&self.author)
            .next()
            .map(|a| a.text().collect::<String>())
            .map(|text| text.trim().trim_start_matches('@').to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| username.to_string());

        let mut seen = HashSet::new();
        let media_urls = item
            .select(&self.media)
            .filter_map(|img| img.value().attr("src"))
            .map(|src| resolve_url(base, src))
            .filter(|src| seen.insert(src.clone()))
            .collect();

        Some(TweetRecord {
            id,
            author,
            content,
            published_at,
            url: strip_fragment(&resolve_url(base, href)),
            media_urls,
        })
    }
}

impl PageParser for NitterParser {
    fn parse(&self, html: &str, page_url: &str, username: &str) -> Vec<TweetRecord> {
        let base = match Url::parse(page_url) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Cannot resolve links against {page_url}: {e}");
                return Vec::new();
            }
        };

        let document = Html::parse_document(html);
        let mut items: Vec<ElementRef> = document.select(&self.item).collect();
        if items.is_empty() {
            items = document.select(&self.item_fallback).collect();
        }

        let records: Vec<TweetRecord> = items
            .iter()
            .filter_map(|item| self.parse_item(item, &base, username))
            .collect();

        log::debug!(
            "Parsed {} of {} timeline items from {}",
            records.len(),
            items.len(),
            page_url
        );
        records
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_fragment(link: &str) -> String {
    match Url::parse(link) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => link.to_string(),
    }
}
