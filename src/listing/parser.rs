use std::collections::HashSet;

use chrono::NaiveDate;
use regex::Regex;
use select::document::Document;
use select::predicate::{Name, Text};
use tracing::debug;
use url::Url;

use crate::article::ArticleSummary;
use crate::error::{Error, Result};

pub const PUBLISH_LABEL: &str = "發布日期";
pub const UPDATE_LABEL: &str = "更新日期";

const DETAIL_PATH: &str = "pages/detail.aspx";
const DATE_FORMAT: &str = "%Y/%m/%d";

/// Turns a listing page into article summaries, in page order.
pub struct ListingParser {
    base_url: Url,
    node_id: String,
    publish_pattern: Regex,
    update_pattern: Regex,
}

impl ListingParser {
    pub fn new(base_url: &str, node_id: u32) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::InvalidUrl(format!("Invalid base URL {}: {}", base_url, e)))?;

        Ok(Self {
            base_url,
            node_id: node_id.to_string(),
            publish_pattern: date_pattern(PUBLISH_LABEL)?,
            update_pattern: date_pattern(UPDATE_LABEL)?,
        })
    }

    pub fn parse_listing(&self, html: &str) -> Vec<ArticleSummary> {
        let document = Document::from(html);

        let texts: Vec<(usize, &str)> = document
            .find(Text)
            .filter_map(|node| node.as_text().map(|text| (node.index(), text)))
            .collect();

        let anchors: Vec<(usize, Url, String)> = document
            .find(Name("a"))
            .filter_map(|node| {
                let href = node.attr("href")?;
                let url = self.resolve_detail(href)?;
                Some((node.index(), url, node.text().trim().to_string()))
            })
            .collect();

        let mut seen = HashSet::new();
        let mut summaries = Vec::new();

        for (position, (index, url, title)) in anchors.iter().enumerate() {
            if title.is_empty() {
                debug!("Skipping untitled link to {}", url);
                continue;
            }

            // Dates belong to this article only until a link to a different one.
            let boundary = anchors[position + 1..]
                .iter()
                .find(|(_, other, _)| other != url)
                .map(|(other_index, _, _)| *other_index)
                .unwrap_or(usize::MAX);

            let window = texts
                .iter()
                .filter(|(text_index, _)| text_index > index && *text_index < boundary)
                .map(|(_, text)| *text)
                .collect::<Vec<_>>()
                .join(" ");

            let summary = ArticleSummary {
                id: extract_pid(url),
                title: title.clone(),
                url: url.to_string(),
                publish_date: extract_date(&self.publish_pattern, &window),
                update_date: extract_date(&self.update_pattern, &window),
            };

            if seen.insert(summary.dedup_key()) {
                summaries.push(summary);
            }
        }

        debug!("Parsed {} summaries from listing page", summaries.len());
        summaries
    }

    /// Resolve `href` against the site and keep it only if it points at an
    /// article of the configured node.
    fn resolve_detail(&self, href: &str) -> Option<Url> {
        let url = self.base_url.join(href.trim()).ok()?;

        if !url.path().to_ascii_lowercase().ends_with(DETAIL_PATH) {
            return None;
        }

        let in_node = url
            .query_pairs()
            .any(|(key, value)| key.eq_ignore_ascii_case("nodeid") && value == self.node_id.as_str());

        in_node.then_some(url)
    }
}

fn date_pattern(label: &str) -> Result<Regex> {
    Regex::new(&format!(r"{}\s*[:：]\s*(\d{{4}}/\d{{2}}/\d{{2}})", regex::escape(label)))
        .map_err(|e| Error::Config(format!("Invalid date pattern: {}", e)))
}

/// `pid` query parameter, when present and numeric.
pub fn extract_pid(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case("pid"))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()))
}

fn extract_date(pattern: &Regex, text: &str) -> String {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|date| NaiveDate::parse_from_str(date, DATE_FORMAT).is_ok())
        .map(str::to_string)
        .unwrap_or_default()
}
