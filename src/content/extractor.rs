use select::document::Document;
use select::node::Node;
use select::predicate::Text;
use tracing::debug;

/// Text markers that delimit the article body on a detail page.
#[derive(Debug, Clone)]
pub struct ContentMarkers {
    /// The body begins on the line after the first line containing this.
    pub start: String,
    /// Tried in order; the first one found after the start ends the body.
    pub end: Vec<String>,
    /// Elements whose text is never part of the body.
    pub skip_tags: Vec<String>,
}

impl Default for ContentMarkers {
    fn default() -> Self {
        Self {
            start: "發布日期：".to_string(),
            end: vec!["上一則".to_string(), "下一則".to_string()],
            skip_tags: vec![
                "script".to_string(),
                "style".to_string(),
                "noscript".to_string(),
            ],
        }
    }
}

/// Best-effort extraction of an article body from its detail page.
///
/// Extraction never fails: a page without the expected markers yields the
/// text that could be located, or an empty string.
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor {
    markers: ContentMarkers,
}

impl ContentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_markers(markers: ContentMarkers) -> Self {
        Self { markers }
    }

    pub fn extract_content(&self, html: &str, title: Option<&str>) -> String {
        let lines = self.text_lines(html);
        let start = self.body_start(&lines, title);
        let end = self.body_end(&lines, start);

        let body = lines[start..end].join("\n").trim().to_string();
        if body.is_empty() {
            debug!("No article body found between markers");
        }
        body
    }

    /// Visible text of the page, one trimmed non-empty text node per line.
    fn text_lines(&self, html: &str) -> Vec<String> {
        let document = Document::from(html);

        document
            .find(Text)
            .filter(|node| !self.is_skipped(node))
            .filter_map(|node| node.as_text().map(str::trim))
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn is_skipped(&self, node: &Node) -> bool {
        let mut current = node.parent();
        while let Some(parent) = current {
            if let Some(name) = parent.name() {
                if self.markers.skip_tags.iter().any(|tag| tag.eq_ignore_ascii_case(name)) {
                    return true;
                }
            }
            current = parent.parent();
        }
        false
    }

    fn body_start(&self, lines: &[String], title: Option<&str>) -> usize {
        if !self.markers.start.is_empty() {
            if let Some(pos) = lines.iter().position(|line| line.contains(&self.markers.start)) {
                return pos + 1;
            }
        }

        let title = title.map(str::trim).filter(|title| !title.is_empty());
        if let Some(title) = title {
            if let Some(pos) = lines.iter().position(|line| line.contains(title)) {
                return pos + 1;
            }
        }

        0
    }

    fn body_end(&self, lines: &[String], start: usize) -> usize {
        self.markers
            .end
            .iter()
            .filter(|marker| !marker.is_empty())
            .find_map(|marker| {
                lines[start..]
                    .iter()
                    .position(|line| line.contains(marker.as_str()))
                    .map(|offset| start + offset)
            })
            .unwrap_or(lines.len())
    }
}
