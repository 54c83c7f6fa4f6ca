//! arXiv Atom API client.
//!
//! Endpoint used:
//!   query: https://export.arxiv.org/api/query
//!
//! Keyword search is restricted to one archive (`cat:cs`, `cat:math`, …) and
//! sorted by relevance; the latest-papers listing sorts by submission date.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scholarsift_common::{validate_arxiv_category, EngineError, PaperRecord, SandboxClient, Source};
use tracing::{debug, instrument, warn};

use super::{blocked, normalize_ws, read_body, PaperEngine};

const ENGINE: Source = Source::Arxiv;

pub struct ArxivClient {
    client: SandboxClient,
    base_url: String,
    default_category: String,
}

/// One page of the newest submissions in a category.
#[derive(Debug, Clone)]
pub struct LatestPage {
    /// Entries published inside the requested window, newest first.
    pub papers: Vec<PaperRecord>,
    /// Entries the feed returned before the date window was applied.
    pub fetched: usize,
}

impl ArxivClient {
    pub fn new(client: SandboxClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            default_category: "cs".to_string(),
        }
    }

    pub fn with_default_category(mut self, category: impl Into<String>) -> Self {
        self.default_category = category.into();
        self
    }

    fn query_url(&self) -> String {
        format!("{}/api/query", self.base_url.trim_end_matches('/'))
    }

    async fn fetch(&self, params: &[(&str, String)]) -> Result<Vec<AtomEntry>, EngineError> {
        let resp = self
            .client
            .get(&self.query_url())
            .map_err(|e| blocked(ENGINE, e))?
            .query(params)
            .send()
            .await
            .map_err(|e| EngineError::network(ENGINE, e))?;
        let body = read_body(ENGINE, resp).await?;
        parse_atom(&body)
    }

    /// Newest submissions in `category`, keeping those published within
    /// `days` of now.
    #[instrument(skip(self))]
    pub async fn latest(
        &self,
        category: &str,
        days: u32,
        offset: usize,
        limit: usize,
    ) -> Result<LatestPage, EngineError> {
        let category = validate_arxiv_category(category)?;
        let params = [
            ("search_query", format!("cat:{category}")),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
            ("start", offset.to_string()),
            ("max_results", limit.max(1).to_string()),
        ];
        let entries = self.fetch(&params).await?;
        let fetched = entries.len();
        let papers = keep_recent(entries, Utc::now(), days);
        debug!(fetched, kept = papers.len(), "arXiv latest listing");
        Ok(LatestPage { papers, fetched })
    }
}

#[async_trait]
impl PaperEngine for ArxivClient {
    fn source(&self) -> Source {
        ENGINE
    }

    #[instrument(skip(self))]
    async fn search(
        &self,
        keywords: &str,
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<PaperRecord>, EngineError> {
        let category = validate_arxiv_category(category.unwrap_or(&self.default_category))?;
        let params = [
            ("search_query", build_query(keywords, category)),
            ("sortBy", "relevance".to_string()),
            ("sortOrder", "descending".to_string()),
            ("start", "0".to_string()),
            ("max_results", limit.max(1).to_string()),
        ];
        let entries = self.fetch(&params).await?;
        let mut papers: Vec<PaperRecord> = entries.into_iter().map(AtomEntry::into_record).collect();
        papers.truncate(limit);
        debug!(n = papers.len(), "arXiv search returned papers");
        Ok(papers)
    }
}

/// `cat:<archive> AND all:<w1> AND all:<w2> …`
fn build_query(keywords: &str, category: &str) -> String {
    let terms: Vec<String> = keywords
        .split_whitespace()
        .map(|w| w.replace(['"', '(', ')'], ""))
        .filter(|w| !w.is_empty())
        .map(|w| format!("all:{w}"))
        .collect();
    if terms.is_empty() {
        format!("cat:{category}")
    } else {
        format!("cat:{category} AND {}", terms.join(" AND "))
    }
}

/// Entries published within `days` of `now`. A window reaching past the
/// representable range has no cutoff.
fn keep_recent(entries: Vec<AtomEntry>, now: DateTime<Utc>, days: u32) -> Vec<PaperRecord> {
    let cutoff = TimeDelta::try_days(i64::from(days)).and_then(|d| now.checked_sub_signed(d));
    entries
        .into_iter()
        .filter(|e| match (e.published_at, cutoff) {
            (Some(t), Some(cutoff)) => t >= cutoff,
            (Some(_), None) => true,
            (None, _) => false,
        })
        .map(AtomEntry::into_record)
        .collect()
}

#[derive(Debug, Default)]
struct AtomEntry {
    id_url: String,
    title: String,
    summary: String,
    published: Option<String>,
    published_at: Option<DateTime<Utc>>,
    authors: Vec<String>,
    pdf_url: Option<String>,
}

impl AtomEntry {
    fn arxiv_id(&self) -> String {
        let url = self.id_url.trim();
        match url.rfind("/abs/") {
            Some(i) => url[i + "/abs/".len()..].trim_matches('/').to_string(),
            None => url.rsplit('/').next().unwrap_or(url).to_string(),
        }
    }

    fn into_record(self) -> PaperRecord {
        let id = self.arxiv_id();
        let mut p = PaperRecord::new(ENGINE, id.clone(), self.title).with_abstract(self.summary);
        p.authors = self.authors;
        p.published = self.published.map(|s| s.chars().take(10).collect());
        p.url = Some(format!("https://arxiv.org/abs/{id}"));
        p.pdf_url = Some(self.pdf_url.unwrap_or_else(|| format!("https://arxiv.org/pdf/{id}.pdf")));
        p
    }
}

fn pdf_link(e: &BytesStart<'_>) -> Option<String> {
    let mut rel = None;
    let mut ty = None;
    let mut href = None;
    for a in e.attributes().flatten() {
        let v = a.unescape_value().map(|v| v.to_string()).unwrap_or_default();
        match a.key.local_name().as_ref() {
            b"rel" => rel = Some(v),
            b"type" => ty = Some(v),
            b"href" => href = Some(v),
            _ => {}
        }
    }
    let is_pdf = ty.as_deref() == Some("application/pdf")
        || (rel.as_deref() == Some("related") && href.as_deref().is_some_and(|h| h.contains("/pdf/")));
    if is_pdf { href } else { None }
}

/// Parse an Atom feed into entries. arXiv reports query errors as a single
/// entry whose id points at `/api/errors`; that becomes a parse error.
fn parse_atom(xml: &str) -> Result<Vec<AtomEntry>, EngineError> {
    let mut entries = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<AtomEntry> = None;
    let mut in_author = false;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                text.clear();
                match e.local_name().as_ref() {
                    b"entry" => current = Some(AtomEntry::default()),
                    b"author" => in_author = true,
                    b"link" => {
                        if let (Some(entry), Some(href)) = (current.as_mut(), pdf_link(e)) {
                            entry.pdf_url = Some(href);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"link" {
                    if let (Some(entry), Some(href)) = (current.as_mut(), pdf_link(e)) {
                        entry.pdf_url = Some(href);
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                let t = e.unescape().unwrap_or_default();
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&t);
            }
            Ok(Event::End(ref e)) => {
                let value = normalize_ws(&text);
                text.clear();
                let name = e.local_name();
                if let Some(entry) = current.as_mut() {
                    match name.as_ref() {
                        b"id" => entry.id_url = value,
                        b"title" => entry.title = value,
                        b"summary" => entry.summary = value,
                        b"published" => {
                            entry.published_at = DateTime::parse_from_rfc3339(&value)
                                .ok()
                                .map(|t| t.with_timezone(&Utc));
                            entry.published = (!value.is_empty()).then_some(value);
                        }
                        b"name" if in_author && !value.is_empty() => entry.authors.push(value),
                        b"author" => in_author = false,
                        b"entry" => {
                            if let Some(done) = current.take() {
                                if done.id_url.contains("/api/errors") {
                                    return Err(EngineError::parse(ENGINE, format!("arXiv rejected the query: {}", done.summary)));
                                }
                                if done.title.is_empty() {
                                    warn!(id = %done.id_url, "Skipping arXiv entry with empty title");
                                } else {
                                    entries.push(done);
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                // Keep what parsed so far unless nothing did.
                if entries.is_empty() {
                    return Err(EngineError::parse(ENGINE, e));
                }
                warn!(error = %e, "arXiv feed truncated, keeping parsed entries");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}
