//! Semantic Scholar Graph API client.
//!
//! Endpoint used:
//!   search: https://api.semanticscholar.org/graph/v1/paper/search
//!
//! HTTP 429 is retried up to `max_retries` times, waiting for the
//! server's `Retry-After` when present and exponential backoff otherwise.
//! No other failure is retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use scholarsift_common::{EngineError, PaperRecord, SandboxClient, Source};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use super::{blocked, read_body, PaperEngine};

const ENGINE: Source = Source::SemanticScholar;
const FIELDS: &str = "paperId,title,abstract,year,publicationDate,authors,url,openAccessPdf";
/// The search endpoint rejects larger pages.
const MAX_PAGE: usize = 100;
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

pub struct SemanticScholarClient {
    client: SandboxClient,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    base_backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    publication_date: Option<String>,
    #[serde(default)]
    authors: Vec<S2Author>,
    url: Option<String>,
    open_access_pdf: Option<S2Pdf>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Pdf {
    url: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(client: SandboxClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            max_retries: 3,
            base_backoff: Duration::from_millis(1000),
        }
    }

    pub fn with_retry_policy(mut self, max_retries: u32, base_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_backoff = base_backoff;
        self
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Send the search request, retrying on 429 only.
    async fn fetch(&self, keywords: &str, limit: usize) -> Result<String, EngineError> {
        let url = format!("{}/graph/v1/paper/search", self.base_url.trim_end_matches('/'));
        let params = [
            ("query", keywords.to_string()),
            ("limit", limit.clamp(1, MAX_PAGE).to_string()),
            ("fields", FIELDS.to_string()),
        ];

        let mut retries = 0;
        loop {
            let mut request = self.client.get(&url).map_err(|e| blocked(ENGINE, e))?.query(&params);
            if let Some(key) = &self.api_key {
                request = request.header("x-api-key", key);
            }
            let resp = request.send().await.map_err(|e| EngineError::network(ENGINE, e))?;

            if resp.status() != StatusCode::TOO_MANY_REQUESTS {
                return read_body(ENGINE, resp).await;
            }
            if retries >= self.max_retries {
                return Err(EngineError::RateLimited { engine: ENGINE, attempts: retries + 1 });
            }

            let delay = retry_after(&resp).unwrap_or_else(|| self.backoff(retries));
            retries += 1;
            warn!(retry = retries, max = self.max_retries, delay_ms = delay.as_millis() as u64, "Rate limited by Semantic Scholar, retrying");
            sleep(delay).await;
        }
    }
}

fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    let secs: u64 = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

fn into_record(p: S2Paper) -> Option<PaperRecord> {
    let id = p.paper_id.filter(|s| !s.is_empty())?;
    let title = p.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
    let mut record = PaperRecord::new(ENGINE, id, title)
        .with_abstract(p.abstract_text.unwrap_or_default().trim());
    record.authors = p.authors.into_iter().filter_map(|a| a.name).filter(|n| !n.is_empty()).collect();
    record.published = p
        .publication_date
        .filter(|d| d.len() >= 10)
        .or_else(|| p.year.map(|y| y.to_string()));
    record.url = p.url.filter(|u| !u.is_empty());
    record.pdf_url = p
        .open_access_pdf
        .and_then(|pdf| pdf.url)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());
    Some(record)
}

#[async_trait]
impl PaperEngine for SemanticScholarClient {
    fn source(&self) -> Source {
        ENGINE
    }

    #[instrument(skip(self))]
    async fn search(
        &self,
        keywords: &str,
        limit: usize,
        _category: Option<&str>,
    ) -> Result<Vec<PaperRecord>, EngineError> {
        let body = self.fetch(keywords, limit).await?;
        let parsed: SearchResponse = serde_json::from_str(&body).map_err(|e| EngineError::parse(ENGINE, e))?;
        let mut papers: Vec<PaperRecord> = parsed.data.into_iter().filter_map(into_record).collect();
        papers.truncate(limit);
        debug!(n = papers.len(), "Semantic Scholar search returned papers");
        Ok(papers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body() -> serde_json::Value {
        serde_json::json!({
            "total": 2,
            "data": [
                {
                    "paperId": "649def34f8be52c8b66281af98ae884c09aef38b",
                    "title": "Graph Neural Networks",
                    "abstract": null,
                    "year": 2021,
                    "publicationDate": null,
                    "authors": [{"authorId": "1", "name": "Ada Lovelace"}],
                    "url": "https://www.semanticscholar.org/paper/649def34",
                    "openAccessPdf": {"url": " https://example.org/gnn.pdf ", "status": "GREEN"}
                },
                {
                    "paperId": "aaaabbbbccccdddd",
                    "title": "Transformers",
                    "abstract": "Attention.",
                    "year": 2017,
                    "publicationDate": "2017-06-12",
                    "authors": [],
                    "url": null,
                    "openAccessPdf": null
                }
            ]
        })
    }

    fn client(server: &MockServer) -> SemanticScholarClient {
        SemanticScholarClient::new(SandboxClient::new().unwrap(), server.uri(), Some("s2-key".into()))
            .with_retry_policy(2, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_search_normalises_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/v1/paper/search"))
            .and(query_param("query", "gnn"))
            .and(header("x-api-key", "s2-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body()))
            .mount(&server)
            .await;

        let papers = client(&server).search("gnn", 10, None).await.unwrap();
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].abstract_text, "");
        assert!(!papers[0].has_abstract());
        assert_eq!(papers[0].published.as_deref(), Some("2021"));
        assert_eq!(papers[0].pdf_url.as_deref(), Some("https://example.org/gnn.pdf"));
        assert_eq!(papers[0].authors, vec!["Ada Lovelace"]);
        assert_eq!(papers[1].published.as_deref(), Some("2017-06-12"));
        assert_eq!(papers[1].url, None);
        assert_eq!(papers[1].source, Source::SemanticScholar);
    }

    #[tokio::test]
    async fn test_retries_after_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body()))
            .expect(1)
            .mount(&server)
            .await;

        let papers = client(&server).search("gnn", 1, None).await.unwrap();
        assert_eq!(papers.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        match client(&server).search("gnn", 5, None).await {
            Err(EngineError::RateLimited { attempts: 3, .. }) => {}
            other => panic!("expected RateLimited after 3 attempts, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).search("gnn", 5, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Upstream { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server).search("gnn", 5, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));
    }

    #[test]
    fn test_backoff_doubles() {
        let c = SemanticScholarClient::new(SandboxClient::new().unwrap(), "http://localhost", None);
        assert_eq!(c.backoff(0), Duration::from_millis(1000));
        assert_eq!(c.backoff(2), Duration::from_millis(4000));
    }
}
