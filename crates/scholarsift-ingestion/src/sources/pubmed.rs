//! PubMed E-utilities client.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi

use std::collections::HashMap;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use scholarsift_common::{EngineError, PaperRecord, SandboxClient, Source};
use tracing::{debug, instrument, warn};

use super::{blocked, normalize_ws, read_body, PaperEngine};

const ENGINE: Source = Source::Pubmed;
const TOOL: &str = "scholarsift";

pub struct PubMedClient {
    client: SandboxClient,
    base_url: String,
    api_key: Option<String>,
    email: String,
}

impl PubMedClient {
    pub fn new(client: SandboxClient, base_url: impl Into<String>, api_key: Option<String>, email: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            email: email.into(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/entrez/eutils/{endpoint}", self.base_url.trim_end_matches('/'))
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("tool", TOOL.to_string()),
            ("email", self.email.clone()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String, EngineError> {
        let resp = self
            .client
            .get(&self.url(endpoint))
            .map_err(|e| blocked(ENGINE, e))?
            .query(params)
            .send()
            .await
            .map_err(|e| EngineError::network(ENGINE, e))?;
        read_body(ENGINE, resp).await
    }

    /// Search PubMed and return PMIDs in relevance order.
    #[instrument(skip(self))]
    async fn esearch(&self, query: &str, max: usize) -> Result<Vec<String>, EngineError> {
        let mut params = self.base_params();
        params.push(("term", query.to_string()));
        params.push(("retmax", max.to_string()));
        params.push(("retmode", "json".to_string()));
        params.push(("sort", "relevance".to_string()));

        let body = self.get("esearch.fcgi", &params).await?;
        let resp: serde_json::Value = serde_json::from_str(&body).map_err(|e| EngineError::parse(ENGINE, e))?;
        if let Some(err) = resp["esearchresult"]["ERROR"].as_str() {
            return Err(EngineError::parse(ENGINE, err));
        }

        let ids: Vec<String> = resp["esearchresult"]["idlist"]
            .as_array()
            .map(|ids| ids.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        debug!(n = ids.len(), "PubMed esearch returned PMIDs");
        Ok(ids)
    }

    /// Fetch article XML for `pmids`, returned in the order given.
    #[instrument(skip(self, pmids), fields(n = pmids.len()))]
    async fn efetch(&self, pmids: &[String]) -> Result<Vec<PaperRecord>, EngineError> {
        if pmids.is_empty() {
            return Ok(vec![]);
        }
        let mut params = self.base_params();
        params.push(("id", pmids.join(",")));
        params.push(("rettype", "abstract".to_string()));
        params.push(("retmode", "xml".to_string()));

        let xml = self.get("efetch.fcgi", &params).await?;
        let mut by_id: HashMap<String, PaperRecord> =
            parse_pubmed_xml(&xml)?.into_iter().map(|p| (p.id.clone(), p)).collect();
        Ok(pmids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[async_trait]
impl PaperEngine for PubMedClient {
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
        let pmids = self.esearch(keywords, limit.max(1)).await?;
        let mut papers = self.efetch(&pmids).await?;
        papers.truncate(limit);
        Ok(papers)
    }
}

#[derive(Default)]
struct ArticleBuilder {
    pmid: Option<String>,
    title: String,
    abstract_parts: Vec<String>,
    authors: Vec<String>,
    year: Option<String>,
    month: Option<String>,
    day: Option<String>,
    medline_date: Option<String>,
}

impl ArticleBuilder {
    fn build(self) -> Option<PaperRecord> {
        let pmid = self.pmid?;
        let title = normalize_ws(&self.title);
        if title.is_empty() {
            return None;
        }
        let published = pub_date(
            self.year.as_deref(),
            self.month.as_deref(),
            self.day.as_deref(),
            self.medline_date.as_deref(),
        );
        let mut record = PaperRecord::new(ENGINE, pmid.clone(), title).with_abstract(self.abstract_parts.join("\n"));
        record.authors = self.authors;
        record.published = published;
        record.url = Some(format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"));
        Some(record)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Pmid,
    Title,
    Abstract,
    LastName,
    ForeName,
    CollectiveName,
    Year,
    Month,
    Day,
    MedlineDate,
}

/// Parse efetch XML (`<PubmedArticleSet><PubmedArticle>…`) into records.
///
/// Only the first `<PMID>` of an article is its own; later ones belong to
/// comments and corrections. Titles may carry inline markup (`<i>`, `<sup>`),
/// so text is accumulated across child elements.
fn parse_pubmed_xml(xml: &str) -> Result<Vec<PaperRecord>, EngineError> {
    let mut papers = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<ArticleBuilder> = None;
    let mut field = Field::None;
    let mut in_pub_date = false;
    let mut in_author = false;
    let mut last = String::new();
    let mut fore = String::new();
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"PubmedArticle" => current = Some(ArticleBuilder::default()),
                b"PubDate" => in_pub_date = true,
                b"Author" => {
                    in_author = true;
                    last.clear();
                    fore.clear();
                }
                name => {
                    let next = match name {
                        b"PMID" if current.as_ref().is_some_and(|a| a.pmid.is_none()) => Field::Pmid,
                        b"ArticleTitle" => Field::Title,
                        b"AbstractText" => Field::Abstract,
                        b"LastName" if in_author => Field::LastName,
                        b"ForeName" if in_author => Field::ForeName,
                        b"CollectiveName" if in_author => Field::CollectiveName,
                        b"Year" if in_pub_date => Field::Year,
                        b"Month" if in_pub_date => Field::Month,
                        b"Day" if in_pub_date => Field::Day,
                        b"MedlineDate" if in_pub_date => Field::MedlineDate,
                        _ => field,
                    };
                    if next != field {
                        field = next;
                        text.clear();
                    }
                }
            },
            Ok(Event::Text(e)) => {
                if field != Field::None {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let closes = matches!(
                    (field, name.as_ref()),
                    (Field::Pmid, b"PMID")
                        | (Field::Title, b"ArticleTitle")
                        | (Field::Abstract, b"AbstractText")
                        | (Field::LastName, b"LastName")
                        | (Field::ForeName, b"ForeName")
                        | (Field::CollectiveName, b"CollectiveName")
                        | (Field::Year, b"Year")
                        | (Field::Month, b"Month")
                        | (Field::Day, b"Day")
                        | (Field::MedlineDate, b"MedlineDate")
                );
                if closes {
                    let value = normalize_ws(&std::mem::take(&mut text));
                    if let Some(article) = current.as_mut() {
                        match field {
                            Field::Pmid => article.pmid = Some(value),
                            Field::Title => article.title = value,
                            Field::Abstract if !value.is_empty() => article.abstract_parts.push(value),
                            Field::LastName => last = value,
                            Field::ForeName => fore = value,
                            Field::CollectiveName => last = value,
                            Field::Year => article.year = Some(value),
                            Field::Month => article.month = Some(value),
                            Field::Day => article.day = Some(value),
                            Field::MedlineDate => article.medline_date = Some(value),
                            _ => {}
                        }
                    }
                    field = Field::None;
                    continue;
                }

                match name.as_ref() {
                    b"PubDate" => in_pub_date = false,
                    b"Author" => {
                        if in_author {
                            if let Some(article) = current.as_mut() {
                                let full = if fore.is_empty() { last.clone() } else { format!("{fore} {last}") };
                                if !full.is_empty() {
                                    article.authors.push(full);
                                }
                            }
                            in_author = false;
                        }
                    }
                    b"PubmedArticle" => {
                        if let Some(article) = current.take() {
                            match article.build() {
                                Some(p) => papers.push(p),
                                None => warn!("Skipping PubMed article without PMID or title"),
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                if papers.is_empty() {
                    return Err(EngineError::parse(ENGINE, e));
                }
                warn!(error = %e, kept = papers.len(), "PubMed XML parse error, keeping parsed articles");
                break;
            }
            _ => {}
        }
    }

    Ok(papers)
}

fn month_number(month: &str) -> Option<u32> {
    if let Ok(n) = month.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let prefix = month.get(..3)?.to_ascii_lowercase();
    const NAMES: [&str; 12] = ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];
    NAMES.iter().position(|m| *m == prefix).map(|i| i as u32 + 1)
}

/// `YYYY-MM-DD` when fully known, else `YYYY-MM` or `YYYY`. A `MedlineDate`
/// like "1998 Dec-1999 Jan" reduces to its leading year.
fn pub_date(year: Option<&str>, month: Option<&str>, day: Option<&str>, medline: Option<&str>) -> Option<String> {
    let Some(year) = year.filter(|y| y.len() == 4) else {
        return medline
            .and_then(|m| m.get(..4))
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
            .map(String::from);
    };
    let Some(month) = month.and_then(month_number) else {
        return Some(year.to_string());
    };
    match day.and_then(|d| d.parse::<u32>().ok()).filter(|d| (1..=31).contains(d)) {
        Some(day) => Some(format!("{year}-{month:02}-{day:02}")),
        None => Some(format!("{year}-{month:02}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTICLES: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">12345678</PMID>
      <Article>
        <Journal>
          <JournalIssue>
            <PubDate><Year>2023</Year><Month>Mar</Month><Day>7</Day></PubDate>
          </JournalIssue>
          <Title>Nature</Title>
        </Journal>
        <ArticleTitle>The <i>KRAS</i> G12D mutation in pancreatic cancer</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Background text.</AbstractText>
          <AbstractText Label="RESULTS">Results &amp; more.</AbstractText>
        </Abstract>
        <AuthorList>
          <Author><LastName>Smith</LastName><ForeName>John</ForeName></Author>
          <Author><CollectiveName>KRAS Consortium</CollectiveName></Author>
        </AuthorList>
      </Article>
      <CommentsCorrectionsList>
        <CommentsCorrections><PMID>99999999</PMID></CommentsCorrections>
      </CommentsCorrectionsList>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>23456789</PMID>
      <Article>
        <Journal>
          <JournalIssue><PubDate><MedlineDate>1998 Dec-1999 Jan</MedlineDate></PubDate></JournalIssue>
        </Journal>
        <ArticleTitle>No abstract here</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_pubmed_xml() {
        let papers = parse_pubmed_xml(ARTICLES).unwrap();
        assert_eq!(papers.len(), 2);

        let p = &papers[0];
        assert_eq!(p.id, "12345678");
        assert_eq!(p.title, "The KRAS G12D mutation in pancreatic cancer");
        assert_eq!(p.abstract_text, "Background text.\nResults & more.");
        assert_eq!(p.authors, vec!["John Smith", "KRAS Consortium"]);
        assert_eq!(p.published.as_deref(), Some("2023-03-07"));
        assert_eq!(p.url.as_deref(), Some("https://pubmed.ncbi.nlm.nih.gov/12345678/"));
        assert_eq!(p.pdf_url, None);

        assert_eq!(papers[1].id, "23456789");
        assert!(!papers[1].has_abstract());
        assert_eq!(papers[1].published.as_deref(), Some("1998"));
    }

    #[test]
    fn test_pub_date_forms() {
        assert_eq!(pub_date(Some("2024"), Some("11"), None, None).as_deref(), Some("2024-11"));
        assert_eq!(pub_date(Some("2024"), Some("September"), Some("30"), None).as_deref(), Some("2024-09-30"));
        assert_eq!(pub_date(Some("2024"), Some("Spring"), None, None).as_deref(), Some("2024"));
        assert_eq!(pub_date(None, None, None, Some("Winter 2020")), None);
        assert_eq!(pub_date(None, None, None, None), None);
    }

    #[test]
    fn test_garbage_xml_is_parse_error() {
        assert!(matches!(parse_pubmed_xml("<a><b></a>"), Err(EngineError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_search_keeps_esearch_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/entrez/eutils/esearch.fcgi"))
            .and(query_param("term", "kras"))
            .and(query_param("email", "me@example.org"))
            .and(query_param("api_key", "ncbi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "2", "idlist": ["23456789", "12345678"]}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/entrez/eutils/efetch.fcgi"))
            .and(query_param("id", "23456789,12345678"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLES))
            .expect(1)
            .mount(&server)
            .await;

        let client = PubMedClient::new(SandboxClient::new().unwrap(), server.uri(), Some("ncbi".into()), "me@example.org");
        let papers = client.search("kras", 10, None).await.unwrap();
        let ids: Vec<&str> = papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["23456789", "12345678"]);
    }

    #[tokio::test]
    async fn test_empty_idlist_skips_efetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/entrez/eutils/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "0", "idlist": []}
            })))
            .mount(&server)
            .await;
        Mock::given(path("/entrez/eutils/efetch.fcgi"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = PubMedClient::new(SandboxClient::new().unwrap(), server.uri(), None, "me@example.org");
        assert!(client.search("nothing", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_esearch_error_field_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"ERROR": "Invalid query"}
            })))
            .mount(&server)
            .await;

        let client = PubMedClient::new(SandboxClient::new().unwrap(), server.uri(), None, "me@example.org");
        let err = client.search("(((", 5, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));
    }
}
