//! Paper records flowing through the search → filter → annotate pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// External search engine a record was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Arxiv,
    SemanticScholar,
    Pubmed,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Arxiv           => "arxiv",
            Source::SemanticScholar => "semantic_scholar",
            Source::Pubmed          => "pubmed",
        }
    }

    /// Parse an engine name as sent by clients. Case-insensitive; accepts a
    /// few common spellings of Semantic Scholar.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "arxiv"                                        => Some(Source::Arxiv),
            "semantic_scholar" | "semanticscholar" | "s2"  => Some(Source::SemanticScholar),
            "pubmed"                                       => Some(Source::Pubmed),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical paper shape produced by every engine adapter.
///
/// `id` is only unique within one `source`; `(source, id)` is the effective key.
/// An empty `abstract_text` means the source did not provide one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub authors: Vec<String>,
    /// `YYYY-MM-DD` where derivable, otherwise the raw year.
    pub published: Option<String>,
    pub url: Option<String>,
    pub pdf_url: Option<String>,
    pub source: Source,
}

impl PaperRecord {
    pub fn new(source: Source, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            abstract_text: String::new(),
            authors: Vec::new(),
            published: None,
            url: None,
            pdf_url: None,
            source,
        }
    }

    pub fn with_abstract(mut self, abstract_text: impl Into<String>) -> Self {
        self.abstract_text = abstract_text.into();
        self
    }

    pub fn has_abstract(&self) -> bool {
        !self.abstract_text.trim().is_empty()
    }
}

/// Fields derived for one paper by the language model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub title_zh: String,
    pub abstract_zh: String,
    pub keywords: String,
    pub relevance_summary: String,
}

impl Annotation {
    /// Safe default used whenever annotation fails: original text passes
    /// through untranslated, derived fields stay empty.
    pub fn fallback(paper: &PaperRecord) -> Self {
        Self {
            title_zh: paper.title.clone(),
            abstract_zh: paper.abstract_text.clone(),
            keywords: String::new(),
            relevance_summary: String::new(),
        }
    }
}

/// A record plus its annotation. The annotation is additive: the original
/// record is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedPaper {
    #[serde(flatten)]
    pub paper: PaperRecord,
    #[serde(flatten)]
    pub annotation: Annotation,
}

impl AnnotatedPaper {
    pub fn new(paper: PaperRecord, annotation: Annotation) -> Self {
        Self { paper, annotation }
    }

    pub fn unannotated(paper: PaperRecord) -> Self {
        let annotation = Annotation::fallback(&paper);
        Self { paper, annotation }
    }
}

/// Stable JSON shape returned to clients and persisted in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperResponse {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_zh: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub abstract_zh: String,
    pub keywords: String,
    pub relevance_summary: String,
    /// Source-specific identifier; the name is kept for client compatibility.
    pub arxiv_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    pub authors: Vec<String>,
    pub published: Option<String>,
    pub source: Source,
}

impl From<AnnotatedPaper> for PaperResponse {
    fn from(p: AnnotatedPaper) -> Self {
        let AnnotatedPaper { paper, annotation } = p;
        let title_zh = Some(annotation.title_zh).filter(|t| !t.is_empty());
        Self {
            title: paper.title,
            title_zh,
            abstract_text: paper.abstract_text,
            abstract_zh: annotation.abstract_zh,
            keywords: annotation.keywords,
            relevance_summary: annotation.relevance_summary,
            arxiv_id: paper.id,
            url: paper.url.unwrap_or_default(),
            pdf_url: paper.pdf_url,
            authors: paper.authors,
            published: paper.published,
            source: paper.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_source_parse_aliases() {
        assert_eq!(Source::parse("ArXiv"), Some(Source::Arxiv));
        assert_eq!(Source::parse("semanticscholar"), Some(Source::SemanticScholar));
        assert_eq!(Source::parse(" pubmed "), Some(Source::Pubmed));
        assert_eq!(Source::parse("google_scholar"), None);
    }

    #[test]
    fn test_source_serializes_snake_case() {
        let json = serde_json::to_string(&Source::SemanticScholar).unwrap();
        assert_eq!(json, "\"semantic_scholar\"");
    }

    #[test]
    fn test_fallback_annotation_keeps_original_text() {
        let paper = PaperRecord::new(Source::Arxiv, "2401.00001v1", "Sparse attention")
            .with_abstract("We study sparse attention.");
        let a = Annotation::fallback(&paper);
        assert_eq!(a.title_zh, "Sparse attention");
        assert_eq!(a.abstract_zh, "We study sparse attention.");
        assert!(a.keywords.is_empty());
        assert!(a.relevance_summary.is_empty());
    }

    #[test]
    fn test_paper_response_maps_id_to_arxiv_id() {
        let mut paper = PaperRecord::new(Source::Pubmed, "38000001", "KRAS inhibitors");
        paper.url = Some("https://pubmed.ncbi.nlm.nih.gov/38000001/".to_string());
        let resp = PaperResponse::from(AnnotatedPaper::unannotated(paper));
        assert_eq!(resp.arxiv_id, "38000001");
        assert_eq!(resp.source, Source::Pubmed);
        assert_eq!(resp.pdf_url, None);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["abstract"], "");
        assert!(json.get("pdf_url").is_none());
    }

    #[test]
    fn test_annotated_paper_flattens_fields() {
        let paper = PaperRecord::new(Source::Arxiv, "2401.00002", "Title");
        let annotated = AnnotatedPaper::new(paper, Annotation {
            title_zh: "标题".to_string(),
            abstract_zh: String::new(),
            keywords: "a，b".to_string(),
            relevance_summary: "relevant".to_string(),
        });
        let json = serde_json::to_value(&annotated).unwrap();
        assert_eq!(json["id"], "2401.00002");
        assert_eq!(json["title_zh"], "标题");
        assert_eq!(json["source"], "arxiv");
    }
}
