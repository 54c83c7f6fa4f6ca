use scholarsift_common::{PaperRecord, Source};

/// A paper with a predictable title, abstract and URL derived from its id.
pub fn paper(source: Source, id: &str) -> PaperRecord {
    let mut p = PaperRecord::new(source, id, format!("Paper {id}"))
        .with_abstract(format!("Abstract of {id}."));
    p.authors = vec!["Ada Lovelace".to_string()];
    p.published = Some("2024-01-15".to_string());
    p.url = Some(format!("https://example.org/{}/{id}", source.as_str()));
    p
}

pub fn papers(source: Source, ids: &[&str]) -> Vec<PaperRecord> {
    ids.iter().map(|id| paper(source, id)).collect()
}

/// A well-formed annotation answer.
pub fn annotation_json(title_zh: &str, abstract_zh: &str, keywords: &str, relevance: &str) -> String {
    serde_json::json!({
        "title_zh": title_zh,
        "abstract_zh": abstract_zh,
        "keywords": keywords,
        "relevance_summary": relevance,
    })
    .to_string()
}
