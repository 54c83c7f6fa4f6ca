//! LLM relevance filter.
//!
//! One model call sees every candidate (id, source, truncated title and
//! abstract) and answers with the ids of the relevant ones, one per line.
//! The answer only decides *which* candidates survive: the result is always a
//! subsequence of the input in input order, at most `max_results` long.
//!
//! Fallbacks, in order:
//! 1. exact id match;
//! 2. relaxed substring match, when nothing matched exactly;
//! 3. first `max_results` candidates, when nothing matched at all or the
//!    model call failed.
//!
//! When every match comes from one source although several sources were
//! searched, a few unmatched papers from each missing source are backfilled.

use std::collections::HashSet;
use std::sync::Arc;

use scholarsift_common::{PaperRecord, Source};
use scholarsift_llm::{LlmBackend, LlmRequest, PromptTemplate};
use tracing::{debug, info, instrument, warn};

const SNIPPET_CHARS: usize = 500;
const MIN_ID_LEN: usize = 4;
const BACKFILL_CAP: usize = 5;

const SYSTEM_PROMPT: &str = "You are an academic research assistant. Given a user's question and a list of \
papers, select the papers most relevant to the question. Read each title and abstract carefully. \
Reply with the IDs of the most relevant papers only, one ID per line, at most {max_results}, ordered \
from most to least relevant. Copy each ID exactly as shown in the list. Do not add any other text. \
If no paper is relevant, reply with an empty line.";

const USER_PROMPT: &str = "Search keywords: {keywords}\n\n\
User question: {question}\n\n\
Papers:\n{papers}\n\n\
Return the IDs of the most relevant papers (one per line, at most {max_results}):";

pub struct RelevanceFilter {
    llm: Arc<dyn LlmBackend>,
    max_results: usize,
    model: Option<String>,
    temperature: f32,
}

impl RelevanceFilter {
    pub fn new(llm: Arc<dyn LlmBackend>, max_results: usize) -> Self {
        Self { llm, max_results, model: None, temperature: 0.0 }
    }

    pub fn with_model(mut self, model: impl Into<String>, temperature: f32) -> Self {
        self.model = Some(model.into());
        self.temperature = temperature;
        self
    }

    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn filter(
        &self,
        keywords: &str,
        question: &str,
        candidates: &[PaperRecord],
    ) -> Vec<PaperRecord> {
        if candidates.is_empty() || self.max_results == 0 {
            return Vec::new();
        }

        let req = self.build_request(keywords, question, candidates);
        let answer = match self.llm.complete(req).await {
            Ok(resp) => resp.content,
            Err(e) => {
                warn!(error = %e, "Relevance filter model call failed, keeping first candidates");
                return self.first_n(candidates);
            }
        };

        let ids = parse_identifiers(&answer);
        if ids.is_empty() {
            warn!("Relevance filter returned no usable ids, keeping first candidates");
            return self.first_n(candidates);
        }

        let indices = select_indices(candidates, &ids, self.max_results);
        if indices.is_empty() {
            warn!(returned = ids.len(), "No returned id matched a candidate, keeping first candidates");
            return self.first_n(candidates);
        }

        info!(selected = indices.len(), "Relevance filter done");
        indices.into_iter().map(|i| candidates[i].clone()).collect()
    }

    fn first_n(&self, candidates: &[PaperRecord]) -> Vec<PaperRecord> {
        candidates.iter().take(self.max_results).cloned().collect()
    }

    fn build_request(&self, keywords: &str, question: &str, candidates: &[PaperRecord]) -> LlmRequest {
        let max = self.max_results.to_string();
        let system = PromptTemplate::new(SYSTEM_PROMPT).render(&[("max_results", &max)]);
        let user = PromptTemplate::new(USER_PROMPT).render(&[
            ("keywords", keywords),
            ("question", question),
            ("papers", &enumerate_candidates(candidates)),
            ("max_results", &max),
        ]);
        LlmRequest::user(user)
            .with_system(system)
            .with_model(self.model.clone())
            .with_temperature(self.temperature)
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn enumerate_candidates(candidates: &[PaperRecord]) -> String {
    let mut out = String::new();
    for (i, p) in candidates.iter().enumerate() {
        out.push_str(&format!(
            "\n[{}] ID: {} (source: {})\nTitle: {}\nAbstract: {}...\n",
            i + 1,
            p.id,
            p.source,
            truncate_chars(&p.title, SNIPPET_CHARS),
            truncate_chars(&p.abstract_text, SNIPPET_CHARS),
        ));
    }
    out
}

/// Pull candidate identifiers out of a free-text answer.
///
/// Each non-empty line yields at most one token: list markers, labels and
/// quoting are stripped, links are reduced to the id they point at, and
/// anything shorter than four characters is dropped.
pub fn parse_identifiers(answer: &str) -> Vec<String> {
    answer.lines().filter_map(parse_identifier_line).collect()
}

fn parse_identifier_line(line: &str) -> Option<String> {
    let mut s = line.trim();
    s = strip_list_marker(s);
    if let Some(rest) = strip_prefix_ignore_case(s, "id:") {
        s = rest.trim_start();
    }
    let token = s.split_whitespace().next()?;
    let token = token.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | ',' | ';' | '*' | '(' | ')' | '<' | '>'));

    let token = if looks_like_url(token) { id_from_url(token) } else { token };

    (token.chars().count() >= MIN_ID_LEN).then(|| token.to_string())
}

/// Old-style arXiv ids (`hep-th/9901001v1`) contain a slash, so only tokens
/// with a scheme or a known host are treated as links.
fn looks_like_url(token: &str) -> bool {
    if token.contains("://") || token.starts_with("www.") {
        return true;
    }
    let host = token.split('/').next().unwrap_or_default();
    [".org", ".com", ".gov", ".net"].iter().any(|tld| host.ends_with(tld))
}

/// The identifier a paper link points at: everything after `/abs/` or
/// `/pdf/` for arXiv, otherwise the last path segment.
fn id_from_url(token: &str) -> &str {
    let rest = token.split_once("://").map_or(token, |(_, r)| r).trim_end_matches('/');
    for marker in ["/abs/", "/pdf/"] {
        if let Some(i) = rest.find(marker) {
            let id = &rest[i + marker.len()..];
            return id.strip_suffix(".pdf").unwrap_or(id);
        }
    }
    rest.rsplit('/').next().unwrap_or(rest)
}

fn strip_list_marker(s: &str) -> &str {
    let s = s.trim_start_matches(['-', '*', '•', ' ']);
    // "[3]" style
    if let Some(rest) = s.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            if rest[..end].chars().all(|c| c.is_ascii_digit()) {
                return rest[end + 1..].trim_start();
            }
        }
    }
    // "3." / "3)" style
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && digits < 4 {
        let rest = &s[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            if rest.starts_with(' ') || rest.is_empty() {
                return rest.trim_start();
            }
        }
    }
    s
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Indices of the surviving candidates, ascending, at most `max` long.
pub fn select_indices(candidates: &[PaperRecord], ids: &[String], max: usize) -> Vec<usize> {
    if max == 0 {
        return Vec::new();
    }

    let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut matched: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, p)| wanted.contains(p.id.as_str()))
        .map(|(i, _)| i)
        .collect();

    if matched.is_empty() {
        matched = candidates
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                !p.id.is_empty()
                    && ids.iter().any(|t| p.id.contains(t.as_str()) || t.contains(p.id.as_str()))
            })
            .map(|(i, _)| i)
            .collect();
        if !matched.is_empty() {
            debug!(matched = matched.len(), "Relaxed id match used");
        }
    }

    if matched.is_empty() {
        return Vec::new();
    }

    let mut backfill = backfill_indices(candidates, &matched, max);
    if backfill.is_empty() {
        matched.truncate(max);
        return matched;
    }

    // Reserve room for the backfill, but never drop every match.
    let keep = matched.len().min(max.saturating_sub(backfill.len())).max(1);
    matched.truncate(keep);
    backfill.truncate(max - matched.len());
    info!(backfilled = backfill.len(), "Backfilled papers from unmatched sources");

    let mut out: Vec<usize> = matched.into_iter().chain(backfill).collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn backfill_indices(candidates: &[PaperRecord], matched: &[usize], max: usize) -> Vec<usize> {
    let mut all_sources: Vec<Source> = Vec::new();
    for p in candidates {
        if !all_sources.contains(&p.source) {
            all_sources.push(p.source);
        }
    }
    let matched_sources: HashSet<Source> = matched.iter().map(|&i| candidates[i].source).collect();
    if all_sources.len() < 2 || matched_sources.len() != 1 {
        return Vec::new();
    }

    let matched_set: HashSet<usize> = matched.iter().copied().collect();
    let mut out = Vec::new();
    for source in all_sources.into_iter().filter(|s| !matched_sources.contains(s)) {
        let unmatched: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(i, p)| p.source == source && !matched_set.contains(i))
            .map(|(i, _)| i)
            .collect();
        let quota = BACKFILL_CAP.min(max / 2).min(unmatched.len());
        out.extend(unmatched.into_iter().take(quota));
    }
    out
}
