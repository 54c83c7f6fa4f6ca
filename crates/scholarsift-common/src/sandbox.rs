use std::collections::HashSet;
use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use thiserror::Error;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("scholarsift/", env!("CARGO_PKG_VERSION"));

/// Hosts every scholarsift process may talk to.
const DEFAULT_ALLOWLIST: &[&str] = &[
    "export.arxiv.org",                  // arXiv API
    "arxiv.org",                         // arXiv abstract / pdf pages
    "api.semanticscholar.org",           // Semantic Scholar Graph API
    "eutils.ncbi.nlm.nih.gov",           // PubMed E-utilities
    "generativelanguage.googleapis.com", // Gemini
    "api.openai.com",                    // OpenAI
    "localhost",                         // Ollama / local gateways
    "127.0.0.1",
];

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("domain not in allowlist for URL {0}")]
    Blocked(String),

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// An HTTP client capped to an allowlist of hosts.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    pub fn new() -> Result<Self, SandboxError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, SandboxError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let allowlist = DEFAULT_ALLOWLIST.iter().map(|d| d.to_string()).collect();
        Ok(Self { client, allowlist })
    }

    /// Allows the host of a configured base URL. Unparseable URLs are ignored;
    /// requests to them fail later with [`SandboxError::Blocked`].
    pub fn allow_base_url(&mut self, base_url: &str) {
        if let Some(host) = Url::parse(base_url).ok().and_then(|u| u.host_str().map(String::from)) {
            self.allowlist.insert(host);
        }
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else { return false };
        let Some(host) = parsed.host_str() else { return false };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)))
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, SandboxError> {
        self.request(reqwest::Method::GET, url)
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: &str,
    ) -> Result<reqwest::RequestBuilder, SandboxError> {
        if !self.is_allowed(url) {
            return Err(SandboxError::Blocked(url.to_string()));
        }
        Ok(self.client.request(method, url))
    }
}
