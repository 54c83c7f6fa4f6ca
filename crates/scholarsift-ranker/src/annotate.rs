//! Per-paper annotation: translated title and abstract, keywords and a short
//! relevance summary against the user's question.
//!
//! `annotate` never fails. Any model or parse failure degrades to
//! `Annotation::fallback`, which passes the original text through.

use std::sync::Arc;
use std::time::Duration;

use scholarsift_common::{AnnotatedPaper, Annotation, PaperRecord};
use scholarsift_llm::{structured, LlmBackend, LlmRequest, ModelCallError, PromptTemplate};
use tracing::{debug, instrument, warn};

use crate::parallel::{OrderedPool, Progress};

#[derive(Debug, Clone)]
pub struct AnnotationSettings {
    /// Maximum in-flight model calls in a batch.
    pub concurrency: usize,
    pub task_timeout: Duration,
    pub target_language: String,
    pub model: Option<String>,
    pub temperature: f32,
}

impl Default for AnnotationSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            task_timeout: Duration::from_secs(90),
            target_language: "Simplified Chinese".to_string(),
            model: None,
            temperature: 0.0,
        }
    }
}

pub struct Annotator {
    llm: Arc<dyn LlmBackend>,
    settings: AnnotationSettings,
}

impl Annotator {
    pub fn new(llm: Arc<dyn LlmBackend>, settings: AnnotationSettings) -> Self {
        Self { llm, settings }
    }

    /// Annotate one paper, falling back to the untranslated original on any
    /// failure.
    pub async fn annotate(&self, paper: &PaperRecord, question: &str) -> Annotation {
        match self.try_annotate(paper, question).await {
            Ok(a) => a,
            Err(e) => {
                warn!(id = %paper.id, source = %paper.source, error = %e, "Annotation failed, using original text");
                Annotation::fallback(paper)
            }
        }
    }

    #[instrument(skip(self, paper, question), fields(id = %paper.id, source = %paper.source))]
    pub async fn try_annotate(&self, paper: &PaperRecord, question: &str) -> Result<Annotation, ModelCallError> {
        let has_abstract = paper.has_abstract();
        let has_question = !question.trim().is_empty();
        let fields = requested_fields(has_abstract, has_question);

        let prompt = PromptTemplate::new(build_template(&fields, has_abstract, has_question)).render(&[
            ("language", &self.settings.target_language),
            ("question", question),
            ("title", &paper.title),
            ("abstract", &paper.abstract_text),
        ]);
        let req = LlmRequest::user(prompt)
            .with_model(self.settings.model.clone())
            .with_temperature(self.settings.temperature)
            .json();

        let resp = self.llm.complete(req).await?;
        if resp.content.trim().is_empty() {
            return Err(ModelCallError::EmptyResponse);
        }
        let parsed = structured::parse_fields(&resp.content, &fields)?;
        let take = |name: &str| parsed.get(name).cloned().unwrap_or_default();

        let fallback = Annotation::fallback(paper);
        let annotation = Annotation {
            title_zh: non_empty_or(take("title_zh"), fallback.title_zh),
            abstract_zh: if has_abstract {
                non_empty_or(take("abstract_zh"), fallback.abstract_zh)
            } else {
                String::new()
            },
            keywords: take("keywords"),
            relevance_summary: if has_question { take("relevance_summary") } else { String::new() },
        };
        debug!("Annotation parsed");
        Ok(annotation)
    }

    /// Annotate a batch through the bounded pool. Output order matches
    /// `papers`; a failed or timed-out paper only loses its own annotation.
    pub async fn annotate_batch(
        self: &Arc<Self>,
        papers: Vec<PaperRecord>,
        question: &str,
        on_progress: impl FnMut(Progress),
    ) -> Vec<AnnotatedPaper> {
        let pool = OrderedPool::new(self.settings.concurrency).with_task_timeout(self.settings.task_timeout);
        let annotator = Arc::clone(self);
        let question = Arc::<str>::from(question);

        pool.map(
            papers,
            move |paper| {
                let annotator = Arc::clone(&annotator);
                let question = Arc::clone(&question);
                async move {
                    let annotation = annotator.annotate(&paper, &question).await;
                    AnnotatedPaper::new(paper, annotation)
                }
            },
            |paper| AnnotatedPaper::unannotated(paper.clone()),
            on_progress,
        )
        .await
    }
}

fn non_empty_or(value: String, default: String) -> String {
    if value.trim().is_empty() { default } else { value }
}

fn requested_fields(has_abstract: bool, has_question: bool) -> Vec<&'static str> {
    let mut fields = vec!["title_zh"];
    if has_abstract {
        fields.push("abstract_zh");
    }
    fields.push("keywords");
    if has_question {
        fields.push("relevance_summary");
    }
    fields
}

fn build_template(fields: &[&str], has_abstract: bool, has_question: bool) -> String {
    let mut tasks = vec!["Translate the paper title into {language} (keep it unchanged if it already is)."];
    if has_abstract {
        tasks.push("Translate the abstract into {language} (keep it unchanged if it already is).");
        tasks.push("Extract 3-5 keywords in {language} from the abstract, separated by commas.");
    } else {
        tasks.push("Extract 3-5 keywords in {language} from the title, separated by commas.");
    }
    if has_question {
        tasks.push(
            "Judge whether this paper helps answer the user's question and summarise that in one or two \
             short sentences in {language}.",
        );
    }

    let mut t = String::from("Complete the following tasks:\n\n");
    for (i, task) in tasks.iter().enumerate() {
        t.push_str(&format!("{}. {}\n", i + 1, task));
    }
    t.push('\n');
    if has_question {
        t.push_str("User question: {question}\n\n");
    }
    t.push_str("Paper title: {title}\n\n");
    if has_abstract {
        t.push_str("Abstract:\n{abstract}\n\n");
    } else {
        t.push_str("Note: this paper has no abstract.\n\n");
    }

    t.push_str("Reply with a JSON object with exactly these string fields:\n{{\n");
    let lines: Vec<String> = fields.iter().map(|f| format!("  \"{f}\": \"...\"")).collect();
    t.push_str(&lines.join(",\n"));
    t.push_str("\n}}\n\nReturn only the JSON, no other text.");
    t
}
