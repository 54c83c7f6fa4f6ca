//! Prompt templating.
//!
//! Templates use `{name}` placeholders and `{{` / `}}` for literal braces.
//! Substituted values are brace-escaped before they are spliced in, so a
//! title containing `{x}` or a JSON snippet can never be mistaken for a
//! placeholder.

use std::collections::HashMap;

/// Double every brace so the text survives a render pass unchanged.
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

fn unescape_braces(text: &str) -> String {
    text.replace("{{", "{").replace("}}", "}")
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    /// Substitute `vars` into the template. Placeholders without a value are
    /// kept literally and logged.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        let mut escaped = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find(['{', '}']) {
            escaped.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") || tail.starts_with("}}") {
                escaped.push_str(&tail[..2]);
                rest = &tail[2..];
                continue;
            }

            if tail.starts_with('{') {
                if let Some(end) = tail.find('}') {
                    let name = &tail[1..end];
                    if is_identifier(name) {
                        match vars.get(name) {
                            Some(value) => escaped.push_str(&escape_braces(value)),
                            None => {
                                tracing::warn!(placeholder = name, "prompt placeholder has no value");
                                escaped.push_str(&escape_braces(&tail[..=end]));
                            }
                        }
                        rest = &tail[end + 1..];
                        continue;
                    }
                }
            }

            // Lone brace: treat as literal.
            escaped.push_str(&escape_braces(&tail[..1]));
            rest = &tail[1..];
        }
        escaped.push_str(rest);

        unescape_braces(&escaped)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
