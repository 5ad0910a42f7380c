//! Compiled URL templates.
//!
//! Endpoint URLs are text templates with `{{ dotted.path }}` slots resolved
//! against the per-request context, e.g.
//! `repos/{{ params.owner }}/issues?page={{ pager.page }}&per_page={{ pager.size }}`.
//! Templates are compiled once at collector construction; rendering is a
//! pure function of the template and the context, so identical contexts
//! always produce identical URLs.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Matches one `{{ dotted.path }}` slot.
#[allow(clippy::expect_used)]
static SLOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}\}")
        .expect("slot pattern is a valid regex")
});

/// Template compilation and rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template text contains a malformed slot.
    #[error("template {name:?}: malformed slot near {fragment:?}")]
    Parse {
        /// Template name (the destination table, by convention).
        name: String,
        /// The offending fragment of template text.
        fragment: String,
    },

    /// A slot path did not resolve against the request context.
    #[error("template {name:?}: no value for slot {path:?}")]
    MissingSlot {
        /// Template name.
        name: String,
        /// The unresolved dotted path.
        path: String,
    },

    /// A slot resolved to an array or object, which cannot be embedded in a URL.
    #[error("template {name:?}: slot {path:?} is not a scalar")]
    NonScalar {
        /// Template name.
        name: String,
        /// The offending dotted path.
        path: String,
    },

    /// The request context could not be serialized for rendering.
    #[error("failed to serialize request context: {0}")]
    Context(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Slot(Vec<String>),
}

/// A compiled URL template.
///
/// Compilation happens once; the compiled form is read-only and can be
/// shared across concurrent fetches without synchronization.
#[derive(Debug, Clone)]
pub struct UrlTemplate {
    name: String,
    segments: Vec<Segment>,
}

impl UrlTemplate {
    /// Compiles template text into segments.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] if the text contains a `{{` that
    /// does not open a well-formed slot.
    pub fn compile(name: &str, text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut cursor = 0;

        for captures in SLOT.captures_iter(text) {
            let matched = captures.get(0).ok_or_else(|| parse_error(name, text))?;
            let path = captures.get(1).ok_or_else(|| parse_error(name, text))?;

            let literal = &text[cursor..matched.start()];
            reject_stray_open(name, literal)?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(literal.to_string()));
            }

            segments.push(Segment::Slot(
                path.as_str().split('.').map(str::to_string).collect(),
            ));
            cursor = matched.end();
        }

        let tail = &text[cursor..];
        reject_stray_open(name, tail)?;
        if !tail.is_empty() {
            segments.push(Segment::Literal(tail.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            segments,
        })
    }

    /// Returns the template's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the template against a request context.
    ///
    /// Strings render verbatim; numbers and booleans via their canonical
    /// form. `null`, arrays, and objects are rendering errors: a URL cannot
    /// embed them.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingSlot`], [`TemplateError::NonScalar`],
    /// or [`TemplateError::Context`].
    pub fn render<C: Serialize>(&self, context: &C) -> Result<String, TemplateError> {
        let root = serde_json::to_value(context)?;
        let mut out = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(path) => {
                    let value = resolve(&root, path).ok_or_else(|| TemplateError::MissingSlot {
                        name: self.name.clone(),
                        path: path.join("."),
                    })?;
                    match value {
                        Value::String(s) => out.push_str(s),
                        Value::Number(n) => out.push_str(&n.to_string()),
                        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
                        Value::Null | Value::Array(_) | Value::Object(_) => {
                            return Err(TemplateError::NonScalar {
                                name: self.name.clone(),
                                path: path.join("."),
                            });
                        }
                    }
                }
            }
        }

        Ok(out)
    }
}

fn resolve<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

fn parse_error(name: &str, text: &str) -> TemplateError {
    TemplateError::Parse {
        name: name.to_string(),
        fragment: text.chars().take(40).collect(),
    }
}

/// A `{{` left in literal text means the slot around it failed to scan.
fn reject_stray_open(name: &str, literal: &str) -> Result<(), TemplateError> {
    if let Some(index) = literal.find("{{") {
        let fragment: String = literal[index..].chars().take(40).collect();
        return Err(TemplateError::Parse {
            name: name.to_string(),
            fragment,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Context {
        pager: Option<Pager>,
        params: serde_json::Value,
        input: Option<serde_json::Value>,
    }

    #[derive(Serialize)]
    struct Pager {
        page: usize,
        size: usize,
        skip: usize,
    }

    fn context() -> Context {
        Context {
            pager: Some(Pager {
                page: 3,
                size: 50,
                skip: 100,
            }),
            params: serde_json::json!({"owner": "apache", "repo": "arrow"}),
            input: Some(serde_json::json!({"id": 42})),
        }
    }

    #[test]
    fn test_compile_literal_only() {
        let template = UrlTemplate::compile("things", "/v1/things").unwrap();
        assert_eq!(template.render(&context()).unwrap(), "/v1/things");
    }

    #[test]
    fn test_render_pager_params_and_input() {
        let template = UrlTemplate::compile(
            "issues",
            "repos/{{ params.owner }}/{{ params.repo }}/issues/{{ input.id }}?page={{ pager.page }}&per_page={{ pager.size }}",
        )
        .unwrap();
        assert_eq!(
            template.render(&context()).unwrap(),
            "repos/apache/arrow/issues/42?page=3&per_page=50"
        );
    }

    #[test]
    fn test_render_is_pure() {
        let template = UrlTemplate::compile("issues", "i?page={{ pager.page }}").unwrap();
        let first = template.render(&context()).unwrap();
        let second = template.render(&context()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_whitespace_in_slot_is_accepted() {
        let template = UrlTemplate::compile("t", "p={{pager.page}}&q={{  pager.skip  }}").unwrap();
        assert_eq!(template.render(&context()).unwrap(), "p=3&q=100");
    }

    #[test]
    fn test_unclosed_slot_fails_compilation() {
        let result = UrlTemplate::compile("t", "/v1/{{ pager.page");
        assert!(matches!(result, Err(TemplateError::Parse { .. })));
    }

    #[test]
    fn test_empty_slot_fails_compilation() {
        let result = UrlTemplate::compile("t", "/v1/{{ }}/x");
        assert!(matches!(result, Err(TemplateError::Parse { .. })));
    }

    #[test]
    fn test_missing_path_is_render_error() {
        let template = UrlTemplate::compile("t", "/v1/{{ params.absent }}").unwrap();
        let result = template.render(&context());
        assert!(matches!(result, Err(TemplateError::MissingSlot { .. })));
    }

    #[test]
    fn test_absent_input_is_render_error() {
        let template = UrlTemplate::compile("t", "/v1/{{ input.id }}").unwrap();
        let context = Context {
            input: None,
            ..context()
        };
        // `input` serializes to null, so the path below it cannot resolve.
        let result = template.render(&context);
        assert!(matches!(result, Err(TemplateError::MissingSlot { .. })));
    }

    #[test]
    fn test_object_slot_is_render_error() {
        let template = UrlTemplate::compile("t", "/v1/{{ params }}").unwrap();
        let result = template.render(&context());
        assert!(matches!(result, Err(TemplateError::NonScalar { .. })));
    }

    #[test]
    fn test_template_keeps_name() {
        let template = UrlTemplate::compile("issues", "/v1/x").unwrap();
        assert_eq!(template.name(), "issues");
    }
}
