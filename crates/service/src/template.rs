//! Template resolution for system and trailing-user turns.
//!
//! Templates use `{{name}}` placeholders. Syntax is checked once when an
//! operation is registered; values are substituted per call. A `}}` that
//! closes no placeholder is plain text, so JSON examples survive intact.

use promptline_core::error::{Error, Result};
use std::collections::HashMap;

/// Turns a template plus call arguments into the final text of a turn.
pub trait TemplateResolver: Send + Sync {
    /// Reject malformed templates. Called at registration time.
    fn check(&self, template: &str) -> Result<()>;

    /// Substitute `variables` into `template`.
    fn resolve(&self, template: &str, variables: &HashMap<String, String>) -> Result<String>;
}

/// `{{variable}}` substitution. Variable names may contain ASCII letters,
/// digits, `_` and `.`; surrounding whitespace inside the braces is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptTemplate;

enum Segment<'a> {
    Text(&'a str),
    Variable(&'a str),
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = template;
    let mut offset = 0;

    while let Some(open) = rest.find("{{") {
        if open > 0 {
            segments.push(Segment::Text(&rest[..open]));
        }
        let after_open = &rest[open + 2..];
        let close = after_open.find("}}").ok_or_else(|| {
            Error::config(format!(
                "unclosed '{{{{' at byte {} in template",
                offset + open
            ))
        })?;

        let name = after_open[..close].trim();
        if !valid_name(name) {
            return Err(Error::config(format!(
                "invalid variable name '{name}' at byte {} in template",
                offset + open
            )));
        }
        segments.push(Segment::Variable(name));

        let consumed = open + 2 + close + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

impl TemplateResolver for PromptTemplate {
    fn check(&self, template: &str) -> Result<()> {
        parse(template).map(|_| ())
    }

    fn resolve(&self, template: &str, variables: &HashMap<String, String>) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        for segment in parse(template)? {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Variable(name) => {
                    let value = variables.get(name).ok_or_else(|| {
                        Error::Template(format!("value for the variable '{name}' is missing"))
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}
