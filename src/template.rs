//! A small placeholder language for output templates.
//!
//! ```text
//! # {{title}}
//! {{#turns}}
//! ## {{role_label}} {{timestamp}}
//! {{content}}
//! {{/turns}}
//! Model: {{metadata.model}}
//! ```
//!
//! Variables are checked when the template is parsed, so a typo fails
//! before any document is produced. `{{metadata.KEY}}` is checked when
//! rendering: a key the conversation lacks is an error rather than an
//! empty string. The engine never escapes; the renderer hands it values
//! already prepared for the target format.

use indexmap::IndexMap;
use thiserror::Error;

/// Variables available everywhere in a template.
pub const GLOBALS: &[&str] = &[
    "title",
    "front_matter",
    "run_settings",
    "conversation",
    "source_file",
    "export_format",
    "turn_count",
];

/// Variables available inside `{{#turns}}…{{/turns}}`.
pub const TURN_FIELDS: &[&str] = &["role", "role_label", "content", "timestamp", "index"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated tag starting at byte {0}")]
    Unterminated(usize),

    #[error("unknown variable {0:?}")]
    UnknownVariable(String),

    #[error("unknown section {0:?} (only \"turns\" is supported)")]
    UnknownSection(String),

    #[error("sections cannot be nested")]
    Nested,

    #[error("closing tag {0:?} has no matching opening tag")]
    UnexpectedClose(String),

    #[error("section {0:?} is never closed")]
    Unclosed(String),

    #[error("metadata key {0:?} is not set for this conversation")]
    MissingMetadata(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Var {
    Global(String),
    Meta(String),
    Turn(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Var(Var),
    Turns(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

/// Values for one turn, already formatted for the output.
#[derive(Debug, Clone, Default)]
pub struct TurnValues {
    pub role: String,
    pub role_label: String,
    pub content: String,
    pub timestamp: String,
    pub index: usize,
}

/// Everything a template can reference.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub globals: IndexMap<&'static str, String>,
    pub metadata: IndexMap<String, String>,
    pub turns: Vec<TurnValues>,
}

impl Template {
    pub fn parse(src: &str) -> Result<Self, TemplateError> {
        let mut root: Vec<Node> = Vec::new();
        let mut section: Option<Vec<Node>> = None;
        let mut rest = src;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            let in_section = section.is_some();
            let target = section.as_mut().unwrap_or(&mut root);
            if start > 0 {
                target.push(Node::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or(TemplateError::Unterminated(offset + start))?;
            let tag = after[..end].trim();

            if let Some(name) = tag.strip_prefix('#') {
                let name = name.trim();
                if name != "turns" {
                    return Err(TemplateError::UnknownSection(name.to_string()));
                }
                if in_section {
                    return Err(TemplateError::Nested);
                }
                section = Some(Vec::new());
            } else if let Some(name) = tag.strip_prefix('/') {
                let name = name.trim();
                match section.take() {
                    Some(body) if name == "turns" => root.push(Node::Turns(body)),
                    _ => return Err(TemplateError::UnexpectedClose(name.to_string())),
                }
            } else {
                let var = parse_var(tag, in_section)?;
                target.push(Node::Var(var));
            }

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }

        if section.is_some() {
            return Err(TemplateError::Unclosed("turns".to_string()));
        }
        if !rest.is_empty() {
            root.push(Node::Text(rest.to_string()));
        }
        Ok(Self { nodes: root })
    }

    pub fn render(&self, ctx: &Context) -> Result<String, TemplateError> {
        let mut out = String::new();
        render_nodes(&self.nodes, ctx, None, &mut out)?;
        Ok(out)
    }
}

fn parse_var(tag: &str, in_section: bool) -> Result<Var, TemplateError> {
    if let Some(key) = tag.strip_prefix("metadata.") {
        if key.is_empty() {
            return Err(TemplateError::UnknownVariable(tag.to_string()));
        }
        return Ok(Var::Meta(key.to_string()));
    }
    if in_section && TURN_FIELDS.contains(&tag) {
        return Ok(Var::Turn(tag.to_string()));
    }
    if GLOBALS.contains(&tag) {
        return Ok(Var::Global(tag.to_string()));
    }
    Err(TemplateError::UnknownVariable(tag.to_string()))
}

fn render_nodes(
    nodes: &[Node],
    ctx: &Context,
    turn: Option<&TurnValues>,
    out: &mut String,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(Var::Global(name)) => {
                if let Some(value) = ctx.globals.get(name.as_str()) {
                    out.push_str(value);
                }
            }
            Node::Var(Var::Meta(key)) => {
                let value = ctx
                    .metadata
                    .get(key)
                    .ok_or_else(|| TemplateError::MissingMetadata(key.clone()))?;
                out.push_str(value);
            }
            Node::Var(Var::Turn(field)) => {
                let Some(t) = turn else { continue };
                match field.as_str() {
                    "role" => out.push_str(&t.role),
                    "role_label" => out.push_str(&t.role_label),
                    "content" => out.push_str(&t.content),
                    "timestamp" => out.push_str(&t.timestamp),
                    "index" => out.push_str(&t.index.to_string()),
                    _ => {}
                }
            }
            Node::Turns(body) => {
                for t in &ctx.turns {
                    render_nodes(body, ctx, Some(t), out)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        let mut ctx = Context::default();
        ctx.globals.insert("title", "Chat".into());
        ctx.metadata.insert("model".into(), "gpt-4o".into());
        for (i, (role, content)) in [("user", "hi"), ("assistant", "hello")].iter().enumerate() {
            ctx.turns.push(TurnValues {
                role: role.to_string(),
                role_label: role.to_uppercase(),
                content: content.to_string(),
                timestamp: String::new(),
                index: i + 1,
            });
        }
        ctx
    }

    #[test]
    fn renders_globals_sections_and_metadata() {
        let t = Template::parse("# {{ title }}\n{{#turns}}{{index}}. {{role}}: {{content}}\n{{/turns}}({{metadata.model}})")
            .unwrap();
        assert_eq!(
            t.render(&ctx()).unwrap(),
            "# Chat\n1. user: hi\n2. assistant: hello\n(gpt-4o)"
        );
    }

    #[test]
    fn rejects_malformed_templates() {
        assert_eq!(
            Template::parse("hello {{title").unwrap_err(),
            TemplateError::Unterminated(6)
        );
        assert!(matches!(
            Template::parse("{{titel}}"),
            Err(TemplateError::UnknownVariable(_))
        ));
        assert!(matches!(
            Template::parse("{{content}}"),
            Err(TemplateError::UnknownVariable(_))
        ));
        assert!(matches!(
            Template::parse("{{#messages}}{{/messages}}"),
            Err(TemplateError::UnknownSection(_))
        ));
        assert!(matches!(
            Template::parse("{{#turns}}{{#turns}}"),
            Err(TemplateError::Nested)
        ));
        assert!(matches!(
            Template::parse("{{/turns}}"),
            Err(TemplateError::UnexpectedClose(_))
        ));
        assert!(matches!(
            Template::parse("{{#turns}}{{content}}"),
            Err(TemplateError::Unclosed(_))
        ));
    }

    #[test]
    fn missing_metadata_fails_at_render() {
        let t = Template::parse("{{metadata.temperature}}").unwrap();
        assert_eq!(
            t.render(&ctx()).unwrap_err(),
            TemplateError::MissingMetadata("temperature".into())
        );
    }

    #[test]
    fn plain_text_passes_through() {
        let t = Template::parse("no tags } here {").unwrap();
        assert_eq!(t.render(&Context::default()).unwrap(), "no tags } here {");
    }
}
