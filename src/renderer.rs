//! Turns a [`CanonicalRecord`] into finished Markdown and/or HTML text.
//!
//! Output depends only on the record and the options: no wall-clock time is
//! ever written, so re-rendering the same export yields identical bytes.

use crate::config::{DocFormat, RenderOptions};
use crate::error::ConvertError;
use crate::record::{CanonicalRecord, Turn, format_timestamp};
use crate::template::{Context, Template, TurnValues};
use indexmap::IndexMap;
use pulldown_cmark::{Event, Options, Parser, html};
use serde_json::Value;
use std::fs;
use std::path::Path;

const DEFAULT_MARKDOWN: &str = include_str!("../templates/default.md");
const DEFAULT_HTML: &str = include_str!("../templates/default.html");

/// Render `record` in every format `options.output_format` asks for.
pub fn render(
    record: &CanonicalRecord,
    options: &RenderOptions,
) -> Result<IndexMap<DocFormat, String>, ConvertError> {
    let mut rendered = IndexMap::new();
    for &format in options.output_format.formats() {
        let (template, name) =
            load_template(options.template_for(format).map(|p| p.as_path()), format)?;
        let ctx = build_context(record, options, format)?;
        let text = template
            .render(&ctx)
            .map_err(|e| ConvertError::template(&name, e))?;
        let mut text = text.trim_end().to_string();
        text.push('\n');
        rendered.insert(format, text);
    }
    Ok(rendered)
}

/// Load a user template, or the built-in one when `path` is `None`.
///
/// A user template that is missing or malformed is an error; there is no
/// silent fallback to the default.
fn load_template(path: Option<&Path>, format: DocFormat) -> Result<(Template, String), ConvertError> {
    match path {
        Some(path) => {
            let src = fs::read_to_string(path)
                .map_err(|e| ConvertError::template(path, format!("cannot read: {e}")))?;
            let template = Template::parse(&src).map_err(|e| ConvertError::template(path, e))?;
            Ok((template, path.display().to_string()))
        }
        None => {
            let (name, src) = match format {
                DocFormat::Markdown => ("<built-in markdown>", DEFAULT_MARKDOWN),
                DocFormat::Html => ("<built-in html>", DEFAULT_HTML),
            };
            let template = Template::parse(src).map_err(|e| ConvertError::template(name, e))?;
            Ok((template, name.to_string()))
        }
    }
}

fn build_context(
    record: &CanonicalRecord,
    options: &RenderOptions,
    format: DocFormat,
) -> Result<Context, ConvertError> {
    let escape = |s: &str| match format {
        DocFormat::Markdown => s.to_string(),
        DocFormat::Html => escape_html(s),
    };

    let mut ctx = Context::default();
    let title = document_title(record);
    let source_file = source_file_name(record);

    ctx.globals.insert("title", escape(&title));
    ctx.globals.insert("source_file", escape(&source_file));
    ctx.globals.insert("export_format", format.extension().to_string());
    ctx.globals.insert("turn_count", record.turns.len().to_string());
    if options.include_yaml_front_matter {
        let block = match format {
            DocFormat::Markdown => yaml_front_matter(record, options, format)?,
            DocFormat::Html => html_meta_tags(record, &source_file, format),
        };
        ctx.globals.insert("front_matter", block);
    }
    if options.include_run_settings && !record.run_settings.is_empty() {
        let section = match format {
            DocFormat::Markdown => markdown_run_settings(&record.run_settings),
            DocFormat::Html => html_run_settings(&record.run_settings),
        };
        ctx.globals.insert("run_settings", section);
    }

    for (key, value) in &record.metadata {
        ctx.metadata.insert(key.clone(), escape(&value_text(value)));
    }

    for (i, turn) in record.turns.iter().enumerate() {
        let timestamp = if options.include_timestamps {
            turn.timestamp.as_ref().map(format_timestamp).unwrap_or_default()
        } else {
            String::new()
        };
        let content = match format {
            DocFormat::Markdown => turn.content.clone(),
            DocFormat::Html => markdown_to_html(&turn.content),
        };
        ctx.turns.push(TurnValues {
            role: turn.role.as_str().to_string(),
            role_label: turn.role.label().to_string(),
            content,
            timestamp,
            index: i + 1,
        });
    }

    let conversation = match format {
        DocFormat::Markdown => markdown_conversation(&record.turns, &ctx.turns),
        DocFormat::Html => html_conversation(&record.turns, &ctx.turns),
    };
    ctx.globals.insert("conversation", conversation);
    Ok(ctx)
}

fn document_title(record: &CanonicalRecord) -> String {
    record
        .title()
        .map(str::to_string)
        .or_else(|| {
            record
                .source_file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "Conversation".to_string())
}

fn source_file_name(record: &CanonicalRecord) -> String {
    record
        .source_file
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Plain text for a metadata value: strings verbatim, everything else as
/// compact JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The mapping written as YAML front matter.
pub fn front_matter_fields(
    record: &CanonicalRecord,
    options: &RenderOptions,
    format: DocFormat,
) -> IndexMap<String, Value> {
    let mut fields = record.metadata.clone();
    fields.insert("source_file".into(), Value::from(source_file_name(record)));
    fields.insert("export_format".into(), Value::from(format.extension()));
    if options.include_run_settings && !record.run_settings.is_empty() {
        let settings = record
            .run_settings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<serde_json::Map<_, _>>();
        fields.insert("run_settings".into(), Value::Object(settings));
    }
    fields
}

fn yaml_front_matter(
    record: &CanonicalRecord,
    options: &RenderOptions,
    format: DocFormat,
) -> Result<String, ConvertError> {
    let fields = front_matter_fields(record, options, format);
    let yaml = serde_yaml::to_string(&fields).map_err(|e| ConvertError::Validation {
        format: format.to_string(),
        reason: format!("front matter is not serializable: {e}"),
    })?;
    Ok(format!("---\n{yaml}---\n\n"))
}

fn html_meta_tags(record: &CanonicalRecord, source_file: &str, format: DocFormat) -> String {
    let mut out = String::new();
    let fixed = [
        ("source_file".to_string(), source_file.to_string()),
        ("export_format".to_string(), format.extension().to_string()),
    ];
    let meta = record.metadata.iter().map(|(k, v)| (k.clone(), value_text(v)));
    for (name, content) in meta.chain(fixed) {
        out.push_str(&format!(
            "<meta name=\"{}\" content=\"{}\">\n",
            escape_html(&name),
            escape_html(&content)
        ));
    }
    out
}

fn markdown_run_settings(settings: &IndexMap<String, Value>) -> String {
    let mut out = String::from("## Run settings\n\n| Setting | Value |\n| --- | --- |\n");
    for (key, value) in settings {
        let cell = match value {
            Value::Array(_) | Value::Object(_) => format!("`{value}`"),
            other => value_text(other),
        };
        out.push_str(&format!("| {} | {} |\n", key, cell.replace('|', "\\|")));
    }
    out.push('\n');
    out
}

fn html_run_settings(settings: &IndexMap<String, Value>) -> String {
    let mut out = String::from(
        "<section class=\"run-settings\">\n<h2>Run settings</h2>\n<table>\n<tr><th>Setting</th><th>Value</th></tr>\n",
    );
    for (key, value) in settings {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>\n",
            escape_html(key),
            escape_html(&value_text(value))
        ));
    }
    out.push_str("</table>\n</section>\n");
    out
}

fn markdown_conversation(turns: &[Turn], values: &[TurnValues]) -> String {
    let sections: Vec<String> = turns
        .iter()
        .zip(values)
        .map(|(turn, v)| {
            let mut section = format!("## {}\n\n", turn.role.label());
            if !v.timestamp.is_empty() {
                section.push_str(&format!("_{}_\n\n", v.timestamp));
            }
            section.push_str(v.content.trim_end());
            section.push('\n');
            section
        })
        .collect();
    sections.join("\n")
}

fn html_conversation(turns: &[Turn], values: &[TurnValues]) -> String {
    let mut out = String::new();
    for (turn, v) in turns.iter().zip(values) {
        out.push_str(&format!(
            "<section class=\"turn turn-{}\">\n<h2>{}</h2>\n",
            turn.role.as_str(),
            turn.role.label()
        ));
        if !v.timestamp.is_empty() {
            out.push_str(&format!(
                "<p class=\"timestamp\"><time datetime=\"{0}\">{0}</time></p>\n",
                v.timestamp
            ));
        }
        out.push_str(&v.content);
        out.push_str("</section>\n");
    }
    out
}

/// Render Markdown turn content to HTML. Raw HTML in the source is shown as
/// text, never passed through.
fn markdown_to_html(src: &str) -> String {
    let opts = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(src, opts).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Split a Markdown document into its YAML front matter and body.
pub fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("---\n")?;
    if let Some(body) = rest.strip_prefix("---\n") {
        return Some(("", body));
    }
    let end = rest.find("\n---\n")?;
    Some((&rest[..end + 1], &rest[end + 5..]))
}

/// Check that rendered text is structurally sound before it is written.
pub fn validate_output(format: DocFormat, text: &str) -> Result<(), ConvertError> {
    let fail = |reason: String| ConvertError::Validation {
        format: format.to_string(),
        reason,
    };
    if text.trim().is_empty() {
        return Err(fail("output is empty".into()));
    }
    match format {
        DocFormat::Markdown => {
            if text.starts_with("---\n") {
                let (yaml, _) = split_front_matter(text)
                    .ok_or_else(|| fail("front matter is not closed".into()))?;
                serde_yaml::from_str::<serde_yaml::Mapping>(yaml)
                    .map_err(|e| fail(format!("front matter is not a YAML mapping: {e}")))?;
            }
        }
        DocFormat::Html => {
            let lower = text.to_ascii_lowercase();
            for tag in ["html", "head", "body"] {
                let opens = count_open_tags(&lower, tag);
                let closes = lower.matches(&format!("</{tag}>")).count();
                if opens != closes || opens > 1 {
                    return Err(fail(format!(
                        "<{tag}> opened {opens} time(s) and closed {closes} time(s)"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn count_open_tags(lower: &str, tag: &str) -> usize {
    let needle = format!("<{tag}");
    lower
        .match_indices(&needle)
        .filter(|(i, _)| {
            lower[i + needle.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == '>' || c.is_whitespace())
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::record::Role;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::io::Write;

    fn record() -> CanonicalRecord {
        let mut r = CanonicalRecord::new("chats/aistudio_example.json");
        r.metadata.insert("title".into(), json!("Rust <basics>"));
        r.metadata.insert("model".into(), json!("gemini-2.5-pro"));
        r.metadata.insert("temperature".into(), json!(0.7));
        r.run_settings.insert("temperature".into(), json!(0.7));
        r.run_settings.insert("safetySettings".into(), json!([{ "category": "x" }]));
        r.turns.push(Turn::new(Role::System, "Be brief."));
        r.turns.push(
            Turn::new(Role::User, "What is *Rust*?")
                .at(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single()),
        );
        r.turns.push(Turn::new(Role::Assistant, "A <b>language</b>."));
        r
    }

    fn opts(format: OutputFormat) -> RenderOptions {
        RenderOptions {
            output_format: format,
            ..RenderOptions::default()
        }
    }

    #[test]
    fn markdown_has_sections_in_order() {
        let out = render(&record(), &opts(OutputFormat::Markdown)).unwrap();
        let md = &out[&DocFormat::Markdown];
        assert!(md.starts_with("# Rust <basics>\n"));
        let sys = md.find("## System").unwrap();
        let user = md.find("## User").unwrap();
        let asst = md.find("## Assistant").unwrap();
        assert!(sys < user && user < asst);
        assert!(!md.contains("2025-01-02"));
        assert!(!md.contains("Run settings"));
        assert!(md.ends_with("A <b>language</b>.\n"));
    }

    #[test]
    fn timestamps_come_from_the_record() {
        let options = RenderOptions {
            include_timestamps: true,
            ..opts(OutputFormat::Markdown)
        };
        let out = render(&record(), &options).unwrap();
        assert!(out[&DocFormat::Markdown].contains("_2025-01-02T03:04:05Z_"));
    }

    #[test]
    fn front_matter_round_trips() {
        let options = RenderOptions {
            include_yaml_front_matter: true,
            ..opts(OutputFormat::Markdown)
        };
        let rec = record();
        let md = render(&rec, &options).unwrap().swap_remove(&DocFormat::Markdown).unwrap();
        let (yaml, body) = split_front_matter(&md).unwrap();
        let parsed: IndexMap<String, Value> = serde_yaml::from_str(yaml).unwrap();
        for (key, value) in &rec.metadata {
            assert_eq!(parsed.get(key), Some(value), "{key}");
        }
        assert_eq!(parsed["source_file"], json!("aistudio_example.json"));
        assert_eq!(parsed["export_format"], json!("md"));
        assert!(!parsed.contains_key("run_settings"));
        assert!(body.starts_with("# Rust"));
        validate_output(DocFormat::Markdown, &md).unwrap();
    }

    #[test]
    fn run_settings_are_gated() {
        let options = RenderOptions {
            include_run_settings: true,
            include_yaml_front_matter: true,
            ..opts(OutputFormat::Markdown)
        };
        let md = render(&record(), &options).unwrap().swap_remove(&DocFormat::Markdown).unwrap();
        assert!(md.contains("## Run settings"));
        assert!(md.contains("| temperature | 0.7 |"));
        assert!(md.contains("run_settings:"));
    }

    #[test]
    fn html_escapes_and_validates() {
        let options = RenderOptions {
            include_yaml_front_matter: true,
            include_run_settings: true,
            ..opts(OutputFormat::Html)
        };
        let out = render(&record(), &options).unwrap();
        let html = &out[&DocFormat::Html];
        assert!(html.contains("<title>Rust &lt;basics&gt;</title>"));
        assert!(html.contains("<em>Rust</em>"));
        assert!(html.contains("&lt;b&gt;language&lt;/b&gt;"));
        assert!(html.contains("<meta name=\"export_format\" content=\"html\">"));
        assert!(html.contains("class=\"turn turn-user\""));
        validate_output(DocFormat::Html, html).unwrap();
    }

    #[test]
    fn both_formats_render_deterministically() {
        let options = opts(OutputFormat::Both);
        let a = render(&record(), &options).unwrap();
        let b = render(&record(), &options).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
    }

    #[test]
    fn user_template_is_used() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{{{#turns}}}}[{{{{role}}}}] {{{{content}}}}\n{{{{/turns}}}}").unwrap();
        let options = RenderOptions {
            template_path: Some(file.path().to_path_buf()),
            ..opts(OutputFormat::Markdown)
        };
        let md = render(&record(), &options).unwrap().swap_remove(&DocFormat::Markdown).unwrap();
        assert_eq!(
            md,
            "[system] Be brief.\n[user] What is *Rust*?\n[assistant] A <b>language</b>.\n"
        );
    }

    #[test]
    fn missing_user_template_does_not_fall_back() {
        let options = RenderOptions {
            template_path: Some("/nonexistent/template.md".into()),
            ..opts(OutputFormat::Markdown)
        };
        let err = render(&record(), &options).unwrap_err();
        assert!(matches!(err, ConvertError::Template { .. }));
    }

    #[test]
    fn validation_catches_broken_output() {
        assert!(validate_output(DocFormat::Markdown, "   ").is_err());
        assert!(validate_output(DocFormat::Markdown, "---\ntitle: x\nno end").is_err());
        assert!(validate_output(DocFormat::Markdown, "---\n- a\n- b\n---\nbody").is_err());
        assert!(validate_output(DocFormat::Html, "<html><body></html>").is_err());
        assert!(validate_output(DocFormat::Html, "<html><head></head><body></body></html>").is_ok());
    }

    #[test]
    fn splits_front_matter() {
        assert_eq!(split_front_matter("---\na: 1\n---\nbody"), Some(("a: 1\n", "body")));
        assert_eq!(split_front_matter("---\n---\nbody"), Some(("", "body")));
        assert_eq!(split_front_matter("# no"), None);
    }
}
