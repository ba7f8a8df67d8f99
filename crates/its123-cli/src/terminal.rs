//! Terminal presentation and input
//!
//! Instrument pages are printed as plain text. Answers are typed as
//! `name=value` lines; an empty line submits the page.

use its123_core::{
    ClientError, ErrorReporter, FieldRecorder, FormData, RenderError, Renderer, Resource,
    SubmissionSource,
};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashSet;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

/// Renderer and submission source over a line reader
pub(crate) struct Terminal<R> {
    lines: tokio::sync::Mutex<Lines<R>>,
    field_pattern: Regex,
    tag_pattern: Regex,
    fields: Mutex<Vec<String>>,
    restored: Mutex<Vec<(String, String)>>,
    scripts: Mutex<HashSet<String>>,
    recorder: Mutex<Option<FieldRecorder>>,
}

impl<R: AsyncBufRead + Unpin> Terminal<R> {
    pub(crate) fn new(reader: R) -> Result<Self, regex::Error> {
        Ok(Self {
            lines: tokio::sync::Mutex::new(reader.lines()),
            field_pattern: Regex::new(r#"name\s*=\s*"([^"]+)""#)?,
            tag_pattern: Regex::new(r"<[^>]*>")?,
            fields: Mutex::new(Vec::new()),
            restored: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashSet::new()),
            recorder: Mutex::new(None),
        })
    }

    fn field_names_of(&self, html: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for capture in self.field_pattern.captures_iter(html) {
            let name = &capture[1];
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    fn plain_text(&self, html: &str) -> String {
        self.tag_pattern
            .replace_all(html, " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Split a `name=value` answer line
pub(crate) fn parse_answer(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[async_trait::async_trait]
impl<R> Renderer for Terminal<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn has_script(&self, src: &str) -> bool {
        self.scripts.lock().contains(src)
    }

    async fn load_script(&self, resource: &Resource) -> Result<(), RenderError> {
        tracing::debug!(path = %resource.path, "script noted, terminal cannot execute it");
        self.scripts.lock().insert(resource.path.clone());
        Ok(())
    }

    fn inject_stylesheet(&self, resource: &Resource) {
        tracing::debug!(path = %resource.path, "stylesheet ignored");
    }

    fn render_instrument(&self, body: &str) -> Result<(), RenderError> {
        let names = self.field_names_of(body);
        println!();
        println!("{}", self.plain_text(body));
        if !names.is_empty() {
            println!("fields: {}", names.join(", "));
        }
        *self.fields.lock() = names;
        self.restored.lock().clear();
        Ok(())
    }

    fn render_report(&self, body: &str) -> Result<(), RenderError> {
        println!();
        println!("{}", self.plain_text(body));
        Ok(())
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.lock().clone()
    }

    fn set_field_value(&self, name: &str, value: &str) {
        println!("  {name} = {value} (restored)");
        self.restored.lock().push((name.to_string(), value.to_string()));
    }

    fn bind_field_changes(&self, recorder: FieldRecorder) {
        *self.recorder.lock() = Some(recorder);
    }
}

#[async_trait::async_trait]
impl<R> SubmissionSource for Terminal<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_submission(&self, access_code: &str) -> Option<FormData> {
        println!("answer as name=value, empty line submits [{access_code}]");
        let recorder = self.recorder.lock().clone();
        let mut form = FormData::new();
        let mut lines = self.lines.lock().await;

        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => break,
                Ok(Some(line)) => match parse_answer(&line) {
                    Some((name, value)) => {
                        if let Some(recorder) = &recorder {
                            recorder.record(&name, &value);
                        }
                        form.push(name, value);
                    }
                    None => eprintln!("ignoring '{}', expected name=value", line.trim()),
                },
                Ok(None) if form.is_empty() => return None,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "input closed");
                    return None;
                }
            }
        }

        for (name, value) in self.restored.lock().iter() {
            if form.get(name).is_none() {
                form.push(name.clone(), value.clone());
            }
        }
        Some(form)
    }
}

/// Forwards reported failures to the log
#[derive(Debug, Default)]
pub(crate) struct LogReporter;

impl ErrorReporter for LogReporter {
    fn notify(&self, error: &ClientError, context: &str) {
        tracing::error!(
            target: "its123::report",
            context,
            kind = ?error.kind(),
            status = ?error.status(),
            error = %error,
            "reported failure"
        );
    }
}
