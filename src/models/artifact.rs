// Diagnostic artifact: connection listing + status snapshot captured on alarm

use super::{Endpoint, Sample};
use chrono::{DateTime, Local};

/// Separator between the fields of one artifact line.
pub const FIELD_DELIMITER: char = '\t';

/// Strip characters that would break the one-record-per-line layout.
/// Braces and quotes are dropped; tabs and line breaks become spaces.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '{' | '}' | '\'' | '"'))
        .map(|c| match c {
            '\t' | '\r' | '\n' => ' ',
            c => c,
        })
        .collect()
}

/// One row of a bulk connection listing, fields in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub fields: Vec<(String, String)>,
}

impl ConnectionRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Single-line rendering: sanitized `k=v` pairs joined by [`FIELD_DELIMITER`].
    pub fn render(&self) -> String {
        let mut line = String::new();
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(FIELD_DELIMITER);
            }
            line.push_str(&sanitize(k));
            line.push('=');
            line.push_str(&sanitize(v));
        }
        line
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticArtifact {
    pub endpoint: Endpoint,
    pub captured_at: DateTime<Local>,
    pub records: Vec<ConnectionRecord>,
    pub status: Sample,
}

impl DiagnosticArtifact {
    /// `{host}_{port}-{kind}-{HHMMSS}.log`
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.log",
            self.endpoint.id(),
            self.endpoint.kind.listing_kind(),
            self.captured_at.format("%H%M%S")
        )
    }

    /// Records first, one per line, then one `name=value` line per status field.
    pub fn body(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&record.render());
            out.push('\n');
        }
        for (name, value) in self.status.fields() {
            out.push_str(&sanitize(name));
            out.push('=');
            out.push_str(&sanitize(value));
            out.push('\n');
        }
        out
    }
}
