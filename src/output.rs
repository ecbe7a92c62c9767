// Table / JSON output for the one-shot commands (scan, mysql-*, general-log).

use serde::Serialize;
use std::io::Write;

pub type OutputRow = Vec<String>;

/// First row is the header.
pub type OutputTable = Vec<OutputRow>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// A typed record that knows its column names and how to render each cell.
pub trait Tabular {
    fn columns() -> Vec<String>;
    fn cells(&self) -> Vec<String>;
}

pub fn table_of<T: Tabular>(records: &[T]) -> OutputTable {
    let mut table = Vec::with_capacity(records.len() + 1);
    table.push(T::columns());
    table.extend(records.iter().map(Tabular::cells));
    table
}

pub struct Printer<W: Write = Box<dyn Write + Send>> {
    out: W,
    format: OutputFormat,
}

impl Printer<Box<dyn Write + Send>> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(Box::new(std::io::stdout()), format)
    }
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    /// Free text; table mode only.
    pub fn line(&mut self, text: &str) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Table => writeln!(self.out, "{}", text),
            OutputFormat::Json => Ok(()),
        }
    }

    pub fn table(&mut self, table: &OutputTable) -> std::io::Result<()> {
        if table.is_empty() {
            return Ok(());
        }
        match self.format {
            OutputFormat::Table => {
                for line in render_aligned(table) {
                    writeln!(self.out, "{}", line)?;
                }
                Ok(())
            }
            OutputFormat::Json => self.table_json(table),
        }
    }

    /// Whole value as JSON; table mode ignores it.
    pub fn value<T: Serialize>(&mut self, value: &T) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Table => Ok(()),
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
                writeln!(self.out, "{}", json)
            }
        }
    }

    fn table_json(&mut self, table: &OutputTable) -> std::io::Result<()> {
        let headers = &table[0];
        let rows: Vec<serde_json::Map<String, serde_json::Value>> = table[1..]
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        let key = headers.get(i).cloned().unwrap_or_else(|| format!("col_{}", i));
                        (key, serde_json::Value::String(cell.clone()))
                    })
                    .collect()
            })
            .collect();
        let json = serde_json::to_string_pretty(&rows).map_err(std::io::Error::other)?;
        writeln!(self.out, "{}", json)
    }
}

/// Column-aligned lines with a separator rule under the header. The first
/// column is left-aligned, the rest right-aligned.
pub fn render_aligned(table: &OutputTable) -> Vec<String> {
    const SEPARATOR: &str = " | ";

    let columns = table.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in table {
        for (col, cell) in row.iter().enumerate() {
            widths[col] = widths[col].max(cell.chars().count());
        }
    }

    let render = |row: &OutputRow| -> String {
        let cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(col, &w)| {
                let cell = row.get(col).map(String::as_str).unwrap_or("");
                if col == 0 {
                    format!("{:<w$}", cell)
                } else {
                    format!("{:>w$}", cell)
                }
            })
            .collect();
        cells.join(SEPARATOR).trim_end().to_string()
    };

    let mut lines = Vec::with_capacity(table.len() + 1);
    let mut rows = table.iter();
    if let Some(header) = rows.next() {
        let header_line = render(header);
        let rule = "-".repeat(header_line.chars().count());
        lines.push(header_line);
        lines.push(rule);
    }
    lines.extend(rows.map(render));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_pads_columns_to_widest_cell() {
        let table: OutputTable = vec![
            vec!["TYPE".into(), "COUNT".into()],
            vec!["STRING".into(), "4".into()],
            vec!["ZSET".into(), "12345".into()],
        ];
        let lines = render_aligned(&table);
        assert_eq!(lines[0], "TYPE   | COUNT");
        assert_eq!(lines[1], "-".repeat(14));
        assert_eq!(lines[2], "STRING |     4");
        assert_eq!(lines[3], "ZSET   | 12345");
    }

    #[test]
    fn json_uses_header_as_keys() {
        let table: OutputTable = vec![
            vec!["name".into(), "value".into()],
            vec!["a".into(), "1".into()],
        ];
        let mut buf = Vec::new();
        Printer::new(&mut buf, OutputFormat::Json).table(&table).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed[0]["name"], "a");
        assert_eq!(parsed[0]["value"], "1");
    }
}
