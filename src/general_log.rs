// MySQL general query log: count statements per kind and the tables each kind
// touches, then rank tables by execution count over the log's time window.

use crate::output::Tabular;
use chrono::{NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::BufRead;
use std::sync::OnceLock;

pub const DEFAULT_TOP: usize = 15;

/// Server command names as the general log prints them. Multi-word names come
/// before their one-word prefixes.
const COMMANDS: &[&str] = &[
    "Binlog Dump GTID",
    "Binlog Dump",
    "Change user",
    "Close stmt",
    "Connect Out",
    "Connect",
    "Create DB",
    "Daemon",
    "Debug",
    "Delayed insert",
    "Drop DB",
    "Error",
    "Execute",
    "Fetch",
    "Field List",
    "Init DB",
    "Kill",
    "Long Data",
    "Ping",
    "Prepare",
    "Processlist",
    "Query",
    "Quit",
    "Refresh",
    "Register Slave",
    "Reset Connection",
    "Reset stmt",
    "Set option",
    "Shutdown",
    "Sleep",
    "Statistics",
    "Table Dump",
    "Time",
];

/// `[YYMMDD H:MM:SS]  <thread id> <command>  <argument>`
fn entry_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^\s*(?:(\d{{6}})\s+(\d{{1,2}}:\d{{2}}:\d{{2}})\s+)?(\d+)\s+({})(?:\s+(.*))?$",
            COMMANDS.join("|")
        ))
        .expect("entry pattern compiles")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Select,
    Update,
    Delete,
    Insert,
}

impl StatementKind {
    /// Report order.
    pub const ALL: [StatementKind; 4] = [
        StatementKind::Select,
        StatementKind::Update,
        StatementKind::Delete,
        StatementKind::Insert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Insert => "INSERT",
        }
    }

    fn from_keyword(upper: &str) -> Option<Self> {
        match upper {
            "SELECT" => Some(StatementKind::Select),
            "UPDATE" => Some(StatementKind::Update),
            "DELETE" => Some(StatementKind::Delete),
            "INSERT" => Some(StatementKind::Insert),
            _ => None,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokens after which the next token names a table.
fn introduces_table(upper: &str) -> bool {
    matches!(upper, "FROM" | "JOIN" | "UPDATE" | "INTO")
}

/// Split SQL into tokens: backticks dropped, `(` standalone.
pub fn tokenize(sql: &str) -> Vec<String> {
    sql.replace('`', " ")
        .replace('(', " ( ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default)]
pub struct GeneralLogStats {
    counts: BTreeMap<StatementKind, u64>,
    tables: BTreeMap<StatementKind, HashMap<String, u64>>,
    first_stamp: Option<NaiveDateTime>,
    last_stamp: Option<NaiveDateTime>,
    entries: u64,
}

impl GeneralLogStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a whole log. Entry-start lines open a new entry; any other line
    /// continues the SQL of the previous one.
    pub fn parse<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut stats = Self::new();
        let mut pending: Option<String> = None;
        for line in reader.lines() {
            let line = line?;
            match entry_start().captures(&line) {
                Some(caps) => {
                    if let Some(sql) = pending.take() {
                        stats.record_sql(&sql);
                    }
                    if let (Some(d), Some(t)) = (caps.get(1), caps.get(2)) {
                        stats.observe_stamp(d.as_str(), t.as_str());
                    }
                    stats.entries += 1;
                    pending = Some(caps.get(5).map_or("", |m| m.as_str()).to_string());
                }
                None => {
                    if let Some(sql) = pending.as_mut() {
                        sql.push(' ');
                        sql.push_str(line.trim());
                    }
                }
            }
        }
        if let Some(sql) = pending {
            stats.record_sql(&sql);
        }
        Ok(stats)
    }

    fn observe_stamp(&mut self, date: &str, time: &str) {
        let Ok(stamp) = NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%y%m%d %H:%M:%S") else {
            tracing::debug!(date, time, "unparseable general log stamp");
            return;
        };
        if self.first_stamp.is_none() {
            self.first_stamp = Some(stamp);
        }
        self.last_stamp = Some(stamp);
    }

    /// Count statements and table references in one entry's SQL.
    pub fn record_sql(&mut self, sql: &str) {
        let mut current: Option<StatementKind> = None;
        let mut next_is_table = false;
        for token in tokenize(sql) {
            let upper = token.to_ascii_uppercase();
            if let Some(kind) = StatementKind::from_keyword(&upper) {
                current = Some(kind);
                *self.counts.entry(kind).or_default() += 1;
            }
            if next_is_table {
                next_is_table = false;
                if token == "(" {
                    continue;
                }
                if let Some(kind) = current {
                    let table = token.trim_end_matches([',', ';']);
                    if !table.is_empty() {
                        *self
                            .tables
                            .entry(kind)
                            .or_default()
                            .entry(table.to_string())
                            .or_default() += 1;
                    }
                }
            }
            if introduces_table(&upper) {
                next_is_table = true;
            }
        }
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn count(&self, kind: StatementKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn table_count(&self, kind: StatementKind, table: &str) -> u64 {
        self.tables
            .get(&kind)
            .and_then(|t| t.get(table))
            .copied()
            .unwrap_or(0)
    }

    pub fn first_stamp(&self) -> Option<NaiveDateTime> {
        self.first_stamp
    }

    /// Seconds from the first stamp to `end` (same day, wrapping past
    /// midnight) or, without `end`, to the last stamp seen.
    pub fn elapsed_secs(&self, end: Option<NaiveTime>) -> Option<i64> {
        let first = self.first_stamp?;
        let secs = match end {
            Some(end) => {
                let d = (end - first.time()).num_seconds();
                if d < 0 { d + 86_400 } else { d }
            }
            None => (self.last_stamp? - first).num_seconds(),
        };
        Some(secs)
    }

    /// Most executed tables for `kind`, ties broken by name.
    pub fn top_tables(&self, kind: StatementKind, top: usize, elapsed_secs: i64) -> Vec<TableUsage> {
        let total = self.count(kind);
        let Some(tables) = self.tables.get(&kind) else {
            return Vec::new();
        };
        let mut ranked: Vec<(&String, &u64)> = tables.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let window = elapsed_secs.max(1) as f64;
        ranked
            .into_iter()
            .take(top)
            .enumerate()
            .map(|(i, (table, &count))| TableUsage {
                rank: i + 1,
                share_pct: if total == 0 { 0.0 } else { count as f64 * 100.0 / total as f64 },
                per_second: count as f64 / window,
                count,
                table: table.clone(),
            })
            .collect()
    }

    pub fn report(&self, end: Option<NaiveTime>, top: usize) -> GeneralLogReport {
        let elapsed_secs = self.elapsed_secs(end).unwrap_or(0);
        GeneralLogReport {
            elapsed_secs,
            begin: self.first_stamp.map(|t| t.time().to_string()),
            end: end
                .or_else(|| self.last_stamp.map(|t| t.time()))
                .map(|t| t.to_string()),
            kinds: StatementKind::ALL
                .iter()
                .map(|&kind| KindReport {
                    kind,
                    total: self.count(kind),
                    top: self.top_tables(kind, top, elapsed_secs),
                })
                .collect(),
        }
    }
}

/// `HH:MM:SS` as given on the command line.
pub fn parse_end_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .map_err(|e| anyhow::anyhow!("end time {:?} is not HH:MM:SS: {}", s, e))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableUsage {
    pub rank: usize,
    pub share_pct: f64,
    pub per_second: f64,
    pub count: u64,
    pub table: String,
}

impl Tabular for TableUsage {
    fn columns() -> Vec<String> {
        ["RANK", "SHARE", "PER_SEC", "COUNT", "TABLE"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.rank.to_string(),
            format!("{:.2}%", self.share_pct),
            format!("{:.2}", self.per_second),
            self.count.to_string(),
            self.table.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindReport {
    pub kind: StatementKind,
    pub total: u64,
    pub top: Vec<TableUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralLogReport {
    pub elapsed_secs: i64,
    pub begin: Option<String>,
    pub end: Option<String>,
    pub kinds: Vec<KindReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_isolates_parens_and_drops_backticks() {
        assert_eq!(
            tokenize("SELECT DISTINCT(id) FROM `t1`"),
            vec!["SELECT", "DISTINCT", "(", "id", ")", "FROM", "t1"]
        );
    }

    #[test]
    fn record_sql_attributes_tables_to_current_kind() {
        let mut stats = GeneralLogStats::new();
        stats.record_sql("select a from `orders` left join users on users.id = orders.uid");
        stats.record_sql("UPDATE `js_captcha` SET `cap_status`=1 WHERE ( cap_id = 22464157 )");
        stats.record_sql("insert into audit (a) values (1)");
        assert_eq!(stats.count(StatementKind::Select), 1);
        assert_eq!(stats.table_count(StatementKind::Select, "orders"), 1);
        assert_eq!(stats.table_count(StatementKind::Select, "users"), 1);
        assert_eq!(stats.table_count(StatementKind::Update, "js_captcha"), 1);
        assert_eq!(stats.table_count(StatementKind::Insert, "audit"), 1);
    }

    #[test]
    fn subquery_paren_after_from_is_not_a_table() {
        let mut stats = GeneralLogStats::new();
        stats.record_sql("SELECT * FROM (SELECT id FROM t2) x");
        assert_eq!(stats.count(StatementKind::Select), 2);
        assert_eq!(stats.table_count(StatementKind::Select, "t2"), 1);
        assert_eq!(stats.table_count(StatementKind::Select, "("), 0);
    }
}
