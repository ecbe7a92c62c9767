// MySQL endpoint over one sqlx connection: global status, processlist, variables, ad-hoc SQL.

use super::EndpointClient;
use crate::error::ConnectionError;
use crate::models::{ConnectionRecord, Endpoint, Sample};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Executor, Row, ValueRef};
use std::collections::BTreeMap;
use tracing::instrument;

const PROCESSLIST_SQL: &str = "SELECT ID, USER, HOST, DB, COMMAND, TIME, STATE, INFO \
     FROM information_schema.PROCESSLIST ORDER BY ID";

pub struct MysqlClient {
    endpoint: Endpoint,
    conn: MySqlConnection,
}

impl MysqlClient {
    pub async fn connect(endpoint: &Endpoint, user: &str, password: &str) -> Result<Self, ConnectionError> {
        let conn = MySqlConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(user)
            .password(password)
            .charset("utf8mb4")
            .connect()
            .await?;
        tracing::debug!(endpoint = %endpoint, "mysql connected");
        Ok(Self {
            endpoint: endpoint.clone(),
            conn,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Global variables restricted to `names`, in server spelling.
    #[instrument(skip(self, names), fields(endpoint = %self.endpoint.name, operation = "show_variables"))]
    pub async fn variables(&mut self, names: &[&str]) -> Result<BTreeMap<String, String>, ConnectionError> {
        let rows = sqlx::raw_sql("SHOW GLOBAL VARIABLES")
            .fetch_all(&mut self.conn)
            .await?;
        Ok(name_value_pairs(&rows)
            .into_iter()
            .filter(|(k, _)| names.iter().any(|n| n.eq_ignore_ascii_case(k)))
            .collect())
    }

    /// Run one statement; returns column names and every row rendered as text.
    #[instrument(skip(self, sql), fields(endpoint = %self.endpoint.name, operation = "execute"))]
    pub async fn execute(&mut self, sql: &str) -> Result<(Vec<String>, Vec<Vec<String>>), ConnectionError> {
        let rows = sqlx::raw_sql(sql).fetch_all(&mut self.conn).await?;
        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let cells = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| cell_text(row, i)).collect())
            .collect();
        Ok((columns, cells))
    }
}

impl EndpointClient for MysqlClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint.name, operation = "show_status"))]
    async fn status(&mut self) -> Result<Sample, ConnectionError> {
        let rows = Executor::fetch_all(&mut self.conn, sqlx::raw_sql("SHOW GLOBAL STATUS")).await?;
        Ok(Sample::new(name_value_pairs(&rows)))
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint.name, operation = "processlist"))]
    async fn list_connections(&mut self) -> Result<Vec<ConnectionRecord>, ConnectionError> {
        let rows = Executor::fetch_all(&mut self.conn, sqlx::raw_sql(PROCESSLIST_SQL)).await?;
        Ok(rows
            .iter()
            .map(|row| {
                ConnectionRecord::new(
                    row.columns()
                        .iter()
                        .enumerate()
                        .map(|(i, c)| (c.name().to_ascii_lowercase(), cell_text(row, i)))
                        .collect(),
                )
            })
            .collect())
    }
}

/// Two-column `Variable_name` / `Value` result sets.
fn name_value_pairs(rows: &[MySqlRow]) -> BTreeMap<String, String> {
    rows.iter()
        .filter_map(|row| {
            let name = text(row, 0)?;
            let value = text(row, 1).unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

/// Raw bytes of a non-NULL cell. `raw_sql` runs over the text protocol, so every
/// column type (DECIMAL, DATETIME, YEAR, ...) arrives as its textual form and the
/// unchecked decode skips sqlx's column-type compatibility check.
fn raw_bytes(row: &MySqlRow, idx: usize) -> Option<Vec<u8>> {
    let raw = row.try_get_raw(idx).ok()?;
    if raw.is_null() {
        return None;
    }
    row.try_get_unchecked::<Vec<u8>, _>(idx).ok()
}

fn text(row: &MySqlRow, idx: usize) -> Option<String> {
    raw_bytes(row, idx).map(|b| String::from_utf8_lossy(&b).into_owned())
}

fn cell_text(row: &MySqlRow, idx: usize) -> String {
    render_cell(raw_bytes(row, idx).as_deref())
}

/// Text, integer, float or temporal values as the server printed them; NULL otherwise.
fn render_cell(raw: Option<&[u8]>) -> String {
    match raw {
        Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        None => "NULL".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_keep_server_text_for_every_type() {
        assert_eq!(render_cell(Some(b"2016-03-30 09:55:01".as_slice())), "2016-03-30 09:55:01");
        assert_eq!(render_cell(Some(b"1234.50".as_slice())), "1234.50");
        assert_eq!(render_cell(Some(b"-7".as_slice())), "-7");
        assert_eq!(render_cell(Some(b"".as_slice())), "");
        assert_eq!(render_cell(None), "NULL");
    }

    #[test]
    fn invalid_utf8_is_rendered_lossily() {
        assert_eq!(render_cell(Some([b'a', 0xff, b'b'].as_slice())), "a\u{fffd}b");
    }
}
