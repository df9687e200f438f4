//! `mysql_async` implementation of the execution gateway.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Pool, Row, TxOpts, Value};
use sync_core::{ExecutionGateway, QueryOutput};

/// Execution gateway over a shared MySQL/TiDB connection pool.
///
/// Each call checks a connection out of the pool and returns it when the
/// call's future completes, on success and error paths alike.
#[derive(Clone)]
pub struct MySQLGateway {
    pool: Pool,
}

impl MySQLGateway {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Close every pooled connection.
    pub async fn disconnect(self) -> Result<()> {
        self.pool.disconnect().await?;
        Ok(())
    }
}

/// Render a MySQL value as text. NULL renders as `"NULL"`.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::NULL => "NULL".to_string(),
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            if *micros == 0 {
                format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
            } else {
                format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
                )
            }
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let hours = u32::from(*hours) + days * 24;
            if *micros == 0 {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
            } else {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
            }
        }
    }
}

fn row_to_map(row: &Row) -> HashMap<String, String> {
    row.columns_ref()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = row
                .as_ref(i)
                .map(value_to_string)
                .unwrap_or_else(|| "NULL".to_string());
            (column.name_str().into_owned(), value)
        })
        .collect()
}

#[async_trait]
impl ExecutionGateway for MySQLGateway {
    async fn execute(&self, statement: &str) -> Result<QueryOutput> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .context("Failed to get MySQL connection from pool")?;

        let rows: Vec<Row> = conn
            .query(statement)
            .await
            .with_context(|| format!("Failed to execute [{statement}]"))?;

        let columns = rows
            .first()
            .map(|row| {
                row.columns_ref()
                    .iter()
                    .map(|c| c.name_str().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(QueryOutput {
            columns,
            rows: rows.iter().map(row_to_map).collect(),
            affected_rows: conn.affected_rows(),
        })
    }

    async fn execute_batch(&self, statements: &[String]) -> Result<u64> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .context("Failed to get MySQL connection from pool")?;

        // Dropping an uncommitted transaction rolls it back.
        let mut tx = conn.start_transaction(TxOpts::default()).await?;
        let mut affected = 0;
        for statement in statements {
            tx.query_drop(statement)
                .await
                .with_context(|| format!("Failed to execute [{statement}]"))?;
            affected += tx.affected_rows();
        }
        tx.commit().await.context("Failed to commit transaction")?;

        Ok(affected)
    }
}
