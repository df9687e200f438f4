//! Change record -> apply payload translation.
//!
//! Translation is lazy: [`Translator::payloads`] yields one payload at a
//! time so the producer only runs as far ahead of the workers as the
//! bounded queue allows.

use std::iter::Peekable;
use std::slice::Iter;

use sync_core::sql::{qualified_name, quote_ident, quote_literal};
use sync_core::{ApplyPayload, ChangeRecord, OperationKind, RedoContent, RowImage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ApplyError;

/// Renders change records of one table as MySQL/TiDB statements.
#[derive(Debug, Clone)]
pub struct Translator {
    target_schema: String,
    coalesce: bool,
    lowercase: bool,
}

impl Translator {
    pub fn new(target_schema: &str) -> Self {
        Self {
            target_schema: target_schema.to_string(),
            coalesce: true,
            lowercase: false,
        }
    }

    pub fn coalesce_transactions(mut self, enabled: bool) -> Self {
        self.coalesce = enabled;
        self
    }

    pub fn lowercase_table_names(mut self, enabled: bool) -> Self {
        self.lowercase = enabled;
        self
    }

    pub fn target_table(&self, source_table: &str) -> String {
        if self.lowercase {
            source_table.to_lowercase()
        } else {
            source_table.to_string()
        }
    }

    /// Payloads for `records`, in record order. All records must belong to
    /// the same source table as the first one. Iteration stops after the
    /// first error.
    pub fn payloads<'a>(&'a self, records: &'a [ChangeRecord]) -> Payloads<'a> {
        Payloads {
            translator: self,
            records: records.iter().peekable(),
            batch: records.first().map(|r| (r.source_schema.as_str(), r.source_table.as_str())),
            failed: false,
        }
    }

    /// Push the payloads of `records` onto `queue`, suspending while it is
    /// full. Stops early if `cancel` fires. Returns the number of payloads
    /// queued.
    pub async fn feed(
        &self,
        records: &[ChangeRecord],
        queue: &mpsc::Sender<ApplyPayload>,
        cancel: &CancellationToken,
    ) -> Result<usize, ApplyError> {
        let mut queued = 0;
        for payload in self.payloads(records) {
            let payload = payload?;
            let table = payload.source_table.clone();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ApplyError::Incomplete {
                        scope: table,
                        reason: "pipeline cancelled while queueing payloads".to_string(),
                    });
                }
                sent = queue.send(payload) => {
                    if sent.is_err() {
                        return Err(ApplyError::Incomplete {
                            scope: table,
                            reason: "all apply workers exited before the queue drained".to_string(),
                        });
                    }
                }
            }
            queued += 1;
        }
        Ok(queued)
    }

    /// Statements for a single record.
    pub fn render(&self, record: &ChangeRecord) -> Result<Vec<String>, ApplyError> {
        let fail = |reason: String| ApplyError::Translation {
            table: record.qualified_table(),
            marker: record.marker,
            reason,
        };
        let target = qualified_name(&self.target_schema, &self.target_table(&record.source_table));

        match &record.content {
            RedoContent::Statement { sql } => {
                let sql = sql.trim().trim_end_matches(';').trim_end();
                if sql.is_empty() {
                    return Err(fail("empty redo statement".to_string()));
                }
                Ok(vec![sql.to_string()])
            }
            RedoContent::Row { before, after } => {
                let image = |image: &Option<RowImage>, name: &str| match image {
                    Some(img) if !img.is_empty() => Ok(img.clone()),
                    Some(_) => Err(fail(format!("{name} image has no columns"))),
                    None => Err(fail(format!(
                        "{} record is missing its {name} image",
                        record.operation
                    ))),
                };

                match record.operation {
                    OperationKind::Insert => Ok(vec![insert_sql(&target, &image(after, "after")?)]),
                    OperationKind::Delete => Ok(vec![delete_sql(&target, &image(before, "before")?)]),
                    OperationKind::Update => {
                        let before = image(before, "before")?;
                        let after = image(after, "after")?;
                        Ok(vec![delete_sql(&target, &before), insert_sql(&target, &after)])
                    }
                }
            }
        }
    }
}

fn insert_sql(target: &str, row: &RowImage) -> String {
    let columns: Vec<String> = row.keys().map(|c| quote_ident(c)).collect();
    let values: Vec<String> = row.values().map(|v| quote_literal(v.as_deref())).collect();
    format!(
        "INSERT INTO {target} ({}) VALUES ({})",
        columns.join(","),
        values.join(",")
    )
}

fn delete_sql(target: &str, row: &RowImage) -> String {
    let conditions: Vec<String> = row
        .iter()
        .map(|(column, value)| match value {
            Some(v) => format!("{} = {}", quote_ident(column), quote_literal(Some(v))),
            None => format!("{} IS NULL", quote_ident(column)),
        })
        .collect();
    format!("DELETE FROM {target} WHERE {} LIMIT 1", conditions.join(" AND "))
}

/// Lazy, ordered payload iterator returned by [`Translator::payloads`].
pub struct Payloads<'a> {
    translator: &'a Translator,
    records: Peekable<Iter<'a, ChangeRecord>>,
    batch: Option<(&'a str, &'a str)>,
    failed: bool,
}

impl<'a> Payloads<'a> {
    fn check_table(&self, record: &ChangeRecord) -> Result<(), ApplyError> {
        match self.batch {
            Some((schema, table)) if !record.belongs_to(schema, table) => {
                Err(ApplyError::Translation {
                    table: record.qualified_table(),
                    marker: record.marker,
                    reason: format!("record does not belong to batch table {schema}.{table}"),
                })
            }
            _ => Ok(()),
        }
    }

    fn build(&mut self, first: &'a ChangeRecord) -> Result<ApplyPayload, ApplyError> {
        self.check_table(first)?;
        let mut statements = self.translator.render(first)?;
        let mut last = first;
        let mut record_count = 1;

        let transaction = first
            .transaction_id
            .as_deref()
            .filter(|xid| self.translator.coalesce && !xid.is_empty());
        if let Some(xid) = transaction {
            while let Some(next) = self
                .records
                .next_if(|r| r.transaction_id.as_deref() == Some(xid))
            {
                self.check_table(next)?;
                statements.extend(self.translator.render(next)?);
                last = next;
                record_count += 1;
            }
        }

        Ok(ApplyPayload {
            source_schema: first.source_schema.clone(),
            source_table: first.source_table.clone(),
            target_schema: self.translator.target_schema.clone(),
            target_table: self.translator.target_table(&first.source_table),
            operation: last.operation,
            marker: last.marker,
            statements,
            record_count,
        })
    }
}

impl<'a> Iterator for Payloads<'a> {
    type Item = Result<ApplyPayload, ApplyError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let first = self.records.next()?;
        let payload = self.build(first);
        if payload.is_err() {
            self.failed = true;
        }
        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::ReplicationMarker;

    fn row(pairs: &[(&str, Option<&str>)]) -> RowImage {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(|s| s.to_string())))
            .collect()
    }

    fn record(op: OperationKind, scn: u64, content: RedoContent) -> ChangeRecord {
        ChangeRecord {
            source_schema: "MARVIN".to_string(),
            source_table: "ORDERS".to_string(),
            operation: op,
            marker: ReplicationMarker::new(scn, scn),
            transaction_id: None,
            content,
        }
    }

    fn statement(scn: u64, sql: &str) -> ChangeRecord {
        record(
            OperationKind::Insert,
            scn,
            RedoContent::Statement {
                sql: sql.to_string(),
            },
        )
    }

    #[test]
    fn test_render_insert() {
        let r = record(
            OperationKind::Insert,
            1,
            RedoContent::Row {
                before: None,
                after: Some(row(&[("ID", Some("1")), ("NOTE", Some("it's")), ("X", None)])),
            },
        );
        let sql = Translator::new("steven").render(&r).unwrap();
        assert_eq!(
            sql,
            vec!["INSERT INTO `steven`.`ORDERS` (`ID`,`NOTE`,`X`) VALUES ('1','it\\'s',NULL)"]
        );
    }

    #[test]
    fn test_render_update_is_delete_then_insert() {
        let r = record(
            OperationKind::Update,
            1,
            RedoContent::Row {
                before: Some(row(&[("ID", Some("1")), ("X", None)])),
                after: Some(row(&[("ID", Some("1")), ("X", Some("2"))])),
            },
        );
        let sql = Translator::new("steven")
            .lowercase_table_names(true)
            .render(&r)
            .unwrap();
        assert_eq!(
            sql,
            vec![
                "DELETE FROM `steven`.`orders` WHERE `ID` = '1' AND `X` IS NULL LIMIT 1",
                "INSERT INTO `steven`.`orders` (`ID`,`X`) VALUES ('1','2')",
            ]
        );
    }

    #[test]
    fn test_render_rejects_malformed_records() {
        let translator = Translator::new("steven");

        let missing_after = record(
            OperationKind::Insert,
            7,
            RedoContent::Row {
                before: None,
                after: None,
            },
        );
        let err = translator.render(&missing_after).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("missing its after image"));

        let empty_before = record(
            OperationKind::Delete,
            8,
            RedoContent::Row {
                before: Some(RowImage::new()),
                after: None,
            },
        );
        assert!(translator.render(&empty_before).is_err());

        assert!(translator.render(&statement(9, " ;  ")).is_err());
    }

    #[test]
    fn test_statement_passthrough_trims_semicolon() {
        let sql = Translator::new("steven")
            .render(&statement(1, "DELETE FROM `steven`.`orders` WHERE id = 1;"))
            .unwrap();
        assert_eq!(sql, vec!["DELETE FROM `steven`.`orders` WHERE id = 1"]);
    }

    #[test]
    fn test_payloads_preserve_order() {
        let records = vec![statement(100, "S1"), statement(101, "S2"), statement(102, "S3")];
        let payloads: Vec<_> = Translator::new("steven")
            .payloads(&records)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(payloads.len(), 3);
        let markers: Vec<u64> = payloads.iter().map(|p| p.marker.global_scn).collect();
        assert_eq!(markers, vec![100, 101, 102]);
        assert_eq!(payloads[1].statements, vec!["S2"]);
        assert_eq!(payloads[1].target_schema, "steven");
        assert_eq!(payloads[1].target_table, "ORDERS");
    }

    #[test]
    fn test_payloads_coalesce_transactions() {
        let mut records = vec![
            statement(100, "A1"),
            statement(101, "A2"),
            statement(102, "B1"),
            statement(103, "C1"),
        ];
        records[0].transaction_id = Some("tx-a".to_string());
        records[1].transaction_id = Some("tx-a".to_string());
        records[1].operation = OperationKind::Delete;
        records[2].transaction_id = Some("tx-b".to_string());

        let payloads: Vec<_> = Translator::new("steven")
            .payloads(&records)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[0].statements, vec!["A1", "A2"]);
        assert_eq!(payloads[0].record_count, 2);
        assert_eq!(payloads[0].marker, ReplicationMarker::new(101, 101));
        assert_eq!(payloads[0].operation, OperationKind::Delete);
        assert_eq!(payloads[1].statements, vec!["B1"]);
        assert_eq!(payloads[2].statements, vec!["C1"]);

        let uncoalesced = Translator::new("steven")
            .coalesce_transactions(false)
            .payloads(&records)
            .count();
        assert_eq!(uncoalesced, 4);
    }

    #[test]
    fn test_payloads_stop_at_first_error() {
        let mut foreign = statement(101, "X");
        foreign.source_table = "ITEMS".to_string();
        let records = vec![statement(100, "S1"), foreign, statement(102, "S3")];

        let results: Vec<_> = Translator::new("steven").payloads(&records).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("does not belong to batch table MARVIN.ORDERS"));
    }

    #[tokio::test]
    async fn test_feed_blocks_on_full_queue() {
        let records = vec![statement(100, "S1"), statement(101, "S2"), statement(102, "S3")];
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let producer = tokio::spawn(async move {
            Translator::new("steven").feed(&records, &tx, &cancel).await
        });

        // Queue depth 1: the producer can't finish until we drain
        tokio::task::yield_now().await;
        assert!(!producer.is_finished());

        let mut seen = Vec::new();
        while let Some(p) = rx.recv().await {
            seen.push(p.marker.global_scn);
        }
        assert_eq!(seen, vec![100, 101, 102]);
        assert_eq!(producer.await.unwrap().unwrap(), 3);
    }
}
