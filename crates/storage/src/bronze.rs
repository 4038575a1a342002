use std::sync::Arc;

use arrow_array::{ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use object_store::path::Path;
use object_store::ObjectStore;
use parquet::arrow::ArrowWriter;
use serde_json::Value as Json;

use crate::error::Result;
use crate::partition::WriteContext;

/// Append-only, partitioned raw-record store (schema §4.8).
///
/// Every extracted field gets its own column, typed by majority vote over
/// the batch (a single `write()` call is always one task/one schema, so
/// fields are homogeneous), alongside the underscore-prefixed lineage
/// columns. A field whose values mix types across the batch, or carry a
/// list/object, falls back to a `Utf8` column holding its JSON text.
pub struct BronzeWriter {
    store: Arc<dyn ObjectStore>,
}

impl BronzeWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Writes `records` as a single Parquet file under the partition
    /// prefix and returns that prefix; consumers read every file beneath
    /// it. A write failure here is the caller's to handle — unlike the
    /// trash writer, bronze writes are load-bearing for a task's
    /// `SUCCESS` status.
    pub async fn write(&self, ctx: &WriteContext, records: &[Json]) -> Result<String> {
        let prefix = ctx.bronze_prefix();
        let file_name = format!("{prefix}/part-{}.parquet", ctx.run_id);

        let batch = to_record_batch(ctx, records)?;
        let bytes = encode_parquet(&batch)?;

        let path = Path::from(file_name);
        self.store.put(&path, bytes.into()).await?;

        tracing::info!(
            partition = %prefix,
            records = records.len(),
            "wrote bronze partition"
        );

        Ok(prefix)
    }
}

fn to_record_batch(ctx: &WriteContext, records: &[Json]) -> Result<RecordBatch> {
    let n = records.len();

    let task_id = vec![ctx.task_id.to_string(); n];
    let run_id = vec![ctx.run_id.to_string(); n];
    let source_id = vec![ctx.source_id.clone(); n];
    let schema_id = vec![ctx.schema_id.to_string(); n];
    let ingested_at = vec![ctx.ingested_at.to_rfc3339(); n];
    let record_index: Vec<i64> = (0..n as i64).collect();

    let mut fields = vec![
        Field::new("_task_id", DataType::Utf8, false),
        Field::new("_run_id", DataType::Utf8, false),
        Field::new("_source_id", DataType::Utf8, false),
        Field::new("_schema_id", DataType::Utf8, false),
        Field::new("_record_index", DataType::Int64, false),
        Field::new("_ingested_at", DataType::Utf8, false),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(task_id)),
        Arc::new(StringArray::from(run_id)),
        Arc::new(StringArray::from(source_id)),
        Arc::new(StringArray::from(schema_id)),
        Arc::new(Int64Array::from(record_index)),
        Arc::new(StringArray::from(ingested_at)),
    ];

    for name in field_names(records) {
        let (field, column) = field_column(&name, records);
        fields.push(field);
        columns.push(column);
    }

    let arrow_schema = Arc::new(Schema::new(fields));
    Ok(RecordBatch::try_new(arrow_schema, columns)?)
}

/// Field names in first-seen order across the batch, deduplicated.
fn field_names(records: &[Json]) -> Vec<String> {
    let mut names = Vec::new();
    for record in records {
        if let Json::Object(map) = record {
            for key in map.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
    }
    names
}

#[derive(Clone, Copy, PartialEq)]
enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
}

fn value_kind(value: &Json) -> Option<ColumnKind> {
    match value {
        Json::Null => None,
        Json::Bool(_) => Some(ColumnKind::Bool),
        Json::Number(num) if num.is_i64() || num.is_u64() => Some(ColumnKind::Int),
        Json::Number(_) => Some(ColumnKind::Float),
        Json::String(_) => Some(ColumnKind::Text),
        Json::Array(_) | Json::Object(_) => Some(ColumnKind::Text),
    }
}

fn column_kind(records: &[Json], name: &str) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for record in records {
        let Some(this) = value_kind(record.get(name).unwrap_or(&Json::Null)) else {
            continue;
        };
        kind = Some(match kind {
            None => this,
            Some(ColumnKind::Int) if this == ColumnKind::Float => ColumnKind::Float,
            Some(ColumnKind::Float) if this == ColumnKind::Int => ColumnKind::Float,
            Some(existing) if existing == this => existing,
            _ => ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn field_column(name: &str, records: &[Json]) -> (Field, ArrayRef) {
    match column_kind(records, name) {
        ColumnKind::Bool => {
            let values: Vec<Option<bool>> = records.iter().map(|r| r.get(name).and_then(Json::as_bool)).collect();
            (Field::new(name, DataType::Boolean, true), Arc::new(BooleanArray::from(values)))
        }
        ColumnKind::Int => {
            let values: Vec<Option<i64>> = records.iter().map(|r| r.get(name).and_then(Json::as_i64)).collect();
            (Field::new(name, DataType::Int64, true), Arc::new(Int64Array::from(values)))
        }
        ColumnKind::Float => {
            let values: Vec<Option<f64>> = records.iter().map(|r| r.get(name).and_then(Json::as_f64)).collect();
            (Field::new(name, DataType::Float64, true), Arc::new(Float64Array::from(values)))
        }
        ColumnKind::Text => {
            let values: Vec<Option<String>> = records
                .iter()
                .map(|r| match r.get(name) {
                    None | Some(Json::Null) => None,
                    Some(Json::String(s)) => Some(s.clone()),
                    Some(other) => Some(other.to_string()),
                })
                .collect();
            (Field::new(name, DataType::Utf8, true), Arc::new(StringArray::from(values)))
        }
    }
}

fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None)?;
        writer.write(batch)?;
        writer.close()?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use futures::StreamExt;
    use object_store::memory::InMemory;
    use serde_json::json;
    use uuid::Uuid;

    fn fixed_context() -> WriteContext {
        WriteContext {
            source_id: "demo-source".into(),
            schema_id: Uuid::nil(),
            task_id: Uuid::nil(),
            run_id: Uuid::nil(),
            ingested_at: "2026-07-28T00:00:00Z".parse::<DateTime<Utc>>().unwrap(),
        }
    }

    #[tokio::test]
    async fn writes_records_under_the_expected_partition_prefix() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let writer = BronzeWriter::new(store.clone());
        let ctx = fixed_context();

        let records = vec![json!({"name": "Widget", "price": 19.99})];
        let prefix = writer.write(&ctx, &records).await.unwrap();

        assert_eq!(prefix, format!("demo-source/2026/07/28/{}", Uuid::nil()));

        let listed: Vec<_> = store
            .list(Some(&Path::from(prefix)))
            .collect::<Vec<_>>()
            .await;
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn writing_zero_records_still_produces_a_readable_file() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let writer = BronzeWriter::new(store.clone());
        let ctx = fixed_context();

        let prefix = writer.write(&ctx, &[]).await.unwrap();
        let listed: Vec<_> = store.list(Some(&Path::from(prefix))).collect::<Vec<_>>().await;
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn extracted_fields_become_their_own_typed_columns() {
        let ctx = fixed_context();
        let records = vec![
            json!({"name": "Widget", "price": 19.99, "in_stock": true}),
            json!({"name": "Gadget", "price": 4, "in_stock": false}),
        ];

        let batch = to_record_batch(&ctx, &records).unwrap();
        let schema = batch.schema();

        assert!(schema.field_with_name("record_json").is_err());

        let name_field = schema.field_with_name("name").unwrap();
        assert_eq!(name_field.data_type(), &DataType::Utf8);

        let price_field = schema.field_with_name("price").unwrap();
        assert_eq!(price_field.data_type(), &DataType::Float64, "mixed int/float must widen to float");

        let stock_field = schema.field_with_name("in_stock").unwrap();
        assert_eq!(stock_field.data_type(), &DataType::Boolean);
    }

    #[test]
    fn a_field_with_mixed_types_falls_back_to_text() {
        let ctx = fixed_context();
        let records = vec![json!({"tag": "sale"}), json!({"tag": ["new", "featured"]})];

        let batch = to_record_batch(&ctx, &records).unwrap();
        let tag_field = batch.schema().field_with_name("tag").unwrap();
        assert_eq!(tag_field.data_type(), &DataType::Utf8);
    }
}
