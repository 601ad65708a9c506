// src/load/warehouse.rs

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use chrono::Datelike;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, instrument};

use super::Destination;
use crate::config::DestinationConfig;
use crate::enrich::{DATA_SOURCE, EXTRACTION_DATE};
use crate::record::{NormalizedRecord, Value};
use crate::source::WriteDisposition;

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// One Parquet file per table under `<root_dir>/<dataset>/`.
#[derive(Debug, Clone)]
pub struct ParquetDestination {
    dir: PathBuf,
}

impl ParquetDestination {
    pub fn new(root_dir: impl AsRef<Path>, dataset: &str) -> Self {
        Self {
            dir: root_dir.as_ref().join(dataset),
        }
    }

    pub fn from_config(cfg: &DestinationConfig) -> Self {
        Self::new(&cfg.root_dir, &cfg.dataset)
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.parquet", table))
    }
}

impl Destination for ParquetDestination {
    #[instrument(level = "info", skip(self, records), fields(records = records.len()))]
    fn write(
        &self,
        table: &str,
        records: Vec<NormalizedRecord>,
        disposition: WriteDisposition,
    ) -> Result<usize> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating dataset dir {:?}", self.dir))?;

        let batch = to_record_batch(&records)?;
        let final_path = self.table_path(table);
        match disposition {
            WriteDisposition::Replace => {
                let tmp_path = self.dir.join(format!(".{}.parquet.tmp", table));
                write_batch(&tmp_path, &batch)?;
                fs::rename(&tmp_path, &final_path).with_context(|| {
                    format!("renaming {:?} -> {:?}", tmp_path, final_path)
                })?;
            }
        }
        info!(path = %final_path.display(), rows = batch.num_rows(), "table replaced");
        Ok(batch.num_rows())
    }
}

fn write_batch(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .context("creating ArrowWriter")?;
    if batch.num_rows() > 0 {
        writer.write(batch).context("writing batch")?;
    }
    writer.close().context("closing ArrowWriter")?;
    Ok(())
}

/// Common scalar type of a column across records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Date,
    Str,
}

impl ColumnKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Int(_) => ColumnKind::Int,
            Value::Float(_) => ColumnKind::Float,
            Value::Date(_) => ColumnKind::Date,
            Value::Str(_) => ColumnKind::Str,
        }
    }

    fn merge(self, other: ColumnKind) -> Self {
        use ColumnKind::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Int, Float) | (Float, Int) => Float,
            _ => Str,
        }
    }

    fn data_type(self) -> DataType {
        match self {
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Date => DataType::Date32,
            ColumnKind::Str => DataType::Utf8,
        }
    }
}

/// Columns in first-seen order with their merged kind.
fn infer_columns(records: &[NormalizedRecord]) -> Vec<(String, ColumnKind)> {
    let mut columns: Vec<(String, ColumnKind)> = Vec::new();
    for rec in records {
        for (name, value) in rec.iter() {
            let kind = ColumnKind::of(value);
            match columns.iter_mut().find(|(n, _)| n == name) {
                Some((_, k)) => *k = k.merge(kind),
                None => columns.push((name.to_string(), kind)),
            }
        }
    }
    columns
}

fn build_column(records: &[NormalizedRecord], name: &str, kind: ColumnKind) -> ArrayRef {
    let values = records.iter().map(|r| r.get(name));
    match kind {
        ColumnKind::Int => Arc::new(Int64Array::from(
            values
                .map(|v| match v {
                    Some(Value::Int(i)) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Float => Arc::new(Float64Array::from(
            values
                .map(|v| match v {
                    Some(Value::Float(x)) => Some(*x),
                    Some(Value::Int(i)) => Some(*i as f64),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Date => Arc::new(Date32Array::from(
            values
                .map(|v| match v {
                    Some(Value::Date(d)) => Some(d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Str => Arc::new(StringArray::from(
            values
                .map(|v| v.map(|v| v.to_string()))
                .collect::<Vec<Option<String>>>(),
        )),
    }
}

/// Build one batch with a schema inferred from the records. No records gives an
/// empty batch carrying only the provenance columns.
pub fn to_record_batch(records: &[NormalizedRecord]) -> Result<RecordBatch> {
    if records.is_empty() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![
            Field::new(DATA_SOURCE, DataType::Utf8, true),
            Field::new(EXTRACTION_DATE, DataType::Date32, true),
        ]));
        return Ok(RecordBatch::new_empty(schema));
    }

    let columns = infer_columns(records);
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, kind)| Field::new(name.as_str(), kind.data_type(), true))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|(name, kind)| build_column(records, name, *kind))
        .collect();

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).context("building RecordBatch")
}

/// Read a whole table back.
pub fn read_table(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet metadata of {:?}", path))?;
    let schema = builder.schema().clone();
    let reader = builder.build().context("building parquet reader")?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading batches of {:?}", path))?;
    Ok((schema, batches))
}
