//! Arrow IPC stream partition backend.

use super::StorageBackend;
use crate::table::Table;
use anyhow::{Context, Result};
use arrow::compute::concat_batches;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use std::io::Cursor;

const IPC_STREAM_OVERHEAD_BYTES: usize = 1024;

/// Writes one table per Arrow IPC stream file (`.arrow`).
#[derive(Debug, Clone, Copy, Default)]
pub struct IpcBackend;

impl StorageBackend for IpcBackend {
    fn name(&self) -> &'static str {
        "ipc"
    }

    fn extension(&self) -> &'static str {
        "arrow"
    }

    fn encode(&self, table: &Table) -> Result<Vec<u8>> {
        let batch = table.batch();
        let mut buf = Vec::with_capacity(
            batch
                .get_array_memory_size()
                .saturating_add(IPC_STREAM_OVERHEAD_BYTES),
        );
        let mut writer = StreamWriter::try_new(&mut buf, batch.schema().as_ref())
            .context("create Arrow IPC StreamWriter")?;
        writer.write(batch).context("write RecordBatch to IPC")?;
        writer.finish().context("finish IPC stream")?;
        drop(writer);
        Ok(buf)
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<Table> {
        let reader = StreamReader::try_new(Cursor::new(bytes), None)
            .context("create Arrow IPC StreamReader")?;
        let schema = reader.schema();
        let batches = reader
            .collect::<std::result::Result<Vec<RecordBatch>, _>>()
            .context("read RecordBatch from IPC stream")?;
        let batch = concat_batches(&schema, &batches).context("concatenate IPC batches")?;
        Ok(Table::from_batch(batch)?)
    }
}
