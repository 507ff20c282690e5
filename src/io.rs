//! Low-level sequential writing.
//!
//! Chunk jobs finish on many rayon workers; each appends its complete chunk
//! through one `SeqWriter`, which hands back the offset the chunk landed at.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Mutex;

use crate::error::{NestoreError, Result};

/// A thread-safe writer that appends data to a file and tracks the current offset.
#[derive(Debug)]
pub struct SeqWriter {
    inner: Mutex<WriterState>,
}

#[derive(Debug)]
struct WriterState {
    writer: BufWriter<File>,
    current_offset: u64,
}

impl SeqWriter {
    /// Wraps an empty, writable file.
    pub fn new(file: File) -> Self {
        Self {
            inner: Mutex::new(WriterState {
                writer: BufWriter::new(file),
                current_offset: 0,
            }),
        }
    }

    /// Atomically appends a complete buffer.
    /// Returns the offset where the writing started.
    pub fn write_all(&self, buffer: &[u8]) -> Result<u64> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| NestoreError::Internal("SeqWriter Mutex poisoned".into()))?;

        let start_offset = state.current_offset;
        state.writer.write_all(buffer)?;
        state.current_offset += buffer.len() as u64;

        Ok(start_offset)
    }

    /// Returns the current file cursor position.
    pub fn current_offset(&self) -> Result<u64> {
        let state = self
            .inner
            .lock()
            .map_err(|_| NestoreError::Internal("SeqWriter Mutex poisoned".into()))?;
        Ok(state.current_offset)
    }

    /// Flushes buffered data and syncs the file to disk.
    pub fn finish(self) -> Result<()> {
        let state = self
            .inner
            .into_inner()
            .map_err(|_| NestoreError::Internal("SeqWriter Mutex poisoned".into()))?;
        let file = state
            .writer
            .into_inner()
            .map_err(|e| NestoreError::from(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }
}
