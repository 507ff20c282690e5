//! The public entry points.
//!
//! [`Nestore`] is a stateless facade: every call takes the container path
//! explicitly, and nothing is cached between calls. Mutating calls hold the
//! sentinel lock for their whole duration; reads never lock.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::SystemTime;

use tracing::instrument;

use crate::error::Result;
use crate::inspector::{self, ContainerReport};
use crate::reader::{ContainerReader, KeySelection};
use crate::summary::{self, DEFAULT_MAX_DEPTH, Summary};
use crate::value::{Dict, Value};
use crate::writer;

/// The main entry point for storing and loading nested data.
#[derive(Debug)]
pub struct Nestore;

impl Nestore {
    /// Returns a builder for non-default behavior.
    pub fn options() -> NestoreOptions {
        NestoreOptions::default()
    }

    /// Writes every top-level entry of `data` into the container at `path`.
    ///
    /// Each key is replaced entirely; a `Value::None` entry deletes its key.
    /// The file and its parent directory are created when missing. Returns
    /// the container's new modification time.
    ///
    /// # Errors
    /// [`NestoreError::LockHeld`](crate::NestoreError::LockHeld) if another
    /// writer holds the container.
    pub fn write<P: AsRef<Path>>(path: P, data: Dict) -> Result<SystemTime> {
        NestoreOptions::default().write(path, data)
    }

    /// Removes the node stored under `key`.
    pub fn delete<P: AsRef<Path>>(path: P, key: &str) -> Result<SystemTime> {
        NestoreOptions::default().delete(path, key)
    }

    /// Reads the selected top-level keys. Keys absent from the file are skipped.
    ///
    /// ```rust,no_run
    /// use nestore::Nestore;
    ///
    /// let all = Nestore::read("run.nst", None::<&str>)?;
    /// let some = Nestore::read("run.nst", vec!["x", "y"])?;
    /// # Ok::<(), nestore::NestoreError>(())
    /// ```
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn read<P: AsRef<Path>>(path: P, keys: impl Into<KeySelection>) -> Result<Dict> {
        ContainerReader::open(path)?.read(&keys.into())
    }

    /// Lists the top-level keys.
    pub fn list_keys<P: AsRef<Path>>(path: P) -> Result<BTreeSet<String>> {
        ContainerReader::open(path)?.list_keys()
    }

    /// Reads a single node at a slash-separated path such as `"scan/volts"`.
    pub fn read_path<P: AsRef<Path>>(path: P, node_path: &str) -> Result<Value> {
        ContainerReader::open(path)?.read_path(node_path)
    }

    /// See [`summary::summarize`].
    pub fn summarize(data: &Dict) -> BTreeMap<String, Summary> {
        summary::summarize(data, DEFAULT_MAX_DEPTH)
    }

    /// See [`summary::render`].
    pub fn render(data: &Dict, annotations: Option<&BTreeMap<String, String>>) -> Result<String> {
        summary::render(data, annotations)
    }

    /// Analyzes the physical layout of a container.
    pub fn inspect<P: AsRef<Path>>(path: P) -> Result<ContainerReport> {
        inspector::inspect(path)
    }
}

/// Configuration for writes and summaries.
///
/// ```rust,no_run
/// use nestore::{dict, Nestore};
///
/// Nestore::options()
///     .compression(false)
///     .write("raw.nst", dict([("x", vec![1i64, 2, 3])]))?;
/// # Ok::<(), nestore::NestoreError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestoreOptions {
    /// Compress array payloads with the preferred backend (LZ4 when the
    /// `lz4_flex` feature is on). Scalars are never compressed.
    pub compression: bool,
    /// Nesting depth expanded by [`NestoreOptions::summarize`].
    pub max_depth: usize,
}

impl Default for NestoreOptions {
    fn default() -> Self {
        Self {
            compression: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl NestoreOptions {
    /// Enables or disables array compression.
    pub fn compression(mut self, enable: bool) -> Self {
        self.compression = enable;
        self
    }

    /// Sets the summary depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// [`Nestore::write`] with these options.
    pub fn write<P: AsRef<Path>>(&self, path: P, data: Dict) -> Result<SystemTime> {
        writer::write_dict(path.as_ref(), data, self)
    }

    /// [`Nestore::delete`] with these options.
    pub fn delete<P: AsRef<Path>>(&self, path: P, key: &str) -> Result<SystemTime> {
        writer::delete_key(path.as_ref(), key, self)
    }

    /// Summarizes at the configured depth.
    pub fn summarize(&self, data: &Dict) -> BTreeMap<String, Summary> {
        summary::summarize(data, self.max_depth)
    }

    /// Renders a summary at the configured depth.
    pub fn render(
        &self,
        data: &Dict,
        annotations: Option<&BTreeMap<String, String>>,
    ) -> Result<String> {
        summary::render_summary(&self.summarize(data), annotations)
    }
}
