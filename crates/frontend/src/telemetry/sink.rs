//! [`RequestLogSink`]: destination for per-request log records.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use common::protocol::RequestLogRecord;

/// Something that can persist a request log record.
pub trait RecordSink: Send + Sync {
    fn write_record(&self, record: &RequestLogRecord) -> io::Result<()>;
}

/// Writes each record as one JSON line to `W`.
///
/// The writer sits behind a mutex and every record goes out in a single
/// `write_all`, so concurrent requests never interleave within a line.
pub struct JsonLines<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl<W: Write + Send> RecordSink for JsonLines<W> {
    fn write_record(&self, record: &RequestLogRecord) -> io::Result<()> {
        let mut line = record.to_json_line().map_err(io::Error::from)?;
        line.push('\n');
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "request log writer poisoned"))?;
        out.write_all(line.as_bytes())?;
        out.flush()
    }
}

/// Cheaply cloneable handle to the request log.
#[derive(Clone)]
pub struct RequestLogSink {
    inner: Arc<dyn RecordSink>,
}

impl RequestLogSink {
    pub fn new(sink: impl RecordSink + 'static) -> Self {
        Self {
            inner: Arc::new(sink),
        }
    }

    /// JSON lines on the process's stdout.
    pub fn stdout() -> Self {
        Self::new(JsonLines::new(io::stdout()))
    }

    /// Write `record`, falling back to stderr if the sink fails.
    ///
    /// Never panics and never returns an error to the caller.
    pub fn emit(&self, record: &RequestLogRecord) {
        if let Err(e) = self.inner.write_record(record) {
            let _ = writeln!(
                io::stderr(),
                "request log write failed: {e}; dropped record: {record:?}"
            );
        }
    }
}

impl std::fmt::Debug for RequestLogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RequestLogSink")
    }
}

/// In-memory sink used by tests to inspect emitted records.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<RequestLogRecord>>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn records(&self) -> Vec<RequestLogRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl RecordSink for MemorySink {
    fn write_record(&self, record: &RequestLogRecord) -> io::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Sink whose writes always fail.
#[cfg(test)]
pub struct BrokenSink;

#[cfg(test)]
impl RecordSink for BrokenSink {
    fn write_record(&self, _record: &RequestLogRecord) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
    }
}
