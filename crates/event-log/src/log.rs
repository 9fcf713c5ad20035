//! Event log backends

use sensors::Timestamp;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{DriverEvent, EventLogError, LogEntry};

/// Write side of the event log, shared by every engine
pub trait EventSink: Send + Sync {
    /// Append one event. Failures are reported through tracing, never returned.
    fn record(&self, at: Timestamp, event: &DriverEvent);
}

/// Event log that can be read back
pub trait EventStore: EventSink {
    fn entries(&self) -> Result<Vec<LogEntry>, EventLogError>;

    /// Entries at or after `cutoff`
    fn entries_since(&self, cutoff: Timestamp) -> Result<Vec<LogEntry>, EventLogError> {
        let mut entries = self.entries()?;
        entries.retain(|e| e.at >= cutoff);
        Ok(entries)
    }
}

/// Keeps written timestamps non-decreasing even if the wall clock steps back
fn clamp_monotonic(last: &mut Option<Timestamp>, at: Timestamp) -> Timestamp {
    let at = match *last {
        Some(prev) if at < prev => prev,
        _ => at,
    };
    *last = Some(at);
    at
}

struct FileInner {
    file: File,
    last: Option<Timestamp>,
}

/// Recent entries plus the file offset they were read up to
#[derive(Default)]
struct ReadCache {
    offset: u64,
    cutoff: Option<Timestamp>,
    entries: Vec<LogEntry>,
}

/// Line-oriented log file opened in append mode
pub struct FileEventLog {
    path: PathBuf,
    inner: Mutex<FileInner>,
    cache: Mutex<ReadCache>,
}

impl FileEventLog {
    /// Open (or create) the log file, creating parent directories
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EventLogError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| EventLogError::Open {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;

        // Continue from the newest line already on disk
        let last = read_entries(&path)?.into_iter().map(|e| e.at).max();

        info!("Event log at {}", path.display());
        Ok(Self {
            path,
            inner: Mutex::new(FileInner { file, last }),
            cache: Mutex::new(ReadCache::default()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read only what was appended since the last call
    fn read_recent(&self, cutoff: Timestamp) -> Result<Vec<LogEntry>, EventLogError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|e| EventLogError::Lock(e.to_string()))?;

        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                *cache = ReadCache::default();
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        // Earlier cutoff than the cached one, or the file shrank: start over
        let len = file.metadata()?.len();
        if len < cache.offset || cache.cutoff.map_or(false, |c| cutoff < c) {
            *cache = ReadCache::default();
        }

        file.seek(SeekFrom::Start(cache.offset))?;
        let mut fresh = Vec::new();
        let consumed = read_lines(BufReader::new(file), false, &mut fresh)?;

        cache.offset += consumed;
        cache.cutoff = Some(cutoff);
        cache.entries.extend(fresh);
        cache.entries.retain(|e| e.at >= cutoff);
        Ok(cache.entries.clone())
    }
}

fn read_entries(path: &Path) -> Result<Vec<LogEntry>, EventLogError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut entries = Vec::new();
    read_lines(BufReader::new(file), true, &mut entries)?;
    Ok(entries)
}

/// Parse lines from `reader` into `entries`, returning the bytes consumed.
///
/// Bytes that are not UTF-8 are replaced rather than failing the read. With
/// `take_partial` unset, a last line without its newline is left unread.
fn read_lines(
    mut reader: impl BufRead,
    take_partial: bool,
    entries: &mut Vec<LogEntry>,
) -> Result<u64, EventLogError> {
    let mut consumed = 0u64;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 || (!take_partial && buf.last() != Some(&b'\n')) {
            break;
        }
        consumed += n as u64;

        let line = String::from_utf8_lossy(&buf);
        match LogEntry::parse(&line) {
            Some(entry) => entries.push(entry),
            None if line.trim().is_empty() => {}
            None => debug!(offset = consumed - n as u64, "Skipping malformed log line"),
        }
    }
    Ok(consumed)
}

impl EventSink for FileEventLog {
    fn record(&self, at: Timestamp, event: &DriverEvent) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(e) => {
                warn!("Event log lock poisoned: {}", e);
                return;
            }
        };

        let at = clamp_monotonic(&mut inner.last, at);
        let line = LogEntry::new(at, event).to_line();
        match writeln!(inner.file, "{}", line).and_then(|_| inner.file.flush()) {
            Ok(()) => info!(event = %event, "Logged event"),
            Err(e) => warn!("Failed to write event log: {}", e),
        }
    }
}

impl EventStore for FileEventLog {
    fn entries(&self) -> Result<Vec<LogEntry>, EventLogError> {
        read_entries(&self.path)
    }

    fn entries_since(&self, cutoff: Timestamp) -> Result<Vec<LogEntry>, EventLogError> {
        self.read_recent(cutoff)
    }
}

/// In-memory log with a retention limit
pub struct MemoryEventLog {
    entries: Mutex<VecDeque<LogEntry>>,
    max_entries: usize,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries: max_entries.max(1),
        }
    }

    /// Event texts in write order
    pub fn texts(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.iter().map(|e| e.text.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of entries with the given bare label
    pub fn count(&self, label: &str) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.iter().filter(|e| e.label() == label).count())
            .unwrap_or(0)
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemoryEventLog {
    fn record(&self, at: Timestamp, event: &DriverEvent) {
        let Ok(mut entries) = self.entries.lock() else {
            warn!("Event log lock poisoned");
            return;
        };

        let mut last = entries.back().map(|e| e.at);
        let at = clamp_monotonic(&mut last, at);

        while entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(LogEntry::new(at, event));
        debug!(event = %event, "Logged event");
    }
}

impl EventStore for MemoryEventLog {
    fn entries(&self) -> Result<Vec<LogEntry>, EventLogError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| EventLogError::Lock(e.to_string()))?;
        Ok(entries.iter().cloned().collect())
    }
}
