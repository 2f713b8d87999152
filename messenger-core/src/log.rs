//! Injectable trace context: entry/exit/log/throw, keyed by the messenger name.
//! The default implementation forwards to `tracing`.

use std::sync::{Arc, Mutex};

use crate::error::MessengerError;

/// Id logged when the messenger has no name yet.
pub const NO_CLIENT_ID: &str = "*";

const MASK: &str = "********";

/// Trace levels. The `*Often` variants tag calls made in tight poll loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceLevel {
    Entry,
    EntryOften,
    Exit,
    ExitOften,
    Parms,
    Data,
    DataOften,
    /// Frame-level protocol trace.
    Detail,
}

impl TraceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceLevel::Entry => "entry",
            TraceLevel::EntryOften => "entry_often",
            TraceLevel::Exit => "exit",
            TraceLevel::ExitOften => "exit_often",
            TraceLevel::Parms => "parms",
            TraceLevel::Data => "data",
            TraceLevel::DataOften => "data_often",
            TraceLevel::Detail => "detail",
        }
    }
}

/// Logging context handed to a [`crate::Messenger`] at construction.
pub trait Logger: Send + Sync {
    fn entry(&self, level: TraceLevel, function: &str, id: &str);
    fn exit(&self, level: TraceLevel, function: &str, id: &str, rc: &str);
    fn log(&self, level: TraceLevel, id: &str, prefix: &str, data: &str);
    fn throw(&self, level: TraceLevel, function: &str, id: &str, err: &MessengerError);
}

/// Default logger: every call becomes a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn entry(&self, level: TraceLevel, function: &str, id: &str) {
        match level {
            TraceLevel::EntryOften => tracing::trace!(client = id, function, "entry"),
            _ => tracing::debug!(client = id, function, "entry"),
        }
    }

    fn exit(&self, level: TraceLevel, function: &str, id: &str, rc: &str) {
        match level {
            TraceLevel::ExitOften => tracing::trace!(client = id, function, rc, "exit"),
            _ => tracing::debug!(client = id, function, rc, "exit"),
        }
    }

    fn log(&self, level: TraceLevel, id: &str, prefix: &str, data: &str) {
        match level {
            TraceLevel::DataOften | TraceLevel::Detail => {
                tracing::trace!(client = id, trace_level = level.as_str(), "{} {}", prefix, data)
            }
            _ => tracing::debug!(client = id, trace_level = level.as_str(), "{} {}", prefix, data),
        }
    }

    fn throw(&self, level: TraceLevel, function: &str, id: &str, err: &MessengerError) {
        tracing::warn!(
            client = id,
            function,
            trace_level = level.as_str(),
            error_name = err.name().as_str(),
            error = %err,
            "throw"
        );
    }
}

/// Logger that keeps formatted lines in memory, for hosts that ship trace elsewhere.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

impl Logger for MemoryLogger {
    fn entry(&self, level: TraceLevel, function: &str, id: &str) {
        self.push(format!("{} {} {}", level.as_str(), id, function));
    }

    fn exit(&self, level: TraceLevel, function: &str, id: &str, rc: &str) {
        self.push(format!("{} {} {} {}", level.as_str(), id, function, rc));
    }

    fn log(&self, level: TraceLevel, id: &str, prefix: &str, data: &str) {
        self.push(format!("{} {} {} {}", level.as_str(), id, prefix, data));
    }

    fn throw(&self, level: TraceLevel, function: &str, id: &str, err: &MessengerError) {
        self.push(format!(
            "throw {} {} {} {}: {}",
            level.as_str(),
            id,
            function,
            err.name(),
            err
        ));
    }
}

/// Mask a password in `user:password@host` form. Only the first occurrence is masked.
pub fn redact_credentials(url: &str) -> String {
    let bytes = url.as_bytes();
    for (at, &b) in bytes.iter().enumerate() {
        if b != b'@' {
            continue;
        }
        let mut start = at;
        while start > 0 && bytes[start - 1] != b'/' && bytes[start - 1] != b':' {
            start -= 1;
        }
        if start > 0 && bytes[start - 1] == b':' && start < at {
            return format!("{}{}{}", &url[..start], MASK, &url[at..]);
        }
    }
    url.to_string()
}

/// Value logged in place of a password: the mask if one was set, otherwise empty.
pub fn masked_password(password: &str) -> &'static str {
    if password.is_empty() {
        ""
    } else {
        MASK
    }
}
