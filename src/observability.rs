use std::fs::File;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use biometrics::{Collector, Counter, Moments, PlainTextEmitter};
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("chatfile.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("chatfile.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("chatfile.client.request_duration_seconds");

pub(crate) static STREAM_EXCHANGES: Counter = Counter::new("chatfile.stream.exchanges");
pub(crate) static STREAM_DELTAS: Counter = Counter::new("chatfile.stream.deltas");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("chatfile.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("chatfile.stream.bytes");
pub(crate) static STREAM_DURATION: Moments = Moments::new("chatfile.stream.duration_seconds");

pub(crate) static SESSION_TURNS: Counter = Counter::new("chatfile.session.turns");
pub(crate) static SESSION_INTERRUPTS: Counter = Counter::new("chatfile.session.interrupts");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EXCHANGES);
    collector.register_counter(&STREAM_DELTAS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&SESSION_TURNS);
    collector.register_counter(&SESSION_INTERRUPTS);
}

/// Write one plain-text reading of every metric in this crate to `path`.
pub fn emit_biometrics(path: &Path) -> Result<()> {
    let collector = Collector::new();
    register_biometrics(&collector);
    let file = File::create(path)
        .map_err(|err| Error::io(format!("cannot create {}: {err}", path.display()), err))?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default();
    let mut emitter = PlainTextEmitter::new(file);
    collector
        .emit(&mut emitter, now)
        .map_err(|err| Error::io(format!("cannot write {}: {err}", path.display()), err))
}

/// Dump metrics to the file named by `CHATFILE_METRICS`, if it is set.
///
/// Failures are logged with `tracing::warn!` and otherwise ignored.
pub fn emit_biometrics_from_env() {
    let Some(path) = std::env::var_os("CHATFILE_METRICS") else {
        return;
    };
    if let Err(err) = emit_biometrics(Path::new(&path)) {
        tracing::warn!(%err, "failed to write metrics");
    }
}

/// Install a stderr `tracing` subscriber filtered by `CHATFILE_LOG`.
///
/// Defaults to `warn`.  Calling this twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("CHATFILE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_written_one_per_line() {
        let path =
            std::env::temp_dir().join(format!("chatfile-metrics-{}.txt", std::process::id()));
        SESSION_TURNS.click();
        emit_biometrics(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(text.lines().any(|line| line.starts_with("chatfile.session.turns ")));
        assert!(text.lines().any(|line| line.starts_with("chatfile.stream.duration_seconds ")));
    }

    #[test]
    fn unwritable_metrics_path_is_an_io_error() {
        let path = std::env::temp_dir()
            .join(format!("chatfile-no-such-dir-{}", std::process::id()))
            .join("metrics.txt");
        let err = emit_biometrics(&path).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
