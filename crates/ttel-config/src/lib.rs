//! Ambient, non-functional configuration: block size, the snapshot
//! elapsed-time threshold, diagnostics, and the log directory.
//!
//! Follows the same load-and-degrade shape `core-config` uses for its own
//! TOML file: a missing or unparseable file falls back to defaults rather
//! than failing the caller, logged once at `warn!` so the fallback isn't
//! silent.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TtelConfig {
    pub block_size: usize,
    pub snapshot_threshold_ms: f64,
    pub diag_enabled: bool,
    pub log_dir: PathBuf,
}

impl Default for TtelConfig {
    fn default() -> Self {
        Self {
            block_size: 256,
            snapshot_threshold_ms: 50.0,
            diag_enabled: false,
            log_dir: PathBuf::from("./ttel-log"),
        }
    }
}

impl TtelConfig {
    /// Loads from `path` if given, else falls back to defaults. Never
    /// returns an `Err`: a missing file or a parse failure both degrade to
    /// `TtelConfig::default()`, with a `warn!` logged in the latter case.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<Self>(&content) {
                Ok(cfg) => Ok(cfg),
                Err(e) => {
                    warn!(target: "ttel.config", path = %path.display(), error = %e, "failed to parse config, using defaults");
                    Ok(Self::default())
                }
            },
            Err(_) => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex, MutexGuard};
    use tracing::Level;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct BufferWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buf = Arc::new(Mutex::new(Vec::new()));
            (Self { inner: buf.clone() }, buf)
        }
    }

    struct LockedWriter<'a> {
        guard: MutexGuard<'a, Vec<u8>>,
    }

    impl<'a> Write for LockedWriter<'a> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = LockedWriter<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            LockedWriter {
                guard: self.inner.lock().expect("log buffer poisoned"),
            }
        }
    }

    #[test]
    fn missing_path_falls_back_to_defaults() {
        let cfg = TtelConfig::load_from(None).unwrap();
        assert_eq!(cfg, TtelConfig::default());
    }

    #[test]
    fn nonexistent_file_falls_back_to_defaults() {
        let cfg = TtelConfig::load_from(Some(Path::new("__does_not_exist__.toml"))).unwrap();
        assert_eq!(cfg, TtelConfig::default());
    }

    #[test]
    fn parses_overridden_fields() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "block_size = 64\ndiag_enabled = true\n").unwrap();
        let cfg = TtelConfig::load_from(Some(tmp.path())).unwrap();
        assert_eq!(cfg.block_size, 64);
        assert!(cfg.diag_enabled);
        assert_eq!(cfg.snapshot_threshold_ms, TtelConfig::default().snapshot_threshold_ms);
    }

    #[test]
    fn malformed_file_logs_a_warning_and_falls_back() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "this is not valid toml [[[").unwrap();
        let (writer, buffer) = BufferWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::WARN)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .finish();

        let cfg = with_default(subscriber, || TtelConfig::load_from(Some(tmp.path())).unwrap());

        assert_eq!(cfg, TtelConfig::default());
        let log_output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(log_output.contains("WARN ttel.config:"));
    }
}
