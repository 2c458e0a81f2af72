use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Info,
  Warn,
  Error,
}

impl Level {
  fn as_str(self) -> &'static str {
    match self {
      Level::Info => "INFO",
      Level::Warn => "WARN",
      Level::Error => "ERROR",
    }
  }
}

/// Append-only diagnostic log. Write failures are swallowed.
pub struct Logger {
  sink: Mutex<Box<dyn Write + Send>>,
}

impl Logger {
  pub fn new(path: &Path) -> anyhow::Result<Self> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Self::from_writer(file))
  }

  pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
    Self {
      sink: Mutex::new(Box::new(writer)),
    }
  }

  /// Discards everything.
  pub fn sink() -> Self {
    Self::from_writer(std::io::sink())
  }

  pub fn log(&self, level: Level, message: &str) {
    let ts = Utc::now().to_rfc3339();
    let line = format!("[{ts}] {}: {message}\n", level.as_str());
    if let Ok(mut sink) = self.sink.lock() {
      let _ = sink.write_all(line.as_bytes());
      let _ = sink.flush();
    }
  }

  pub fn info(&self, message: &str) {
    self.log(Level::Info, message);
  }

  pub fn warn(&self, message: &str) {
    self.log(Level::Warn, message);
  }

  pub fn error(&self, message: &str) {
    self.log(Level::Error, message);
  }
}
