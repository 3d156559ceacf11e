//! Run logging.
//!
//! Each invocation appends nothing and overwrites nothing: it gets its own
//! file at `log/<exchange>/<account>/<timestamp>--<verbs>.log`, and every
//! record is mirrored to stdout. `RUST_LOG` overrides the default `debug`
//! level.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::Local;
use env_logger::{Builder, Env, Target};

use crate::errors::{Error, Result};

struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

/// Install the global logger for this run and return the log file path.
pub fn init(exchange: &str, account: &str, verbs: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(format!("log/{exchange}/{account}"));
    fs::create_dir_all(&dir).map_err(|e| Error::Io(e.to_string()))?;

    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let path = dir.join(format!("{stamp}--{verbs}.log"));
    let file = File::create(&path).map_err(|e| Error::Io(e.to_string()))?;

    Builder::from_env(Env::default().default_filter_or("debug"))
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .map_err(|e| Error::Io(e.to_string()))?;

    Ok(path)
}
