//! Line-oriented trace of sampler decisions.
//!
//! The run log records every accepted proposal, every chain update and the
//! exchange counts of an estimation run, one tab-separated record per line.
//! When no log file is configured the sink discards everything.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::chain::EmcChain;
use crate::error::Result;
use crate::io::is_gzip;

pub const MCMC_HEADER: &str = "##iteration\tindividual\tproposal";
pub const EMC_HEADER: &str = "##iteration\tindividual\tproposal\tchainID\tchainTemp\tmutation";

enum Sink {
    Disabled,
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    #[cfg(test)]
    Memory(Vec<String>),
}

pub struct RunLog {
    sink: Sink,
}

impl RunLog {
    /// A log that drops every line.
    pub fn disabled() -> Self {
        Self {
            sink: Sink::Disabled,
        }
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Vec::new()),
        }
    }

    /// Opens `path` for writing, gzip-compressed when it ends in `.gz`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = BufWriter::new(File::create(path)?);
        let sink = if is_gzip(path) {
            Sink::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            Sink::Plain(file)
        };
        log::info!("Logging to:\t{}", path.display());
        Ok(Self { sink })
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.sink, Sink::Disabled)
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        match &mut self.sink {
            Sink::Disabled => {}
            Sink::Plain(w) => writeln!(w, "{line}")?,
            Sink::Gzip(w) => writeln!(w, "{line}")?,
            #[cfg(test)]
            Sink::Memory(lines) => lines.push(line.to_string()),
        }
        Ok(())
    }

    /// Logs the state of an EMC chain after an accepted update.
    pub fn write_chain(&mut self, generation: usize, chain: &EmcChain, mutation: bool) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.write_line(&format!(
            "{generation}\t{}\t{}\t{}\t{}\t{}",
            chain.individual(),
            chain.likelihood(),
            chain.id(),
            chain.temperature(),
            u8::from(mutation)
        ))
    }

    pub fn flush(&mut self) -> Result<()> {
        match &mut self.sink {
            Sink::Plain(w) => w.flush()?,
            Sink::Gzip(w) => w.flush()?,
            #[cfg(test)]
            Sink::Memory(_) => {}
            Sink::Disabled => {}
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn lines(&self) -> &[String] {
        match &self.sink {
            Sink::Memory(lines) => lines.as_slice(),
            _ => &[],
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        // errors cannot be reported from drop
        match &mut self.sink {
            Sink::Gzip(w) => {
                let _ = w.try_finish();
                let _ = w.get_mut().flush();
            }
            Sink::Plain(w) => {
                let _ = w.flush();
            }
            #[cfg(test)]
            Sink::Memory(_) => {}
            Sink::Disabled => {}
        }
    }
}
