//! Readers and writers for the files around an estimation run.
//!
//! * [`gl`] reads genotype likelihoods from the tab-separated text format.
//! * [`panel`] reads a reference panel (legend + haplotypes files).
//! * [`output`] writes the final phased calls.
//!
//! Every reader accepts plain or gzip-compressed input; compression is
//! detected from the `.gz` extension.

pub mod gl;
pub mod output;
pub mod panel;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::Result;

/// A biallelic site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub chrom: String,
    pub pos: u64,
    pub ref_allele: String,
    pub alt_allele: String,
}

impl Site {
    /// Reference and alternative allele concatenated, as written in legend
    /// files.
    pub fn alleles(&self) -> String {
        format!("{}{}", self.ref_allele, self.alt_allele)
    }
}

pub(crate) fn is_gzip(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

/// Opens `path` for line-wise reading, decompressing `.gz` files.
pub(crate) fn open_lines(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let reader: Box<dyn BufRead> = if is_gzip(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}
