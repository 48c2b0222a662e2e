/*!
# Phased call output

Writes the result of an estimation run as a tab-delimited table with a
header `chrom pos ref alt <sample names...>` and one row per site. Each
sample cell holds the phased genotype and the alternative-allele dosage,
e.g. `0|1:0.875`.
*/

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{is_gzip, Site};
use crate::error::{PhaseError, Result};
use crate::sampling::PhasedCalls;

/**
Saves phased calls to `path`, gzip-compressed when the path ends in `.gz`.

# Arguments

* `path` - Output file.
* `sites` - The sites of the run, one output row each.
* `names` - Sample names, one column each, in individual order.
* `calls` - Finalized calls from [`crate::sampling::SampleAccumulator::finalize`].
*/
pub fn write_phased(
    path: impl AsRef<Path>,
    sites: &[Site],
    names: &[String],
    calls: &PhasedCalls,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    if is_gzip(path) {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write_table(&mut encoder, sites, names, calls)?;
        encoder.finish()?;
        Ok(())
    } else {
        write_table(file, sites, names, calls)
    }
}

/// Writes the phased table into any writer.
pub fn write_table<W: Write>(
    writer: W,
    sites: &[Site],
    names: &[String],
    calls: &PhasedCalls,
) -> Result<()> {
    if calls.n_individuals() != names.len() || calls.n_sites() != sites.len() {
        return Err(PhaseError::precondition(format!(
            "calls cover {} individuals x {} sites but {} names and {} sites were given",
            calls.n_individuals(),
            calls.n_sites(),
            names.len(),
            sites.len()
        )));
    }
    let mut wtr = WriterBuilder::new().delimiter(b'\t').from_writer(writer);

    let mut header: Vec<String> = ["chrom", "pos", "ref", "alt"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(names.iter().cloned());
    wtr.write_record(&header)?;

    for (site_idx, site) in sites.iter().enumerate() {
        let mut row = vec![
            site.chrom.clone(),
            site.pos.to_string(),
            site.ref_allele.clone(),
            site.alt_allele.clone(),
        ];
        row.extend((0..names.len()).map(|individual| {
            let (a, b) = calls.alleles(individual, site_idx);
            format!("{a}|{b}:{:.3}", calls.dosage(individual, site_idx))
        }));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
