//! Reference haplotype panels: a legend file describing the sites and a
//! haplotypes file with one row per site and one `0`/`1` column per
//! reference haplotype.
//!
//! The legend must list exactly the sites of the genotype likelihoods, in the
//! same order and with the same alleles.

use std::io::BufRead;
use std::path::Path;

use bitvec::prelude::*;

use super::{open_lines, Site};
use crate::error::{PhaseError, Result};

const LEGEND_HEADER: [&str; 4] = ["id", "position", "a0", "a1"];

/// Read-only reference haplotypes over the run's sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePanel {
    haplotypes: Vec<BitVec<u64, Lsb0>>,
    n_sites: usize,
}

impl ReferencePanel {
    pub fn new(haplotypes: Vec<BitVec<u64, Lsb0>>, n_sites: usize) -> Self {
        debug_assert!(haplotypes.iter().all(|h| h.len() == n_sites));
        Self {
            haplotypes,
            n_sites,
        }
    }

    /// Loads a panel after checking its legend against `sites`.
    pub fn load(legend: impl AsRef<Path>, haps: impl AsRef<Path>, sites: &[Site]) -> Result<Self> {
        let (legend, haps) = (legend.as_ref(), haps.as_ref());
        check_legend(open_lines(legend)?, legend, sites)?;
        let panel = read_haplotypes(open_lines(haps)?, haps, sites.len())?;
        log::info!("Reference panel haplotypes\t{}", panel.n_haps());
        Ok(panel)
    }

    /// Loads a panel when both paths are given; exactly one of them is an error.
    pub fn load_optional(
        legend: Option<&Path>,
        haps: Option<&Path>,
        sites: &[Site],
    ) -> Result<Option<Self>> {
        match (legend, haps) {
            (None, None) => Ok(None),
            (Some(legend), Some(haps)) => Self::load(legend, haps, sites).map(Some),
            (Some(_), None) => Err(PhaseError::config(
                "a reference haplotypes file is required together with a legend file",
            )),
            (None, Some(_)) => Err(PhaseError::config(
                "a legend file is required together with a reference haplotypes file",
            )),
        }
    }

    pub fn haplotypes(&self) -> &[BitVec<u64, Lsb0>] {
        &self.haplotypes
    }

    pub fn n_haps(&self) -> usize {
        self.haplotypes.len()
    }

    pub fn n_sites(&self) -> usize {
        self.n_sites
    }
}

pub(crate) fn check_legend<B: BufRead>(reader: B, source: &Path, sites: &[Site]) -> Result<()> {
    let mut n_rows = 0;
    for (offset, line) in reader.lines().enumerate() {
        let line_num = offset + 1;
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if line_num == 1 {
            if tokens.len() < LEGEND_HEADER.len() || tokens[..4] != LEGEND_HEADER {
                return Err(PhaseError::invalid_data(
                    source,
                    line_num,
                    format!(
                        "header must start with {:?}, found {line:?}",
                        LEGEND_HEADER.join(" ")
                    ),
                ));
            }
            continue;
        }
        if tokens.is_empty() {
            continue;
        }
        let site = sites.get(n_rows).ok_or_else(|| {
            PhaseError::invalid_data(
                source,
                line_num,
                format!("legend lists more sites than the {} loaded", sites.len()),
            )
        })?;
        if tokens.len() < 4 {
            return Err(PhaseError::invalid_data(
                source,
                line_num,
                "expected at least 4 columns",
            ));
        }
        if tokens[1] != site.pos.to_string() {
            return Err(PhaseError::invalid_data(
                source,
                line_num,
                format!(
                    "position {} needs to match position {} of the likelihood data",
                    tokens[1], site.pos
                ),
            ));
        }
        if format!("{}{}", tokens[2], tokens[3]) != site.alleles() {
            return Err(PhaseError::invalid_data(
                source,
                line_num,
                format!(
                    "alleles {} {} need to match alleles {} {} of the likelihood data",
                    tokens[2], tokens[3], site.ref_allele, site.alt_allele
                ),
            ));
        }
        n_rows += 1;
    }
    if n_rows != sites.len() {
        return Err(PhaseError::invalid_data(
            source,
            n_rows + 1,
            format!(
                "legend lists {n_rows} sites but the likelihood data has {}",
                sites.len()
            ),
        ));
    }
    Ok(())
}

pub(crate) fn read_haplotypes<B: BufRead>(
    reader: B,
    source: &Path,
    n_sites: usize,
) -> Result<ReferencePanel> {
    let mut haplotypes: Vec<BitVec<u64, Lsb0>> = Vec::new();
    let mut n_rows = 0;
    for (offset, line) in reader.lines().enumerate() {
        let line_num = offset + 1;
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if n_rows == 0 {
            haplotypes = vec![BitVec::with_capacity(n_sites); tokens.len()];
        }
        if tokens.len() != haplotypes.len() {
            return Err(PhaseError::invalid_data(
                source,
                line_num,
                format!(
                    "every row must have {} columns, found {}",
                    haplotypes.len(),
                    tokens.len()
                ),
            ));
        }
        if n_rows == n_sites {
            return Err(PhaseError::invalid_data(
                source,
                line_num,
                format!("more rows than the {n_sites} sites"),
            ));
        }
        for (hap, token) in haplotypes.iter_mut().zip(&tokens) {
            match *token {
                "0" => hap.push(false),
                "1" => hap.push(true),
                other => {
                    return Err(PhaseError::invalid_data(
                        source,
                        line_num,
                        format!("allele {other:?} is not 0 or 1"),
                    ))
                }
            }
        }
        n_rows += 1;
    }
    if haplotypes.is_empty() {
        return Err(PhaseError::invalid_data(
            source,
            1,
            "no reference haplotypes (is the file empty?)",
        ));
    }
    if n_rows != n_sites {
        return Err(PhaseError::invalid_data(
            source,
            n_rows + 1,
            format!("found {n_rows} rows but expected one per site ({n_sites})"),
        ));
    }
    Ok(ReferencePanel::new(haplotypes, n_sites))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sites() -> Vec<Site> {
        [(100, "A", "C"), (200, "G", "T")]
            .iter()
            .map(|&(pos, r, a)| Site {
                chrom: "20".to_string(),
                pos,
                ref_allele: r.to_string(),
                alt_allele: a.to_string(),
            })
            .collect()
    }

    fn legend(text: &str) -> Result<()> {
        check_legend(Cursor::new(text.to_string()), Path::new("ref.legend"), &sites())
    }

    fn haps(text: &str) -> Result<ReferencePanel> {
        read_haplotypes(Cursor::new(text.to_string()), Path::new("ref.haps"), 2)
    }

    #[test]
    fn test_matching_legend() {
        legend("id position a0 a1\nrs1 100 A C\nrs2 200 G T\n").unwrap();
    }

    #[test]
    fn test_legend_header_mismatch() {
        let err = legend("id pos a0 a1\nrs1 100 A C\nrs2 200 G T\n").unwrap_err();
        assert!(matches!(err, PhaseError::InvalidData { line: 1, .. }));
    }

    #[test]
    fn test_legend_position_mismatch() {
        let err = legend("id position a0 a1\nrs1 100 A C\nrs2 201 G T\n").unwrap_err();
        assert!(matches!(err, PhaseError::InvalidData { line: 3, .. }));
    }

    #[test]
    fn test_legend_allele_mismatch() {
        let err = legend("id position a0 a1\nrs1 100 A G\nrs2 200 G T\n").unwrap_err();
        assert!(matches!(err, PhaseError::InvalidData { line: 2, .. }));
    }

    #[test]
    fn test_legend_too_short() {
        assert!(legend("id position a0 a1\nrs1 100 A C\n").is_err());
    }

    #[test]
    fn test_read_haplotypes() {
        let panel = haps("0 1 1\n1 1 0\n").unwrap();
        assert_eq!(panel.n_haps(), 3);
        assert_eq!(panel.n_sites(), 2);
        assert!(!panel.haplotypes()[0][0]);
        assert!(panel.haplotypes()[0][1]);
        assert!(panel.haplotypes()[2][0]);
        assert!(!panel.haplotypes()[2][1]);
    }

    #[test]
    fn test_haplotype_allele_out_of_range() {
        let err = haps("0 1 1\n1 2 0\n").unwrap_err();
        match err {
            PhaseError::InvalidData { line, file, .. } => {
                assert_eq!(line, 2);
                assert_eq!(file, Path::new("ref.haps"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_haplotype_column_mismatch() {
        let err = haps("0 1 1\n1 0\n").unwrap_err();
        assert!(matches!(err, PhaseError::InvalidData { line: 2, .. }));
    }

    #[test]
    fn test_empty_haplotypes_file() {
        assert!(haps("").is_err());
    }

    #[test]
    fn test_only_one_panel_file_is_config_error() {
        let err = ReferencePanel::load_optional(Some(Path::new("a.legend")), None, &sites())
            .unwrap_err();
        assert!(matches!(err, PhaseError::Config { .. }));
    }
}
