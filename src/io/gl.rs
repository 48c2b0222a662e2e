//! Genotype likelihoods in the tab-separated text format.
//!
//! The first line is a header `chrom pos alleles name1 name2 ...`. Each
//! following line describes one biallelic site: chromosome, position, the two
//! alleles (`AC`, or `A C` when an allele is longer than one base) and one
//! column per sample holding `P(het) P(hom-alt)` separated by a space. The
//! hom-ref probability is `max(0, 1 - P(het) - P(hom-alt))`.

use std::io::BufRead;
use std::path::Path;

use ndarray::Array3;

use super::{open_lines, Site};
use crate::error::{PhaseError, Result};

const LEADING_COLUMNS: usize = 3;

/// Genotype likelihoods of all samples over all sites.
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeLikelihoods {
    pub sites: Vec<Site>,
    pub names: Vec<String>,
    /// `[individual, site, genotype]`, genotypes ordered hom-ref, het, hom-alt.
    pub gls: Array3<f64>,
}

impl GenotypeLikelihoods {
    pub fn n_individuals(&self) -> usize {
        self.names.len()
    }

    pub fn n_sites(&self) -> usize {
        self.sites.len()
    }

    /// Reads a (possibly gzipped) likelihood file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::from_reader(open_lines(path)?, path)
    }

    /// Parses likelihoods from `reader`; `source` is only used in error messages.
    pub fn from_reader<B: BufRead>(reader: B, source: &Path) -> Result<Self> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line?,
            None => return Err(PhaseError::invalid_data(source, 1, "file is empty")),
        };
        let header: Vec<&str> = header.split('\t').collect();
        if header.len() <= LEADING_COLUMNS {
            return Err(PhaseError::invalid_data(
                source,
                1,
                "header does not contain any sample information",
            ));
        }
        let names: Vec<String> = header[LEADING_COLUMNS..]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let n_columns = LEADING_COLUMNS + names.len();

        let mut sites = Vec::new();
        // site-major while reading, transposed at the end
        let mut values: Vec<[f64; 3]> = Vec::new();
        for (offset, line) in lines.enumerate() {
            let line_num = offset + 2;
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split('\t').collect();
            if tokens.len() != n_columns {
                return Err(PhaseError::invalid_data(
                    source,
                    line_num,
                    format!(
                        "expected {n_columns} columns, found {}",
                        tokens.len()
                    ),
                ));
            }
            let pos = tokens[1].parse::<u64>().map_err(|e| {
                PhaseError::invalid_data(source, line_num, format!("bad position {:?}: {e}", tokens[1]))
            })?;
            let (ref_allele, alt_allele) = parse_alleles(tokens[2])
                .ok_or_else(|| {
                    PhaseError::invalid_data(
                        source,
                        line_num,
                        format!("could not parse alleles {:?}", tokens[2]),
                    )
                })?;
            sites.push(Site {
                chrom: tokens[0].to_string(),
                pos,
                ref_allele,
                alt_allele,
            });
            for cell in &tokens[LEADING_COLUMNS..] {
                values.push(parse_cell(cell).map_err(|message| {
                    PhaseError::invalid_data(source, line_num, message)
                })?);
            }
        }

        let n_sites = sites.len();
        let n_individuals = names.len();
        let gls = Array3::from_shape_fn((n_individuals, n_sites, 3), |(i, s, g)| {
            values[s * n_individuals + i][g]
        });
        Ok(Self { sites, names, gls })
    }
}

fn parse_alleles(field: &str) -> Option<(String, String)> {
    if field.len() > 2 {
        let (r, a) = field.split_once(' ')?;
        if r.is_empty() || a.is_empty() {
            return None;
        }
        Some((r.to_string(), a.to_string()))
    } else {
        let mut chars = field.chars();
        let r = chars.next()?;
        let a = chars.next()?;
        Some((r.to_string(), a.to_string()))
    }
}

fn parse_cell(cell: &str) -> std::result::Result<[f64; 3], String> {
    let mut parts = cell.split_whitespace();
    let (het, alt) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(a), None) => (h, a),
        _ => return Err(format!("expected two likelihoods, found {cell:?}")),
    };
    let het: f64 = het
        .parse()
        .map_err(|e| format!("bad likelihood {het:?}: {e}"))?;
    let alt: f64 = alt
        .parse()
        .map_err(|e| format!("bad likelihood {alt:?}: {e}"))?;
    if !(0.0..=1.0).contains(&het) || !(0.0..=1.0).contains(&alt) {
        return Err(format!("likelihoods {het} {alt} are outside [0, 1]"));
    }
    // small tolerance for rounded input
    if het + alt > 1.0 + 1e-6 {
        return Err(format!("likelihoods {het} + {alt} sum to more than 1"));
    }
    Ok([(1.0 - het - alt).max(0.0), het, alt])
}
