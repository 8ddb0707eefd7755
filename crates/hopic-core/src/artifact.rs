//! Artifact pattern matching and the normalization seam.
//!
//! Producing byte-for-byte reproducible tar/ar archives is out of this
//! crate's scope the same way the YAML template plug-in mechanism is:
//! [`ArtifactNormalizer`] is the trait
//! contract a concrete rewriter would implement, and [`NullNormalizer`] is
//! the part of the job this core *does* own — matching patterns against the
//! declared mandatory/optional artifact sets and reporting [`HopicError::MissingFile`]
//! when a mandatory pattern matches nothing.

use anyhow::Result;
use camino::Utf8Path;
use hopic_types::ArtifactSpec;

use crate::errors::HopicError;

/// Normalizes one matched artifact path so that repeated builds at
/// different wall-clock times produce byte-identical output. Concrete
/// rewriters (tar/gzip, Debian `ar`) are out of scope here; this crate only
/// defines the contract and ships a no-op default.
pub trait ArtifactNormalizer {
    fn normalize(&self, path: &Utf8Path, source_date_epoch: i64) -> Result<()>;
}

/// The default normalizer: does nothing to file contents. Sufficient for
/// any pipeline that doesn't require bit-reproducible archives.
pub struct NullNormalizer;

impl ArtifactNormalizer for NullNormalizer {
    fn normalize(&self, _path: &Utf8Path, _source_date_epoch: i64) -> Result<()> {
        Ok(())
    }
}

/// Expands a single artifact glob pattern, normalizing the `(*)` shorthand
/// the config loader leaves intact in the pattern text and interpreting
/// `**` as "any number of path components".
fn expand_pattern(root: &Utf8Path, pattern: &str) -> Result<Vec<camino::Utf8PathBuf>> {
    let normalized = pattern.replace("(*)", "*");
    let full = root.join(&normalized);
    let mut matches = Vec::new();
    for entry in glob::glob(full.as_str())? {
        let path = entry?;
        if let Ok(utf8) = camino::Utf8PathBuf::from_path_buf(path) {
            matches.push(utf8);
        }
    }
    Ok(matches)
}

/// Matches every pattern in `spec` against `root`, normalizing each hit with
/// `normalizer`. Returns the matched paths. A pattern that matches nothing
/// is an error unless `spec.allow_missing` (or `force_optional`) is set.
pub fn resolve_artifacts(
    root: &Utf8Path,
    spec: &ArtifactSpec,
    force_optional: bool,
    source_date_epoch: i64,
    normalizer: &dyn ArtifactNormalizer,
) -> Result<Vec<camino::Utf8PathBuf>> {
    let mut all_matches = Vec::new();
    for pattern in &spec.patterns {
        let matches = expand_pattern(root, pattern)?;
        if matches.is_empty() && !spec.allow_missing && !force_optional {
            return Err(HopicError::MissingFile {
                message: format!("artifact pattern `{pattern}` matched nothing"),
            }
            .into());
        }
        for path in &matches {
            normalizer.normalize(path, source_date_epoch)?;
        }
        all_matches.extend(matches);
    }
    Ok(all_matches)
}
