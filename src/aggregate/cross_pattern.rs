//! Cross-pattern aggregation over persisted round-level result files.
//!
//! A folder holds one JSON result per run, named `<anything>-<run>.json` or,
//! as written by the node level, `<anything>-<run>-averaged.json`. Files whose
//! name contains `avg` are earlier aggregates and are skipped.
//! The remaining files are ordered by run number, loaded, and reduced like
//! any other set of rounds.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::rounds::aggregate_rounds;
use crate::error::{AggregationError, Result};
use crate::results::AggregateResult;

/// A round result file and its run number
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundFile {
    pub path: PathBuf,
    pub run: u64,
}

/// Run number of a round file: the integer after the last `-` of its stem,
/// once a node-level `-averaged` suffix is removed.
///
/// ```rust
/// use std::path::Path;
/// use osb_aggregator::aggregate::run_number;
///
/// assert_eq!(run_number(Path::new("out/big5-8-clients-10.json")), Some(10));
/// assert_eq!(run_number(Path::new("big5-8-clients-3-averaged.json")), Some(3));
/// assert_eq!(run_number(Path::new("big5-latest.json")), None);
/// ```
pub fn run_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let stem = stem
        .strip_suffix(crate::defaults::NODE_OUTPUT_MARKER)
        .unwrap_or(stem);
    let (_, suffix) = stem.rsplit_once('-')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

fn is_candidate(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == crate::defaults::RESULT_EXTENSION);
    is_json && !name.contains(crate::defaults::AVG_MARKER)
}

/// Keep the round files among `paths` and order them by run number.
///
/// Ties on the run number fall back to the file name, so the order never
/// depends on the listing order.
pub fn select_round_files(
    paths: impl IntoIterator<Item = PathBuf>,
    ordering_key: impl Fn(&Path) -> Option<u64>,
) -> Result<Vec<RoundFile>> {
    let mut files = Vec::new();
    for path in paths {
        if !is_candidate(&path) {
            debug!("Skipping {}", path.display());
            continue;
        }
        let run = ordering_key(&path).ok_or_else(|| AggregationError::UnorderableRounds {
            file: path.clone(),
        })?;
        files.push(RoundFile { path, run });
    }
    files.sort_by(|a, b| a.run.cmp(&b.run).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| AggregationError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AggregationError::io(dir, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| AggregationError::io(entry.path(), e))?;
        if file_type.is_file() {
            paths.push(entry.path());
        }
    }
    Ok(paths)
}

/// List the round files of `dir`, ordered by `ordering_key`.
pub fn discover_round_files(
    dir: &Path,
    ordering_key: impl Fn(&Path) -> Option<u64>,
) -> Result<Vec<RoundFile>> {
    select_round_files(list_files(dir)?, ordering_key)
}

/// Select, order, load and aggregate persisted round results.
///
/// A file with an empty `test-pattern` is labelled by its stem so the output
/// still records where every round came from.
pub fn aggregate_cross_pattern(
    result_files: &[PathBuf],
    ordering_key: impl Fn(&Path) -> Option<u64>,
) -> Result<AggregateResult> {
    let files = select_round_files(result_files.iter().cloned(), ordering_key)?;

    let mut rounds = Vec::with_capacity(files.len());
    for file in &files {
        info!("Loading run {} from {}", file.run, file.path.display());
        let mut round = AggregateResult::load(&file.path)?;
        if round.test_pattern.is_empty() {
            let stem = file
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            round.test_pattern.push(stem);
        }
        rounds.push(round);
    }
    aggregate_rounds(&rounds)
}

/// Aggregate every round file found in `dir`, ordered by run number.
pub fn aggregate_folder(dir: &Path) -> Result<AggregateResult> {
    let paths = list_files(dir)?;
    info!("Found {} files in {}", paths.len(), dir.display());
    aggregate_cross_pattern(&paths, run_number)
}
