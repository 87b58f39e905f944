//! # Utility Functions and Helper Module
//!
//! Numeric helpers shared by every aggregation level, plus small validators
//! and formatters used by the command-line front end.
//!
//! ## Key Functionality Categories
//!
//! - **Statistics**: arithmetic mean, sample standard deviation and relative
//!   standard deviation (RSD)
//! - **Validation**: range checks on user-supplied limits with clear messages
//! - **Formatting**: fixed-precision rendering for console tables
//!
//! ## Usage Examples
//!
//! ```rust
//! use osb_aggregator::utils::*;
//!
//! let values = [10.0, 12.0, 14.0];
//! assert_eq!(mean(&values), Some(12.0));
//! assert_eq!(sample_std_dev(&values), Some(2.0));
//! let rsd = relative_std_dev(&values).unwrap();
//! assert!((rsd - 16.666_666_666).abs() < 1e-6);
//! ```

use anyhow::Result;

/// Arithmetic mean of a set of values
///
/// ## Returns
/// - `Some(mean)` for a non-empty slice
/// - `None` for an empty slice, where the mean is undefined
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (Bessel-corrected)
///
/// Uses the sample formula:
/// s = √(Σ(x - x̄)² / (N - 1))
///
/// This matches how dispersion between benchmark rounds is reported: the rounds
/// are a sample of all possible runs, not the whole population.
///
/// ## Returns
/// - `Some(stdev)` when at least two values are given
/// - `None` otherwise
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let variance =
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Relative standard deviation, expressed as a percentage of the mean
///
/// RSD = (s / x̄) × 100
///
/// Every aggregation level reports RSD in this percentage form.
///
/// ## Returns
/// - `None` with fewer than two values
/// - `None` when the mean is zero, since the ratio is undefined
pub fn relative_std_dev(values: &[f64]) -> Option<f64> {
    let stdev = sample_std_dev(values)?;
    let mean = mean(values)?;
    if mean == 0.0 {
        return None;
    }
    Some(stdev / mean * 100.0)
}

/// Round a value to a fixed number of decimal places for display
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Format an optional RSD percentage for display (`"-"` when undefined)
pub fn format_rsd(rsd: Option<f64>) -> String {
    match rsd {
        Some(rsd) => format!("{:.2}%", rsd),
        None => "-".to_string(),
    }
}

/// Validate the per-query result cap
///
/// ## Validation Rules
///
/// - **Minimum**: at least one document
/// - **Maximum**: 10,000, the default OpenSearch `index.max_result_window`;
///   larger values are rejected by the store itself
pub fn validate_max_results(max_results: usize) -> Result<()> {
    if max_results == 0 {
        anyhow::bail!("Max results cannot be zero");
    }
    if max_results > crate::defaults::MAX_RESULTS {
        anyhow::bail!(
            "Max results {} is too large (maximum {})",
            max_results,
            crate::defaults::MAX_RESULTS
        );
    }
    Ok(())
}

/// Validate the number of hosts addressed by one remote command
///
/// ## Validation Rules
///
/// - **Minimum**: 1
/// - **Maximum**: 50, the per-command target limit of the command service
pub fn validate_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        anyhow::bail!("Batch size cannot be zero");
    }
    if batch_size > crate::defaults::DISPATCH_BATCH_SIZE {
        anyhow::bail!(
            "Batch size {} is too large (maximum {})",
            batch_size,
            crate::defaults::DISPATCH_BATCH_SIZE
        );
    }
    Ok(())
}
