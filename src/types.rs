use std::time::Duration;

use serde::Deserialize;

/// Where module results are kept between orchestration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStorageMode {
    /// Results live in memory only (lost on restart).
    Memory,
    /// Results are snapshotted to a JSON file after every mutation.
    File,
}

impl Default for ResultStorageMode {
    fn default() -> Self {
        ResultStorageMode::Memory
    }
}

/// What happens to previously written fields when a module is re-run.
///
/// - `Keep`: fields from an earlier attempt stay visible while the module is
///   WORKING and after it lands in ERROR.
/// - `Clear`: fields are dropped on entering WORKING and on ERROR, so readers
///   never see data that does not belong to the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleFieldPolicy {
    Keep,
    Clear,
}

impl Default for StaleFieldPolicy {
    fn default() -> Self {
        StaleFieldPolicy::Keep
    }
}

/// Parse a duration string like `"500ms"`, `"30s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => scaled_secs(value, 60, s),
        "h" => scaled_secs(value, 60 * 60, s),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn scaled_secs(value: u64, factor: u64, raw: &str) -> Result<Duration, String> {
    value
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{raw}' is too large"))
}
