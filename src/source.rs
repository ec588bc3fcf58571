use eyre::Result;
use std::fs;
use std::path::Path;

/// Read the newline-delimited address list.
///
/// Lines are trimmed and blank lines skipped; addresses are otherwise
/// treated as opaque strings.
pub fn load_addresses<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("failed to read address list {}: {}", path.display(), e))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}
