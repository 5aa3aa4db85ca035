//! Delivers an assembled payload to disk. A thin seam, not part of the
//! download engine proper: the engine only promises a contiguous byte
//! buffer (spec'd length `total_length`); writing it anywhere is the
//! caller's business.
use std::path::Path;

use tracing::instrument;

use crate::error::Result;

#[instrument(skip(data), fields(bytes = data.len()), level = "debug")]
pub fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, data)?;
    Ok(())
}
