use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::features::FeatureCollection;

/// Writes `collection` as pretty-printed GeoJSON, replacing any existing file.
pub fn write_feature_collection(path: &Path, collection: &FeatureCollection) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, collection)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    debug!("Wrote {} features to {}", collection.len(), path.display());
    Ok(())
}
