use std::path::Path;

use csv::Writer;

use super::Frame;
use crate::{disc::mesh::Mesh, error::OutputError};

/// One row per cell: centroid, velocity, then every scalar of the frame.
pub fn write_to_csv(path: &Path, mesh: &Mesh, frame: &Frame) -> Result<(), OutputError> {
    let mut writer = Writer::from_path(path)?;
    let mut header = vec![
        "x".to_string(),
        "y".to_string(),
        "velocity.x".to_string(),
        "velocity.y".to_string(),
    ];
    header.extend(frame.scalars.iter().map(|(name, _)| name.clone()));
    writer.write_record(&header)?;
    let mut record = Vec::with_capacity(header.len());
    for (icell, cell) in mesh.cells.iter().enumerate() {
        record.clear();
        record.extend([cell.pos.x, cell.pos.y, frame.velocity[0][icell], frame.velocity[1][icell]]);
        record.extend(frame.scalars.iter().map(|(_, values)| values[icell]));
        writer.write_record(record.iter().map(|value| value.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}
