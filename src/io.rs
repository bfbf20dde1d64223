pub mod gmsh;
pub mod output_thread;
pub mod param_parser;
pub mod write_to_csv;
pub mod write_to_vtu;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::info;

use crate::{
    disc::{
        field::{ScalarField, VectorField},
        mesh::Mesh,
    },
    error::OutputError,
};
use param_parser::{Encoding, OutputConfig, OutputFormat};
use write_to_vtu::PvdWriter;

/// Owned copy of the cell data written for one output step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    pub step: usize,
    pub time: f64,
    pub velocity: [Vec<f64>; 2],
    /// Pressure first, then every passive scalar.
    pub scalars: Vec<(String, Vec<f64>)>,
}
impl Frame {
    /// Copies the current field values, reusing this frame's allocations.
    pub fn fill(&mut self, step: usize, time: f64, velocity: &VectorField, scalars: &[&ScalarField]) {
        self.step = step;
        self.time = time;
        for (c, buffer) in self.velocity.iter_mut().enumerate() {
            buffer.clear();
            buffer.extend(velocity.component(c).values().iter());
        }
        self.scalars.resize_with(scalars.len(), Default::default);
        for ((name, buffer), field) in self.scalars.iter_mut().zip(scalars) {
            name.clear();
            name.push_str(field.name());
            buffer.clear();
            buffer.extend(field.values().iter());
        }
    }
}

/// Writes frames in every configured format under `<directory>/<name>_<step>`.
pub struct FrameWriter {
    mesh: Arc<Mesh>,
    name: String,
    directory: PathBuf,
    formats: Vec<OutputFormat>,
    encoding: Encoding,
    collection: Option<PvdWriter>,
}
impl FrameWriter {
    pub fn new(mesh: Arc<Mesh>, name: &str, output: &OutputConfig) -> Result<Self, OutputError> {
        fs::create_dir_all(&output.directory)?;
        let collection = if output.formats.contains(&OutputFormat::Vtu) {
            Some(PvdWriter::create(&output.directory.join(format!("{name}.pvd")))?)
        } else {
            None
        };
        Ok(Self {
            mesh,
            name: name.to_string(),
            directory: output.directory.clone(),
            formats: output.formats.clone(),
            encoding: output.encoding,
            collection,
        })
    }
    fn path(&self, step: usize, extension: &str) -> PathBuf {
        self.directory.join(format!("{}_{}.{}", self.name, step, extension))
    }
    pub fn write(&mut self, frame: &Frame) -> Result<(), OutputError> {
        for format in self.formats.iter() {
            match format {
                OutputFormat::Vtu => {
                    let path = self.path(frame.step, "vtu");
                    write_to_vtu::write_vtu(&path, &self.mesh, frame, self.encoding)?;
                    if let Some(collection) = self.collection.as_mut() {
                        collection.add(frame.time, file_name(&path))?;
                    }
                }
                OutputFormat::Csv => {
                    let path = self.path(frame.step, "csv");
                    write_to_csv::write_to_csv(&path, &self.mesh, frame)?;
                }
            }
        }
        info!(step = frame.step, time = frame.time, "output written");
        Ok(())
    }
    pub fn finish(self) -> Result<(), OutputError> {
        match self.collection {
            Some(collection) => collection.finish(),
            None => Ok(()),
        }
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|name| name.to_str()).unwrap_or_default()
}
