use std::{
    fmt::Write as _,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use vtkio::{
    Vtk,
    model::{
        Attribute, Attributes, ByteOrder, CellType, Cells, DataArray, DataSet, ElementType,
        IOBuffer, UnstructuredGridPiece, Version, VertexNumbers,
    },
};

use super::{Frame, param_parser::Encoding};
use crate::{disc::mesh::Mesh, error::OutputError};

pub fn write_vtu(path: &Path, mesh: &Mesh, frame: &Frame, encoding: Encoding) -> Result<(), OutputError> {
    match encoding {
        Encoding::Ascii => write_ascii(path, mesh, frame),
        Encoding::Binary => write_binary(path, mesh, frame),
    }
}

/// VTK cell type and its numeric code. The mesh builder only admits
/// triangles and quadrilaterals.
fn cell_type(vertex_num: usize) -> (CellType, u8) {
    match vertex_num {
        3 => (CellType::Triangle, 5),
        4 => (CellType::Quad, 9),
        n => unreachable!("cell with {n} vertices passed mesh validation"),
    }
}

/// Cell connectivity and offsets.
fn topology(mesh: &Mesh) -> (Vec<u64>, Vec<u64>) {
    let mut connectivity = Vec::with_capacity(mesh.cell_num() * 4);
    let mut offsets = Vec::with_capacity(mesh.cell_num());
    for cell in mesh.cells.iter() {
        connectivity.extend(cell.vertices.iter().map(|&inode| inode as u64));
        offsets.push(connectivity.len() as u64);
    }
    (connectivity, offsets)
}

fn interleaved_velocity(frame: &Frame) -> Vec<f64> {
    let [ux, uy] = &frame.velocity;
    ux.iter().zip(uy).flat_map(|(&x, &y)| [x, y, 0.0]).collect()
}

fn write_ascii(path: &Path, mesh: &Mesh, frame: &Frame) -> Result<(), OutputError> {
    let (connectivity, offsets) = topology(mesh);
    let mut xml = String::new();
    write_piece(&mut xml, mesh, frame, &connectivity, &offsets)
        .map_err(|err| OutputError::Vtk(format!("{}: {err}", path.display())))?;
    fs::write(path, xml)?;
    Ok(())
}

fn write_array<T: std::fmt::Display>(
    xml: &mut String,
    header: &str,
    values: impl IntoIterator<Item = T>,
) -> std::fmt::Result {
    writeln!(xml, "        {header}")?;
    xml.push_str("          ");
    for value in values {
        write!(xml, "{value} ")?;
    }
    xml.push('\n');
    writeln!(xml, "        </DataArray>")
}

fn write_piece(
    xml: &mut String,
    mesh: &Mesh,
    frame: &Frame,
    connectivity: &[u64],
    offsets: &[u64],
) -> std::fmt::Result {
    writeln!(xml, "<?xml version=\"1.0\"?>")?;
    writeln!(
        xml,
        "<VTKFile type=\"UnstructuredGrid\" version=\"1.0\" byte_order=\"LittleEndian\">"
    )?;
    writeln!(xml, "  <UnstructuredGrid>")?;
    writeln!(
        xml,
        "    <Piece NumberOfPoints=\"{}\" NumberOfCells=\"{}\">",
        mesh.vertices.len(),
        mesh.cell_num()
    )?;
    writeln!(xml, "      <Points>")?;
    write_array(
        xml,
        "<DataArray type=\"Float64\" NumberOfComponents=\"3\" format=\"ascii\">",
        mesh.vertices
            .iter()
            .flat_map(|v| [v.x, v.y, 0.0])
            .map(|x| format!("{x:e}")),
    )?;
    writeln!(xml, "      </Points>")?;
    writeln!(xml, "      <Cells>")?;
    write_array(
        xml,
        "<DataArray type=\"Int64\" Name=\"connectivity\" format=\"ascii\">",
        connectivity,
    )?;
    write_array(xml, "<DataArray type=\"Int64\" Name=\"offsets\" format=\"ascii\">", offsets)?;
    write_array(
        xml,
        "<DataArray type=\"UInt8\" Name=\"types\" format=\"ascii\">",
        mesh.cells.iter().map(|cell| cell_type(cell.vertices.len()).1),
    )?;
    writeln!(xml, "      </Cells>")?;
    writeln!(xml, "      <CellData Vectors=\"velocity\">")?;
    write_array(
        xml,
        "<DataArray type=\"Float64\" Name=\"velocity\" NumberOfComponents=\"3\" format=\"ascii\">",
        interleaved_velocity(frame).into_iter().map(|x| format!("{x:e}")),
    )?;
    for (name, values) in frame.scalars.iter() {
        write_array(
            xml,
            &format!("<DataArray type=\"Float64\" Name=\"{name}\" format=\"ascii\">"),
            values.iter().map(|x| format!("{x:e}")),
        )?;
    }
    writeln!(xml, "      </CellData>")?;
    writeln!(xml, "    </Piece>")?;
    writeln!(xml, "  </UnstructuredGrid>")?;
    writeln!(xml, "</VTKFile>")
}

fn write_binary(path: &Path, mesh: &Mesh, frame: &Frame) -> Result<(), OutputError> {
    let (connectivity, offsets) = topology(mesh);
    let types = mesh.cells.iter().map(|cell| cell_type(cell.vertices.len()).0).collect();
    let points = mesh.vertices.iter().flat_map(|v| [v.x, v.y, 0.0]).collect();
    let mut cell = vec![Attribute::DataArray(DataArray {
        name: "velocity".to_string(),
        elem: ElementType::Vectors,
        data: IOBuffer::F64(interleaved_velocity(frame)),
    })];
    for (name, values) in frame.scalars.iter() {
        cell.push(Attribute::DataArray(DataArray {
            name: name.clone(),
            elem: ElementType::Scalars {
                num_comp: 1,
                lookup_table: None,
            },
            data: IOBuffer::F64(values.clone()),
        }));
    }
    let vtk_file = Vtk {
        version: Version::XML { major: 1, minor: 0 },
        title: format!("step {}", frame.step),
        byte_order: ByteOrder::LittleEndian,
        data: DataSet::inline(UnstructuredGridPiece {
            points: IOBuffer::F64(points),
            cells: Cells {
                cell_verts: VertexNumbers::XML {
                    connectivity,
                    offsets,
                },
                types,
            },
            data: Attributes {
                point: vec![],
                cell,
            },
        }),
        file_path: None,
    };
    vtk_file
        .export(path)
        .map_err(|err| OutputError::Vtk(format!("{}: {err:?}", path.display())))
}

/// ParaView collection file listing every written frame with its time.
///
/// Entries are flushed as they are added, so the collection can be opened
/// while the run is still going; the closing tags are written by `finish`.
pub struct PvdWriter {
    file: BufWriter<File>,
}
impl PvdWriter {
    pub fn create(path: &Path) -> Result<Self, OutputError> {
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "<?xml version=\"1.0\"?>")?;
        writeln!(
            file,
            "<VTKFile type=\"Collection\" version=\"0.1\" byte_order=\"LittleEndian\">"
        )?;
        writeln!(file, "  <Collection>")?;
        file.flush()?;
        Ok(Self { file })
    }
    pub fn add(&mut self, time: f64, file_name: &str) -> Result<(), OutputError> {
        writeln!(
            self.file,
            "    <DataSet timestep=\"{time:e}\" group=\"\" part=\"0\" file=\"{file_name}\"/>"
        )?;
        self.file.flush()?;
        Ok(())
    }
    pub fn finish(mut self) -> Result<(), OutputError> {
        writeln!(self.file, "  </Collection>")?;
        writeln!(self.file, "</VTKFile>")?;
        self.file.flush()?;
        Ok(())
    }
}
