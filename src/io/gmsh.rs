//! Reader for ASCII gmsh meshes, format version 2.2.
//!
//! Triangles (type 2) and quadrilaterals (type 3) become cells, 2-node lines
//! (type 1) become boundary segments tagged by their physical id. Names from
//! `$PhysicalNames` label the boundary groups.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use hashbrown::HashMap;
use nalgebra::Vector2;
use tracing::info;

use crate::{
    disc::mesh::{Mesh, mesh2d::MeshBuilder},
    error::MeshError,
};

const LINE: u32 = 1;
const TRIANGLE: u32 = 2;
const QUADRANGLE: u32 = 3;

pub fn read_gmsh(path: &Path) -> Result<Mesh, MeshError> {
    let file = File::open(path).map_err(|source| MeshError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mesh = parse_gmsh(BufReader::new(file))?;
    info!(
        path = %path.display(),
        cells = mesh.cell_num(),
        faces = mesh.face_num(),
        boundary_faces = mesh.faces.iter().filter(|f| f.is_boundary()).count(),
        "mesh loaded"
    );
    Ok(mesh)
}

struct Lines<R> {
    inner: std::io::Lines<R>,
    line: usize,
}
impl<R: BufRead> Lines<R> {
    fn error(&self, message: impl Into<String>) -> MeshError {
        MeshError::Format {
            line: self.line,
            message: message.into(),
        }
    }
    fn next_line(&mut self) -> Result<Option<String>, MeshError> {
        match self.inner.next() {
            Some(Ok(line)) => {
                self.line += 1;
                Ok(Some(line))
            }
            Some(Err(err)) => Err(self.error(err.to_string())),
            None => Ok(None),
        }
    }
    fn expect_line(&mut self, what: &str) -> Result<String, MeshError> {
        match self.next_line()? {
            Some(line) => Ok(line),
            None => Err(self.error(format!("unexpected end of file, expected {what}"))),
        }
    }
    fn expect_count(&mut self, section: &str) -> Result<usize, MeshError> {
        let line = self.expect_line(section)?;
        line.trim()
            .parse()
            .map_err(|_| self.error(format!("invalid {section} count '{}'", line.trim())))
    }
    fn expect_end(&mut self, section: &str) -> Result<(), MeshError> {
        let line = self.expect_line(section)?;
        if line.trim() == section {
            Ok(())
        } else {
            Err(self.error(format!("expected {section}, found '{}'", line.trim())))
        }
    }
    fn parse<T: std::str::FromStr>(&self, token: Option<&str>, what: &str) -> Result<T, MeshError> {
        match token.map(str::parse) {
            Some(Ok(value)) => Ok(value),
            _ => Err(self.error(format!("invalid or missing {what}"))),
        }
    }
}

pub fn parse_gmsh<R: BufRead>(reader: R) -> Result<Mesh, MeshError> {
    let mut lines = Lines {
        inner: reader.lines(),
        line: 0,
    };
    let mut version_seen = false;
    let mut vertices: Vec<Vector2<f64>> = Vec::new();
    let mut node_map: HashMap<usize, usize> = HashMap::new();
    let mut names: Vec<(String, usize)> = Vec::new();
    let mut cells: Vec<Vec<usize>> = Vec::new();
    let mut segments: Vec<(usize, usize, usize)> = Vec::new();

    while let Some(line) = lines.next_line()? {
        match line.trim() {
            "" => {}
            "$MeshFormat" => {
                let format = lines.expect_line("format line")?;
                let mut tokens = format.split_whitespace();
                let version = tokens.next().unwrap_or_default();
                if version != "2.2" {
                    return Err(MeshError::UnsupportedVersion(version.to_string()));
                }
                if tokens.next() != Some("0") {
                    return Err(lines.error("only ASCII meshes are supported"));
                }
                lines.expect_end("$EndMeshFormat")?;
                version_seen = true;
            }
            "$PhysicalNames" => {
                let count = lines.expect_count("$PhysicalNames")?;
                for _ in 0..count {
                    let entry = lines.expect_line("physical name")?;
                    let mut tokens = entry.split_whitespace();
                    let dimension: usize = lines.parse(tokens.next(), "physical dimension")?;
                    let tag: usize = lines.parse(tokens.next(), "physical tag")?;
                    let name = tokens.collect::<Vec<_>>().join(" ");
                    // only curves name boundary groups
                    if dimension == 1 {
                        names.push((name.trim_matches('"').to_string(), tag));
                    }
                }
                lines.expect_end("$EndPhysicalNames")?;
            }
            "$Nodes" => {
                let count = lines.expect_count("$Nodes")?;
                vertices.reserve(count);
                for _ in 0..count {
                    let entry = lines.expect_line("node")?;
                    let mut tokens = entry.split_whitespace();
                    let tag: usize = lines.parse(tokens.next(), "node tag")?;
                    let x: f64 = lines.parse(tokens.next(), "x coordinate")?;
                    let y: f64 = lines.parse(tokens.next(), "y coordinate")?;
                    node_map.insert(tag, vertices.len());
                    vertices.push(Vector2::new(x, y));
                }
                lines.expect_end("$EndNodes")?;
            }
            "$Elements" => {
                let count = lines.expect_count("$Elements")?;
                for _ in 0..count {
                    let entry = lines.expect_line("element")?;
                    let tokens: Vec<&str> = entry.split_whitespace().collect();
                    let element: usize = lines.parse(tokens.first().copied(), "element id")?;
                    let element_type: u32 = lines.parse(tokens.get(1).copied(), "element type")?;
                    let tag_num: usize = lines.parse(tokens.get(2).copied(), "tag count")?;
                    let node_num = match element_type {
                        LINE => 2,
                        TRIANGLE => 3,
                        QUADRANGLE => 4,
                        _ => {
                            return Err(MeshError::UnsupportedElement {
                                element,
                                element_type,
                            });
                        }
                    };
                    let physical: usize = if tag_num > 0 {
                        lines.parse(tokens.get(3).copied(), "physical tag")?
                    } else {
                        0
                    };
                    let start = 3 + tag_num;
                    if tokens.len() < start + node_num {
                        return Err(lines.error(format!("element {element} lists too few nodes")));
                    }
                    let mut inodes = Vec::with_capacity(node_num);
                    for token in &tokens[start..start + node_num] {
                        let tag: usize = lines.parse(Some(*token), "node reference")?;
                        match node_map.get(&tag) {
                            Some(&inode) => inodes.push(inode),
                            None => return Err(lines.error(format!("element {element} references unknown node {tag}"))),
                        }
                    }
                    if element_type == LINE {
                        segments.push((inodes[0], inodes[1], physical));
                    } else {
                        cells.push(inodes);
                    }
                }
                lines.expect_end("$EndElements")?;
            }
            section if section.starts_with('$') => {
                // skip sections this reader does not use
                let end = format!("$End{}", &section[1..]);
                loop {
                    let skipped = lines.expect_line(&end)?;
                    if skipped.trim() == end {
                        break;
                    }
                }
            }
            other => return Err(lines.error(format!("unexpected content '{other}'"))),
        }
    }
    if !version_seen {
        return Err(lines.error("missing $MeshFormat section"));
    }

    let mut builder = MeshBuilder::new(vertices);
    for (a, b, group) in segments {
        builder.add_boundary_segment(a, b, group);
    }
    for inodes in cells {
        builder.add_cell(inodes);
    }
    for (name, tag) in names {
        builder.name_boundary(name, tag);
    }
    builder.build()
}
