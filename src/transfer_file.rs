//! Transfer files exchanged with downstream solvers.
//!
//! The layout is a finite-element point zone:
//!
//! ```text
//! TITLE = "wing loads"
//! VARIABLES = "x" "y" "z" "id" "displacement_1" "displacement_2" "displacement_3"
//! ZONE T="wing", N=4, E=2, F=FEPOINT, ET=QUADRILATERAL
//! 0e0 0e0 0e0 1 1e-3 0e0 0e0
//! ...
//! 1 2 3 3
//! 1 3 4 4
//! ```
//!
//! Connectivity is 1-based and triangles repeat their last vertex.

use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, Vector3};
use tracing::{debug, info};

use crate::{
    datatypes::{BoundaryTable, FieldData},
    discretization::Discretization,
    error::LodestoneError,
};

/// A named field supplied for every discretization of a dataset
#[derive(Debug, Clone)]
pub struct FieldBlock {
    pub name: String,
    /// Declared number of columns
    pub rank: usize,
    /// One field per discretization, in the same order
    pub per_discretization: Vec<FieldData>,
}

/// Location of a field block among the dataset's field columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBlock {
    pub name: String,
    pub offset: usize,
    pub rank: usize,
}

impl ColumnBlock {
    fn column_names(&self) -> Vec<String> {
        (1..=self.rank)
            .map(|c| format!("{}_{}", self.name, c))
            .collect()
    }
}

/// Node table, field columns and connectivity of a transfer file
#[derive(Debug, Clone, PartialEq)]
pub struct TransferDataset {
    pub title: String,
    pub zone: Option<String>,
    pub coordinates: Vec<Vector3<f64>>,
    /// Original 1-based row of each node, kept through compaction
    pub ids: Vec<usize>,
    pub blocks: Vec<ColumnBlock>,
    /// One row per node, one column per field channel
    pub fields: DMatrix<f64>,
    /// 1-based node rows of each element
    pub connectivity: Vec<[usize; 4]>,
    /// Surface group of each element, when known
    pub element_groups: Vec<Option<String>>,
}

impl TransferDataset {
    /// Stacks the vertices and elements of several discretizations
    ///
    /// # Arguments
    /// * `title` - Title line of the file
    /// * `discretizations` - Discretizations, one node range each
    /// * `blocks` - Fields to carry, each holding one field per discretization
    ///
    /// # Returns
    /// The stacked dataset. Node ids are the 1-based stacked row numbers.
    pub fn from_discretizations(
        title: &str,
        discretizations: &[&Discretization],
        blocks: &[FieldBlock],
    ) -> Result<TransferDataset, LodestoneError> {
        let num_nodes: usize = discretizations.iter().map(|d| d.num_points()).sum();
        let num_elements: usize = discretizations.iter().map(|d| d.num_elements()).sum();

        let mut layout: Vec<ColumnBlock> = Vec::with_capacity(blocks.len());
        let mut width: usize = 0;
        for block in blocks {
            if block.per_discretization.len() != discretizations.len() {
                return Err(LodestoneError::Mismatch(format!(
                    "field '{}' has data for {} discretizations, expected {}",
                    block.name,
                    block.per_discretization.len(),
                    discretizations.len()
                )));
            }
            for (data, disc) in block.per_discretization.iter().zip(discretizations) {
                if data.rank() != block.rank {
                    return Err(LodestoneError::Mismatch(format!(
                        "field '{}' is declared with rank {} but carries {} columns",
                        block.name,
                        block.rank,
                        data.rank()
                    )));
                }
                data.check_rows(disc.num_points())?;
            }

            layout.push(ColumnBlock {
                name: block.name.clone(),
                offset: width,
                rank: block.rank,
            });
            width += block.rank;
        }

        let mut coordinates: Vec<Vector3<f64>> = Vec::with_capacity(num_nodes);
        let mut connectivity: Vec<[usize; 4]> = Vec::with_capacity(num_elements);
        let mut element_groups: Vec<Option<String>> = Vec::with_capacity(num_elements);
        let mut fields: DMatrix<f64> = DMatrix::zeros(num_nodes, width);

        let mut node_offset: usize = 0;
        for (d, disc) in discretizations.iter().enumerate() {
            coordinates.extend_from_slice(disc.coordinates());

            for (block, column) in std::iter::zip(blocks, &layout) {
                let data = &block.per_discretization[d];
                for local in 0..disc.num_points() {
                    for c in 0..column.rank {
                        fields[(node_offset + local, column.offset + c)] = data.value(local, c);
                    }
                }
            }

            for element in disc.elements() {
                let [n0, n1, n2] = element.locals().map(|l| node_offset + l + 1);
                connectivity.push([n0, n1, n2, n2]);
                element_groups.push(
                    element
                        .group
                        .and_then(|g| disc.group_name(g))
                        .map(|g| g.to_owned()),
                );
            }

            node_offset += disc.num_points();
        }

        Ok(TransferDataset {
            title: title.to_owned(),
            zone: None,
            coordinates,
            ids: (1..=num_nodes).collect(),
            blocks: layout,
            fields,
            connectivity,
            element_groups,
        })
    }

    pub fn with_zone(mut self, zone: &str) -> TransferDataset {
        self.zone = Some(zone.to_owned());
        self
    }

    pub fn num_nodes(&self) -> usize {
        self.coordinates.len()
    }

    pub fn num_elements(&self) -> usize {
        self.connectivity.len()
    }

    pub fn block(&self, name: &str) -> Option<&ColumnBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Values of one field block as a standalone field
    pub fn block_field(&self, name: &str) -> Option<FieldData> {
        let block = self.block(name)?;
        Some(FieldData::new(
            self.fields.columns(block.offset, block.rank).into_owned(),
        ))
    }

    /// Marks nodes touching at least one element on a wetted group
    ///
    /// # Arguments
    /// * `table` - Group name to boundary kind lookup
    pub fn wetted_mask(&self, table: &BoundaryTable) -> Vec<bool> {
        let mut used = vec![false; self.num_nodes()];

        for (e, row) in self.connectivity.iter().enumerate() {
            let wetted = match self.element_groups.get(e) {
                Some(Some(name)) => table.is_wetted(name),
                _ => false,
            };
            if !wetted {
                continue;
            }
            for node in row {
                if let Some(flag) = used.get_mut(node.wrapping_sub(1)) {
                    *flag = true;
                }
            }
        }

        used
    }

    /// Drops unused nodes and every element touching one
    ///
    /// Surviving nodes keep their relative order and their id. Connectivity is
    /// rewritten through the old to new row map.
    ///
    /// # Arguments
    /// * `used` - One flag per node
    ///
    /// # Returns
    /// The compacted dataset
    pub fn remove_unused(&self, used: &[bool]) -> Result<TransferDataset, LodestoneError> {
        if used.len() != self.num_nodes() {
            return Err(LodestoneError::Mismatch(format!(
                "usage mask has {} entries for {} nodes",
                used.len(),
                self.num_nodes()
            )));
        }
        self.check_element_groups()?;

        let mut remap: Vec<Option<usize>> = vec![None; self.num_nodes()];
        let mut kept: Vec<usize> = Vec::new();
        for (row, flag) in used.iter().enumerate() {
            if *flag {
                kept.push(row);
                remap[row] = Some(kept.len());
            }
        }

        let mut connectivity: Vec<[usize; 4]> = Vec::new();
        let mut element_groups: Vec<Option<String>> = Vec::new();
        for (row, group) in std::iter::zip(&self.connectivity, &self.element_groups) {
            let mut rewritten = [0usize; 4];
            let mut keep = true;
            for (slot, node) in rewritten.iter_mut().zip(row) {
                match node.checked_sub(1).and_then(|n| remap.get(n).copied().flatten()) {
                    Some(new) => *slot = new,
                    None => {
                        keep = false;
                        break;
                    }
                }
            }
            if keep {
                connectivity.push(rewritten);
                element_groups.push(group.clone());
            }
        }

        debug!(
            "compacted {} nodes and {} elements down to {} and {}",
            self.num_nodes(),
            self.num_elements(),
            kept.len(),
            connectivity.len()
        );

        Ok(TransferDataset {
            title: self.title.clone(),
            zone: self.zone.clone(),
            coordinates: kept.iter().map(|r| self.coordinates[*r]).collect(),
            ids: kept.iter().map(|r| self.ids[*r]).collect(),
            blocks: self.blocks.clone(),
            fields: self.fields.select_rows(kept.iter()),
            connectivity,
            element_groups,
        })
    }

    fn check_element_groups(&self) -> Result<(), LodestoneError> {
        if self.element_groups.len() != self.num_elements() {
            return Err(LodestoneError::Mismatch(format!(
                "{} elements but {} element groups",
                self.num_elements(),
                self.element_groups.len()
            )));
        }
        Ok(())
    }

    /// Checks row counts, names and connectivity before anything is written
    fn validate(&self) -> Result<(), LodestoneError> {
        let width: usize = self.blocks.iter().map(|b| b.rank).sum();

        check_name("title", &self.title)?;
        if let Some(zone) = &self.zone {
            check_name("zone", zone)?;
            // the zone line is split on commas when read back
            if zone.contains(',') {
                return Err(LodestoneError::Format(format!(
                    "zone {zone:?} cannot hold commas"
                )));
            }
        }
        for block in &self.blocks {
            check_name("field block", &block.name)?;
            if block.name.is_empty() {
                return Err(LodestoneError::Format(
                    "field block names cannot be empty".to_owned(),
                ));
            }
        }

        if self.ids.len() != self.num_nodes() || self.fields.nrows() != self.num_nodes() {
            return Err(LodestoneError::Mismatch(format!(
                "{} coordinates, {} ids and {} field rows",
                self.num_nodes(),
                self.ids.len(),
                self.fields.nrows()
            )));
        }
        if self.fields.ncols() != width {
            return Err(LodestoneError::Mismatch(format!(
                "field blocks declare {} columns but {} are stored",
                width,
                self.fields.ncols()
            )));
        }
        for (e, row) in self.connectivity.iter().enumerate() {
            if row.iter().any(|n| *n == 0 || *n > self.num_nodes()) {
                return Err(LodestoneError::Format(format!(
                    "element {} references {:?} outside of {} nodes",
                    e + 1,
                    row,
                    self.num_nodes()
                )));
            }
        }
        self.check_element_groups()
    }

    /// Renders the dataset into the transfer file layout
    ///
    /// # Arguments
    /// * `active` - Field block whose columns are populated. Every other block
    ///     is written as zeros. `None` populates every block.
    pub fn render(&self, active: Option<&str>) -> Result<String, LodestoneError> {
        self.validate()?;

        if let Some(name) = active {
            if self.block(name).is_none() {
                return Err(LodestoneError::Mismatch(format!(
                    "no field block named '{name}'"
                )));
            }
        }

        let mut out = String::new();
        out.push_str(&format!("TITLE = \"{}\"\n", self.title));

        let mut variables: Vec<String> =
            ["x", "y", "z", "id"].iter().map(|v| v.to_string()).collect();
        for block in &self.blocks {
            variables.extend(block.column_names());
        }
        let quoted: Vec<String> = variables.iter().map(|v| format!("\"{v}\"")).collect();
        out.push_str(&format!("VARIABLES = {}\n", quoted.join(" ")));

        let zone = match &self.zone {
            Some(name) => format!("ZONE T=\"{}\", ", name),
            None => "ZONE ".to_owned(),
        };
        out.push_str(&format!(
            "{zone}N={}, E={}, F=FEPOINT, ET=QUADRILATERAL\n",
            self.num_nodes(),
            self.num_elements()
        ));

        for (row, (xyz, id)) in std::iter::zip(&self.coordinates, &self.ids).enumerate() {
            let mut line = format!("{:e} {:e} {:e} {}", xyz.x, xyz.y, xyz.z, id);
            for block in &self.blocks {
                let populated = active.map(|a| a == block.name).unwrap_or(true);
                for c in 0..block.rank {
                    let value = if populated {
                        self.fields[(row, block.offset + c)]
                    } else {
                        0.0
                    };
                    line.push_str(&format!(" {:e}", value));
                }
            }
            out.push_str(&line);
            out.push('\n');
        }

        for row in &self.connectivity {
            out.push_str(&format!("{} {} {} {}\n", row[0], row[1], row[2], row[3]));
        }

        Ok(out)
    }
}

/// Writes a dataset to a transfer file
///
/// The file is rendered and validated in memory first, so a failed
/// validation leaves nothing on disk.
///
/// # Arguments
/// * `path` - Output file
/// * `dataset` - The dataset to write
/// * `active` - Field block to populate, `None` for all of them
pub fn write_transfer_file(
    path: &Path,
    dataset: &TransferDataset,
    active: Option<&str>,
) -> Result<(), LodestoneError> {
    let contents = dataset.render(active)?;

    match std::fs::write(path, contents) {
        Ok(()) => {}
        Err(err) => {
            return Err(LodestoneError::Io(format!(
                "Failed to write {}: {err}",
                path.display()
            )))
        }
    }

    info!(
        "wrote {} nodes and {} elements to {}",
        dataset.num_nodes(),
        dataset.num_elements(),
        path.display()
    );

    Ok(())
}

/// Writes one transfer file per field block, each with only that block
/// populated. A dataset without blocks produces a single geometry file.
///
/// # Arguments
/// * `directory` - Output directory
/// * `prefix` - File name prefix
/// * `dataset` - The dataset to write
///
/// # Returns
/// The written paths, in block order
pub fn write_transfer_files(
    directory: &Path,
    prefix: &str,
    dataset: &TransferDataset,
) -> Result<Vec<PathBuf>, LodestoneError> {
    if dataset.blocks.is_empty() {
        let path = directory.join(format!("{prefix}.dat"));
        write_transfer_file(&path, dataset, None)?;
        return Ok(vec![path]);
    }

    let mut written: Vec<PathBuf> = Vec::with_capacity(dataset.blocks.len());
    for block in &dataset.blocks {
        let path = directory.join(format!("{}_{}.dat", prefix, block.name));
        write_transfer_file(&path, dataset, Some(&block.name))?;
        written.push(path);
    }

    Ok(written)
}

/// Header names are written between double quotes on a single line
fn check_name(what: &str, name: &str) -> Result<(), LodestoneError> {
    if name.contains('"') || name.chars().any(|c| c.is_control()) {
        return Err(LodestoneError::Format(format!(
            "{what} {name:?} cannot hold quotes or control characters"
        )));
    }
    Ok(())
}

enum ParseState {
    Header,
    Nodes,
    Connectivity,
}

/// Text between double quotes, in order
fn quoted_values(line: &str) -> Vec<String> {
    line.split('"')
        .skip(1)
        .step_by(2)
        .map(|v| v.to_owned())
        .collect()
}

/// Splits `name_3` into `("name", 3)`
fn column_stem(column: &str) -> (&str, Option<usize>) {
    match column.rsplit_once('_') {
        Some((stem, index)) => match index.parse::<usize>() {
            Ok(i) if !stem.is_empty() => (stem, Some(i)),
            _ => (column, None),
        },
        None => (column, None),
    }
}

/// Groups consecutive `stem_1 .. stem_n` columns into blocks
fn blocks_from_columns(columns: &[String]) -> Vec<ColumnBlock> {
    let mut blocks: Vec<ColumnBlock> = Vec::new();

    for (offset, column) in columns.iter().enumerate() {
        let (stem, index) = column_stem(column);
        if let (Some(index), Some(last)) = (index, blocks.last_mut()) {
            if last.name == stem && index == last.rank + 1 {
                last.rank += 1;
                continue;
            }
        }
        blocks.push(ColumnBlock {
            name: stem.to_owned(),
            offset,
            rank: 1,
        });
    }

    blocks
}

fn parse_zone(line: &str) -> Result<(Option<String>, usize, usize), LodestoneError> {
    let mut zone: Option<String> = None;
    let mut num_nodes: Option<usize> = None;
    let mut num_elements: Option<usize> = None;

    for entry in line.trim_start_matches("ZONE").split(',') {
        let (key, value) = match entry.split_once('=') {
            Some(kv) => kv,
            None => continue,
        };
        let value = value.trim();
        match key.trim() {
            "T" => zone = Some(value.trim_matches('"').to_owned()),
            "N" => {
                num_nodes = Some(value.parse().map_err(|_| {
                    LodestoneError::Format(format!("bad node count '{value}'"))
                })?)
            }
            "E" => {
                num_elements = Some(value.parse().map_err(|_| {
                    LodestoneError::Format(format!("bad element count '{value}'"))
                })?)
            }
            _ => {}
        }
    }

    match (num_nodes, num_elements) {
        (Some(n), Some(e)) => Ok((zone, n, e)),
        _ => Err(LodestoneError::Format(format!(
            "zone line without node and element counts: {line}"
        ))),
    }
}

/// Parses transfer file contents
///
/// # Arguments
/// * `contents` - Text of a transfer file
///
/// # Returns
/// The dataset. Element groups are not stored in the file and come back empty.
pub fn parse_transfer(contents: &str) -> Result<TransferDataset, LodestoneError> {
    let mut state = ParseState::Header;
    let mut title = String::new();
    let mut variables: Vec<String> = Vec::new();
    let mut zone: Option<String> = None;
    let mut num_nodes: usize = 0;
    let mut num_elements: usize = 0;

    let mut coordinates: Vec<Vector3<f64>> = Vec::new();
    let mut ids: Vec<usize> = Vec::new();
    let mut field_rows: Vec<f64> = Vec::new();
    let mut connectivity: Vec<[usize; 4]> = Vec::new();
    let mut has_id = false;

    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match state {
            ParseState::Header => {
                if line.starts_with("TITLE") {
                    title = quoted_values(line).into_iter().next().unwrap_or_default();
                } else if line.starts_with("VARIABLES") {
                    variables = quoted_values(line);
                    if variables.len() < 3 || variables[..3] != ["x", "y", "z"] {
                        return Err(LodestoneError::Format(format!(
                            "variables must start with x, y, z: {:?}",
                            variables
                        )));
                    }
                    has_id = variables.get(3).map(|v| v == "id").unwrap_or(false);
                } else if line.starts_with("ZONE") {
                    if variables.is_empty() {
                        return Err(LodestoneError::Format(
                            "ZONE before VARIABLES".to_owned(),
                        ));
                    }
                    (zone, num_nodes, num_elements) = parse_zone(line)?;
                    state = if num_nodes > 0 {
                        ParseState::Nodes
                    } else {
                        ParseState::Connectivity
                    };
                } else {
                    return Err(LodestoneError::Format(format!(
                        "unexpected header line {}: {}",
                        number + 1,
                        line
                    )));
                }
            }
            ParseState::Nodes => {
                let values = match line
                    .split_whitespace()
                    .map(|v| v.parse::<f64>())
                    .collect::<Result<Vec<f64>, _>>()
                {
                    Ok(v) => v,
                    Err(err) => {
                        return Err(LodestoneError::Format(format!(
                            "non-float value on line {}: {err}",
                            number + 1
                        )))
                    }
                };
                if values.len() != variables.len() {
                    return Err(LodestoneError::Format(format!(
                        "line {} has {} values for {} variables",
                        number + 1,
                        values.len(),
                        variables.len()
                    )));
                }

                coordinates.push(Vector3::new(values[0], values[1], values[2]));
                if has_id {
                    let id = values[3];
                    if id < 1.0 || id.fract() != 0.0 {
                        return Err(LodestoneError::Format(format!(
                            "bad node id {} on line {}",
                            id,
                            number + 1
                        )));
                    }
                    ids.push(id as usize);
                    field_rows.extend_from_slice(&values[4..]);
                } else {
                    ids.push(coordinates.len());
                    field_rows.extend_from_slice(&values[3..]);
                }

                if coordinates.len() == num_nodes {
                    state = ParseState::Connectivity;
                }
            }
            ParseState::Connectivity => {
                if connectivity.len() == num_elements {
                    return Err(LodestoneError::Format(format!(
                        "trailing data on line {}",
                        number + 1
                    )));
                }

                let row = match line
                    .split_whitespace()
                    .map(|v| v.parse::<usize>())
                    .collect::<Result<Vec<usize>, _>>()
                {
                    Ok(r) => r,
                    Err(err) => {
                        return Err(LodestoneError::Format(format!(
                            "non-integer connectivity on line {}: {err}",
                            number + 1
                        )))
                    }
                };
                if row.len() != 4 {
                    return Err(LodestoneError::Format(format!(
                        "line {} has {} connectivity entries, expected 4",
                        number + 1,
                        row.len()
                    )));
                }
                if row.iter().any(|n| *n == 0 || *n > num_nodes) {
                    return Err(LodestoneError::Format(format!(
                        "dangling connectivity {:?} on line {} with {} nodes",
                        row,
                        number + 1,
                        num_nodes
                    )));
                }
                connectivity.push([row[0], row[1], row[2], row[3]]);
            }
        }
    }

    if variables.is_empty() {
        return Err(LodestoneError::Format("missing VARIABLES line".to_owned()));
    }
    if coordinates.len() != num_nodes || connectivity.len() != num_elements {
        return Err(LodestoneError::Format(format!(
            "expected {} nodes and {} elements, found {} and {}",
            num_nodes,
            num_elements,
            coordinates.len(),
            connectivity.len()
        )));
    }

    let columns = &variables[if has_id { 4 } else { 3 }..];
    let blocks = blocks_from_columns(columns);

    Ok(TransferDataset {
        title,
        zone,
        coordinates,
        ids,
        blocks,
        fields: DMatrix::from_row_slice(num_nodes, columns.len(), &field_rows),
        element_groups: vec![None; connectivity.len()],
        connectivity,
    })
}

/// Reads a transfer file
///
/// # Arguments
/// * `path` - The transfer file to read
pub fn read_transfer_file(path: &Path) -> Result<TransferDataset, LodestoneError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            return Err(LodestoneError::Io(format!(
                "Unable to open transfer file {}: {err}",
                path.display()
            )))
        }
    };

    let dataset = parse_transfer(&contents)?;
    info!(
        "loaded {} nodes and {} elements from {}",
        dataset.num_nodes(),
        dataset.num_elements(),
        path.display()
    );

    Ok(dataset)
}
