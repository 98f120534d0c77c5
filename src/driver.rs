use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::{
    config::InputDeck,
    datatypes::FieldData,
    discretization::{build, build_single_body, Discretization},
    error::LodestoneError,
    locator::{locate, Location},
    transfer::{integrate_all, interpolate, total_area},
    transfer_file::{write_transfer_files, FieldBlock, TransferDataset},
};

/// What a run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub num_points: usize,
    pub num_elements: usize,
    pub area: f64,
    /// Nodes and elements left in the transfer files
    pub written_nodes: usize,
    pub written_elements: usize,
    pub transfer_files: Vec<PathBuf>,
    pub extrapolated_queries: usize,
}

/// Writes located query points and their interpolated values to a CSV file
///
/// # Arguments
/// * `path` - The output csv file
/// * `deck` - The input deck the queries came from
/// * `locations` - One location per query
/// * `values` - Interpolated values per query, fields concatenated
fn csv_output(
    path: &Path,
    deck: &InputDeck,
    locations: &[Location],
    values: &[Vec<f64>],
) -> Result<(), LodestoneError> {
    let mut header: Vec<String> = ["u", "v", "element", "extrapolated"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    for field in &deck.fields {
        header.extend((1..=field.rank).map(|c| format!("{}_{}", field.name, c)));
    }

    let mut contents = header.join(",");
    contents.push('\n');
    for ((query, location), row) in deck.queries.iter().zip(locations).zip(values) {
        contents.push_str(&format!(
            "{u},{v},{element},{extrapolated}",
            u = query.x,
            v = query.y,
            element = location.element,
            extrapolated = location.extrapolated,
        ));
        for value in row {
            contents.push_str(&format!(",{value}"));
        }
        contents.push('\n');
    }

    match std::fs::write(path, contents) {
        Ok(()) => {}
        Err(err) => {
            return Err(LodestoneError::Io(format!(
                "Failed to create {}: {err}",
                path.display()
            )));
        }
    }

    info!("wrote {} query results to {}", locations.len(), path.display());

    Ok(())
}

/// Locates every query point and interpolates every field there
///
/// # Arguments
/// * `disc` - The discretization to search
/// * `deck` - The input deck holding the queries
/// * `fields` - Fields gathered onto the discretization, in deck order
fn transfer_queries(
    disc: &Discretization,
    deck: &InputDeck,
    fields: &[FieldData],
) -> Result<(Vec<Location>, Vec<Vec<f64>>), LodestoneError> {
    let mut locations: Vec<Location> = Vec::with_capacity(deck.queries.len());
    let mut values: Vec<Vec<f64>> = Vec::with_capacity(deck.queries.len());

    let bar = ProgressBar::new(deck.queries.len() as u64);
    for query in &deck.queries {
        bar.inc(1);

        let location = locate(disc, query)?;
        if location.extrapolated {
            warn!(
                "query ({}, {}) is outside boundary '{}', \
                 extrapolating from element {} with weights {:?}",
                query.x,
                query.y,
                disc.tag(),
                location.element,
                location.weights
            );
        }

        let mut row: Vec<f64> = Vec::new();
        for field in fields {
            row.extend(interpolate(disc, location.element, &location.weights, field)?);
        }

        locations.push(location);
        values.push(row);
    }
    bar.finish_with_message(format!("located {} query points", deck.queries.len()));

    Ok((locations, values))
}

/// Runs a transfer from an input deck
///
/// # Arguments
/// * `deck` - The parsed input deck
/// * `output_dir` - Directory for the transfer files
/// * `prefix` - File name prefix of the transfer files
/// * `queries_output` - CSV file for query results, written only if the deck
///     has queries
pub fn run(
    deck: &InputDeck,
    output_dir: &Path,
    prefix: &str,
    queries_output: &Path,
) -> Result<RunSummary, LodestoneError> {
    let boundary = deck.metadata.boundary.as_str();

    let disc = if deck.metadata.single_body {
        build_single_body(&deck.bodies, boundary)?
    } else {
        build(&deck.bodies, boundary)?
    };

    let area = total_area(&disc)?;
    info!("boundary '{}' has area {:.6}", boundary, area);

    let mut gathered: Vec<FieldData> = Vec::with_capacity(deck.fields.len());
    let mut blocks: Vec<FieldBlock> = Vec::with_capacity(deck.fields.len());
    for field in &deck.fields {
        let data = disc.gather(&field.per_body)?;
        let integral = integrate_all(&disc, field.rank, Some(&data))?;
        info!("integrated {} over '{}': {:?}", field.name, boundary, integral);

        blocks.push(FieldBlock {
            name: field.name.clone(),
            rank: field.rank,
            per_discretization: vec![data.clone()],
        });
        gathered.push(data);
    }

    let mut dataset =
        TransferDataset::from_discretizations(&deck.metadata.title, &[&disc], &blocks)?;
    if let Some(zone) = &deck.metadata.zone {
        dataset = dataset.with_zone(zone);
    }

    if deck.metadata.remove_unused {
        let used = dataset.wetted_mask(&deck.groups);
        dataset = dataset.remove_unused(&used)?;
        info!(
            "kept {} nodes and {} elements on wetted groups",
            dataset.num_nodes(),
            dataset.num_elements()
        );
        if dataset.num_elements() == 0 {
            warn!("no elements of boundary '{}' are on a wetted group", boundary);
        }
    }

    let transfer_files = write_transfer_files(output_dir, prefix, &dataset)?;

    let mut extrapolated_queries: usize = 0;
    if !deck.queries.is_empty() {
        let (locations, values) = transfer_queries(&disc, deck, &gathered)?;
        extrapolated_queries = locations.iter().filter(|l| l.extrapolated).count();
        csv_output(queries_output, deck, &locations, &values)?;
    }

    Ok(RunSummary {
        num_points: disc.num_points(),
        num_elements: disc.num_elements(),
        area,
        written_nodes: dataset.num_nodes(),
        written_elements: dataset.num_elements(),
        transfer_files,
        extrapolated_queries,
    })
}
