use approx::assert_relative_eq;
use tempfile::tempdir;

use lodestone::{config::parse_input, driver, read_transfer_file, LodestoneError};

/// Panel A is wetted, panel B is a wall. They share global ids 1 and 2.
const DECK: &str = r#"{
    "metadata": {
        "title": "panel loads",
        "boundary": "skin",
        "zone": "panels",
        "remove_unused": true
    },
    "groups": { "upper": "viscous", "pylon": "wall" },
    "bodies": [
        {
            "faces": [
                {
                    "tag": "skin",
                    "group": "upper",
                    "xyz": [[0, 0, 0], [1, 0, 0], [1, 1, 0], [0, 1, 0]],
                    "uv": [[0, 0], [1, 0], [1, 1], [0, 1]],
                    "global_ids": [0, 1, 2, 3],
                    "triangles": [[0, 1, 2], [0, 2, 3]]
                },
                {
                    "tag": "skin",
                    "group": "pylon",
                    "xyz": [[1, 0, 0], [2, 0, 0], [2, 1, 0], [1, 1, 0]],
                    "uv": [[1, 0], [2, 0], [2, 1], [1, 1]],
                    "global_ids": [1, 4, 5, 2],
                    "triangles": [[0, 1, 2], [0, 2, 3]]
                },
                {
                    "tag": "root",
                    "xyz": [[0, 0, 0], [0, 0, 1], [0, 1, 0]],
                    "uv": [[0, 0], [1, 0], [0, 1]],
                    "global_ids": [0, 6, 3],
                    "triangles": [[0, 1, 2]]
                }
            ],
            "fields": {
                "displacement": [
                    [0.0, 0, 0], [0.1, 0, -0.01], [0.2, 0, -0.02],
                    [0.3, 0, -0.03], [0.4, 0, -0.04], [0.5, 0, -0.05], [0.6, 0, -0.06]
                ],
                "pressure": [[2.0]]
            }
        }
    ],
    "queries": [[0.5, 0.25], [2.5, 0.5]]
}"#;

fn column(header: &[&str], name: &str) -> usize {
    header.iter().position(|h| *h == name).unwrap()
}

#[test]
fn test_run_writes_compacted_transfer_files() {
    let deck = parse_input(DECK).unwrap();
    let dir = tempdir().unwrap();
    let queries = dir.path().join("queries.csv");

    let summary = driver::run(&deck, dir.path(), "panels", &queries).unwrap();

    assert_eq!(summary.num_points, 6);
    assert_eq!(summary.num_elements, 4);
    assert_relative_eq!(summary.area, 2.0, epsilon = 1e-12);
    assert_eq!(summary.written_nodes, 4);
    assert_eq!(summary.written_elements, 2);
    assert_eq!(summary.transfer_files.len(), 2);
    assert_eq!(summary.extrapolated_queries, 1);

    let displacement = read_transfer_file(&dir.path().join("panels_displacement.dat")).unwrap();
    assert_eq!(displacement.title, "panel loads");
    assert_eq!(displacement.zone.as_deref(), Some("panels"));
    assert_eq!(displacement.ids, vec![1, 2, 3, 4]);

    let d = displacement.block_field("displacement").unwrap();
    let p = displacement.block_field("pressure").unwrap();
    for (row, id) in displacement.ids.iter().enumerate() {
        // panel A vertices are stitched first, in global id order 0, 1, 2, 3
        assert_relative_eq!(d.value(row, 0), 0.1 * (id - 1) as f64, epsilon = 1e-12);
        assert_eq!(p.value(row, 0), 0.0);
    }

    let pressure = read_transfer_file(&dir.path().join("panels_pressure.dat")).unwrap();
    let p = pressure.block_field("pressure").unwrap();
    for row in 0..pressure.num_nodes() {
        assert_eq!(p.value(row, 0), 2.0);
    }
}

#[test]
fn test_run_writes_query_results() {
    let deck = parse_input(DECK).unwrap();
    let dir = tempdir().unwrap();
    let queries = dir.path().join("queries.csv");

    driver::run(&deck, dir.path(), "panels", &queries).unwrap();

    let contents = std::fs::read_to_string(&queries).unwrap();
    let mut lines = contents.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();
    let rows: Vec<Vec<&str>> = lines.map(|l| l.split(',').collect()).collect();
    assert_eq!(rows.len(), 2);

    let inside = &rows[0];
    assert_eq!(inside[column(&header, "element")], "0");
    assert_eq!(inside[column(&header, "extrapolated")], "false");
    let dx: f64 = inside[column(&header, "displacement_1")].parse().unwrap();
    assert_relative_eq!(dx, 0.5 * 0.0 + 0.25 * 0.1 + 0.25 * 0.2, epsilon = 1e-12);
    let pressure: f64 = inside[column(&header, "pressure_1")].parse().unwrap();
    assert_relative_eq!(pressure, 2.0, epsilon = 1e-12);

    let outside = &rows[1];
    assert_eq!(outside[column(&header, "extrapolated")], "true");
}

#[test]
fn test_run_without_compaction_keeps_everything() {
    let deck = DECK.replace("\"remove_unused\": true", "\"remove_unused\": false");
    let deck = parse_input(&deck).unwrap();
    let dir = tempdir().unwrap();

    let summary = driver::run(&deck, dir.path(), "full", &dir.path().join("q.csv")).unwrap();

    assert_eq!(summary.written_nodes, 6);
    assert_eq!(summary.written_elements, 4);
}

#[test]
fn test_run_on_untagged_boundary() {
    let deck = DECK.replace("\"boundary\": \"skin\"", "\"boundary\": \"tail\"");
    let deck = parse_input(&deck).unwrap();
    let dir = tempdir().unwrap();

    let err = driver::run(&deck, dir.path(), "tail", &dir.path().join("q.csv")).unwrap_err();
    assert!(matches!(err, LodestoneError::NotFound(_)));
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn test_run_single_body_restriction() {
    let deck = DECK.replace("\"remove_unused\": true", "\"single_body\": true");
    let deck = parse_input(&deck).unwrap();
    let dir = tempdir().unwrap();

    let summary = driver::run(&deck, dir.path(), "single", &dir.path().join("q.csv")).unwrap();
    assert_eq!(summary.num_points, 6);
}
