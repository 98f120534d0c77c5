use json::JsonValue;
use nalgebra::{Vector2, Vector3};
use tracing::info;

use crate::{
    datatypes::{BoundaryKind, BoundaryTable, FieldData},
    error::LodestoneError,
    tessellation::{TessellatedBody, TessellatedFace},
};

/// Run-level settings from the `metadata` section
#[derive(Debug, Clone, PartialEq)]
pub struct InputMetadata {
    pub title: String,
    /// Coupling-boundary tag to build the discretization for
    pub boundary: String,
    pub zone: Option<String>,
    pub single_body: bool,
    pub remove_unused: bool,
}

/// A field given per body, each indexed by body-global vertex id
#[derive(Debug, Clone)]
pub struct BodyField {
    pub name: String,
    pub rank: usize,
    pub per_body: Vec<FieldData>,
}

/// Everything read from an input deck
#[derive(Debug, Clone)]
pub struct InputDeck {
    pub metadata: InputMetadata,
    pub groups: BoundaryTable,
    pub bodies: Vec<TessellatedBody>,
    pub fields: Vec<BodyField>,
    pub queries: Vec<Vector2<f64>>,
}

/// Parses the input json into a JsonValue object
///
/// # Arguments
/// * `contents` - The input file contents
///
/// # Returns
/// A JsonValue object with the required sections present
fn load_input_json(contents: &str) -> Result<JsonValue, LodestoneError> {
    let input_json = match json::parse(contents) {
        Ok(f) => f,
        Err(err) => {
            return Err(LodestoneError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    if !input_json.has_key("metadata") {
        return Err(LodestoneError::Input(
            "Input json missing metadata field".to_string(),
        ));
    }
    if !input_json.has_key("bodies") || !input_json["bodies"].is_array() {
        return Err(LodestoneError::Input(
            "Input json missing bodies list".to_string(),
        ));
    }
    if !input_json["metadata"].has_key("boundary") {
        return Err(LodestoneError::Input(
            "Input json missing boundary field in metadata section".to_string(),
        ));
    }

    Ok(input_json)
}

/// Parses run metadata from the input json
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
fn parse_input_metadata(input_json: &JsonValue) -> Result<InputMetadata, LodestoneError> {
    let metadata = &input_json["metadata"];

    let boundary = match metadata["boundary"].as_str() {
        Some(b) if !b.is_empty() => b.to_owned(),
        _ => {
            return Err(LodestoneError::Input(
                "Input json boundary must be a non-empty string".to_owned(),
            ))
        }
    };

    let title = metadata["title"].as_str().unwrap_or(&boundary).to_owned();
    let zone = metadata["zone"].as_str().map(|z| z.to_owned());

    let single_body = if metadata.has_key("single_body") {
        match metadata["single_body"].as_bool() {
            Some(b) => b,
            None => {
                return Err(LodestoneError::Input(
                    "Bad value for single_body in metadata section".to_owned(),
                ))
            }
        }
    } else {
        false
    };
    let remove_unused = if metadata.has_key("remove_unused") {
        match metadata["remove_unused"].as_bool() {
            Some(b) => b,
            None => {
                return Err(LodestoneError::Input(
                    "Bad value for remove_unused in metadata section".to_owned(),
                ))
            }
        }
    } else {
        false
    };

    Ok(InputMetadata {
        title,
        boundary,
        zone,
        single_body,
        remove_unused,
    })
}

/// Builds the group lookup from the `groups` section
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
fn parse_groups(input_json: &JsonValue) -> Result<BoundaryTable, LodestoneError> {
    let mut table = BoundaryTable::new();

    for (name, kind_json) in input_json["groups"].entries() {
        let kind: BoundaryKind = match kind_json.as_str() {
            Some(k) => k.parse()?,
            None => {
                return Err(LodestoneError::Input(format!(
                    "Group '{name}' must map to a boundary kind string"
                )))
            }
        };
        table.insert(name, kind);
    }

    Ok(table)
}

/// Reads a list of fixed-length number rows
fn parse_rows(
    value: &JsonValue,
    width: usize,
    what: &str,
) -> Result<Vec<Vec<f64>>, LodestoneError> {
    if !value.is_array() {
        return Err(LodestoneError::Input(format!("{what} must be a list")));
    }

    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(value.len());
    for (i, row) in value.members().enumerate() {
        let parsed: Option<Vec<f64>> = row.members().map(|v| v.as_f64()).collect();
        match parsed {
            Some(r) if row.is_array() && (width == 0 || r.len() == width) => rows.push(r),
            _ => {
                return Err(LodestoneError::Input(format!(
                    "Bad entry {i} in {what}. Expected {width} numbers"
                )))
            }
        }
    }

    Ok(rows)
}

fn parse_indices(value: &JsonValue, what: &str) -> Result<Vec<usize>, LodestoneError> {
    let parsed: Option<Vec<usize>> = value.members().map(|v| v.as_usize()).collect();
    match parsed {
        Some(v) if value.is_array() => Ok(v),
        _ => Err(LodestoneError::Input(format!(
            "{what} must be a list of non-negative integers"
        ))),
    }
}

/// Parses one face of a body
///
/// # Arguments
/// * `face_json` - The face entry
/// * `label` - Location of the face for error messages
fn parse_face(face_json: &JsonValue, label: &str) -> Result<TessellatedFace, LodestoneError> {
    for key in ["xyz", "uv", "global_ids", "triangles"] {
        if !face_json.has_key(key) {
            return Err(LodestoneError::Input(format!("{label} is missing {key} field")));
        }
    }

    let xyz: Vec<Vector3<f64>> = parse_rows(&face_json["xyz"], 3, &format!("{label} xyz"))?
        .iter()
        .map(|r| Vector3::new(r[0], r[1], r[2]))
        .collect();
    let uv: Vec<Vector2<f64>> = parse_rows(&face_json["uv"], 2, &format!("{label} uv"))?
        .iter()
        .map(|r| Vector2::new(r[0], r[1]))
        .collect();
    let global_ids = parse_indices(&face_json["global_ids"], &format!("{label} global_ids"))?;

    let mut triangles: Vec<[usize; 3]> = Vec::with_capacity(face_json["triangles"].len());
    for (t, triangle) in face_json["triangles"].members().enumerate() {
        let indices = parse_indices(triangle, &format!("{label} triangle {t}"))?;
        if indices.len() != 3 {
            return Err(LodestoneError::Input(format!(
                "{label} triangle {t} has {} vertices",
                indices.len()
            )));
        }
        triangles.push([indices[0], indices[1], indices[2]]);
    }

    let mut face = TessellatedFace::new(xyz, uv, global_ids, triangles)?;
    if let Some(tag) = face_json["tag"].as_str() {
        face = face.with_tag(tag);
    }
    if let Some(group) = face_json["group"].as_str() {
        face = face.with_group(group);
    }

    Ok(face)
}

/// Parses the tessellated bodies and their per-body fields
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
///
/// # Returns
/// The bodies and the fields, in that order
fn parse_bodies(
    input_json: &JsonValue,
) -> Result<(Vec<TessellatedBody>, Vec<BodyField>), LodestoneError> {
    let mut bodies: Vec<TessellatedBody> = Vec::new();
    let mut fields: Vec<BodyField> = Vec::new();
    let num_bodies = input_json["bodies"].len();

    for (b, body_json) in input_json["bodies"].members().enumerate() {
        if !body_json["faces"].is_array() {
            return Err(LodestoneError::Input(format!(
                "Body {b} is missing faces list"
            )));
        }

        let mut faces: Vec<TessellatedFace> = Vec::new();
        for (f, face_json) in body_json["faces"].members().enumerate() {
            faces.push(parse_face(face_json, &format!("Body {b} face {f}"))?);
        }
        bodies.push(TessellatedBody::new(faces));

        for (name, rows_json) in body_json["fields"].entries() {
            let rows = parse_rows(rows_json, 0, &format!("Body {b} field {name}"))?;
            let rank = rows.first().map(|r| r.len()).unwrap_or(0);
            let flat: Vec<f64> = rows.iter().flatten().copied().collect();
            if rows.iter().any(|r| r.len() != rank) {
                return Err(LodestoneError::Input(format!(
                    "Body {b} field {name} has rows of different lengths"
                )));
            }
            let data = FieldData::from_rows(rank, &flat)?;

            let index = match fields.iter().position(|f| f.name == name) {
                Some(i) => i,
                None => {
                    fields.push(BodyField {
                        name: name.to_owned(),
                        rank,
                        per_body: Vec::with_capacity(num_bodies),
                    });
                    fields.len() - 1
                }
            };
            let field = &mut fields[index];
            if field.rank != rank {
                return Err(LodestoneError::Input(format!(
                    "Field {name} has rank {} on earlier bodies but {rank} on body {b}",
                    field.rank
                )));
            }
            if field.per_body.len() != b {
                return Err(LodestoneError::Input(format!(
                    "Field {name} must be given on every body, first missing before body {b}"
                )));
            }
            field.per_body.push(data);
        }
    }

    for field in &fields {
        if field.per_body.len() != num_bodies {
            return Err(LodestoneError::Input(format!(
                "Field {} is given on {} of {} bodies",
                field.name,
                field.per_body.len(),
                num_bodies
            )));
        }
    }

    Ok((bodies, fields))
}

/// Parses an input deck
///
/// # Arguments
/// * `contents` - The input file contents
pub fn parse_input(contents: &str) -> Result<InputDeck, LodestoneError> {
    let input_json = load_input_json(contents)?;
    let metadata = parse_input_metadata(&input_json)?;
    let groups = parse_groups(&input_json)?;
    let (bodies, fields) = parse_bodies(&input_json)?;

    let queries: Vec<Vector2<f64>> = if input_json.has_key("queries") {
        parse_rows(&input_json["queries"], 2, "queries")?
            .iter()
            .map(|r| Vector2::new(r[0], r[1]))
            .collect()
    } else {
        Vec::new()
    };

    info!(
        "loaded {} bodies, {} fields and {} boundary groups from input file",
        bodies.len(),
        fields.len(),
        groups.len()
    );

    Ok(InputDeck {
        metadata,
        groups,
        bodies,
        fields,
        queries,
    })
}

/// Reads and parses an input deck
///
/// # Arguments
/// * `input_file` - The path to the input file
pub fn load_input_file(input_file: &str) -> Result<InputDeck, LodestoneError> {
    let contents = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(_err) => {
            return Err(LodestoneError::Input(format!(
                "Unable to open input file {}",
                input_file
            )))
        }
    };

    parse_input(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tessellation::Tessellation;

    const DECK: &str = r#"{
        "metadata": { "title": "wing loads", "boundary": "skin", "remove_unused": true },
        "groups": { "upper": "viscous", "far": "farfield" },
        "bodies": [
            {
                "faces": [
                    {
                        "tag": "skin",
                        "group": "upper",
                        "xyz": [[0, 0, 0], [1, 0, 0], [0, 1, 0]],
                        "uv": [[0, 0], [1, 0], [0, 1]],
                        "global_ids": [0, 1, 2],
                        "triangles": [[0, 1, 2]]
                    }
                ],
                "fields": { "pressure": [[1.5], [2.5], [3.5]] }
            }
        ],
        "queries": [[0.25, 0.25]]
    }"#;

    #[test]
    fn test_parse_deck() {
        let deck = parse_input(DECK).unwrap();

        assert_eq!(deck.metadata.title, "wing loads");
        assert_eq!(deck.metadata.boundary, "skin");
        assert!(deck.metadata.remove_unused);
        assert!(!deck.metadata.single_body);
        assert!(deck.groups.is_wetted("upper"));
        assert_eq!(deck.groups.kind("far"), Some(BoundaryKind::Farfield));

        assert_eq!(deck.bodies.len(), 1);
        assert_eq!(deck.bodies[0].face_tag(0), Some("skin"));
        assert_eq!(deck.bodies[0].face_group(0), Some("upper"));
        assert_eq!(deck.bodies[0].face_xyz(0, 1).unwrap(), Vector3::new(1.0, 0.0, 0.0));

        assert_eq!(deck.fields.len(), 1);
        assert_eq!(deck.fields[0].rank, 1);
        assert_eq!(deck.fields[0].per_body[0].value(2, 0), 3.5);
        assert_eq!(deck.queries, vec![Vector2::new(0.25, 0.25)]);
    }

    #[test]
    fn test_missing_boundary() {
        let err = parse_input(r#"{ "metadata": {}, "bodies": [] }"#).unwrap_err();
        assert!(matches!(err, LodestoneError::Input(_)));
    }

    #[test]
    fn test_unknown_group_kind_rejected_at_parse() {
        let deck = DECK.replace("\"farfield\"", "\"outflow\"");
        assert!(matches!(parse_input(&deck), Err(LodestoneError::Input(_))));
    }

    #[test]
    fn test_bad_triangle() {
        let deck = DECK.replace("[[0, 1, 2]]", "[[0, 1]]");
        assert!(matches!(parse_input(&deck), Err(LodestoneError::Input(_))));
    }

    #[test]
    fn test_field_missing_on_a_body() {
        let deck = r#"{
            "metadata": { "boundary": "skin" },
            "bodies": [
                { "faces": [], "fields": { "pressure": [[1.0]] } },
                { "faces": [] }
            ]
        }"#;
        assert!(matches!(parse_input(deck), Err(LodestoneError::Input(_))));

        let deck = deck.replace(
            r#"{ "faces": [] }"#,
            r#"{ "faces": [], "fields": { "pressure": [[1.0, 2.0]] } }"#,
        );
        assert!(matches!(parse_input(&deck), Err(LodestoneError::Input(_))));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(parse_input("{ nope"), Err(LodestoneError::Input(_))));
    }

    #[test]
    fn test_missing_input_file() {
        assert!(matches!(
            load_input_file("/nonexistent/deck.json"),
            Err(LodestoneError::Input(_))
        ));
    }
}
