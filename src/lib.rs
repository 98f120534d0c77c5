pub mod config;
pub mod datatypes;
pub mod discretization;
pub mod driver;
pub mod error;
pub mod locator;
pub mod tessellation;
pub mod transfer;
pub mod transfer_file;

pub use datatypes::{BoundaryKind, BoundaryTable, Element, FieldData, Vertex};
pub use discretization::{build, build_single_body, Discretization};
pub use error::LodestoneError;
pub use locator::{locate, locate_on_face, Location};
pub use tessellation::{TessellatedBody, TessellatedFace, Tessellation};
pub use transfer::{integrate, integrate_bar, interpolate, interpolate_bar};
pub use transfer_file::{read_transfer_file, write_transfer_file, TransferDataset};
