//! Conversion between the flat tabular exchange format and the
//! hierarchical network model.
//!
//! The import direction validates substation blocks, materializes
//! node-breaker (or fallback bus-breaker) topology per voltage level and
//! converts equipment parameters to engineering units. The export
//! direction flattens voltage levels back to coarse buses, substation
//! blocks and raw records. Both directions iterate in fixed total orders
//! so the same input always produces byte-identical output.

pub mod context;
pub mod export;
pub mod import;
pub mod reader;
pub mod records;
pub mod writer;

pub use context::PerUnitContext;
pub use export::export_network;
pub use import::import_case;
pub use reader::{parse_case, read_case_file};
pub use records::RawCase;
pub use writer::{write_case_file, write_case_string};
