//! Format decoders: raw upstream bytes to normalized record lists.
//!
//! Decoders are pure and stateless; they never touch the network or storage.
//! Shape validation of the decoded records happens downstream in
//! [`crate::validate`].

pub mod bulk_csv;
pub mod sdmx;

pub use bulk_csv::{decode_bulk_csv, BulkTable};
pub use sdmx::decode_sdmx;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("no observation path found in document")]
    NoObservations,
    #[error("bulk table header row not found in first {0} rows")]
    MissingHeader(usize),
    #[error("bulk table has no year columns")]
    NoYearColumns,
}
