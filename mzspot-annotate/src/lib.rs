//! Spectral library annotation of aligned peaks.
//!
//! A [`ReferenceLibrary`] of [`MoleculeMsReference`] entries is read from an
//! MSP file ([`msp`]) or a tab separated compound list ([`textdb`]) and
//! searched through an [`Annotator`]. [`annotate_spots`] applies an annotator
//! to every spot of an alignment.
pub mod annotator;
pub mod error;
pub mod library;
pub mod msp;
pub mod params;
pub mod reference;
pub mod textdb;

pub use annotator::{
    annotate_features, annotate_spots, secondary_key_for, AnnotatingPeakSource, Annotator, MsQuery,
    MspAnnotator, TextDbAnnotator,
};
pub use error::AnnotationError;
pub use library::{ReferenceLibrary, SecondaryKey};
pub use msp::{read_msp, read_msp_file};
pub use params::MsRefSearchParameter;
pub use reference::MoleculeMsReference;
pub use textdb::{read_textdb, read_textdb_file};
