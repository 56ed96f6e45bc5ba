//! pdfmark PDF Library
//!
//! Round-trips highlights through native PDF annotations: text highlights
//! become `Highlight` annotations with quad points, area highlights become
//! borderless `Square` annotations. Both carry an appearance stream.

mod appearance;
mod error;
mod export;
mod import;
pub mod page;

pub use error::{CodecError, CodecResult};
pub use export::{ExportReport, export_highlights, export_to_document, export_with_report};
pub use import::{ImportReport, import_from_document, import_highlights};
