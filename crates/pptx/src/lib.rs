//! PPTX (Office Open XML) deck assembly.
//!
//! Builds .pptx files, which are ZIP archives of XML parts: a presentation
//! part wiring together slide masters, layouts, a theme, and one part per
//! slide. The assembler either imports the structural parts from a template
//! package or falls back to an embedded blank scaffold, then generates the
//! slide parts from an outline.

pub mod builder;
mod package;

pub use builder::{generation_stamp, DeckBuilder, DeckError, PPTX_CONTENT_TYPE};
