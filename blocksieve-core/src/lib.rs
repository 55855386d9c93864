//! Block filtering front-end for heading inference.
//!
//! Takes the text blocks an extractor produced for a document, characterizes
//! the document (spacing, font sizes, page size), and drops the blocks that
//! would only add noise downstream: running headers/footers repeated across
//! pages and short, irregularly aligned table cells.
//!
//! ```
//! use blocksieve_core::{
//!     entities::{BBox, Block, Line},
//!     filter::{filter_blocks, FilterConfig},
//! };
//!
//! let blocks = vec![Block::new(
//!     0,
//!     BBox::new(72.0, 100.0, 500.0, 112.0),
//!     vec![Line::from_text("1. Introduction to the problem space", 14.0)],
//! )];
//! let result = filter_blocks(blocks, 1, None, &FilterConfig::default());
//! assert_eq!(result.kept.len(), 1);
//! ```

pub mod entities;
pub mod filter;
pub mod stats;

pub use entities::{BBox, Block, BlockSource, Line, PageID, Span};
pub use filter::{filter_blocks, ExcludedBlock, ExclusionReason, FilterConfig, FilteredResult};
pub use stats::DocumentStats;
