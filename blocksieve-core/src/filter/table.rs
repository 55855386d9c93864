use serde::{Deserialize, Serialize};

use super::index::NeighborIndex;
use crate::{
    entities::{BBox, Block},
    stats::DocumentStats,
};

/// Blocks with at least this many characters are treated as prose.
pub const TABLE_MAX_TEXT_LEN: usize = 30;
/// A block starting further right than this fraction of the page width sits
/// in a non-standard column.
pub const TABLE_INDENT_RATIO: f32 = 0.2;
/// Fraction of the document's average spacing under which two blocks are
/// considered tightly packed.
pub const TABLE_TIGHT_SPACING_RATIO: f32 = 0.8;
/// Fraction of the page width by which tightly packed neighbors must disagree
/// on their left edge.
pub const TABLE_ALIGNMENT_DELTA_RATIO: f32 = 0.1;

/// How the indent signal and the neighbor signal combine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TablePolicy {
    /// Either signal alone flags the block.
    #[default]
    AnySignal,
    /// Both signals must hold. Keeps indented prose (block quotes, centered
    /// short lines) at the cost of missing loosely spaced tables.
    RequireBoth,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TableThresholds {
    pub max_text_len: usize,
    pub indent_ratio: f32,
    pub tight_spacing_ratio: f32,
    pub alignment_delta_ratio: f32,
    pub policy: TablePolicy,
}

impl Default for TableThresholds {
    fn default() -> Self {
        Self {
            max_text_len: TABLE_MAX_TEXT_LEN,
            indent_ratio: TABLE_INDENT_RATIO,
            tight_spacing_ratio: TABLE_TIGHT_SPACING_RATIO,
            alignment_delta_ratio: TABLE_ALIGNMENT_DELTA_RATIO,
            policy: TablePolicy::AnySignal,
        }
    }
}

/// The signature that made a block look like a table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSignal {
    Indent,
    TightMisaligned,
    Both,
}

/// Per-document table detector. Holds the neighbor index so that each
/// decision is a constant number of lookups.
pub struct TableClassifier<'a> {
    blocks: &'a [Block],
    index: NeighborIndex,
    stats: DocumentStats,
    thresholds: TableThresholds,
}

impl<'a> TableClassifier<'a> {
    pub fn new(blocks: &'a [Block], stats: &DocumentStats, thresholds: &TableThresholds) -> Self {
        Self::with_index(blocks, NeighborIndex::build(blocks), stats, thresholds)
    }

    /// Classifier over a prebuilt index, e.g. one restricted to the blocks
    /// still alive in the pipeline.
    pub fn with_index(
        blocks: &'a [Block],
        index: NeighborIndex,
        stats: &DocumentStats,
        thresholds: &TableThresholds,
    ) -> Self {
        Self {
            blocks,
            index,
            stats: *stats,
            thresholds: *thresholds,
        }
    }

    pub fn is_table_block(&self, idx: usize) -> bool {
        self.classify(idx).is_some()
    }

    /// Runs the gates in order: OCR exemption, text length, then the indent
    /// and neighbor signals combined according to the policy.
    pub fn classify(&self, idx: usize) -> Option<TableSignal> {
        let block = self.blocks.get(idx)?;
        let bbox = block.geometry()?;

        // OCR geometry is too noisy for alignment heuristics
        if block.is_ocr() {
            return None;
        }
        if block.text_len() >= self.thresholds.max_text_len {
            return None;
        }

        let page_width = block.page_width();
        let indented = bbox.x0 > page_width * self.thresholds.indent_ratio;

        match self.thresholds.policy {
            TablePolicy::AnySignal => {
                if indented {
                    Some(TableSignal::Indent)
                } else if self.tight_and_misaligned(idx, block, bbox) {
                    Some(TableSignal::TightMisaligned)
                } else {
                    None
                }
            }
            TablePolicy::RequireBoth => {
                if indented && self.tight_and_misaligned(idx, block, bbox) {
                    Some(TableSignal::Both)
                } else {
                    None
                }
            }
        }
    }

    fn tight_and_misaligned(&self, idx: usize, block: &Block, bbox: &BBox) -> bool {
        let tight_gap = self.stats.average_line_spacing * self.thresholds.tight_spacing_ratio;
        let min_shift = block.page_width() * self.thresholds.alignment_delta_ratio;

        let neighbors = self.index.get(idx);
        let above = neighbors
            .prev
            .and_then(|n| self.blocks[n].geometry())
            .map(|prev| (prev.vertical_gap(bbox), prev));
        let below = neighbors
            .next
            .and_then(|n| self.blocks[n].geometry())
            .map(|next| (bbox.vertical_gap(next), next));

        above
            .into_iter()
            .chain(below)
            .any(|(gap, other)| gap < tight_gap && bbox.horizontal_offset(other) > min_shift)
    }
}

/// One-shot form of [`TableClassifier::is_table_block`] for the block at
/// `idx` in `blocks`. Builds the neighbor index on every call: use
/// [`TableClassifier`] when classifying a whole document.
pub fn is_table_block(
    idx: usize,
    blocks: &[Block],
    doc_stats: &DocumentStats,
    thresholds: &TableThresholds,
) -> bool {
    TableClassifier::new(blocks, doc_stats, thresholds).is_table_block(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BlockSource, Line};

    const PAGE_WIDTH: f32 = 595.0;

    fn block(x0: f32, y0: f32, y1: f32, text: &str) -> Block {
        Block::new(
            0,
            BBox {
                x0,
                y0,
                x1: x0 + 100.0,
                y1,
            },
            vec![Line::from_text(text, 10.0)],
        )
        .with_page_size(PAGE_WIDTH, 842.0)
    }

    fn stats(spacing: f32) -> DocumentStats {
        DocumentStats {
            average_line_spacing: spacing,
            ..Default::default()
        }
    }

    #[test]
    fn test_classifier_outlives_its_arguments() {
        let blocks = vec![block(PAGE_WIDTH * 0.5, 100.0, 110.0, "42")];
        let classifier = {
            let stats = stats(10.0);
            let thresholds = TableThresholds::default();
            TableClassifier::new(&blocks, &stats, &thresholds)
        };

        assert_eq!(classifier.classify(0), Some(TableSignal::Indent));
    }

    #[test]
    fn test_indent_signal() {
        let blocks = vec![block(PAGE_WIDTH * 0.25, 100.0, 110.0, "Q3 revenue")];
        let classifier = TableClassifier::new(&blocks, &stats(10.0), &TableThresholds::default());

        assert_eq!(classifier.classify(0), Some(TableSignal::Indent));
    }

    #[test]
    fn test_indent_threshold_is_strict() {
        let thresholds = TableThresholds::default();
        let blocks = vec![block(PAGE_WIDTH * 0.2, 100.0, 110.0, "Q3 revenue")];

        assert!(!is_table_block(0, &blocks, &stats(10.0), &thresholds));
    }

    #[test]
    fn test_length_gate() {
        let thresholds = TableThresholds::default();
        let thirty = "a".repeat(30);
        let blocks = vec![block(PAGE_WIDTH * 0.5, 100.0, 110.0, &thirty)];
        assert!(!is_table_block(0, &blocks, &stats(10.0), &thresholds));

        let twenty_nine = "a".repeat(29);
        let blocks = vec![block(PAGE_WIDTH * 0.25, 100.0, 110.0, &twenty_nine)];
        assert!(is_table_block(0, &blocks, &stats(10.0), &thresholds));
    }

    #[test]
    fn test_ocr_blocks_are_exempt() {
        let blocks = vec![
            block(72.0, 100.0, 110.0, "Name"),
            block(PAGE_WIDTH * 0.6, 100.5, 110.0, "Qty").with_source(BlockSource::Ocr),
            block(72.0, 111.0, 120.0, "Bolts"),
        ];
        let classifier = TableClassifier::new(&blocks, &stats(10.0), &TableThresholds::default());

        assert!(!classifier.is_table_block(1));
    }

    #[test]
    fn test_tight_misaligned_neighbors() {
        let blocks = vec![
            block(20.0, 100.0, 110.0, "Item"),
            // 2pt below its predecessor and shifted right by 80pt (> 59.5)
            block(100.0, 112.0, 122.0, "Price"),
        ];
        let classifier = TableClassifier::new(&blocks, &stats(10.0), &TableThresholds::default());

        assert_eq!(classifier.classify(1), Some(TableSignal::TightMisaligned));
        assert_eq!(classifier.classify(0), Some(TableSignal::TightMisaligned));
    }

    #[test]
    fn test_tight_but_aligned_is_prose() {
        let blocks = vec![
            block(72.0, 100.0, 110.0, "Item"),
            block(80.0, 112.0, 122.0, "Price"),
        ];
        let classifier = TableClassifier::new(&blocks, &stats(10.0), &TableThresholds::default());

        assert!(!classifier.is_table_block(0));
        assert!(!classifier.is_table_block(1));
    }

    #[test]
    fn test_loose_and_misaligned_is_prose() {
        let blocks = vec![
            block(10.0, 100.0, 110.0, "Item"),
            // 9pt gap, above 80% of the spacing
            block(100.0, 119.0, 129.0, "Price"),
        ];
        let classifier = TableClassifier::new(&blocks, &stats(10.0), &TableThresholds::default());

        assert!(!classifier.is_table_block(1));
    }

    #[test]
    fn test_neighbors_on_other_pages_are_ignored() {
        let mut other_page = block(10.0, 100.0, 110.0, "Item");
        other_page.page_id = 1;
        let blocks = vec![other_page, block(100.0, 111.0, 121.0, "Price")];
        let classifier = TableClassifier::new(&blocks, &stats(10.0), &TableThresholds::default());

        assert!(!classifier.is_table_block(1));
    }

    #[test]
    fn test_require_both_policy() {
        let thresholds = TableThresholds {
            policy: TablePolicy::RequireBoth,
            ..Default::default()
        };
        // Indented block quote, nothing tight around it
        let quote = vec![
            block(72.0, 100.0, 110.0, "Body"),
            block(PAGE_WIDTH * 0.3, 140.0, 150.0, "A short quote"),
        ];
        assert!(!is_table_block(1, &quote, &stats(10.0), &thresholds));

        let table = vec![
            block(72.0, 100.0, 110.0, "Region"),
            block(PAGE_WIDTH * 0.3, 101.0, 110.0, "Sales"),
        ];
        let classifier = TableClassifier::new(&table, &stats(10.0), &thresholds);
        assert_eq!(classifier.classify(1), Some(TableSignal::Both));
    }

    #[test]
    fn test_malformed_and_out_of_range() {
        let mut malformed = block(PAGE_WIDTH * 0.5, 100.0, 110.0, "x");
        malformed.bbox = None;
        let blocks = vec![malformed];
        let classifier = TableClassifier::new(&blocks, &stats(10.0), &TableThresholds::default());

        assert!(!classifier.is_table_block(0));
        assert!(!classifier.is_table_block(7));
    }
}
