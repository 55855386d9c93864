use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use plsfix::fix_text;
use serde::{Deserialize, Serialize};

use crate::{
    entities::{BBox, Block, PageID},
    stats::DocumentStats,
};

/// Top fraction of the page height where running headers live.
pub const HEADER_BAND: f32 = 0.15;
/// Bottom fraction of the page height where running footers live.
pub const FOOTER_BAND: f32 = 0.15;
/// Fraction of the document's pages a text must recur on.
pub const MIN_PAGE_FRACTION: f32 = 0.5;
/// Absolute floor on the number of pages, so that short documents need real
/// cross-page evidence.
pub const MIN_REPEAT_PAGES: usize = 2;
pub const MIN_CANDIDATE_TEXT_LEN: usize = 3;
pub const MAX_CANDIDATE_TEXT_LEN: usize = 79;
/// Blocks set larger than this multiple of the median font size are headings,
/// never running headers.
pub const HEADING_FONT_RATIO: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionBand {
    Header,
    Footer,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RepetitionConfig {
    pub header_band: f32,
    pub footer_band: f32,
    pub min_page_fraction: f32,
    pub min_pages: usize,
    pub min_text_len: usize,
    pub max_text_len: usize,
    pub heading_font_ratio: f32,
}

impl Default for RepetitionConfig {
    fn default() -> Self {
        Self {
            header_band: HEADER_BAND,
            footer_band: FOOTER_BAND,
            min_page_fraction: MIN_PAGE_FRACTION,
            min_pages: MIN_REPEAT_PAGES,
            min_text_len: MIN_CANDIDATE_TEXT_LEN,
            max_text_len: MAX_CANDIDATE_TEXT_LEN,
            heading_font_ratio: HEADING_FONT_RATIO,
        }
    }
}

impl RepetitionConfig {
    /// Number of distinct pages a group must cover to be flagged.
    pub fn required_pages(&self, num_pages: usize) -> usize {
        let fraction = (num_pages as f32 * self.min_page_fraction).ceil() as usize;
        fraction.max(self.min_pages)
    }

    /// The band is decided on the block's top edge only, so a block taller than
    /// the page body still lands in a single band.
    pub fn band(&self, bbox: &BBox, page_height: f32) -> Option<PositionBand> {
        if bbox.y0 < page_height * self.header_band {
            Some(PositionBand::Header)
        } else if bbox.y0 > page_height * (1f32 - self.footer_band) {
            Some(PositionBand::Footer)
        } else {
            None
        }
    }
}

/// A text recurring in the same band across enough pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatedGroup {
    pub text: String,
    pub band: PositionBand,
    pub pages: Vec<PageID>,
    pub blocks: Vec<usize>,
}

/// Case-folded, whitespace-collapsed text used as the grouping key.
pub fn normalize_text(text: &str) -> String {
    fix_text(text, None)
        .to_lowercase()
        .split_whitespace()
        .join(" ")
}

fn candidate_key(
    block: &Block,
    stats: &DocumentStats,
    config: &RepetitionConfig,
) -> Option<(String, PositionBand)> {
    let bbox = block.geometry()?;
    let band = config.band(bbox, block.page_height())?;

    let text = normalize_text(&block.text());
    let len = text.chars().count();
    if len < config.min_text_len || len > config.max_text_len {
        return None;
    }
    // Bare page numbers change from page to page anyway
    if text.chars().all(char::is_numeric) {
        return None;
    }
    if !block.is_ocr() {
        if let Some(size) = block.avg_font_size() {
            if size > stats.median_font_size * config.heading_font_ratio {
                return None;
            }
        }
    }
    Some((text, band))
}

/// Groups of blocks that behave like running headers or footers, ordered by
/// their first block.
#[tracing::instrument(skip_all)]
pub fn find_repeated_groups(
    blocks: &[Block],
    num_pages: usize,
    stats: &DocumentStats,
    config: &RepetitionConfig,
) -> Vec<RepeatedGroup> {
    // A single page gives no cross-page evidence
    if num_pages < config.min_pages.max(2) {
        return Vec::new();
    }
    let required = config.required_pages(num_pages);

    let mut groups: HashMap<(String, PositionBand), Vec<usize>> = HashMap::new();
    for (idx, block) in blocks.iter().enumerate() {
        if let Some(key) = candidate_key(block, stats, config) {
            groups.entry(key).or_default().push(idx);
        }
    }

    let repeated: Vec<RepeatedGroup> = groups
        .into_iter()
        .filter_map(|((text, band), members)| {
            let pages: Vec<PageID> = members
                .iter()
                .map(|idx| blocks[*idx].page_id)
                .sorted()
                .dedup()
                .collect();
            (pages.len() >= required).then_some(RepeatedGroup {
                text,
                band,
                pages,
                blocks: members,
            })
        })
        .sorted_by_key(|g| g.blocks[0])
        .collect();

    for group in &repeated {
        tracing::debug!(
            "repeated {:?} text {:?} on {}/{num_pages} pages",
            group.band,
            group.text,
            group.pages.len(),
        );
    }
    repeated
}

/// Indices of every block that belongs to a running header or footer group.
pub fn find_repeated_positions(
    blocks: &[Block],
    num_pages: usize,
    stats: &DocumentStats,
    config: &RepetitionConfig,
) -> HashSet<usize> {
    find_repeated_groups(blocks, num_pages, stats, config)
        .into_iter()
        .flat_map(|g| g.blocks)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BlockSource, Line};

    const PAGE_HEIGHT: f32 = 842.0;

    fn block(page_id: PageID, y0: f32, text: &str, size: f32) -> Block {
        Block::new(
            page_id,
            BBox {
                x0: 72.0,
                y0,
                x1: 400.0,
                y1: y0 + size,
            },
            vec![Line::from_text(text, size)],
        )
        .with_page_size(595.0, PAGE_HEIGHT)
    }

    fn stats() -> DocumentStats {
        DocumentStats {
            median_font_size: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  ACME   Corp\n Annual\tReport "), "acme corp annual report");
    }

    #[test]
    fn test_bands() {
        let config = RepetitionConfig::default();
        let at = |y0: f32| BBox::new(0.0, y0, 10.0, y0 + 10.0);

        assert_eq!(config.band(&at(20.0), PAGE_HEIGHT), Some(PositionBand::Header));
        assert_eq!(config.band(&at(400.0), PAGE_HEIGHT), None);
        assert_eq!(config.band(&at(800.0), PAGE_HEIGHT), Some(PositionBand::Footer));
        // Spans the whole page: header only
        let tall = BBox::new(0.0, 10.0, 10.0, 830.0);
        assert_eq!(config.band(&tall, PAGE_HEIGHT), Some(PositionBand::Header));
    }

    #[test]
    fn test_required_pages() {
        let config = RepetitionConfig::default();
        assert_eq!(config.required_pages(2), 2);
        assert_eq!(config.required_pages(3), 2);
        assert_eq!(config.required_pages(10), 5);
        assert_eq!(config.required_pages(11), 6);
    }

    #[test]
    fn test_running_header_and_footer() {
        let mut blocks = Vec::new();
        for page in 0..4 {
            blocks.push(block(page, 20.0, "ACME Corp  Annual Report", 9.0));
            blocks.push(block(page, 300.0, "Some body text that is unique", 10.0));
            blocks.push(block(page, 810.0, "Confidential", 9.0));
        }
        let groups = find_repeated_groups(&blocks, 4, &stats(), &RepetitionConfig::default());

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].band, PositionBand::Header);
        assert_eq!(groups[0].text, "acme corp annual report");
        assert_eq!(groups[0].pages, vec![0, 1, 2, 3]);
        assert_eq!(groups[1].band, PositionBand::Footer);

        let flagged = find_repeated_positions(&blocks, 4, &stats(), &RepetitionConfig::default());
        assert_eq!(flagged, HashSet::from([0, 2, 3, 5, 6, 8, 9, 11]));
    }

    #[test]
    fn test_same_text_in_body_is_not_grouped() {
        let blocks = vec![
            block(0, 20.0, "Revision history", 9.0),
            block(1, 400.0, "Revision history", 9.0),
        ];
        let flagged = find_repeated_positions(&blocks, 2, &stats(), &RepetitionConfig::default());
        assert!(flagged.is_empty());
    }

    #[test]
    fn test_below_page_fraction() {
        let mut blocks = Vec::new();
        for page in 0..6 {
            blocks.push(block(page, 300.0, "Body paragraph text", 10.0));
        }
        blocks.push(block(0, 20.0, "Chapter One Summary", 9.0));
        blocks.push(block(1, 20.0, "Chapter One Summary", 9.0));
        // 2 of 6 pages, 3 required
        let flagged = find_repeated_positions(&blocks, 6, &stats(), &RepetitionConfig::default());
        assert!(flagged.is_empty());
    }

    #[test]
    fn test_single_page_never_triggers() {
        let blocks = vec![
            block(0, 10.0, "Draft copy", 9.0),
            block(0, 30.0, "Draft copy", 9.0),
        ];
        let flagged = find_repeated_positions(&blocks, 1, &stats(), &RepetitionConfig::default());
        assert!(flagged.is_empty());
    }

    #[test]
    fn test_page_numbers_and_short_text_skipped() {
        let blocks = vec![
            block(0, 815.0, "12", 9.0),
            block(1, 815.0, "12", 9.0),
            block(0, 20.0, "ab", 9.0),
            block(1, 20.0, "ab", 9.0),
        ];
        let flagged = find_repeated_positions(&blocks, 2, &stats(), &RepetitionConfig::default());
        assert!(flagged.is_empty());
    }

    #[test]
    fn test_large_headings_are_protected() {
        let blocks = vec![
            block(0, 20.0, "Executive Summary", 16.0),
            block(1, 20.0, "Executive Summary", 16.0),
        ];
        let flagged = find_repeated_positions(&blocks, 2, &stats(), &RepetitionConfig::default());
        assert!(flagged.is_empty());

        // OCR font sizes are synthetic, no protection
        let blocks: Vec<Block> = blocks
            .into_iter()
            .map(|b| b.with_source(BlockSource::Ocr))
            .collect();
        let flagged = find_repeated_positions(&blocks, 2, &stats(), &RepetitionConfig::default());
        assert_eq!(flagged.len(), 2);
    }

    #[test]
    fn test_malformed_blocks_ignored() {
        let mut malformed = block(1, 20.0, "Quarterly Report", 9.0);
        malformed.bbox = None;
        let blocks = vec![block(0, 20.0, "Quarterly Report", 9.0), malformed];
        let flagged = find_repeated_positions(&blocks, 2, &stats(), &RepetitionConfig::default());
        assert!(flagged.is_empty());
    }
}
