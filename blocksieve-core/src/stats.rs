use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::entities::{BBox, Block, DEFAULT_PAGE_HEIGHT, DEFAULT_PAGE_WIDTH};

/// Spacing used when the document doesn't give at least
/// [`MIN_SPACING_SAMPLES`] gaps to average over.
pub const DEFAULT_LINE_SPACING: f32 = 12.0;
pub const DEFAULT_BLOCK_HEIGHT: f32 = 12.0;
pub const DEFAULT_FONT_SIZE: f32 = 12.0;

pub const MIN_SPACING_SAMPLES: usize = 2;

/// Document-wide baselines shared by every detector.
///
/// Computed once per document and passed by value; it is never updated while
/// the document is being filtered.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct DocumentStats {
    pub average_line_spacing: f32,
    pub average_block_height: f32,
    pub median_font_size: f32,
    pub page_width: f32,
    pub page_height: f32,
    pub spacing_samples: usize,
}

impl Default for DocumentStats {
    fn default() -> Self {
        Self {
            average_line_spacing: DEFAULT_LINE_SPACING,
            average_block_height: DEFAULT_BLOCK_HEIGHT,
            median_font_size: DEFAULT_FONT_SIZE,
            page_width: DEFAULT_PAGE_WIDTH,
            page_height: DEFAULT_PAGE_HEIGHT,
            spacing_samples: 0,
        }
    }
}

impl DocumentStats {
    #[tracing::instrument(skip_all)]
    pub fn compute(blocks: &[Block], num_pages: usize) -> Self {
        let well_formed: Vec<(&Block, &BBox)> = blocks
            .iter()
            .filter_map(|b| b.geometry().map(|bbox| (b, bbox)))
            .collect();

        let gaps = page_gaps(&well_formed);
        let average_line_spacing = if gaps.len() >= MIN_SPACING_SAMPLES {
            mean(&gaps).max(0f32)
        } else {
            DEFAULT_LINE_SPACING
        };

        let heights: Vec<f32> = well_formed
            .iter()
            .map(|(_, bbox)| bbox.height())
            .filter(|h| *h > 0f32)
            .collect();
        let average_block_height = if heights.is_empty() {
            DEFAULT_BLOCK_HEIGHT
        } else {
            mean(&heights)
        };

        let font_sizes: Vec<f32> = well_formed
            .iter()
            .filter(|(b, _)| !b.is_ocr())
            .flat_map(|(b, _)| b.spans().map(|s| s.size))
            .filter(|s| s.is_finite() && *s > 0f32)
            .sorted_by(f32::total_cmp)
            .collect();
        let median_font_size = font_sizes
            .get(font_sizes.len() / 2)
            .copied()
            .unwrap_or(DEFAULT_FONT_SIZE);

        let (page_width, page_height) = if well_formed.is_empty() {
            (DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT)
        } else {
            well_formed.iter().fold((0f32, 0f32), |(w, h), (b, _)| {
                (w.max(b.page_width()), h.max(b.page_height()))
            })
        };

        let stats = Self {
            average_line_spacing,
            average_block_height,
            median_font_size,
            page_width,
            page_height,
            spacing_samples: gaps.len(),
        };
        tracing::debug!(
            "document stats over {} blocks / {num_pages} pages: spacing={:.2} ({} samples), block_height={:.2}, median_font={:.2}",
            well_formed.len(),
            stats.average_line_spacing,
            stats.spacing_samples,
            stats.average_block_height,
            stats.median_font_size,
        );
        stats
    }
}

/// Non-negative gaps between vertically consecutive blocks of the same page.
fn page_gaps(blocks: &[(&Block, &BBox)]) -> Vec<f32> {
    blocks
        .iter()
        .sorted_by(|(a, a_bbox), (b, b_bbox)| {
            a.page_id
                .cmp(&b.page_id)
                .then(a_bbox.y0.total_cmp(&b_bbox.y0))
                .then(a_bbox.x0.total_cmp(&b_bbox.x0))
        })
        .tuple_windows()
        .filter(|((prev, _), (next, _))| prev.page_id == next.page_id)
        .map(|((_, prev), (_, next))| prev.vertical_gap(next))
        .filter(|gap| *gap >= 0f32)
        .collect()
}

#[inline]
fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}
