use serde::{Deserialize, Serialize};

use crate::{entities::Block, stats::DocumentStats};

pub mod index;
pub mod repetition;
pub mod table;

use index::NeighborIndex;
use repetition::{find_repeated_positions, RepetitionConfig};
use table::{TableClassifier, TableSignal, TableThresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    HeaderFooter,
    Table,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedBlock {
    pub block: Block,
    pub reason: ExclusionReason,
}

/// Tunables for one filtering pass. The stage order is fixed; only the
/// thresholds inside each stage move.
#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    pub repetition: RepetitionConfig,
    pub table: TableThresholds,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilteredResult {
    /// Surviving blocks, in input order.
    pub kept: Vec<Block>,
    /// Dropped blocks with the first reason that applied, in input order.
    pub excluded: Vec<ExcludedBlock>,
    /// Page count actually used.
    pub num_pages: usize,
    pub stats: DocumentStats,
    /// Malformed blocks skipped by every detector. They are part of `kept`.
    pub malformed: usize,
}

impl FilteredResult {
    pub fn count(&self, reason: ExclusionReason) -> usize {
        self.excluded.iter().filter(|e| e.reason == reason).count()
    }
}

/// Page count the pipeline runs with: the caller's value, unless it can't
/// hold the pages the blocks claim to be on.
pub fn effective_num_pages(blocks: &[Block], num_pages: usize) -> usize {
    match blocks.iter().map(|b| b.page_id).max() {
        Some(max_page) if max_page >= num_pages => {
            let pages = max_page.saturating_add(1);
            tracing::warn!(
                "num_pages={num_pages} but blocks reference page {max_page}, using {pages}"
            );
            pages
        }
        _ => num_pages,
    }
}

/// Drops running headers/footers and table cells from a document's blocks.
///
/// Stages run in a fixed order: repetition detection over the whole set, then
/// table classification of every block not already excluded, repeated over the
/// survivors until no new cell shows up. A block carries at most one reason,
/// the first stage to claim it wins. Kept and excluded blocks come out in their
/// input order, untouched. Filtering the kept blocks again with the same stats
/// and page count excludes nothing.
///
/// When `doc_stats` is `None` they are computed from `blocks`.
#[tracing::instrument(skip_all, fields(blocks = blocks.len()))]
pub fn filter_blocks(
    blocks: Vec<Block>,
    num_pages: usize,
    doc_stats: Option<DocumentStats>,
    config: &FilterConfig,
) -> FilteredResult {
    let num_pages = effective_num_pages(&blocks, num_pages);
    let stats = doc_stats.unwrap_or_else(|| DocumentStats::compute(&blocks, num_pages));

    let malformed = blocks.iter().filter(|b| b.is_malformed()).count();
    if malformed > 0 {
        tracing::warn!("{malformed} malformed blocks skipped by the classifiers");
    }

    let mut reasons: Vec<Option<ExclusionReason>> = vec![None; blocks.len()];

    for idx in find_repeated_positions(&blocks, num_pages, &stats, &config.repetition) {
        reasons[idx] = Some(ExclusionReason::HeaderFooter);
    }

    // Dropping a cell can turn two survivors into neighbors, so the table
    // stage reruns over the survivors until the kept set is stable.
    let mut table_passes = 0;
    loop {
        table_passes += 1;
        let index = NeighborIndex::build_masked(&blocks, |idx| reasons[idx].is_none());
        let classifier = TableClassifier::with_index(&blocks, index, &stats, &config.table);
        let flagged: Vec<(usize, TableSignal)> = (0..blocks.len())
            .filter(|idx| reasons[*idx].is_none())
            .filter_map(|idx| classifier.classify(idx).map(|signal| (idx, signal)))
            .collect();
        if flagged.is_empty() {
            break;
        }
        for (idx, signal) in flagged {
            tracing::trace!("block {idx} is table content ({signal:?}), pass {table_passes}");
            reasons[idx] = Some(ExclusionReason::Table);
        }
    }
    if table_passes > 2 {
        tracing::debug!("table stage settled after {table_passes} passes");
    }

    let mut kept = Vec::with_capacity(blocks.len());
    let mut excluded = Vec::new();
    for (block, reason) in blocks.into_iter().zip(reasons) {
        match reason {
            Some(reason) => excluded.push(ExcludedBlock { block, reason }),
            None => kept.push(block),
        }
    }

    let result = FilteredResult {
        kept,
        excluded,
        num_pages,
        stats,
        malformed,
    };
    tracing::debug!(
        "kept {} blocks, excluded {} header/footer and {} table blocks",
        result.kept.len(),
        result.count(ExclusionReason::HeaderFooter),
        result.count(ExclusionReason::Table),
    );
    result
}
