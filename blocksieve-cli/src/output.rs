use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use blocksieve_core::{Block, DocumentStats, ExcludedBlock, ExclusionReason, FilteredResult};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterSummary {
    pub header_footer: usize,
    pub table: usize,
    pub malformed: usize,
    pub kept: usize,
}

impl From<&FilteredResult> for FilterSummary {
    fn from(result: &FilteredResult) -> Self {
        Self {
            header_footer: result.count(ExclusionReason::HeaderFooter),
            table: result.count(ExclusionReason::Table),
            malformed: result.malformed,
            kept: result.kept.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FilterMetadata {
    #[serde(rename = "duration_ms", with = "serde_millis")]
    pub filtering_duration: Duration,
    pub blocksieve_version: &'static str,
}

impl FilterMetadata {
    pub fn new(filtering_duration: Duration) -> Self {
        Self {
            filtering_duration,
            blocksieve_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FilteredDocument<'a> {
    pub doc_name: &'a str,
    pub num_pages: usize,
    pub stats: &'a DocumentStats,
    pub kept: &'a [Block],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded: Option<&'a [ExcludedBlock]>,
    pub summary: FilterSummary,
    pub metadata: FilterMetadata,
}

impl<'a> FilteredDocument<'a> {
    pub fn new(
        doc_name: &'a str,
        result: &'a FilteredResult,
        keep_excluded: bool,
        filtering_duration: Duration,
    ) -> Self {
        Self {
            doc_name,
            num_pages: result.num_pages,
            stats: &result.stats,
            kept: &result.kept,
            excluded: keep_excluded.then_some(result.excluded.as_slice()),
            summary: FilterSummary::from(result),
            metadata: FilterMetadata::new(filtering_duration),
        }
    }
}

/// File stem for a document: whitespace becomes `_`, path separators and
/// other punctuation become `-`, so a dump name never escapes `output_dir`.
fn output_file_stem(doc_name: &str) -> String {
    let stem: String = doc_name
        .trim()
        .chars()
        .map(|c| match c {
            c if c.is_alphanumeric() || c == '-' || c == '_' => c,
            c if c.is_whitespace() => '_',
            _ => '-',
        })
        .collect();
    if stem.is_empty() {
        "document".to_owned()
    } else {
        stem
    }
}

/// Writes `<doc_name>.json` into `output_dir` and returns its path.
pub fn save_filtered_document(
    doc: &FilteredDocument,
    output_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let file_out = output_dir.join(format!("{}.json", output_file_stem(doc.doc_name)));
    let file = File::create(&file_out)
        .with_context(|| format!("can't create output file {}", file_out.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, doc)?;
    writer.flush()?;
    Ok(file_out)
}
