use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::Context;
use blocksieve_core::Block;
use memmap2::Mmap;
use serde::Deserialize;
use uuid::Uuid;

/// On-disk shape of a block dump: either the bare block list or an object
/// carrying the page count along.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BlockDump {
    Document {
        #[serde(default)]
        num_pages: Option<usize>,
        blocks: Vec<Block>,
    },
    Blocks(Vec<Block>),
}

#[derive(Debug)]
pub struct InputDocument {
    pub doc_name: String,
    pub path: PathBuf,
    pub num_pages: usize,
    pub blocks: Vec<Block>,
}

/// Expands directories into their `*.json` files, sorted by path. Files are
/// taken as given.
pub fn collect_inputs(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut files = std::fs::read_dir(path)
                .with_context(|| format!("can't read input directory {}", path.display()))?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
                .collect::<Vec<_>>();
            files.sort();
            if files.is_empty() {
                tracing::warn!("no json file in {}", path.display());
            }
            inputs.extend(files);
        } else {
            inputs.push(path.to_owned());
        }
    }
    Ok(inputs)
}

pub fn doc_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .filter(|name| !name.is_empty())
        .map(|s| s.to_owned())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Page count implied by the blocks themselves.
pub fn derive_num_pages(blocks: &[Block]) -> usize {
    blocks
        .iter()
        .map(|b| b.page_id.saturating_add(1))
        .max()
        .unwrap_or(0)
}

fn parse_dump(bytes: &[u8]) -> anyhow::Result<(Option<usize>, Vec<Block>)> {
    let dump: BlockDump = serde_json::from_slice(bytes)?;
    Ok(match dump {
        BlockDump::Document { num_pages, blocks } => (num_pages, blocks),
        BlockDump::Blocks(blocks) => (None, blocks),
    })
}

/// Reads one block dump. `num_pages` overrides whatever the file says.
pub fn load_document(path: &Path, num_pages: Option<usize>) -> anyhow::Result<InputDocument> {
    let file =
        File::open(path).with_context(|| format!("can't open input file {}", path.display()))?;
    let len = file.metadata()?.len();
    if len == 0 {
        anyhow::bail!("input file {} is empty", path.display());
    }
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("can't map input file {}", path.display()))?;

    let (file_num_pages, blocks) =
        parse_dump(&mmap).with_context(|| format!("invalid block dump {}", path.display()))?;

    let num_pages = num_pages
        .or(file_num_pages)
        .unwrap_or_else(|| derive_num_pages(&blocks));
    tracing::debug!(
        "loaded {} blocks over {num_pages} pages from {}",
        blocks.len(),
        path.display()
    );

    Ok(InputDocument {
        doc_name: doc_name(path),
        path: path.to_owned(),
        num_pages,
        blocks,
    })
}
