use serde::{Deserialize, Serialize};

pub type PageID = usize;

/// A4 in points, used when the extractor didn't report the page size.
pub const DEFAULT_PAGE_WIDTH: f32 = 595.0;
pub const DEFAULT_PAGE_HEIGHT: f32 = 842.0;

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(from = "BBoxRepr")]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// Extractors either emit named corners or a plain `[x0, y0, x1, y1]` tuple.
#[derive(Deserialize)]
#[serde(untagged)]
enum BBoxRepr {
    Named { x0: f32, y0: f32, x1: f32, y1: f32 },
    Tuple(f32, f32, f32, f32),
}

impl From<BBoxRepr> for BBox {
    fn from(repr: BBoxRepr) -> Self {
        match repr {
            BBoxRepr::Named { x0, y0, x1, y1 } | BBoxRepr::Tuple(x0, y0, x1, y1) => {
                Self { x0, y0, x1, y1 }
            }
        }
    }
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[inline(always)]
    pub fn is_finite(&self) -> bool {
        self.x0.is_finite() && self.y0.is_finite() && self.x1.is_finite() && self.y1.is_finite()
    }

    /// Vertical distance from the bottom of `self` to the top of `below`.
    /// Negative when the two boxes overlap vertically.
    #[inline(always)]
    pub fn vertical_gap(&self, below: &Self) -> f32 {
        below.y0 - self.y1
    }

    #[inline(always)]
    pub fn horizontal_offset(&self, other: &Self) -> f32 {
        (self.x0 - other.x0).abs()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSource {
    #[default]
    #[serde(alias = "pymupdf")]
    Native,
    Ocr,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Span {
    pub text: String,
    #[serde(default)]
    pub size: f32,
    #[serde(default)]
    pub font: String,
    #[serde(default)]
    pub flags: u32,
}

impl Span {
    pub fn new(text: impl Into<String>, size: f32) -> Self {
        Self {
            text: text.into(),
            size,
            ..Default::default()
        }
    }

    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = font.into();
        self
    }

    #[inline(always)]
    pub fn is_bold(&self) -> bool {
        self.font.to_lowercase().contains("bold")
    }
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Line {
    #[serde(default)]
    pub spans: Vec<Span>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
}

impl Line {
    pub fn new(spans: Vec<Span>) -> Self {
        Self { spans, bbox: None }
    }

    pub fn from_text(text: impl Into<String>, size: f32) -> Self {
        Self::new(vec![Span::new(text, size)])
    }
}

/// A contiguous run of text on one page, as handed over by the extractor.
///
/// Blocks are never rewritten by the filter: they are either kept or moved to
/// the excluded list untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Block {
    #[serde(alias = "page_number", alias = "page_num")]
    pub page_id: PageID,
    #[serde(default, alias = "bounding_box")]
    pub bbox: Option<BBox>,
    #[serde(default)]
    pub lines: Vec<Line>,
    #[serde(default)]
    pub source: BlockSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_height: Option<f32>,
}

impl Block {
    pub fn new(page_id: PageID, bbox: BBox, lines: Vec<Line>) -> Self {
        Self {
            page_id,
            bbox: Some(bbox),
            lines,
            source: BlockSource::Native,
            page_width: None,
            page_height: None,
        }
    }

    pub fn with_source(mut self, source: BlockSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_page_size(mut self, width: f32, height: f32) -> Self {
        self.page_width = Some(width);
        self.page_height = Some(height);
        self
    }

    /// Returns the geometry of a well-formed block.
    ///
    /// A block without a bounding box, with non-finite coordinates or without
    /// any line is malformed: it takes no part in statistics or classification.
    #[inline]
    pub fn geometry(&self) -> Option<&BBox> {
        match &self.bbox {
            Some(bbox) if bbox.is_finite() && !self.lines.is_empty() => Some(bbox),
            _ => None,
        }
    }

    #[inline]
    pub fn is_malformed(&self) -> bool {
        self.geometry().is_none()
    }

    #[inline(always)]
    pub fn is_ocr(&self) -> bool {
        self.source == BlockSource::Ocr
    }

    pub fn page_width(&self) -> f32 {
        self.page_width
            .filter(|w| w.is_finite() && *w > 0f32)
            .unwrap_or(DEFAULT_PAGE_WIDTH)
    }

    pub fn page_height(&self) -> f32 {
        self.page_height
            .filter(|h| h.is_finite() && *h > 0f32)
            .unwrap_or(DEFAULT_PAGE_HEIGHT)
    }

    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.lines.iter().flat_map(|l| l.spans.iter())
    }

    /// Span texts glued together without separator, trimmed.
    pub fn text(&self) -> String {
        let text: String = self.spans().map(|s| s.text.as_str()).collect();
        text.trim().to_owned()
    }

    pub fn text_len(&self) -> usize {
        self.text().chars().count()
    }

    pub fn avg_font_size(&self) -> Option<f32> {
        let (sum, count) = self
            .spans()
            .fold((0f32, 0usize), |(sum, count), s| (sum + s.size, count + 1));
        if count > 0 {
            Some(sum / count as f32)
        } else {
            None
        }
    }

    pub fn is_bold(&self) -> bool {
        self.spans().any(Span::is_bold)
    }
}
