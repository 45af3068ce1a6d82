//! Decoded tile payloads.
//!
//! A [`DecodedTile`] is what a data source hands back after fetching and
//! decoding a tile: a list of processing techniques and the content items
//! that reference them. The binary format it came from is not visible here.
//!
//! The set of geometry kinds a payload contains is derived from its
//! techniques and memoised inside the payload, so techniques are never
//! mutated to cache it.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::geometry::{GeometryKind, GeometryKindSet};

/// Name of the technique used to process a content item.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TechniqueName {
    Fill,
    Line,
    SolidLine,
    DashedLine,
    Segments,
    ExtrudedLine,
    ExtrudedPolygon,
    Standard,
    Terrain,
    Poi,
    LineMarker,
    Text,
    Squares,
    Circles,
    Shader,
    Other(Arc<str>),
}

impl TechniqueName {
    /// Kind assumed for content whose technique declares none.
    pub fn default_kind(&self) -> GeometryKind {
        match self {
            TechniqueName::Fill => GeometryKind::Area,
            TechniqueName::Line
            | TechniqueName::SolidLine
            | TechniqueName::DashedLine
            | TechniqueName::Segments
            | TechniqueName::ExtrudedLine => GeometryKind::Line,
            TechniqueName::ExtrudedPolygon => GeometryKind::Building,
            TechniqueName::Poi | TechniqueName::LineMarker | TechniqueName::Text => {
                GeometryKind::Label
            }
            _ => GeometryKind::All,
        }
    }

    /// Parse a style name such as `"extruded-polygon"`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "fill" => TechniqueName::Fill,
            "line" => TechniqueName::Line,
            "solid-line" => TechniqueName::SolidLine,
            "dashed-line" => TechniqueName::DashedLine,
            "segments" => TechniqueName::Segments,
            "extruded-line" => TechniqueName::ExtrudedLine,
            "extruded-polygon" => TechniqueName::ExtrudedPolygon,
            "standard" => TechniqueName::Standard,
            "terrain" => TechniqueName::Terrain,
            "labeled-icon" | "poi" => TechniqueName::Poi,
            "line-marker" => TechniqueName::LineMarker,
            "text" => TechniqueName::Text,
            "squares" => TechniqueName::Squares,
            "circles" => TechniqueName::Circles,
            "shader" => TechniqueName::Shader,
            other => TechniqueName::Other(Arc::from(other)),
        }
    }
}

impl fmt::Display for TechniqueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TechniqueName::Fill => "fill",
            TechniqueName::Line => "line",
            TechniqueName::SolidLine => "solid-line",
            TechniqueName::DashedLine => "dashed-line",
            TechniqueName::Segments => "segments",
            TechniqueName::ExtrudedLine => "extruded-line",
            TechniqueName::ExtrudedPolygon => "extruded-polygon",
            TechniqueName::Standard => "standard",
            TechniqueName::Terrain => "terrain",
            TechniqueName::Poi => "poi",
            TechniqueName::LineMarker => "line-marker",
            TechniqueName::Text => "text",
            TechniqueName::Squares => "squares",
            TechniqueName::Circles => "circles",
            TechniqueName::Shader => "shader",
            TechniqueName::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// A processing technique referenced by content items.
#[derive(Clone, Debug, PartialEq)]
pub struct Technique {
    pub name: TechniqueName,
    /// Explicit kind; when `None` the name's default applies.
    pub kind: Option<GeometryKind>,
}

impl Technique {
    pub fn new(name: TechniqueName) -> Self {
        Self { name, kind: None }
    }

    /// Declare an explicit kind.
    pub fn with_kind(mut self, kind: GeometryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Explicit kind, or the default for the technique name.
    pub fn effective_kind(&self) -> GeometryKind {
        self.kind.clone().unwrap_or_else(|| self.name.default_kind())
    }
}

/// One piece of decoded content (a geometry batch, a text run, a POI set).
#[derive(Clone, Debug, PartialEq)]
pub struct ContentItem {
    /// Index into [`DecodedTile::techniques`].
    pub technique_index: usize,
    /// Approximate memory held by the item.
    pub byte_size: usize,
}

impl ContentItem {
    pub fn new(technique_index: usize, byte_size: usize) -> Self {
        Self {
            technique_index,
            byte_size,
        }
    }
}

/// Decoded tile payload.
#[derive(Debug, Default)]
pub struct DecodedTile {
    techniques: Vec<Technique>,
    items: Vec<ContentItem>,
    kinds: OnceLock<GeometryKindSet>,
}

impl DecodedTile {
    pub fn new(techniques: Vec<Technique>, items: Vec<ContentItem>) -> Self {
        Self {
            techniques,
            items,
            kinds: OnceLock::new(),
        }
    }

    pub fn techniques(&self) -> &[Technique] {
        &self.techniques
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    /// True if the payload has no content.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Kind of a content item; items pointing at a missing technique count
    /// as `All`.
    pub fn item_kind(&self, item: &ContentItem) -> GeometryKind {
        self.techniques
            .get(item.technique_index)
            .map(Technique::effective_kind)
            .unwrap_or(GeometryKind::All)
    }

    /// Kinds present in this payload. Computed once.
    pub fn geometry_kinds(&self) -> &GeometryKindSet {
        self.kinds.get_or_init(|| classify(self))
    }

    /// Approximate memory held by the payload.
    pub fn byte_size(&self) -> usize {
        self.items.iter().map(|item| item.byte_size).sum()
    }
}

impl Clone for DecodedTile {
    fn clone(&self) -> Self {
        Self::new(self.techniques.clone(), self.items.clone())
    }
}

/// Classify every content item of `decoded` in one pass.
pub fn classify(decoded: &DecodedTile) -> GeometryKindSet {
    decoded
        .items
        .iter()
        .map(|item| decoded.item_kind(item))
        .collect()
}
