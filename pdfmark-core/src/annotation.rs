//! Annotation records and the small value types they are built from.
//!
//! All coordinates are stored in document space: the page's own unit system,
//! independent of the zoom level the page happens to be displayed at. The
//! render pipeline applies the current zoom once per pass.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned box with non-negative extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    /// Box spanned by two opposite corners, in either order.
    pub fn from_corners(first: Point, last: Point) -> Self {
        Self {
            x: first.x.min(last.x),
            y: first.y.min(last.y),
            width: (last.x - first.x).abs(),
            height: (last.y - first.y).abs(),
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Radius of the circle inscribed in this box.
    pub fn inscribed_radius(&self) -> f64 {
        self.width.min(self.height) / 2.0
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Same color with its alpha multiplied by `factor` (clamped to 0..=1).
    pub fn with_opacity(self, factor: f32) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        let a = (self.a as f32 * factor).round() as u8;
        Self { a, ..self }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::rgb(0xef, 0x44, 0x44)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid color {0:?}: expected #rgb, #rrggbb or #rrggbbaa")]
pub struct ColorParseError(pub String);

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ColorParseError(s.to_owned());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16);
        let short = |idx: usize| u8::from_str_radix(&hex[idx..idx + 1], 16).map(|v| v * 17);
        let parsed = match hex.len() {
            3 => short(0).and_then(|r| Ok(Color::rgb(r, short(1)?, short(2)?))),
            6 => channel(0..2).and_then(|r| Ok(Color::rgb(r, channel(2..4)?, channel(4..6)?))),
            8 => channel(0..2).and_then(|r| {
                Ok(Color::rgba(r, channel(2..4)?, channel(4..6)?, channel(6..8)?))
            }),
            _ => return Err(invalid()),
        };
        parsed.map_err(|_| invalid())
    }
}

/// Kind of mark an annotation draws. Serialized with the names used by the
/// JSON export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationKind {
    #[serde(rename = "drawing")]
    Freehand,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "highlight")]
    Highlight,
    #[serde(rename = "square")]
    Rectangle,
    #[serde(rename = "circle")]
    Circle,
}

impl AnnotationKind {
    /// Shape kinds carry a bounding box derived from the gesture's first and
    /// last points.
    pub fn is_shape(self) -> bool {
        matches!(
            self,
            AnnotationKind::Highlight | AnnotationKind::Rectangle | AnnotationKind::Circle
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            AnnotationKind::Freehand => "drawing",
            AnnotationKind::Text => "text",
            AnnotationKind::Highlight => "highlight",
            AnnotationKind::Rectangle => "square",
            AnnotationKind::Circle => "circle",
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Toolbar selection. `Select` is the pass-through tool: pointer input on
/// the overlay is ignored while it is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Select,
    Freehand,
    Text,
    Highlight,
    Rectangle,
    Circle,
}

impl Tool {
    pub fn kind(self) -> Option<AnnotationKind> {
        match self {
            Tool::Select => None,
            Tool::Freehand => Some(AnnotationKind::Freehand),
            Tool::Text => Some(AnnotationKind::Text),
            Tool::Highlight => Some(AnnotationKind::Highlight),
            Tool::Rectangle => Some(AnnotationKind::Rectangle),
            Tool::Circle => Some(AnnotationKind::Circle),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f64,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: Color::default(),
            width: 3.0,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AnnotationError {
    #[error("{kind} annotation {id} has no points")]
    EmptyPoints { id: String, kind: AnnotationKind },
    #[error("{kind} annotation {id} is missing its bounding box")]
    MissingBounds { id: String, kind: AnnotationKind },
    #[error("text annotation {id} has no text")]
    MissingText { id: String },
    #[error("annotation {id} is on page {page}, document has {page_count} pages")]
    PageOutOfRange {
        id: String,
        page: u32,
        page_count: u32,
    },
    #[error("annotation {id} has non-finite geometry")]
    NonFiniteGeometry { id: String },
    #[error("annotation {id} has invalid stroke width {width}")]
    InvalidWidth { id: String, width: f64 },
}

/// A committed mark on one page.
///
/// Records are immutable once created; the only way an annotation leaves a
/// store is a bulk clear.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    /// 1-based page number.
    pub page: u32,
    pub points: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde_as(as = "DisplayFromStr")]
    pub color: Color,
    pub width: f64,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
}

impl Annotation {
    /// Builds an annotation from a recorded gesture path. Shape kinds get
    /// their bounds from the first and last points only.
    pub fn from_path(
        kind: AnnotationKind,
        page: u32,
        points: Vec<Point>,
        style: StrokeStyle,
    ) -> Self {
        let bounds = if kind.is_shape() {
            match (points.first(), points.last()) {
                (Some(first), Some(last)) => Some(Bounds::from_corners(*first, *last)),
                _ => None,
            }
        } else {
            None
        };
        Self {
            id: next_annotation_id(),
            kind,
            page,
            points,
            text: None,
            color: style.color,
            width: style.width,
            timestamp: now_millis(),
            bounds,
        }
    }

    pub fn text_label(
        page: u32,
        anchor: Point,
        text: impl Into<String>,
        style: StrokeStyle,
    ) -> Self {
        Self {
            id: next_annotation_id(),
            kind: AnnotationKind::Text,
            page,
            points: vec![anchor],
            text: Some(text.into()),
            color: style.color,
            width: style.width,
            timestamp: now_millis(),
            bounds: None,
        }
    }

    pub fn style(&self) -> StrokeStyle {
        StrokeStyle {
            color: self.color,
            width: self.width,
        }
    }

    /// 0-based index of the owning page.
    pub fn page_index(&self) -> usize {
        self.page.saturating_sub(1) as usize
    }

    pub fn validate(&self, page_count: u32) -> Result<(), AnnotationError> {
        if self.page == 0 || self.page > page_count {
            return Err(AnnotationError::PageOutOfRange {
                id: self.id.clone(),
                page: self.page,
                page_count,
            });
        }
        if self.points.is_empty() {
            return Err(AnnotationError::EmptyPoints {
                id: self.id.clone(),
                kind: self.kind,
            });
        }
        if self.kind.is_shape() && self.bounds.is_none() {
            return Err(AnnotationError::MissingBounds {
                id: self.id.clone(),
                kind: self.kind,
            });
        }
        if self.kind == AnnotationKind::Text
            && self.text.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(AnnotationError::MissingText { id: self.id.clone() });
        }
        let geometry_finite = self.points.iter().all(Point::is_finite)
            && self.bounds.as_ref().map_or(true, Bounds::is_finite);
        if !geometry_finite {
            return Err(AnnotationError::NonFiniteGeometry { id: self.id.clone() });
        }
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err(AnnotationError::InvalidWidth {
                id: self.id.clone(),
                width: self.width,
            });
        }
        Ok(())
    }
}

fn next_annotation_id() -> String {
    format!("ann_{}", Uuid::new_v4())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
