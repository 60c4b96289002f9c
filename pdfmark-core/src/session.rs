//! The transient state of a single gesture, from pointer-down until the
//! gesture either becomes an [`Annotation`] or is discarded.

use tracing::debug;

use crate::annotation::{Annotation, AnnotationKind, Point, StrokeStyle, Tool};
use crate::input::PointerSample;

/// An in-progress freehand stroke or shape drag.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSession {
    pub kind: AnnotationKind,
    pub page_index: usize,
    pub points: Vec<Point>,
    pub style: StrokeStyle,
}

/// A text anchor waiting for the host's inline input to be submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSession {
    pub page_index: usize,
    pub anchor: Point,
    pub screen_anchor: PointerSample,
    pub value: String,
    pub style: StrokeStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    DrawingPath,
    TextPending,
}

/// What a pointer-down did to the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionStart {
    Ignored,
    Drawing { page_index: usize },
    TextInput {
        page_index: usize,
        screen_anchor: PointerSample,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKey {
    Enter,
    Escape,
}

/// Gesture state machine.
///
/// The kind and style of a session are captured at pointer-down. Tool or
/// style changes made while a gesture is in progress apply to the next one.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DrawSession {
    #[default]
    Idle,
    Drawing(PathSession),
    TextPending(TextSession),
}

impl DrawSession {
    pub fn state(&self) -> SessionState {
        match self {
            DrawSession::Idle => SessionState::Idle,
            DrawSession::Drawing(_) => SessionState::DrawingPath,
            DrawSession::TextPending(_) => SessionState::TextPending,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, DrawSession::Idle)
    }

    pub fn active_page(&self) -> Option<usize> {
        match self {
            DrawSession::Idle => None,
            DrawSession::Drawing(path) => Some(path.page_index),
            DrawSession::TextPending(text) => Some(text.page_index),
        }
    }

    /// The live stroke or shape to draw on top of committed annotations.
    pub fn preview(&self) -> Option<&PathSession> {
        match self {
            DrawSession::Drawing(path) => Some(path),
            _ => None,
        }
    }

    pub fn pending_text(&self) -> Option<&TextSession> {
        match self {
            DrawSession::TextPending(text) => Some(text),
            _ => None,
        }
    }

    /// Starts a gesture. A pointer-down while a stroke is already in progress
    /// is ignored; one while text is pending abandons the pending text.
    pub fn pointer_down(
        &mut self,
        tool: Tool,
        page_index: usize,
        point: Point,
        screen: PointerSample,
        style: StrokeStyle,
    ) -> SessionStart {
        let Some(kind) = tool.kind() else {
            return SessionStart::Ignored;
        };
        if matches!(self, DrawSession::Drawing(_)) {
            return SessionStart::Ignored;
        }
        if let DrawSession::TextPending(pending) = self {
            debug!(page_index = pending.page_index, "abandoning pending text input");
        }

        if kind == AnnotationKind::Text {
            *self = DrawSession::TextPending(TextSession {
                page_index,
                anchor: point,
                screen_anchor: screen,
                value: String::new(),
                style,
            });
            debug!(page_index, x = point.x, y = point.y, "text input requested");
            SessionStart::TextInput {
                page_index,
                screen_anchor: screen,
            }
        } else {
            *self = DrawSession::Drawing(PathSession {
                kind,
                page_index,
                points: vec![point],
                style,
            });
            debug!(page_index, %kind, "drawing started");
            SessionStart::Drawing { page_index }
        }
    }

    /// Extends the active path. Returns `true` when a point was appended.
    /// Moves on other pages and moves without coordinates change nothing.
    pub fn pointer_move(&mut self, page_index: usize, point: Option<Point>) -> bool {
        match (self, point) {
            (DrawSession::Drawing(path), Some(point)) if path.page_index == page_index => {
                path.points.push(point);
                true
            }
            _ => false,
        }
    }

    /// Ends a stroke or shape drag, producing the annotation to commit.
    /// Pending text is unaffected by pointer-up.
    pub fn pointer_up(&mut self) -> Option<Annotation> {
        let path = match std::mem::take(self) {
            DrawSession::Drawing(path) => path,
            other => {
                *self = other;
                return None;
            }
        };
        if path.points.is_empty() {
            return None;
        }
        let page = page_number(path.page_index);
        debug!(page, kind = %path.kind, points = path.points.len(), "drawing finished");
        Some(Annotation::from_path(path.kind, page, path.points, path.style))
    }

    pub fn set_text(&mut self, value: impl Into<String>) -> bool {
        match self {
            DrawSession::TextPending(text) => {
                text.value = value.into();
                true
            }
            _ => false,
        }
    }

    /// Commits pending text. Whitespace-only input discards the session
    /// without producing an annotation.
    pub fn submit_text(&mut self) -> Option<Annotation> {
        let text = match std::mem::take(self) {
            DrawSession::TextPending(text) => text,
            other => {
                *self = other;
                return None;
            }
        };
        let trimmed = text.value.trim();
        if trimmed.is_empty() {
            debug!(page_index = text.page_index, "discarding empty text input");
            return None;
        }
        Some(Annotation::text_label(
            page_number(text.page_index),
            text.anchor,
            trimmed,
            text.style,
        ))
    }

    pub fn cancel_text(&mut self) -> bool {
        if matches!(self, DrawSession::TextPending(_)) {
            *self = DrawSession::Idle;
            true
        } else {
            false
        }
    }

    /// Enter submits, Escape cancels. Returns the annotation to commit, if
    /// any.
    pub fn handle_key(&mut self, key: TextKey) -> Option<Annotation> {
        match key {
            TextKey::Enter => self.submit_text(),
            TextKey::Escape => {
                self.cancel_text();
                None
            }
        }
    }
}

fn page_number(page_index: usize) -> u32 {
    u32::try_from(page_index + 1).unwrap_or(u32::MAX)
}
