use egui::Pos2;
use serde::{Deserialize, Serialize};

use super::region::FontWeight;
use crate::color::Rgb;

/// One fragment of a multi-color text. `new_line` starts a fresh line
/// before this segment; it is ignored on the first segment. There is no
/// automatic wrapping for custom texts — line structure is exactly what the
/// segments say.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    pub color: Rgb,
    pub new_line: bool,
}

impl TextSegment {
    pub fn new(text: impl Into<String>, color: Rgb) -> Self {
        Self {
            text: text.into(),
            color,
            new_line: false,
        }
    }

    pub fn on_new_line(mut self) -> Self {
        self.new_line = true;
        self
    }
}

/// A freely placed multi-segment text overlay. `pos` is the baseline start
/// of the first line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomText {
    pub id: u64,
    pub segments: Vec<TextSegment>,
    pub pos: Pos2,
    pub font_size: f32,
    pub scale: f32,
    /// In [0, 1].
    pub opacity: f32,
    pub weight: FontWeight,
    pub rotation_deg: f32,
    pub font_family: String,
}

impl CustomText {
    pub const DEFAULT_FONT_SIZE: f32 = 32.0;
    pub const LINE_HEIGHT_FACTOR: f32 = 1.2;

    pub fn new(id: u64, pos: Pos2, segments: Vec<TextSegment>) -> Self {
        Self {
            id,
            segments,
            pos,
            font_size: Self::DEFAULT_FONT_SIZE,
            scale: 1.0,
            opacity: 1.0,
            weight: FontWeight::Normal,
            rotation_deg: 0.0,
            font_family: String::new(),
        }
    }

    /// Unscaled advance between line baselines.
    pub fn line_height(&self) -> f32 {
        self.font_size * Self::LINE_HEIGHT_FACTOR
    }

    /// Segments grouped into lines: a new line starts at every segment with
    /// `new_line` set, except the first.
    pub fn lines(&self) -> Vec<&[TextSegment]> {
        let mut lines = Vec::new();
        let mut start = 0;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 && segment.new_line {
                lines.push(&self.segments[start..i]);
                start = i;
            }
        }
        if start < self.segments.len() {
            lines.push(&self.segments[start..]);
        }
        lines
    }
}

/// Shallow-merge update for a custom text.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TextPatch {
    pub segments: Option<Vec<TextSegment>>,
    pub pos: Option<Pos2>,
    pub font_size: Option<f32>,
    pub scale: Option<f32>,
    pub opacity: Option<f32>,
    pub weight: Option<FontWeight>,
    pub rotation_deg: Option<f32>,
    pub font_family: Option<String>,
}

impl CustomText {
    pub fn apply(&mut self, patch: TextPatch) {
        let TextPatch {
            segments,
            pos,
            font_size,
            scale,
            opacity,
            weight,
            rotation_deg,
            font_family,
        } = patch;
        if let Some(segments) = segments {
            self.segments = segments;
        }
        if let Some(pos) = pos {
            self.pos = pos;
        }
        if let Some(font_size) = font_size {
            self.font_size = font_size;
        }
        if let Some(scale) = scale {
            self.scale = scale;
        }
        if let Some(opacity) = opacity {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(weight) = weight {
            self.weight = weight;
        }
        if let Some(rotation_deg) = rotation_deg {
            self.rotation_deg = rotation_deg;
        }
        if let Some(font_family) = font_family {
            self.font_family = font_family;
        }
    }
}
