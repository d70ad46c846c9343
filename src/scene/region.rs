use egui::Rect;
use serde::{Deserialize, Serialize};

use crate::analyzer::RegionAnalysis;
use crate::color::Rgb;

/// What a drawn region marks: text to re-typeset, a rectangle for the
/// generative collaborator, or a spot for an uploaded replacement image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    Text,
    AiImage,
    ImageReplace,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// A user-drawn rectangle marking an edit target, in source-raster pixel
/// coordinates. Styling fields are flat; which ones matter depends on
/// `kind`. All defaults live in [`SelectionRegion::new`] so no read site
/// needs its own fallback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectionRegion {
    pub id: u64,
    pub rect: Rect,
    pub kind: RegionKind,

    // Text styling.
    pub text_color: Rgb,
    pub background: Rgb,
    pub font_size: f32,
    pub weight: FontWeight,
    pub align: TextAlign,
    pub font_family: String,
    /// Degrees, signed. Applied to drawing and (for `Text` kind only) to
    /// hit testing.
    pub rotation_deg: f32,
    /// Shrink the drawn font size so the longest line fits the rect width.
    pub fit_width: bool,

    // Image-replace styling. `image_rotation_deg` affects rendering only,
    // never hit testing.
    pub image_rotation_deg: f32,
    pub flip_h: bool,
    pub flip_v: bool,
}

impl SelectionRegion {
    pub const DEFAULT_FONT_SIZE: f32 = 32.0;

    pub fn new(id: u64, rect: Rect, kind: RegionKind) -> Self {
        Self {
            id,
            rect,
            kind,
            text_color: Rgb::BLACK,
            background: Rgb::WHITE,
            font_size: Self::DEFAULT_FONT_SIZE,
            weight: FontWeight::Normal,
            align: TextAlign::Center,
            font_family: String::new(),
            rotation_deg: 0.0,
            fit_width: false,
            image_rotation_deg: 0.0,
            flip_h: false,
            flip_v: false,
        }
    }

    /// Seed styling from the analyzer's estimate.
    pub fn with_analysis(mut self, analysis: &RegionAnalysis) -> Self {
        self.background = analysis.background;
        self.text_color = analysis.text_color;
        self.font_size = analysis.font_size;
        self
    }
}

/// Shallow-merge update for a region; `None` fields keep their value.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegionPatch {
    pub rect: Option<Rect>,
    pub text_color: Option<Rgb>,
    pub background: Option<Rgb>,
    pub font_size: Option<f32>,
    pub weight: Option<FontWeight>,
    pub align: Option<TextAlign>,
    pub font_family: Option<String>,
    pub rotation_deg: Option<f32>,
    pub fit_width: Option<bool>,
    pub image_rotation_deg: Option<f32>,
    pub flip_h: Option<bool>,
    pub flip_v: Option<bool>,
}

impl SelectionRegion {
    pub fn apply(&mut self, patch: RegionPatch) {
        let RegionPatch {
            rect,
            text_color,
            background,
            font_size,
            weight,
            align,
            font_family,
            rotation_deg,
            fit_width,
            image_rotation_deg,
            flip_h,
            flip_v,
        } = patch;
        if let Some(rect) = rect {
            self.rect = rect;
        }
        if let Some(text_color) = text_color {
            self.text_color = text_color;
        }
        if let Some(background) = background {
            self.background = background;
        }
        if let Some(font_size) = font_size {
            self.font_size = font_size;
        }
        if let Some(weight) = weight {
            self.weight = weight;
        }
        if let Some(align) = align {
            self.align = align;
        }
        if let Some(font_family) = font_family {
            self.font_family = font_family;
        }
        if let Some(rotation_deg) = rotation_deg {
            self.rotation_deg = rotation_deg;
        }
        if let Some(fit_width) = fit_width {
            self.fit_width = fit_width;
        }
        if let Some(image_rotation_deg) = image_rotation_deg {
            self.image_rotation_deg = image_rotation_deg;
        }
        if let Some(flip_h) = flip_h {
            self.flip_h = flip_h;
        }
        if let Some(flip_v) = flip_v {
            self.flip_v = flip_v;
        }
    }
}
