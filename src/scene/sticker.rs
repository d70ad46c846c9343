use egui::Pos2;
use serde::{Deserialize, Serialize};

/// A decorative raster overlay placed by its center. Intrinsic size comes
/// from the uploaded image; the decoded pixels live in the scene's cache
/// keyed by `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sticker {
    pub id: u64,
    /// Center position in canvas coordinates.
    pub pos: Pos2,
    pub width: f32,
    pub height: f32,
    pub rotation_deg: f32,
    pub flip_h: bool,
    /// In [0, 1].
    pub opacity: f32,
    pub scale: f32,
}

impl Sticker {
    pub fn new(id: u64, pos: Pos2, width: f32, height: f32) -> Self {
        Self {
            id,
            pos,
            width,
            height,
            rotation_deg: 0.0,
            flip_h: false,
            opacity: 1.0,
            scale: 1.0,
        }
    }
}

/// Shallow-merge update for a sticker.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct StickerPatch {
    pub pos: Option<Pos2>,
    pub rotation_deg: Option<f32>,
    pub flip_h: Option<bool>,
    pub opacity: Option<f32>,
    pub scale: Option<f32>,
}

impl Sticker {
    pub fn apply(&mut self, patch: StickerPatch) {
        let StickerPatch {
            pos,
            rotation_deg,
            flip_h,
            opacity,
            scale,
        } = patch;
        if let Some(pos) = pos {
            self.pos = pos;
        }
        if let Some(rotation_deg) = rotation_deg {
            self.rotation_deg = rotation_deg;
        }
        if let Some(flip_h) = flip_h {
            self.flip_h = flip_h;
        }
        if let Some(opacity) = opacity {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(scale) = scale {
            self.scale = scale;
        }
    }
}
