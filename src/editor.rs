//! Single-threaded interaction driver tying the pieces together: pointer
//! gestures create or drag elements, structural mutations commit history
//! snapshots, and rendering goes through the shared compositor. One event
//! runs to completion before the next is processed.

use egui::{Pos2, Rect};
use image::RgbaImage;
use log::info;

use crate::analyzer::{self, RegionAnalysis};
use crate::compositor::{render_preview, FontBook};
use crate::error::RenderError;
use crate::export::{self, AiImageService, CredentialStore, ExportOutcome};
use crate::hit_test::{hit_test, HitTarget};
use crate::history::History;
use crate::scene::{
    RegionKind, RegionPatch, Scene, SceneSnapshot, StickerPatch, TextPatch, TextSegment,
};

/// In-flight pointer gesture.
#[derive(Clone, Copy, Debug)]
enum DragState {
    /// Rubber-band region selection anchored at the pointer-down point.
    Select { start: Pos2 },
    /// Dragging an existing element by pointer delta.
    Move { target: HitTarget, last: Pos2 },
}

pub struct Editor {
    /// The pristine source pixels. Never drawn on; every render starts
    /// from it.
    raster: Option<RgbaImage>,
    scene: Scene,
    history: History<SceneSnapshot>,
    fonts: FontBook,
    /// Kind assigned to the next drawn region.
    active_kind: RegionKind,
    live_preview: bool,
    drag: Option<DragState>,
    selection: Option<HitTarget>,
}

impl Editor {
    pub fn new() -> Self {
        Self::with_fonts(FontBook::new())
    }

    pub fn with_fonts(fonts: FontBook) -> Self {
        Self {
            raster: None,
            scene: Scene::new(),
            history: History::new(),
            fonts,
            active_kind: RegionKind::Text,
            live_preview: true,
            drag: None,
            selection: None,
        }
    }

    /// Start over on a freshly decoded source raster. Everything editable
    /// is discarded; the empty scene becomes the first history state.
    pub fn load_raster(&mut self, raster: RgbaImage) {
        info!("raster loaded ({}x{})", raster.width(), raster.height());
        self.scene.clear();
        self.history.reset(self.scene.snapshot());
        self.drag = None;
        self.selection = None;
        self.raster = Some(raster);
    }

    pub fn raster(&self) -> Option<&RgbaImage> {
        self.raster.as_ref()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    pub fn fonts_mut(&mut self) -> &mut FontBook {
        &mut self.fonts
    }

    pub fn set_active_kind(&mut self, kind: RegionKind) {
        self.active_kind = kind;
    }

    pub fn active_kind(&self) -> RegionKind {
        self.active_kind
    }

    pub fn set_live_preview(&mut self, enabled: bool) {
        self.live_preview = enabled;
    }

    pub fn live_preview(&self) -> bool {
        self.live_preview
    }

    pub fn selection(&self) -> Option<HitTarget> {
        self.selection
    }

    // --- Pointer gestures --------------------------------------------------

    /// What the pointer is over right now.
    pub fn hit(&self, point: Pos2) -> Option<HitTarget> {
        hit_test(&self.scene, point, |text| self.fonts.custom_text_width(text))
    }

    pub fn pointer_down(&mut self, point: Pos2) {
        if self.raster.is_none() {
            return;
        }
        match self.hit(point) {
            Some(target) => {
                self.selection = Some(target);
                self.drag = Some(DragState::Move {
                    target,
                    last: point,
                });
            }
            None => {
                self.selection = None;
                self.drag = Some(DragState::Select { start: point });
            }
        }
    }

    pub fn pointer_moved(&mut self, point: Pos2) {
        let Some(DragState::Move { target, last }) = self.drag else {
            return;
        };
        let delta = point - last;
        match target {
            HitTarget::Region(id) => {
                if let Some(region) = self.scene.region(id) {
                    let moved = region.rect.translate(delta);
                    self.scene.update_region(
                        id,
                        RegionPatch {
                            rect: Some(moved),
                            ..Default::default()
                        },
                    );
                }
            }
            HitTarget::Sticker(id) => {
                if let Some(sticker) = self.scene.sticker(id) {
                    self.scene.update_sticker(
                        id,
                        StickerPatch {
                            pos: Some(sticker.pos + delta),
                            ..Default::default()
                        },
                    );
                }
            }
            HitTarget::Text(id) => {
                if let Some(text) = self.scene.text(id) {
                    self.scene.update_text(
                        id,
                        TextPatch {
                            pos: Some(text.pos + delta),
                            ..Default::default()
                        },
                    );
                }
            }
        }
        self.drag = Some(DragState::Move {
            target,
            last: point,
        });
    }

    /// Finish the gesture. A rubber-band drag becomes a new region of the
    /// active kind, pre-styled by the analyzer; an undersized drag creates
    /// nothing and leaves history alone.
    pub fn pointer_up(&mut self, point: Pos2) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        let DragState::Select { start } = drag else {
            // A move gesture is a continuous style edit, not a commit.
            return;
        };
        let Some(raster) = self.raster.as_ref() else {
            return;
        };
        let rect = Rect::from_two_pos(start, point);
        let analysis = match self.active_kind {
            RegionKind::Text => Some(analyzer::analyze_region(raster, rect)),
            RegionKind::AiImage => None,
            RegionKind::ImageReplace => {
                // The page color around the rectangle, so the patch blends
                // in before an image is chosen.
                let background = analyzer::detect_surrounding_color(raster, rect);
                Some(RegionAnalysis {
                    background,
                    text_color: background.contrasting(),
                    font_size: analyzer::estimate_font_size(rect.height()),
                })
            }
        };
        if let Some(id) = self.scene.add_region(rect, self.active_kind, analysis.as_ref()) {
            self.selection = Some(HitTarget::Region(id));
            self.commit();
        }
    }

    // --- Structural edits --------------------------------------------------

    /// Add an uploaded image as a sticker at the canvas center.
    pub fn add_sticker(&mut self, pixels: RgbaImage) -> Option<u64> {
        let raster = self.raster.as_ref()?;
        let center = Pos2::new(raster.width() as f32 / 2.0, raster.height() as f32 / 2.0);
        let id = self.scene.add_sticker(pixels, center);
        self.selection = Some(HitTarget::Sticker(id));
        self.commit();
        Some(id)
    }

    pub fn add_text(&mut self, pos: Pos2, segments: Vec<TextSegment>) -> u64 {
        let id = self.scene.add_text(pos, segments);
        self.selection = Some(HitTarget::Text(id));
        self.commit();
        id
    }

    /// Delete whatever is selected. Returns whether anything was removed.
    pub fn remove_selected(&mut self) -> bool {
        let Some(target) = self.selection.take() else {
            return false;
        };
        match target {
            HitTarget::Region(id) => self.scene.remove_region(id),
            HitTarget::Sticker(id) => self.scene.remove_sticker(id),
            HitTarget::Text(id) => self.scene.remove_text(id),
        }
        self.commit();
        true
    }

    // --- Style edits (no history commit) -----------------------------------

    pub fn update_region(&mut self, id: u64, patch: RegionPatch) {
        self.scene.update_region(id, patch);
    }

    pub fn update_sticker(&mut self, id: u64, patch: StickerPatch) {
        self.scene.update_sticker(id, patch);
    }

    pub fn update_text(&mut self, id: u64, patch: TextPatch) {
        self.scene.update_text(id, patch);
    }

    pub fn set_replacement(&mut self, id: u64, value: impl Into<String>) {
        self.scene.set_replacement(id, value);
    }

    pub fn clear_replacement(&mut self, id: u64) {
        self.scene.clear_replacement(id);
    }

    pub fn set_region_raster(&mut self, id: u64, pixels: RgbaImage) {
        self.scene.set_region_raster(id, pixels);
    }

    // --- History -----------------------------------------------------------

    fn commit(&mut self) {
        self.history.commit(self.scene.snapshot());
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo().cloned() else {
            return false;
        };
        self.scene.restore(&snapshot);
        // The selected element may no longer exist.
        self.selection = None;
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo().cloned() else {
            return false;
        };
        self.scene.restore(&snapshot);
        self.selection = None;
        true
    }

    // --- Rendering ---------------------------------------------------------

    /// Composite the current scene for display.
    pub fn render(&self) -> Result<RgbaImage, RenderError> {
        let raster = self.raster.as_ref().ok_or(RenderError::NoRaster)?;
        render_preview(raster, &self.scene, &self.fonts, self.live_preview)
    }

    /// Flatten against the pristine raster, resolving ai-image regions
    /// through the collaborators.
    pub fn export(
        &self,
        ai: &mut dyn AiImageService,
        credentials: &dyn CredentialStore,
    ) -> Result<ExportOutcome, RenderError> {
        let raster = self.raster.as_ref().ok_or(RenderError::NoRaster)?;
        export::export(raster, &self.scene, &self.fonts, ai, credentials)
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}
