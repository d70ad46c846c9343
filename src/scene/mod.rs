//! The mutable set of editable elements and the snapshot type the history
//! manager captures. All callers mutate through the create/update/delete
//! API; nothing reaches into the collections directly, so a snapshot taken
//! after any call is a complete picture of the scene.

mod region;
mod sticker;
mod text;

use std::collections::{BTreeMap, HashMap};

use egui::{Pos2, Rect};
use image::RgbaImage;
use log::{debug, info};
use serde::{Deserialize, Serialize};

pub use region::{FontWeight, RegionKind, RegionPatch, SelectionRegion, TextAlign};
pub use sticker::{Sticker, StickerPatch};
pub use text::{CustomText, TextPatch, TextSegment};

use crate::analyzer::RegionAnalysis;

/// Regions smaller than this in either dimension are drag noise, not
/// intentional selections, and are silently dropped.
pub const MIN_REGION_SIZE: f32 = 10.0;
/// Admission-control limit on concurrent regions.
pub const MAX_REGIONS: usize = 10;

/// Immutable copy of the editable state at one point in history. Decoded
/// raster caches are deliberately not part of the snapshot: identities are
/// never reused, so a surviving cache entry always matches its entity.
/// Deletion purges the entry, though, so an entity brought back by undo
/// returns without its decoded pixels until the host re-supplies them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub regions: Vec<SelectionRegion>,
    pub replacements: BTreeMap<u64, String>,
    pub stickers: Vec<Sticker>,
    pub texts: Vec<CustomText>,
}

#[derive(Default)]
pub struct Scene {
    regions: Vec<SelectionRegion>,
    replacements: BTreeMap<u64, String>,
    stickers: Vec<Sticker>,
    texts: Vec<CustomText>,
    /// Decoded replacement rasters for image-replace regions, keyed by
    /// region id.
    region_rasters: HashMap<u64, RgbaImage>,
    /// Decoded sticker pixels, keyed by sticker id.
    sticker_rasters: HashMap<u64, RgbaImage>,
    /// Monotonic creation token. Never reset, so identities are unique for
    /// the lifetime of the scene even across undo and clear.
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    fn allocate_id(&mut self) -> u64 {
        // `default()` leaves next_id at 0; treat both starts the same.
        if self.next_id == 0 {
            self.next_id = 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // --- Regions -----------------------------------------------------------

    /// Create a region from a drag rectangle. Returns `None` without any
    /// side effect when the rectangle is under the minimum size or the
    /// region limit is reached — an in-progress gesture is not an error.
    pub fn add_region(
        &mut self,
        rect: Rect,
        kind: RegionKind,
        analysis: Option<&RegionAnalysis>,
    ) -> Option<u64> {
        if rect.width().abs() <= MIN_REGION_SIZE || rect.height().abs() <= MIN_REGION_SIZE {
            debug!(
                "region rejected: {}x{} under minimum",
                rect.width(),
                rect.height()
            );
            return None;
        }
        if self.regions.len() >= MAX_REGIONS {
            debug!("region rejected: limit of {MAX_REGIONS} reached");
            return None;
        }
        let id = self.allocate_id();
        let normalized = Rect::from_two_pos(rect.min, rect.max);
        let mut region = SelectionRegion::new(id, normalized, kind);
        if let Some(analysis) = analysis {
            region = region.with_analysis(analysis);
        }
        info!("region {id} created ({kind:?}, {normalized:?})");
        self.regions.push(region);
        Some(id)
    }

    pub fn region(&self, id: u64) -> Option<&SelectionRegion> {
        self.regions.iter().find(|region| region.id == id)
    }

    pub fn regions(&self) -> &[SelectionRegion] {
        &self.regions
    }

    /// Shallow-merge `patch` onto the region with `id`; unknown id is a
    /// no-op.
    pub fn update_region(&mut self, id: u64, patch: RegionPatch) {
        if let Some(region) = self.regions.iter_mut().find(|region| region.id == id) {
            region.apply(patch);
        }
    }

    /// Remove a region together with its replacement value and any cached
    /// decoded raster.
    pub fn remove_region(&mut self, id: u64) {
        let before = self.regions.len();
        self.regions.retain(|region| region.id != id);
        if self.regions.len() != before {
            info!("region {id} removed");
        }
        self.replacements.remove(&id);
        self.region_rasters.remove(&id);
    }

    // --- Replacement values ------------------------------------------------

    /// Associate the user-entered correction or prompt with a region. Values
    /// for unknown regions are dropped.
    pub fn set_replacement(&mut self, id: u64, value: impl Into<String>) {
        if self.region(id).is_some() {
            self.replacements.insert(id, value.into());
        }
    }

    pub fn clear_replacement(&mut self, id: u64) {
        self.replacements.remove(&id);
    }

    pub fn replacement(&self, id: u64) -> Option<&str> {
        self.replacements.get(&id).map(String::as_str)
    }

    pub fn replacements(&self) -> &BTreeMap<u64, String> {
        &self.replacements
    }

    // --- Decoded raster caches --------------------------------------------

    /// Cache the decoded replacement image for an image-replace region.
    pub fn set_region_raster(&mut self, id: u64, raster: RgbaImage) {
        if self.region(id).is_some() {
            self.region_rasters.insert(id, raster);
        }
    }

    pub fn region_raster(&self, id: u64) -> Option<&RgbaImage> {
        self.region_rasters.get(&id)
    }

    pub fn sticker_raster(&self, id: u64) -> Option<&RgbaImage> {
        self.sticker_rasters.get(&id)
    }

    // --- Stickers ----------------------------------------------------------

    /// Add an uploaded image as a sticker centered at `center`, taking its
    /// intrinsic size from the pixels.
    pub fn add_sticker(&mut self, raster: RgbaImage, center: Pos2) -> u64 {
        let id = self.allocate_id();
        let sticker = Sticker::new(id, center, raster.width() as f32, raster.height() as f32);
        info!(
            "sticker {id} created ({}x{})",
            raster.width(),
            raster.height()
        );
        self.sticker_rasters.insert(id, raster);
        self.stickers.push(sticker);
        id
    }

    pub fn sticker(&self, id: u64) -> Option<&Sticker> {
        self.stickers.iter().find(|sticker| sticker.id == id)
    }

    pub fn stickers(&self) -> &[Sticker] {
        &self.stickers
    }

    pub fn update_sticker(&mut self, id: u64, patch: StickerPatch) {
        if let Some(sticker) = self.stickers.iter_mut().find(|sticker| sticker.id == id) {
            sticker.apply(patch);
        }
    }

    pub fn remove_sticker(&mut self, id: u64) {
        self.stickers.retain(|sticker| sticker.id != id);
        self.sticker_rasters.remove(&id);
    }

    // --- Custom texts ------------------------------------------------------

    pub fn add_text(&mut self, pos: Pos2, segments: Vec<TextSegment>) -> u64 {
        let id = self.allocate_id();
        self.texts.push(CustomText::new(id, pos, segments));
        info!("custom text {id} created");
        id
    }

    pub fn text(&self, id: u64) -> Option<&CustomText> {
        self.texts.iter().find(|text| text.id == id)
    }

    pub fn texts(&self) -> &[CustomText] {
        &self.texts
    }

    pub fn update_text(&mut self, id: u64, patch: TextPatch) {
        if let Some(text) = self.texts.iter_mut().find(|text| text.id == id) {
            text.apply(patch);
        }
    }

    pub fn remove_text(&mut self, id: u64) {
        self.texts.retain(|text| text.id != id);
    }

    // --- Snapshots and reset ----------------------------------------------

    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            regions: self.regions.clone(),
            replacements: self.replacements.clone(),
            stickers: self.stickers.clone(),
            texts: self.texts.clone(),
        }
    }

    /// Replace the editable state with a snapshot. Caches and the id
    /// counter are untouched: ids are never reused, so surviving cache
    /// entries still belong to the entities that come back. Entries purged
    /// by a deletion are not resurrected; a restored element renders
    /// without its decoded pixels until they are supplied again.
    pub fn restore(&mut self, snapshot: &SceneSnapshot) {
        self.regions = snapshot.regions.clone();
        self.replacements = snapshot.replacements.clone();
        self.stickers = snapshot.stickers.clone();
        self.texts = snapshot.texts.clone();
    }

    /// Drop everything, including cached rasters. Used when a new source
    /// raster is loaded. The id counter keeps counting.
    pub fn clear(&mut self) {
        self.regions.clear();
        self.replacements.clear();
        self.stickers.clear();
        self.texts.clear();
        self.region_rasters.clear();
        self.sticker_rasters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_min_size(Pos2::new(x, y), egui::vec2(w, h))
    }

    #[test]
    fn small_rects_are_rejected() {
        let mut scene = Scene::new();
        assert_eq!(scene.add_region(rect(0.0, 0.0, 10.0, 50.0), RegionKind::Text, None), None);
        assert_eq!(scene.add_region(rect(0.0, 0.0, 50.0, 9.0), RegionKind::Text, None), None);
        assert!(scene.add_region(rect(0.0, 0.0, 11.0, 11.0), RegionKind::Text, None).is_some());
    }

    #[test]
    fn region_limit_is_enforced() {
        let mut scene = Scene::new();
        for i in 0..MAX_REGIONS {
            let r = rect(i as f32 * 20.0, 0.0, 15.0, 15.0);
            assert!(scene.add_region(r, RegionKind::Text, None).is_some());
        }
        assert_eq!(scene.regions().len(), MAX_REGIONS);
        assert_eq!(scene.add_region(rect(0.0, 50.0, 15.0, 15.0), RegionKind::Text, None), None);
        assert_eq!(scene.regions().len(), MAX_REGIONS);
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let mut scene = Scene::new();
        let a = scene.add_region(rect(0.0, 0.0, 20.0, 20.0), RegionKind::Text, None).unwrap();
        let b = scene.add_sticker(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])), Pos2::ZERO);
        scene.remove_region(a);
        let c = scene.add_region(rect(0.0, 0.0, 20.0, 20.0), RegionKind::Text, None).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn removal_purges_replacement_and_raster() {
        let mut scene = Scene::new();
        let id = scene
            .add_region(rect(0.0, 0.0, 40.0, 40.0), RegionKind::ImageReplace, None)
            .unwrap();
        scene.set_replacement(id, "prompt");
        scene.set_region_raster(id, RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])));
        assert!(scene.replacement(id).is_some());
        assert!(scene.region_raster(id).is_some());

        scene.remove_region(id);
        assert!(scene.region(id).is_none());
        assert!(scene.replacement(id).is_none());
        assert!(scene.region_raster(id).is_none());
    }

    #[test]
    fn update_unknown_id_is_noop() {
        let mut scene = Scene::new();
        scene.update_region(99, RegionPatch { font_size: Some(64.0), ..Default::default() });
        scene.update_sticker(99, StickerPatch::default());
        scene.update_text(99, TextPatch::default());
        assert!(scene.regions().is_empty());
    }

    #[test]
    fn patch_merges_shallowly() {
        let mut scene = Scene::new();
        let id = scene.add_region(rect(0.0, 0.0, 40.0, 40.0), RegionKind::Text, None).unwrap();
        scene.update_region(id, RegionPatch { font_size: Some(48.0), ..Default::default() });
        let region = scene.region(id).unwrap();
        assert_eq!(region.font_size, 48.0);
        // Untouched fields keep their construction defaults.
        assert_eq!(region.align, TextAlign::Center);
        assert_eq!(region.weight, FontWeight::Normal);
    }

    #[test]
    fn replacement_for_unknown_region_is_dropped() {
        let mut scene = Scene::new();
        scene.set_replacement(42, "orphan");
        assert!(scene.replacements().is_empty());
    }

    #[test]
    fn restore_does_not_resurrect_purged_rasters() {
        let mut scene = Scene::new();
        let id = scene
            .add_region(rect(0.0, 0.0, 40.0, 40.0), RegionKind::ImageReplace, None)
            .unwrap();
        scene.set_region_raster(id, RgbaImage::from_pixel(2, 2, Rgba([7, 8, 9, 255])));
        let snapshot = scene.snapshot();

        scene.remove_region(id);
        scene.restore(&snapshot);
        // The region is back; its decoded pixels are gone with the purge.
        assert!(scene.region(id).is_some());
        assert!(scene.region_raster(id).is_none());
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut scene = Scene::new();
        let id = scene.add_region(rect(0.0, 0.0, 30.0, 30.0), RegionKind::Text, None).unwrap();
        scene.set_replacement(id, "hello");
        let snapshot = scene.snapshot();

        scene.remove_region(id);
        scene.add_text(Pos2::ZERO, vec![]);
        assert_ne!(scene.snapshot(), snapshot);

        scene.restore(&snapshot);
        assert_eq!(scene.snapshot(), snapshot);
    }
}
