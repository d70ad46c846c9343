//! Final compositing against the pristine source raster. Export reuses the
//! preview drawing primitives but stages element kinds strictly: text
//! regions finish before any ai-image region is resolved, which finish
//! before image-replace patches, then stickers, then custom texts. Editing
//! chrome is never drawn here.

use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use egui::Rect;
use image::RgbaImage;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::compositor::{
    draw_custom_text, draw_image_replace, draw_region_text, draw_sticker, FontBook, Surface,
};
use crate::error::{AiError, CredentialError, RenderError};
use crate::scene::{RegionKind, Scene};

/// One image payload returned by the generation collaborator.
#[derive(Clone, Debug)]
pub struct GeneratedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Generative-image collaborator. Given the current composite as context,
/// an instruction, and the target rectangle, returns zero or one payload.
/// At most one payload is consumed per region regardless of what the
/// backing service produces.
pub trait AiImageService {
    fn edit_region(
        &mut self,
        api_key: &str,
        composite_png: &[u8],
        prompt: &str,
        rect: Rect,
    ) -> Result<Option<GeneratedImage>, AiError>;
}

/// Read side of the persisted credential. Absence is a valid state; only
/// ai-image regions need the key.
pub trait CredentialStore {
    fn api_key(&self) -> Result<Option<String>, CredentialError>;
}

/// Credential persisted as a small JSON file, one opaque string under a
/// fixed key.
pub struct JsonCredentialStore {
    path: PathBuf,
}

#[derive(Serialize, Deserialize, Default)]
struct StoredCredential {
    api_key: Option<String>,
}

impl JsonCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save_api_key(&self, key: &str) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stored = StoredCredential {
            api_key: Some(key.to_owned()),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }
}

impl CredentialStore for JsonCredentialStore {
    fn api_key(&self) -> Result<Option<String>, CredentialError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)?;
        let stored: StoredCredential = serde_json::from_str(&text)?;
        Ok(stored.api_key.filter(|key| !key.is_empty()))
    }
}

/// Per-region degradations collected during export. None of these abort
/// the pass; the affected region simply does not update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportWarning {
    MissingCredential { region: u64 },
    GenerationFailed { region: u64, reason: String },
    DecodeFailed { region: u64, reason: String },
}

pub struct ExportOutcome {
    pub image: RgbaImage,
    pub warnings: Vec<ExportWarning>,
}

/// Flatten the scene over the pristine `raster`. The live canvas is never
/// an input, so exporting twice from the same snapshot is pixel-identical
/// (given a deterministic collaborator). Callers must not start a second
/// export while one is in flight.
pub fn export(
    raster: &RgbaImage,
    scene: &Scene,
    fonts: &FontBook,
    ai: &mut dyn AiImageService,
    credentials: &dyn CredentialStore,
) -> Result<ExportOutcome, RenderError> {
    let mut surface = Surface::from_raster(raster)?;
    let mut warnings = Vec::new();

    for region in scene.regions() {
        if region.kind == RegionKind::Text {
            if let Some(value) = scene.replacement(region.id) {
                draw_region_text(&mut surface, fonts, region, value);
            }
        }
    }

    let api_key = match credentials.api_key() {
        Ok(key) => key,
        Err(err) => {
            warn!("credential store unavailable: {err}");
            None
        }
    };
    for region in scene.regions() {
        if region.kind != RegionKind::AiImage {
            continue;
        }
        let Some(prompt) = scene.replacement(region.id).filter(|p| !p.trim().is_empty())
        else {
            debug!("ai region {} has no prompt, skipping", region.id);
            continue;
        };
        let Some(key) = api_key.as_deref() else {
            warn!("ai region {} skipped: no credential", region.id);
            warnings.push(ExportWarning::MissingCredential { region: region.id });
            continue;
        };
        // The collaborator sees everything drawn so far as context.
        let context = encode_png(&surface.to_raster())?;
        match ai.edit_region(key, &context, prompt, region.rect) {
            Ok(Some(payload)) => match image::load_from_memory(&payload.bytes) {
                Ok(decoded) => {
                    debug!(
                        "ai region {} resolved ({}, {} bytes)",
                        region.id,
                        payload.mime,
                        payload.bytes.len()
                    );
                    draw_image_replace(&mut surface, region, &decoded.to_rgba8());
                }
                Err(err) => {
                    warn!("ai region {} payload undecodable: {err}", region.id);
                    warnings.push(ExportWarning::DecodeFailed {
                        region: region.id,
                        reason: err.to_string(),
                    });
                }
            },
            Ok(None) => {
                debug!("ai region {} returned no payload", region.id);
            }
            Err(err) => {
                warn!("ai region {} generation failed: {err}", region.id);
                warnings.push(ExportWarning::GenerationFailed {
                    region: region.id,
                    reason: err.to_string(),
                });
            }
        }
    }

    for region in scene.regions() {
        if region.kind == RegionKind::ImageReplace {
            if let Some(patch) = scene.region_raster(region.id) {
                draw_image_replace(&mut surface, region, patch);
            }
        }
    }

    for sticker in scene.stickers() {
        if let Some(pixels) = scene.sticker_raster(sticker.id) {
            draw_sticker(&mut surface, sticker, pixels);
        }
    }

    for text in scene.texts() {
        draw_custom_text(&mut surface, fonts, text);
    }

    Ok(ExportOutcome {
        image: surface.to_raster(),
        warnings,
    })
}

/// Serialize a raster as PNG bytes.
pub fn encode_png(raster: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(raster.clone())
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::RegionKind;
    use egui::Pos2;
    use image::Rgba;

    struct NoCredential;
    impl CredentialStore for NoCredential {
        fn api_key(&self) -> Result<Option<String>, CredentialError> {
            Ok(None)
        }
    }

    struct FixedCredential;
    impl CredentialStore for FixedCredential {
        fn api_key(&self) -> Result<Option<String>, CredentialError> {
            Ok(Some("key".to_owned()))
        }
    }

    /// Scripted collaborator: pops one response per call, recording calls.
    struct ScriptedAi {
        responses: Vec<Result<Option<GeneratedImage>, AiError>>,
        calls: usize,
    }

    impl ScriptedAi {
        fn new(mut responses: Vec<Result<Option<GeneratedImage>, AiError>>) -> Self {
            responses.reverse();
            Self {
                responses,
                calls: 0,
            }
        }
    }

    impl AiImageService for ScriptedAi {
        fn edit_region(
            &mut self,
            _api_key: &str,
            composite_png: &[u8],
            _prompt: &str,
            _rect: Rect,
        ) -> Result<Option<GeneratedImage>, AiError> {
            assert!(!composite_png.is_empty());
            self.calls += 1;
            self.responses.pop().unwrap_or(Ok(None))
        }
    }

    fn white_raster(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
    }

    fn red_png() -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))).unwrap()
    }

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_min_size(Pos2::new(x, y), egui::vec2(w, h))
    }

    #[test]
    fn export_omits_editing_chrome() {
        let raster = white_raster(80, 80);
        let mut scene = Scene::new();
        scene.add_region(rect(10.0, 10.0, 40.0, 30.0), RegionKind::Text, None);
        let mut ai = ScriptedAi::new(vec![]);
        let out = export(&raster, &scene, &FontBook::new(), &mut ai, &NoCredential).unwrap();
        // A text region without a replacement value leaves no trace.
        assert_eq!(out.image, raster);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn export_twice_is_pixel_identical() {
        let raster = white_raster(80, 80);
        let mut scene = Scene::new();
        let id = scene
            .add_region(rect(10.0, 10.0, 50.0, 30.0), RegionKind::Text, None)
            .unwrap();
        scene.set_replacement(id, "hi");
        scene.add_sticker(
            RgbaImage::from_pixel(12, 12, Rgba([0, 100, 0, 255])),
            Pos2::new(60.0, 60.0),
        );
        let fonts = FontBook::new();

        let mut ai = ScriptedAi::new(vec![]);
        let a = export(&raster, &scene, &fonts, &mut ai, &NoCredential).unwrap();
        let mut ai = ScriptedAi::new(vec![]);
        let b = export(&raster, &scene, &fonts, &mut ai, &NoCredential).unwrap();
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn missing_credential_skips_only_ai_regions() {
        let raster = white_raster(80, 80);
        let mut scene = Scene::new();
        let ai_id = scene
            .add_region(rect(5.0, 5.0, 30.0, 30.0), RegionKind::AiImage, None)
            .unwrap();
        scene.set_replacement(ai_id, "make it blue");
        let patch_id = scene
            .add_region(rect(40.0, 40.0, 30.0, 30.0), RegionKind::ImageReplace, None)
            .unwrap();
        scene.set_region_raster(patch_id, RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])));

        let mut ai = ScriptedAi::new(vec![]);
        let out = export(&raster, &scene, &FontBook::new(), &mut ai, &NoCredential).unwrap();
        assert_eq!(ai.calls, 0);
        assert_eq!(
            out.warnings,
            vec![ExportWarning::MissingCredential { region: ai_id }]
        );
        // The image-replace region still composited.
        assert_eq!(out.image.get_pixel(55, 55), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn ai_failure_does_not_abort_later_regions() {
        let raster = white_raster(100, 100);
        let mut scene = Scene::new();
        let first = scene
            .add_region(rect(5.0, 5.0, 30.0, 30.0), RegionKind::AiImage, None)
            .unwrap();
        scene.set_replacement(first, "one");
        let second = scene
            .add_region(rect(50.0, 50.0, 30.0, 30.0), RegionKind::AiImage, None)
            .unwrap();
        scene.set_replacement(second, "two");

        let mut ai = ScriptedAi::new(vec![
            Err(AiError("backend exploded".to_owned())),
            Ok(Some(GeneratedImage {
                mime: "image/png".to_owned(),
                bytes: red_png(),
            })),
        ]);
        let out = export(&raster, &scene, &FontBook::new(), &mut ai, &FixedCredential).unwrap();
        assert_eq!(ai.calls, 2);
        assert_eq!(out.warnings.len(), 1);
        assert!(matches!(
            out.warnings[0],
            ExportWarning::GenerationFailed { region, .. } if region == first
        ));
        // The second region's payload landed in its rectangle.
        assert_eq!(out.image.get_pixel(65, 65), &Rgba([255, 0, 0, 255]));
        // The failed region's pixels are untouched.
        assert_eq!(out.image.get_pixel(20, 20), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn undecodable_payload_is_a_warning() {
        let raster = white_raster(60, 60);
        let mut scene = Scene::new();
        let id = scene
            .add_region(rect(5.0, 5.0, 30.0, 30.0), RegionKind::AiImage, None)
            .unwrap();
        scene.set_replacement(id, "prompt");
        let mut ai = ScriptedAi::new(vec![Ok(Some(GeneratedImage {
            mime: "image/png".to_owned(),
            bytes: vec![0, 1, 2, 3],
        }))]);
        let out = export(&raster, &scene, &FontBook::new(), &mut ai, &FixedCredential).unwrap();
        assert!(matches!(
            out.warnings[0],
            ExportWarning::DecodeFailed { region, .. } if region == id
        ));
        assert_eq!(out.image, raster);
    }

    #[test]
    fn promptless_ai_region_never_calls_the_service() {
        let raster = white_raster(60, 60);
        let mut scene = Scene::new();
        scene.add_region(rect(5.0, 5.0, 30.0, 30.0), RegionKind::AiImage, None);
        let mut ai = ScriptedAi::new(vec![]);
        let out = export(&raster, &scene, &FontBook::new(), &mut ai, &FixedCredential).unwrap();
        assert_eq!(ai.calls, 0);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn credential_store_round_trip() {
        let dir = std::env::temp_dir().join("retouch-credential-test");
        let store = JsonCredentialStore::new(dir.join("settings.json"));
        let _ = fs::remove_file(dir.join("settings.json"));
        assert_eq!(store.api_key().unwrap(), None);
        store.save_api_key("sk-123").unwrap();
        assert_eq!(store.api_key().unwrap(), Some("sk-123".to_owned()));
        let _ = fs::remove_file(dir.join("settings.json"));
    }

    #[test]
    fn png_encoding_round_trips() {
        let mut raster = white_raster(9, 7);
        raster.put_pixel(2, 3, Rgba([1, 2, 3, 255]));
        let bytes = encode_png(&raster).unwrap();
        let back = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(back, raster);
    }
}
