//! CPU compositing of the base raster plus every scene element, in a fixed
//! layering order. The same drawing primitives serve the live preview and
//! the export path so the two stay pixel-consistent.

use std::collections::HashMap;

use ab_glyph::{Font, FontArc, Glyph, GlyphId, PxScale, ScaleFont, point};
use egui::{Pos2, Rect};
use image::RgbaImage;
use log::warn;
use tiny_skia::{
    BlendMode, FillRule, FilterQuality, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke,
    StrokeDash, Transform,
};

use crate::color::Rgb;
use crate::error::RenderError;
use crate::geometry::Placement;
use crate::layout;
use crate::scene::{
    CustomText, FontWeight, RegionKind, Scene, SelectionRegion, Sticker, TextAlign,
};

/// Horizontal padding inside a region when wrapping its replacement text.
pub const TEXT_INSET: f32 = 2.0;
/// Line advance as a multiple of font size.
pub const LINE_HEIGHT_FACTOR: f32 = 1.2;
/// Per-character width estimate used when no font is available.
const ESTIMATED_ADVANCE: f32 = 0.6;

const OUTLINE_COLOR: Rgb = Rgb([59, 130, 246]);
const OUTLINE_WIDTH: f32 = 2.0;
const OUTLINE_DASH: [f32; 2] = [6.0, 4.0];
const REGION_FILL_ALPHA: u8 = 40;
const BADGE_COLOR: Rgb = Rgb([30, 30, 30]);
const BADGE_FONT_SIZE: f32 = 12.0;

/// Family-keyed font registry. Fonts are collaborator-supplied; the book
/// only resolves names and answers measurements. With no fonts registered,
/// text draws are skipped and widths fall back to a per-character estimate
/// so layout and hit testing keep working headless.
#[derive(Default)]
pub struct FontBook {
    default: Option<FontArc>,
    families: HashMap<String, FontArc>,
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(font: FontArc) -> Self {
        Self {
            default: Some(font),
            families: HashMap::new(),
        }
    }

    /// Best-effort default from common system font locations.
    pub fn load_system() -> Self {
        let candidates = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "/System/Library/Fonts/SFNS.ttf",
        ];
        for path in candidates {
            if let Ok(bytes) = std::fs::read(path) {
                if let Ok(font) = FontArc::try_from_vec(bytes) {
                    return Self::with_default(font);
                }
            }
        }
        warn!("no system font found, text rendering disabled");
        Self::default()
    }

    pub fn register(&mut self, family: impl Into<String>, font: FontArc) {
        self.families.insert(family.into(), font);
    }

    /// Resolve a family name, falling back to the default font.
    pub fn resolve(&self, family: &str) -> Option<&FontArc> {
        self.families.get(family).or(self.default.as_ref())
    }

    /// Width of one line in the given family, or the estimate when no font
    /// is loaded.
    pub fn measure(&self, family: &str, size: f32, text: &str) -> f32 {
        match self.resolve(family) {
            Some(font) => line_width(font, size, text),
            None => text.chars().count() as f32 * size * ESTIMATED_ADVANCE,
        }
    }

    /// Unscaled width of a custom text's widest line.
    pub fn custom_text_width(&self, text: &CustomText) -> f32 {
        text.lines()
            .iter()
            .map(|line| {
                line.iter()
                    .map(|segment| self.measure(&text.font_family, text.font_size, &segment.text))
                    .sum()
            })
            .fold(0.0, f32::max)
    }
}

fn layout_line(font: &FontArc, size: f32, text: &str) -> (Vec<Glyph>, f32) {
    let scale = PxScale::from(size);
    let scaled = font.as_scaled(scale);
    let mut glyphs = Vec::new();
    let mut cursor = 0.0f32;
    let mut last: Option<GlyphId> = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = last {
            cursor += scaled.kern(prev, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(cursor, 0.0)));
        cursor += scaled.h_advance(id);
        last = Some(id);
    }
    (glyphs, cursor)
}

/// Advance width of one line of text.
pub fn line_width(font: &FontArc, size: f32, text: &str) -> f32 {
    layout_line(font, size, text).1
}

/// A line of text rasterized at the baseline origin: image pixel (0, 0)
/// sits at `(min_x, min_y)` in baseline space.
struct LineRaster {
    image: RgbaImage,
    min_x: f32,
    min_y: f32,
}

/// Rasterize one line into a tight RGBA buffer. Bold is synthesized with a
/// second pass offset by a fraction of the glyph width. Returns `None` for
/// whitespace-only text.
fn rasterize_line(
    font: &FontArc,
    text: &str,
    size: f32,
    color: Rgb,
    weight: FontWeight,
) -> Option<LineRaster> {
    let (glyphs, _) = layout_line(font, size, text);
    let passes: &[f32] = match weight {
        FontWeight::Normal => &[0.0],
        FontWeight::Bold => &[0.0, size * 0.02 + 0.4],
    };

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    let mut outlined = Vec::new();
    for offset in passes {
        for glyph in &glyphs {
            let mut glyph = glyph.clone();
            glyph.position.x += offset;
            if let Some(og) = font.outline_glyph(glyph) {
                let bounds = og.px_bounds();
                min_x = min_x.min(bounds.min.x);
                min_y = min_y.min(bounds.min.y);
                max_x = max_x.max(bounds.max.x);
                max_y = max_y.max(bounds.max.y);
                outlined.push(og);
            }
        }
    }
    if outlined.is_empty() {
        return None;
    }

    let width = (max_x - min_x).ceil() as u32 + 1;
    let height = (max_y - min_y).ceil() as u32 + 1;
    let mut image = RgbaImage::new(width, height);
    let [r, g, b] = color.0;
    for og in &outlined {
        let bounds = og.px_bounds();
        og.draw(|x, y, coverage| {
            let px = (bounds.min.x - min_x) as u32 + x;
            let py = (bounds.min.y - min_y) as u32 + y;
            if px < width && py < height {
                let alpha = (coverage * 255.0) as u8;
                let pixel = image.get_pixel_mut(px, py);
                // Overlapping outlines keep the strongest coverage.
                pixel.0 = [r, g, b, pixel.0[3].max(alpha)];
            }
        });
    }
    Some(LineRaster { image, min_x, min_y })
}

/// A premultiplied pixel surface the passes draw into.
pub struct Surface {
    pixmap: Pixmap,
}

impl Surface {
    pub fn from_raster(raster: &RgbaImage) -> Result<Self, RenderError> {
        let (width, height) = raster.dimensions();
        let mut pixmap = Pixmap::new(width, height)
            .ok_or(RenderError::SurfaceAlloc { width, height })?;
        premultiply_into(raster, pixmap.data_mut());
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Copy back out to straight-alpha RGBA.
    pub fn to_raster(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width(), self.height());
        for (src, dst) in self.pixmap.pixels().iter().zip(out.pixels_mut()) {
            let c = src.demultiply();
            dst.0 = [c.red(), c.green(), c.blue(), c.alpha()];
        }
        out
    }

    /// Draw `raster` through `transform` (source pixel space to canvas).
    pub fn blit_raster(&mut self, raster: &RgbaImage, transform: Transform, opacity: f32) {
        let (width, height) = raster.dimensions();
        let Some(mut src) = Pixmap::new(width, height) else {
            warn!("skipping {width}x{height} blit: cannot allocate source");
            return;
        };
        premultiply_into(raster, src.data_mut());
        let paint = PixmapPaint {
            opacity: opacity.clamp(0.0, 1.0),
            blend_mode: BlendMode::SourceOver,
            quality: FilterQuality::Bilinear,
        };
        self.pixmap
            .draw_pixmap(0, 0, src.as_ref(), &paint, transform, None);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgb, alpha: u8, transform: Transform) {
        let Some(skia_rect) =
            tiny_skia::Rect::from_xywh(rect.left(), rect.top(), rect.width(), rect.height())
        else {
            return;
        };
        let path = PathBuilder::from_rect(skia_rect);
        let mut paint = Paint::default();
        let [r, g, b] = color.0;
        paint.set_color_rgba8(r, g, b, alpha);
        paint.anti_alias = true;
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, transform, None);
    }

    pub fn stroke_rect_dashed(&mut self, rect: Rect, color: Rgb, transform: Transform) {
        let Some(skia_rect) =
            tiny_skia::Rect::from_xywh(rect.left(), rect.top(), rect.width(), rect.height())
        else {
            return;
        };
        let path = PathBuilder::from_rect(skia_rect);
        let mut paint = Paint::default();
        let [r, g, b] = color.0;
        paint.set_color_rgba8(r, g, b, 255);
        paint.anti_alias = true;
        let stroke = Stroke {
            width: OUTLINE_WIDTH,
            dash: StrokeDash::new(OUTLINE_DASH.to_vec(), 0.0),
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint, &stroke, transform, None);
    }

    /// Draw one line of text with its baseline starting at `origin` in the
    /// space `transform` maps from.
    pub fn draw_text_line(
        &mut self,
        font: &FontArc,
        text: &str,
        size: f32,
        color: Rgb,
        weight: FontWeight,
        origin: Pos2,
        transform: Transform,
        opacity: f32,
    ) {
        let Some(line) = rasterize_line(font, text, size, color, weight) else {
            return;
        };
        let placed = transform.pre_concat(Transform::from_translate(
            origin.x + line.min_x,
            origin.y + line.min_y,
        ));
        self.blit_raster(&line.image, placed, opacity);
    }
}

/// Straight-alpha RGBA to tiny-skia's premultiplied byte layout.
fn premultiply_into(raster: &RgbaImage, data: &mut [u8]) {
    for (src, dst) in raster.pixels().zip(data.chunks_exact_mut(4)) {
        let [r, g, b, a] = src.0;
        if a == 255 {
            dst.copy_from_slice(&[r, g, b, a]);
        } else {
            let a16 = a as u16;
            dst[0] = ((r as u16 * a16) / 255) as u8;
            dst[1] = ((g as u16 * a16) / 255) as u8;
            dst[2] = ((b as u16 * a16) / 255) as u8;
            dst[3] = a;
        }
    }
}

/// Composite the scene over `raster` for on-screen display: replacement
/// images, live text previews (when `preview_enabled`), region chrome,
/// stickers, custom texts — in that z-order.
pub fn render_preview(
    raster: &RgbaImage,
    scene: &Scene,
    fonts: &FontBook,
    preview_enabled: bool,
) -> Result<RgbaImage, RenderError> {
    let mut surface = Surface::from_raster(raster)?;

    for region in scene.regions() {
        if region.kind == RegionKind::ImageReplace {
            if let Some(patch) = scene.region_raster(region.id) {
                draw_image_replace(&mut surface, region, patch);
            }
        }
    }

    for region in scene.regions() {
        let live_text = preview_enabled
            && region.kind == RegionKind::Text
            && scene.replacement(region.id).is_some();
        if live_text {
            if let Some(value) = scene.replacement(region.id) {
                draw_region_text(&mut surface, fonts, region, value);
            }
        }
        draw_region_chrome(&mut surface, fonts, region, live_text);
    }

    for sticker in scene.stickers() {
        if let Some(pixels) = scene.sticker_raster(sticker.id) {
            draw_sticker(&mut surface, sticker, pixels);
        }
    }

    for text in scene.texts() {
        draw_custom_text(&mut surface, fonts, text);
    }

    Ok(surface.to_raster())
}

/// Transform used for both drawing a text region's content and its chrome.
/// Non-text kinds stay axis-aligned here; image-replace rotation is applied
/// to the patch raster alone.
fn region_transform(region: &SelectionRegion) -> Transform {
    match region.kind {
        RegionKind::Text => Placement::new(region.rect.center(), region.rotation_deg).matrix(),
        RegionKind::AiImage | RegionKind::ImageReplace => Transform::identity(),
    }
}

/// Step 2: a decoded replacement image scaled into the region rectangle,
/// rotated and flipped about the rectangle center.
pub(crate) fn draw_image_replace(surface: &mut Surface, region: &SelectionRegion, patch: &RgbaImage) {
    let (iw, ih) = (patch.width() as f32, patch.height() as f32);
    if iw <= 0.0 || ih <= 0.0 {
        return;
    }
    let sx = region.rect.width() / iw * if region.flip_h { -1.0 } else { 1.0 };
    let sy = region.rect.height() / ih * if region.flip_v { -1.0 } else { 1.0 };
    let transform = Placement::new(region.rect.center(), region.image_rotation_deg)
        .with_scale(sx, sy)
        .matrix()
        .pre_concat(Transform::from_translate(-iw / 2.0, -ih / 2.0));
    surface.blit_raster(patch, transform, 1.0);
}

/// Step 3: filled background plus the wrapped replacement text, vertically
/// centered in the rectangle.
pub(crate) fn draw_region_text(
    surface: &mut Surface,
    fonts: &FontBook,
    region: &SelectionRegion,
    value: &str,
) {
    let transform = region_transform(region);
    surface.fill_rect(region.rect, region.background, 255, transform);

    let Some(font) = fonts.resolve(&region.font_family) else {
        return;
    };
    let max_width = region.rect.width() - 2.0 * TEXT_INSET;

    let mut font_size = region.font_size;
    if region.fit_width {
        font_size = fit_font_size(value, font_size, max_width, |s, size| {
            line_width(font, size, s)
        });
    }
    let lines = layout::wrap(value, max_width, |s| line_width(font, font_size, s));

    let scaled = font.as_scaled(PxScale::from(font_size));
    let (ascent, descent) = (scaled.ascent(), scaled.descent());
    let line_height = font_size * LINE_HEIGHT_FACTOR;
    let block_height = lines.len() as f32 * line_height;
    let block_top = region.rect.center().y - block_height / 2.0;

    for (i, line) in lines.iter().enumerate() {
        let slot_center = block_top + (i as f32 + 0.5) * line_height;
        // Center the glyph extent (ascent above baseline, |descent| below)
        // within the line slot.
        let baseline = slot_center + (ascent + descent) / 2.0;
        let width = line_width(font, font_size, line);
        let x = match region.align {
            TextAlign::Left => region.rect.left() + TEXT_INSET,
            TextAlign::Center => region.rect.center().x - width / 2.0,
            TextAlign::Right => region.rect.right() - TEXT_INSET - width,
        };
        surface.draw_text_line(
            font,
            line,
            font_size,
            region.text_color,
            region.weight,
            Pos2::new(x, baseline),
            transform,
            1.0,
        );
    }
}

/// Font size reduced so the widest explicit-break line fits `max_width`
/// unwrapped. Measured before wrapping: wrapped lines fit by construction,
/// so they say nothing about how much the text overflows. Advance and kern
/// widths scale linearly with the pixel scale, which makes one
/// proportional factor exact. Never enlarges.
fn fit_font_size<F>(value: &str, font_size: f32, max_width: f32, measure: F) -> f32
where
    F: Fn(&str, f32) -> f32,
{
    let widest = value
        .split('\n')
        .map(|line| measure(line, font_size))
        .fold(0.0, f32::max);
    if widest > max_width && widest > 0.0 {
        font_size * max_width / widest
    } else {
        font_size
    }
}

/// Step 4: dashed outline, translucent fill (unless live text already
/// covers the rectangle), and the identity badge.
pub(crate) fn draw_region_chrome(
    surface: &mut Surface,
    fonts: &FontBook,
    region: &SelectionRegion,
    live_text_drawn: bool,
) {
    let transform = region_transform(region);
    if !live_text_drawn {
        surface.fill_rect(region.rect, OUTLINE_COLOR, REGION_FILL_ALPHA, transform);
    }
    surface.stroke_rect_dashed(region.rect, OUTLINE_COLOR, transform);

    // Identity badge at the top-left corner.
    let label = region.id.to_string();
    let badge = Rect::from_min_size(
        region.rect.min,
        egui::vec2(8.0 + 7.0 * label.len() as f32, 16.0),
    );
    surface.fill_rect(badge, BADGE_COLOR, 220, transform);
    if let Some(font) = fonts.resolve(&region.font_family) {
        surface.draw_text_line(
            font,
            &label,
            BADGE_FONT_SIZE,
            Rgb::WHITE,
            FontWeight::Normal,
            Pos2::new(badge.left() + 4.0, badge.bottom() - 4.0),
            transform,
            1.0,
        );
    }
}

/// Step 5: a sticker about its own pivot with rotation, flip, opacity, and
/// uniform scale.
pub(crate) fn draw_sticker(surface: &mut Surface, sticker: &Sticker, pixels: &RgbaImage) {
    let (iw, ih) = (pixels.width() as f32, pixels.height() as f32);
    if iw <= 0.0 || ih <= 0.0 {
        return;
    }
    let sx = sticker.scale * if sticker.flip_h { -1.0 } else { 1.0 };
    let transform = Placement::new(sticker.pos, sticker.rotation_deg)
        .with_scale(sx, sticker.scale)
        .matrix()
        .pre_concat(Transform::from_translate(-iw / 2.0, -ih / 2.0));
    surface.blit_raster(pixels, transform, sticker.opacity);
}

/// Step 6: a custom text, segment by segment. The cursor advances
/// left-to-right within a line and resets to column zero on a segment with
/// `new_line` set; every segment carries its own color.
pub(crate) fn draw_custom_text(surface: &mut Surface, fonts: &FontBook, text: &CustomText) {
    let Some(font) = fonts.resolve(&text.font_family) else {
        return;
    };
    let transform = Placement::new(text.pos, text.rotation_deg)
        .with_scale(text.scale, text.scale)
        .matrix();

    let mut cursor_x = 0.0f32;
    let mut baseline_y = 0.0f32;
    for (i, segment) in text.segments.iter().enumerate() {
        if i > 0 && segment.new_line {
            cursor_x = 0.0;
            baseline_y += text.line_height();
        }
        surface.draw_text_line(
            font,
            &segment.text,
            text.font_size,
            segment.color,
            text.weight,
            Pos2::new(cursor_x, baseline_y),
            transform,
            text.opacity,
        );
        cursor_x += line_width(font, text.font_size, &segment.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::RegionPatch;
    use image::Rgba;

    fn white_raster(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn surface_round_trips_opaque_pixels() {
        let mut raster = white_raster(8, 8);
        raster.put_pixel(3, 4, Rgba([12, 34, 56, 255]));
        let surface = Surface::from_raster(&raster).unwrap();
        assert_eq!(surface.to_raster(), raster);
    }

    #[test]
    fn empty_scene_renders_base_unchanged() {
        let raster = white_raster(16, 16);
        let scene = Scene::new();
        let fonts = FontBook::new();
        let out = render_preview(&raster, &scene, &fonts, true).unwrap();
        assert_eq!(out, raster);
    }

    #[test]
    fn region_chrome_marks_pixels() {
        let raster = white_raster(100, 100);
        let mut scene = Scene::new();
        let rect = Rect::from_min_size(Pos2::new(20.0, 20.0), egui::vec2(50.0, 30.0));
        scene.add_region(rect, RegionKind::Text, None);
        let out = render_preview(&raster, &scene, &FontBook::new(), false).unwrap();
        assert_ne!(out, raster);
        // Pixels far outside the region stay untouched.
        assert_eq!(out.get_pixel(90, 90), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn image_replace_patch_is_composited() {
        let raster = white_raster(100, 100);
        let mut scene = Scene::new();
        let rect = Rect::from_min_size(Pos2::new(10.0, 10.0), egui::vec2(40.0, 40.0));
        let id = scene.add_region(rect, RegionKind::ImageReplace, None).unwrap();
        scene.set_region_raster(id, RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])));
        let out = render_preview(&raster, &scene, &FontBook::new(), false).unwrap();
        // Region center is solidly the patch color.
        assert_eq!(out.get_pixel(30, 30), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn sticker_opacity_blends() {
        let raster = white_raster(60, 60);
        let mut scene = Scene::new();
        let id = scene.add_sticker(
            RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255])),
            Pos2::new(30.0, 30.0),
        );
        scene.update_sticker(
            id,
            crate::scene::StickerPatch {
                opacity: Some(0.5),
                ..Default::default()
            },
        );
        let out = render_preview(&raster, &scene, &FontBook::new(), false).unwrap();
        let center = out.get_pixel(30, 30).0;
        // Half-transparent black over white lands mid-gray.
        assert!(center[0] > 100 && center[0] < 155, "got {center:?}");
    }

    #[test]
    fn rotated_text_region_chrome_follows_rotation() {
        let raster = white_raster(120, 120);
        let mut scene = Scene::new();
        let rect = Rect::from_min_size(Pos2::new(40.0, 55.0), egui::vec2(40.0, 10.0));
        let id = scene.add_region(rect, RegionKind::Text, None).unwrap();

        let straight = render_preview(&raster, &scene, &FontBook::new(), false).unwrap();
        scene.update_region(
            id,
            RegionPatch {
                rotation_deg: Some(90.0),
                ..Default::default()
            },
        );
        let rotated = render_preview(&raster, &scene, &FontBook::new(), false).unwrap();
        assert_ne!(straight, rotated);
        // After a 90° turn about (60, 60) the fill covers (60, 75), which
        // the flat 40x10 strip never reached.
        assert_ne!(rotated.get_pixel(60, 75), &Rgba([255, 255, 255, 255]));
    }

    // Linear in size, like real advance widths.
    fn half_char_measure(s: &str, size: f32) -> f32 {
        s.chars().count() as f32 * size * 0.5
    }

    #[test]
    fn fit_width_shrinks_to_the_widest_line() {
        // 10 chars at size 32 measure 160; fitting into 80 halves the size.
        let fitted = fit_font_size("abcdefghij", 32.0, 80.0, half_char_measure);
        assert_eq!(fitted, 16.0);
        assert_eq!(half_char_measure("abcdefghij", fitted), 80.0);

        // The widest explicit-break line governs, not the whole string.
        let fitted = fit_font_size("abc\nabcdefghij\nab", 32.0, 80.0, half_char_measure);
        assert_eq!(fitted, 16.0);
    }

    #[test]
    fn fit_width_never_enlarges() {
        assert_eq!(fit_font_size("ab", 32.0, 500.0, half_char_measure), 32.0);
        assert_eq!(fit_font_size("", 32.0, 80.0, half_char_measure), 32.0);
    }

    #[test]
    fn render_is_deterministic() {
        let raster = white_raster(80, 80);
        let mut scene = Scene::new();
        let rect = Rect::from_min_size(Pos2::new(10.0, 10.0), egui::vec2(30.0, 20.0));
        scene.add_region(rect, RegionKind::Text, None);
        scene.add_sticker(
            RgbaImage::from_pixel(10, 10, Rgba([0, 128, 0, 255])),
            Pos2::new(60.0, 60.0),
        );
        let fonts = FontBook::new();
        let a = render_preview(&raster, &scene, &fonts, true).unwrap();
        let b = render_preview(&raster, &scene, &fonts, true).unwrap();
        assert_eq!(a, b);
    }
}
