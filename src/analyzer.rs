//! Pixel-sampling heuristics that pre-fill a freshly drawn region's colors
//! and font size. The sample sets are fixed and tiny so analysis cost does
//! not depend on region size; the results are defaults the user can
//! override, not a vision model.

use egui::{Pos2, Rect};
use image::RgbaImage;
use log::debug;

use crate::color::{self, Rgb};

/// Ratio of region height used as the suggested font size.
pub const FONT_SIZE_RATIO: f32 = 0.7;
pub const FONT_SIZE_MIN: f32 = 12.0;
pub const FONT_SIZE_MAX: f32 = 200.0;

/// Minimum summed per-channel distance (over 3 channels) for a sample to
/// count as contrasting text. Below this the region is judged to carry no
/// detectable text and a black/white fallback is used.
pub const CONTRAST_THRESHOLD: u32 = 100;

/// Inset from region edges for background samples.
const EDGE_INSET: f32 = 2.0;
/// Distance outside the rect for surrounding-color samples.
const SURROUND_MARGIN: f32 = 10.0;
const TEXT_SAMPLE_COUNT: usize = 5;

/// Result of [`analyze_region`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionAnalysis {
    pub background: Rgb,
    pub text_color: Rgb,
    pub font_size: f32,
}

/// Estimate background, text color, and font size for a rectangle of the
/// source raster. The rectangle is clamped to raster bounds; an entirely
/// out-of-bounds rectangle degrades to white/contrast defaults.
pub fn analyze_region(raster: &RgbaImage, rect: Rect) -> RegionAnalysis {
    let Some(rect) = clamp_to_raster(rect, raster) else {
        return RegionAnalysis {
            background: Rgb::WHITE,
            text_color: Rgb::BLACK,
            font_size: FONT_SIZE_MIN,
        };
    };
    let background = detect_background_color_fast(raster, rect);
    let text_color = detect_text_color(raster, rect, background);
    RegionAnalysis {
        background,
        text_color,
        font_size: estimate_font_size(rect.height()),
    }
}

/// Background estimate from 8 fixed samples: the 4 corners inset by 2 px and
/// the 4 edge midpoints. Out-of-bounds samples are skipped; if every sample
/// is skipped the safe default is white.
pub fn detect_background_color_fast(raster: &RgbaImage, rect: Rect) -> Rgb {
    let Some(rect) = clamp_to_raster(rect, raster) else {
        return Rgb::WHITE;
    };
    let (l, t) = (rect.left() + EDGE_INSET, rect.top() + EDGE_INSET);
    let (r, b) = (rect.right() - EDGE_INSET, rect.bottom() - EDGE_INSET);
    let center = rect.center();

    let points = [
        Pos2::new(l, t),
        Pos2::new(r, t),
        Pos2::new(l, b),
        Pos2::new(r, b),
        Pos2::new(center.x, t),
        Pos2::new(center.x, b),
        Pos2::new(l, center.y),
        Pos2::new(r, center.y),
    ];

    average_samples(raster, &points).unwrap_or(Rgb::WHITE)
}

/// Text-color estimate: sample 5 points on a circle of radius min(w, h)/4
/// around the region center and keep the one farthest from the background.
/// If even the farthest sample is within [`CONTRAST_THRESHOLD`], fall back
/// to black or white by background luminance.
pub fn detect_text_color(raster: &RgbaImage, rect: Rect, background: Rgb) -> Rgb {
    let Some(rect) = clamp_to_raster(rect, raster) else {
        return background.contrasting();
    };
    let center = rect.center();
    let radius = rect.width().min(rect.height()) / 4.0;

    let mut best: Option<(Rgb, u32)> = None;
    for i in 0..TEXT_SAMPLE_COUNT {
        let angle = i as f32 * std::f32::consts::TAU / TEXT_SAMPLE_COUNT as f32;
        let point = Pos2::new(center.x + radius * angle.cos(), center.y + radius * angle.sin());
        let Some(sample) = sample_pixel(raster, point) else {
            continue;
        };
        let distance = sample.channel_distance(background);
        if best.is_none_or(|(_, best_distance)| distance > best_distance) {
            best = Some((sample, distance));
        }
    }

    match best {
        Some((sample, distance)) if distance >= CONTRAST_THRESHOLD => sample,
        _ => {
            debug!("no contrasting text found, using luminance fallback");
            background.contrasting()
        }
    }
}

/// Average of 4 samples just outside the rectangle, one past each edge
/// midpoint. Used for image-replace regions, where the interesting color is
/// the page around the region rather than its contents. Samples outside the
/// raster are skipped independently; all skipped means white.
pub fn detect_surrounding_color(raster: &RgbaImage, rect: Rect) -> Rgb {
    let center = rect.center();
    let points = [
        Pos2::new(center.x, rect.top() - SURROUND_MARGIN),
        Pos2::new(center.x, rect.bottom() + SURROUND_MARGIN),
        Pos2::new(rect.left() - SURROUND_MARGIN, center.y),
        Pos2::new(rect.right() + SURROUND_MARGIN, center.y),
    ];
    average_samples(raster, &points).unwrap_or(Rgb::WHITE)
}

/// `round(height * 0.7)` clamped to [12, 200].
pub fn estimate_font_size(height: f32) -> f32 {
    (height * FONT_SIZE_RATIO)
        .round()
        .clamp(FONT_SIZE_MIN, FONT_SIZE_MAX)
}

/// Shrink a rectangle to the raster bounds. `None` when the rectangle lies
/// entirely outside the raster: `Rect::intersect` inverts rather than
/// collapses in that case, and an inverted rect's corners alias sample
/// points back inside the raster.
fn clamp_to_raster(rect: Rect, raster: &RgbaImage) -> Option<Rect> {
    let bounds = Rect::from_min_max(
        Pos2::ZERO,
        Pos2::new(raster.width() as f32, raster.height() as f32),
    );
    let clamped = rect.intersect(bounds);
    (!clamped.is_negative()).then_some(clamped)
}

fn average_samples(raster: &RgbaImage, points: &[Pos2]) -> Option<Rgb> {
    let samples: Vec<Rgb> = points
        .iter()
        .filter_map(|point| sample_pixel(raster, *point))
        .collect();
    color::average(&samples)
}

/// Read one pixel, or `None` when the point lies outside the raster.
fn sample_pixel(raster: &RgbaImage, point: Pos2) -> Option<Rgb> {
    if point.x < 0.0 || point.y < 0.0 {
        return None;
    }
    let (x, y) = (point.x as u32, point.y as u32);
    if x >= raster.width() || y >= raster.height() {
        return None;
    }
    let pixel = raster.get_pixel(x, y);
    Some(Rgb([pixel.0[0], pixel.0[1], pixel.0[2]]))
}
