#![warn(clippy::all, rust_2018_idioms)]

pub mod analyzer;
pub mod color;
pub mod compositor;
pub mod editor;
pub mod error;
pub mod export;
pub mod geometry;
pub mod history;
pub mod layout;
pub mod scene;

pub use analyzer::{RegionAnalysis, analyze_region};
pub use color::Rgb;
pub use compositor::{FontBook, render_preview};
pub use editor::Editor;
pub use error::{AiError, CredentialError, RenderError};
pub use export::{
    AiImageService, CredentialStore, ExportOutcome, ExportWarning, GeneratedImage,
    JsonCredentialStore, export,
};
pub use geometry::Placement;
pub use history::History;
pub use hit_test::{HitTarget, hit_test};
pub use scene::{
    CustomText, FontWeight, RegionKind, RegionPatch, Scene, SceneSnapshot, SelectionRegion,
    Sticker, StickerPatch, TextAlign, TextPatch, TextSegment,
};
