use thiserror::Error;

/// Errors that can abort a full render or export. Per-region collaborator
/// failures are not listed here: those degrade to warnings and never stop
/// the pass.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("cannot allocate a {width}x{height} surface")]
    SurfaceAlloc { width: u32, height: u32 },
    #[error("no source raster loaded")]
    NoRaster,
    #[error("PNG encode failed: {0}")]
    PngEncode(#[from] image::ImageError),
}

/// Failure reported by the generative-image collaborator.
#[derive(Error, Debug)]
#[error("image generation failed: {0}")]
pub struct AiError(pub String);

/// Errors from the credential store collaborator.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("cannot access credential storage: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
