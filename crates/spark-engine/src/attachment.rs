use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use spark_contracts::chat::ImageAttachment;

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// Reads a jpg/png upload and checks that it decodes as an image.
pub fn load_attachment(path: &Path) -> Result<ImageAttachment> {
    let mime_type = mime_for_path(path).ok_or_else(|| {
        anyhow!(
            "unsupported image type for {} (expected jpg, jpeg or png)",
            path.display()
        )
    })?;
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    image::load_from_memory(&bytes)
        .with_context(|| format!("failed decoding image {}", path.display()))?;
    let name = path
        .file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    Ok(ImageAttachment::new(name, mime_type, bytes))
}

pub fn image_dimensions(image: &ImageAttachment) -> Option<(u32, u32)> {
    let decoded = image::load_from_memory(&image.bytes).ok()?;
    Some((decoded.width(), decoded.height()))
}
