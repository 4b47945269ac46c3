//! Media preparation before upload.
//!
//! Photos are downscaled to 800 px wide and re-encoded at quality 60.
//! Videos above 10 MiB go through `ffmpeg` (H.264, 1280 px tall, CRF 28).

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

use crate::error::{MediaError, MediaResult};

/// Photos wider than this are scaled down.
pub const MAX_IMAGE_WIDTH: u32 = 800;

/// JPEG quality after re-encoding.
pub const JPEG_QUALITY: u8 = 60;

/// Largest photo accepted after compression.
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Largest video accepted before compression.
pub const MAX_VIDEO_BYTES: u64 = 100 * 1024 * 1024;

/// Videos above this size are compressed, and must end up below it.
pub const TARGET_VIDEO_BYTES: u64 = 10 * 1024 * 1024;

/// Bytes ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMedia {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Guess a MIME type from the file extension.
pub fn detect_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

fn format_for_mime(mime: &str) -> Option<ImageFormat> {
    match mime {
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        "image/webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}

fn downscale(img: DynamicImage) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= MAX_IMAGE_WIDTH {
        return img;
    }
    let new_height = ((height as u64 * MAX_IMAGE_WIDTH as u64) / width as u64).max(1) as u32;
    img.resize_exact(MAX_IMAGE_WIDTH, new_height, FilterType::Triangle)
}

fn encode(img: &DynamicImage, format: ImageFormat) -> MediaResult<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
            img.to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| MediaError::Encode(e.to_string()))?;
        }
        other => {
            img.write_to(&mut Cursor::new(&mut buffer), other)
                .map_err(|e| MediaError::Encode(e.to_string()))?;
        }
    }
    Ok(buffer)
}

/// Decode (format sniffed from the bytes), downscale and encode as `output`.
fn recompress(data: &[u8], output: ImageFormat) -> MediaResult<Vec<u8>> {
    let img = image::load_from_memory(data).map_err(|e| MediaError::Encode(e.to_string()))?;
    encode(&downscale(img), output)
}

/// Downscale and re-encode a photo in its own format.
///
/// Non-image input and unsupported formats pass through untouched, as does
/// anything that fails to decode.
pub fn compress_image(data: &[u8], mime: &str) -> PreparedMedia {
    let passthrough = || PreparedMedia {
        bytes: Bytes::copy_from_slice(data),
        content_type: mime.to_string(),
    };

    let Some(format) = format_for_mime(mime) else {
        return passthrough();
    };

    match recompress(data, format) {
        Ok(bytes) => PreparedMedia {
            bytes: Bytes::from(bytes),
            content_type: mime.to_string(),
        },
        Err(e) => {
            tracing::warn!(mime, error = %e, "image compression failed, keeping original");
            passthrough()
        }
    }
}

/// Prepare a photo for a `.jpg` slot: downscale, convert to JPEG and check
/// the size limit.
///
/// Photos that cannot be converted (HEIC, undecodable data) are uploaded
/// as they are, labelled with their own MIME type.
pub fn prepare_photo(data: &[u8], mime: &str) -> MediaResult<PreparedMedia> {
    let converted = match format_for_mime(mime) {
        Some(_) => match recompress(data, ImageFormat::Jpeg) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                tracing::warn!(mime, error = %e, "photo conversion failed, uploading original");
                None
            }
        },
        None => None,
    };

    let prepared = match converted {
        Some(bytes) => PreparedMedia {
            bytes,
            content_type: "image/jpeg".to_string(),
        },
        None => PreparedMedia {
            bytes: Bytes::copy_from_slice(data),
            content_type: mime.to_string(),
        },
    };

    check_size("image", prepared.bytes.len() as u64, MAX_IMAGE_BYTES)?;
    Ok(prepared)
}

fn check_size(kind: &'static str, size: u64, limit: u64) -> MediaResult<()> {
    if size > limit {
        return Err(MediaError::TooLarge { kind, size, limit });
    }
    Ok(())
}

/// `ffmpeg` arguments for the video transcode.
pub fn ffmpeg_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-vf".into(),
        "scale=-2:1280".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-crf".into(),
        "28".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "96k".into(),
        "-ac".into(),
        "1".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// A video ready to upload. A transcoded file is removed on drop.
#[derive(Debug)]
pub enum PreparedVideo {
    Original(PathBuf),
    Compressed(TempPath),
}

impl PreparedVideo {
    pub fn path(&self) -> &Path {
        match self {
            Self::Original(path) => path,
            Self::Compressed(path) => path,
        }
    }

    /// MIME type of the file at [`path`](Self::path).
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Original(path) => match detect_mime(path) {
                "application/octet-stream" => "video/mp4",
                mime => mime,
            },
            Self::Compressed(_) => "video/mp4",
        }
    }
}

/// Transcode `path` with `ffmpeg` into a temporary MP4.
///
/// Fails when the result is still above [`TARGET_VIDEO_BYTES`].
pub async fn compress_video(path: &Path) -> MediaResult<TempPath> {
    let output = tempfile::Builder::new()
        .prefix("intake-video-")
        .suffix(".mp4")
        .tempfile()?
        .into_temp_path();

    let result = tokio::process::Command::new("ffmpeg")
        .args(ffmpeg_args(path, &output))
        .output()
        .await
        .map_err(|e| MediaError::Ffmpeg(format!("could not run ffmpeg: {}", e)))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");
        return Err(MediaError::Ffmpeg(format!(
            "exit code {:?}: {}",
            result.status.code(),
            tail
        )));
    }

    let size = tokio::fs::metadata(&output).await?.len();
    check_size("compressed video", size, TARGET_VIDEO_BYTES)?;

    tracing::info!(source = %path.display(), size, "video compressed");
    Ok(output)
}

/// Check the video size limit and compress when above the target.
pub async fn prepare_video(path: &Path) -> MediaResult<PreparedVideo> {
    let size = tokio::fs::metadata(path).await?.len();
    check_size("video", size, MAX_VIDEO_BYTES)?;

    if size <= TARGET_VIDEO_BYTES {
        return Ok(PreparedVideo::Original(path.to_path_buf()));
    }
    Ok(PreparedVideo::Compressed(compress_video(path).await?))
}
