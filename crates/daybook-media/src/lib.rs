use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use daybook_core::{
    BlobStore, DaybookError, DaybookResult, MAX_RAW_IMAGE_BYTES, now_millis, random_base36,
};
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const PREVIEW_MAX_DIMENSION: u32 = 300;
pub const DEFAULT_UPLOAD_MAX_DIMENSION: u32 = 1280;
pub const JPEG_QUALITY: u8 = 80;

const FALLBACK_MIME: &str = "image/jpeg";
const FALLBACK_EXTENSION: &str = "jpg";

/// A raw image picked by the user, already checked against the size limit.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn read(path: &Path) -> DaybookResult<Self> {
        let metadata = fs::metadata(path).map_err(|err| {
            DaybookError::io(format!("failed to stat image '{}': {}", path.display(), err))
        })?;
        check_size(metadata.len(), &path.display().to_string())?;

        let bytes = fs::read(path).map_err(|err| {
            DaybookError::io(format!("failed to read image '{}': {}", path.display(), err))
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self { name, bytes })
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> DaybookResult<Self> {
        let name = name.into();
        check_size(bytes.len() as u64, &name)?;
        Ok(Self { name, bytes })
    }

    pub fn mime_type(&self) -> String {
        sniff_mime(&self.bytes, &self.name)
    }
}

/// Where the payload is headed once it leaves the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPlan {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub downscaled: bool,
}

/// `data:<mime>;base64,<payload>` for the raw bytes.
pub fn encode_inline(file: &ImageFile) -> String {
    format!(
        "data:{};base64,{}",
        file.mime_type(),
        STANDARD.encode(&file.bytes)
    )
}

pub fn decode_inline(payload: &str) -> Option<(String, Vec<u8>)> {
    let rest = payload.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(data.trim()).ok()?;
    Some((mime.to_string(), bytes))
}

/// Shrinks an inline payload so its longer edge is at most `max_dimension`
/// and re-encodes it as JPEG. Anything that cannot be decoded comes back
/// untouched.
pub fn downscale(payload: &str, max_dimension: u32) -> String {
    let Some((_, bytes)) = decode_inline(payload) else {
        debug!("not an inline image payload; leaving it as is");
        return payload.to_string();
    };

    match downscale_bytes(&bytes, max_dimension) {
        Ok(jpeg) => format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg)),
        Err(err) => {
            debug!(error = %err, "downscale skipped");
            payload.to_string()
        }
    }
}

pub fn downscale_bytes(bytes: &[u8], max_dimension: u32) -> DaybookResult<Vec<u8>> {
    if max_dimension == 0 {
        return Err(DaybookError::validation(
            "max dimension must be greater than zero",
        ));
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|err| DaybookError::validation(format!("failed to decode image: {err}")))?;
    let scaled = if decoded.width().max(decoded.height()) > max_dimension {
        decoded.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        decoded
    };

    let rgb = DynamicImage::ImageRgb8(scaled.to_rgb8());
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|err| DaybookError::io(format!("failed to encode JPEG: {err}")))?;
    Ok(out)
}

/// The inline thumbnail used as a fallback reference when uploading fails.
pub fn preview(file: &ImageFile) -> String {
    downscale(&encode_inline(file), PREVIEW_MAX_DIMENSION)
}

pub fn plan_upload(file: &ImageFile, max_dimension: Option<u32>) -> UploadPlan {
    if let Some(max_dimension) = max_dimension
        && let Ok(smaller) = downscale_bytes(&file.bytes, max_dimension)
        && smaller.len() < file.bytes.len()
    {
        return UploadPlan {
            filename: generate_filename(FALLBACK_EXTENSION),
            content_type: FALLBACK_MIME.to_string(),
            bytes: smaller,
            downscaled: true,
        };
    }

    UploadPlan {
        filename: generate_filename(&extension_for(file)),
        content_type: file.mime_type(),
        bytes: file.bytes.clone(),
        downscaled: false,
    }
}

pub fn upload(
    blobs: &dyn BlobStore,
    file: &ImageFile,
    max_dimension: Option<u32>,
) -> DaybookResult<String> {
    let plan = plan_upload(file, max_dimension);
    debug!(
        filename = %plan.filename,
        bytes = plan.bytes.len(),
        downscaled = plan.downscaled,
        "uploading image"
    );
    blobs.put(&plan.filename, &plan.content_type, plan.bytes)
}

pub fn generate_filename(extension: &str) -> String {
    format!("{}_{}.{extension}", now_millis(), random_base36(7))
}

pub fn sniff_mime(bytes: &[u8], name: &str) -> String {
    if let Some(kind) = infer::get(bytes)
        && kind.mime_type().starts_with("image/")
    {
        return kind.mime_type().to_string();
    }

    let mime = match name_extension(name).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("heic") => "image/heic",
        _ => FALLBACK_MIME,
    };
    mime.to_string()
}

fn extension_for(file: &ImageFile) -> String {
    name_extension(&file.name)
        .or_else(|| infer::get(&file.bytes).map(|kind| kind.extension().to_string()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

fn name_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    let valid = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

fn check_size(len: u64, label: &str) -> DaybookResult<()> {
    if len > MAX_RAW_IMAGE_BYTES {
        return Err(DaybookError::validation(format!(
            "image '{label}' is {len} bytes; the limit is {MAX_RAW_IMAGE_BYTES} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extension_prefers_name_then_sniffed_type() {
        let named = ImageFile::from_bytes("Photo.JPEG", vec![0; 4]).expect("file");
        assert_eq!(extension_for(&named), "jpeg");

        let png_magic = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let unnamed = ImageFile::from_bytes("clipboard", png_magic).expect("file");
        assert_eq!(extension_for(&unnamed), "png");
        assert_eq!(unnamed.mime_type(), "image/png");

        let unknown = ImageFile::from_bytes("blob.tar/gz", vec![1, 2, 3]).expect("file");
        assert_eq!(extension_for(&unknown), "jpg");
        assert_eq!(unknown.mime_type(), "image/jpeg");
    }

    #[test]
    fn oversized_raw_image_is_rejected() {
        let err = ImageFile::from_bytes("big.png", vec![0; MAX_RAW_IMAGE_BYTES as usize + 1])
            .expect_err("too big");
        assert_eq!(err.kind, daybook_core::ErrorKind::Validation);
    }

    #[test]
    fn generated_filenames_have_seven_char_suffix() {
        let name = generate_filename("png");
        let (stem, ext) = name.rsplit_once('.').expect("extension");
        assert_eq!(ext, "png");
        let (millis, suffix) = stem.split_once('_').expect("separator");
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 7);
    }

    #[test]
    fn inline_payload_round_trips() {
        let file = ImageFile::from_bytes("a.gif", b"GIF89a....".to_vec()).expect("file");
        let payload = encode_inline(&file);
        assert!(payload.starts_with("data:image/gif;base64,"));
        assert_eq!(
            decode_inline(&payload),
            Some(("image/gif".to_string(), file.bytes.clone()))
        );
        assert_eq!(decode_inline("https://example.com/a.gif"), None);
    }
}
