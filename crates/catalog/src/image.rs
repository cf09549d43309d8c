//! Product images: format detection and attachment metadata.
//!
//! Formats are identified from the leading bytes of the upload. Client-supplied
//! content types and file extensions are not trusted.

use serde::{Deserialize, Serialize};

use harvest_core::{DomainError, uuid_newtype};

uuid_newtype!(
    /// Identifier of an image attached to a variant.
    pub struct ImageId,
    "ImageId"
);

pub const UNSUPPORTED_FORMAT: &str = "has an unsupported format";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

        if bytes.starts_with(PNG) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Image metadata stored on the variant; the bytes live in the attachment store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    /// 1-based order within the variant, assigned on attach.
    pub position: u32,
    pub alt: Option<String>,
    pub attachment_file_name: String,
    pub attachment_content_type: String,
    pub attachment_file_size: u64,
}

impl Image {
    /// Build metadata for an upload, rejecting anything that is not a supported image.
    pub fn from_upload(
        id: ImageId,
        file_name: Option<&str>,
        alt: Option<String>,
        bytes: &[u8],
    ) -> Result<Self, DomainError> {
        let format = ImageFormat::sniff(bytes)
            .ok_or_else(|| DomainError::validation("attachment", UNSUPPORTED_FORMAT))?;

        let file_name = file_name
            .map(base_name)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("image.{}", format.extension()));

        Ok(Self {
            id,
            position: 0,
            alt,
            attachment_file_name: file_name,
            attachment_content_type: format.content_type().to_string(),
            attachment_file_size: bytes.len() as u64,
        })
    }
}

/// Strip any client-side directory components.
fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn sniffs_supported_formats() {
        assert_eq!(ImageFormat::sniff(PNG_HEADER), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::Webp));
    }

    #[test]
    fn rejects_unknown_and_empty_uploads() {
        // OpenEXR magic number.
        assert_eq!(ImageFormat::sniff(&[0x76, 0x2f, 0x31, 0x01]), None);
        assert_eq!(ImageFormat::sniff(&[]), None);

        let err = Image::from_upload(ImageId::new(), Some("unsupported_image_format.exr"), None, &[])
            .unwrap_err();
        let DomainError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("attachment"), Some(&[UNSUPPORTED_FORMAT.to_string()][..]));
    }

    #[test]
    fn metadata_comes_from_the_bytes() {
        let image =
            Image::from_upload(ImageId::new(), Some("C:\\photos\\logo.gif"), None, PNG_HEADER).unwrap();
        assert_eq!(image.attachment_content_type, "image/png");
        assert_eq!(image.attachment_file_name, "logo.gif");
        assert_eq!(image.attachment_file_size, PNG_HEADER.len() as u64);

        let unnamed = Image::from_upload(ImageId::new(), None, None, PNG_HEADER).unwrap();
        assert_eq!(unnamed.attachment_file_name, "image.png");
    }
}
