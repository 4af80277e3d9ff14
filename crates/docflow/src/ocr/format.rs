//! Content-based format detection for uploaded files.
//!
//! The stored filename is not trusted; the first bytes decide.

use image::ImageFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    WebP,
}

impl DocumentFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            return Some(DocumentFormat::Pdf);
        }
        match image::guess_format(bytes).ok()? {
            ImageFormat::Png => Some(DocumentFormat::Png),
            ImageFormat::Jpeg => Some(DocumentFormat::Jpeg),
            ImageFormat::Gif => Some(DocumentFormat::Gif),
            ImageFormat::Bmp => Some(DocumentFormat::Bmp),
            ImageFormat::Tiff => Some(DocumentFormat::Tiff),
            ImageFormat::WebP => Some(DocumentFormat::WebP),
            _ => None,
        }
    }

    /// Parses a configured format name or file extension.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "png" => Some(DocumentFormat::Png),
            "jpg" | "jpeg" => Some(DocumentFormat::Jpeg),
            "gif" => Some(DocumentFormat::Gif),
            "bmp" => Some(DocumentFormat::Bmp),
            "tif" | "tiff" => Some(DocumentFormat::Tiff),
            "webp" => Some(DocumentFormat::WebP),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Png => "png",
            DocumentFormat::Jpeg => "jpg",
            DocumentFormat::Gif => "gif",
            DocumentFormat::Bmp => "bmp",
            DocumentFormat::Tiff => "tiff",
            DocumentFormat::WebP => "webp",
        }
    }

    pub fn mime_type(&self) -> String {
        mime_guess::from_ext(self.extension())
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, DocumentFormat::Pdf)
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_sniff_pdf() {
        assert_eq!(
            DocumentFormat::sniff(b"%PDF-1.7\n%\xe2\xe3"),
            Some(DocumentFormat::Pdf)
        );
    }

    #[test]
    fn test_sniff_images() {
        assert_eq!(DocumentFormat::sniff(PNG_MAGIC), Some(DocumentFormat::Png));
        assert_eq!(
            DocumentFormat::sniff(b"\xff\xd8\xff\xe0\0\x10JFIF"),
            Some(DocumentFormat::Jpeg)
        );
        assert_eq!(DocumentFormat::sniff(b"GIF89a\x01\0"), Some(DocumentFormat::Gif));
    }

    #[test]
    fn test_sniff_unknown() {
        assert_eq!(DocumentFormat::sniff(b"PK\x03\x04 docx archive"), None);
        assert_eq!(DocumentFormat::sniff(b"plain text"), None);
        assert_eq!(DocumentFormat::sniff(b""), None);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(DocumentFormat::from_name("JPG"), Some(DocumentFormat::Jpeg));
        assert_eq!(DocumentFormat::from_name(".tif"), Some(DocumentFormat::Tiff));
        assert_eq!(DocumentFormat::from_name("docx"), None);
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(DocumentFormat::Pdf.mime_type(), "application/pdf");
        assert_eq!(DocumentFormat::Png.mime_type(), "image/png");
        assert_eq!(DocumentFormat::Jpeg.mime_type(), "image/jpeg");
        assert!(DocumentFormat::Png.is_image());
        assert!(!DocumentFormat::Pdf.is_image());
    }
}
