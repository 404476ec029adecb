use once_cell::sync::Lazy;

/// Image formats recognized by signature sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Tiff,
}

struct Signature {
    offset: usize,
    bytes: &'static [u8],
    format: ImageFormat,
}

/// Ordered signature table, first match wins. WEBP shares RIFF's leading
/// bytes with WAV/AVI, so it matches on the `WEBP` tag at offset 8 instead.
static SIGNATURES: Lazy<Vec<Signature>> = Lazy::new(|| {
    vec![
        Signature { offset: 0, bytes: &[0xFF, 0xD8, 0xFF], format: ImageFormat::Jpeg },
        Signature { offset: 0, bytes: &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], format: ImageFormat::Png },
        Signature { offset: 0, bytes: b"GIF87a", format: ImageFormat::Gif },
        Signature { offset: 0, bytes: b"GIF89a", format: ImageFormat::Gif },
        Signature { offset: 8, bytes: b"WEBP", format: ImageFormat::Webp },
        Signature { offset: 0, bytes: b"BM", format: ImageFormat::Bmp },
        Signature { offset: 0, bytes: &[0x49, 0x49, 0x2A, 0x00], format: ImageFormat::Tiff },
        Signature { offset: 0, bytes: &[0x4D, 0x4D, 0x00, 0x2A], format: ImageFormat::Tiff },
    ]
});

/// Probe the leading bytes of a file against the signature table. Content
/// decides, never the filename extension.
pub fn sniff_image(leading: &[u8]) -> Option<ImageFormat> {
    SIGNATURES.iter().find_map(|sig| {
        let end = sig.offset + sig.bytes.len();
        (leading.len() >= end && &leading[sig.offset..end] == sig.bytes).then_some(sig.format)
    })
}

pub fn is_image(leading: &[u8]) -> bool {
    sniff_image(leading).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_known_signatures() {
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), Some(ImageFormat::Jpeg));
        assert_eq!(
            sniff_image(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00]),
            Some(ImageFormat::Png)
        );
        assert_eq!(sniff_image(b"GIF89a..."), Some(ImageFormat::Gif));
        assert_eq!(sniff_image(b"RIFF\x10\x00\x00\x00WEBPVP8 "), Some(ImageFormat::Webp));
        assert_eq!(sniff_image(&[0x49, 0x49, 0x2A, 0x00, 0x08]), Some(ImageFormat::Tiff));
    }

    #[test]
    fn rejects_text_and_short_input() {
        assert_eq!(sniff_image(b"someContent"), None);
        assert_eq!(sniff_image(&[0xFF]), None);
        assert_eq!(sniff_image(&[]), None);
        // RIFF without the WEBP tag is not an image
        assert_eq!(sniff_image(b"RIFF\x10\x00\x00\x00WAVEfmt "), None);
    }
}
