//! MIME detection and data-URI encoding for file posts.

use base64::Engine;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Magic numbers checked before falling back to the file extension.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b", "application/gzip"),
    (b"BM", "image/bmp"),
    (b"OggS", "audio/ogg"),
    (b"fLaC", "audio/x-flac"),
    (b"ID3", "audio/mpeg"),
    (b"\x1aE\xdf\xa3", "video/webm"),
    (b"\x00asm", "application/wasm"),
];

/// Guess a MIME type from the leading bytes of a file.
pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
    let known = SIGNATURES
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))
        .map(|(_, mime)| *mime);
    if known.is_some() {
        return known;
    }
    // RIFF and ISO-BMFF containers keep their brand a few bytes in.
    match (bytes.get(0..4), bytes.get(8..12)) {
        (Some(b"RIFF"), Some(b"WEBP")) => return Some("image/webp"),
        (Some(b"RIFF"), Some(b"WAVE")) => return Some("audio/wav"),
        _ => {}
    }
    match (bytes.get(4..8), bytes.get(8..12)) {
        (Some(b"ftyp"), Some(b"avif")) => Some("image/avif"),
        (Some(b"ftyp"), Some(b"qt  ")) => Some("video/quicktime"),
        (Some(b"ftyp"), Some(_)) => Some("video/mp4"),
        _ => None,
    }
}

/// MIME type by content, then by file name, then `application/octet-stream`.
pub fn mime_type(file_name: &str, bytes: &[u8]) -> String {
    sniff(bytes)
        .map(str::to_string)
        .or_else(|| mime_guess::from_path(file_name).first_raw().map(str::to_string))
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// `data:<mime>;base64,<payload>` for the given file.
pub fn data_uri(file_name: &str, bytes: &[u8]) -> String {
    let mime = mime_type(file_name, bytes);
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{payload}")
}
