//! Byte-level cleanup of export files
//!
//! The recording system writes Latin-1 text, sometimes behind a UTF-8 byte
//! order mark, with CRLF line endings. Tokenizing happens on the cleaned
//! text only.

use encoding_rs::WINDOWS_1252;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Strip a leading BOM, decode the legacy single-byte encoding and drop
/// carriage returns
pub fn sanitize(bytes: &[u8]) -> String {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    // WHATWG maps ISO-8859-1 onto windows-1252; both agree outside 0x80..0x9F
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(body);

    text.chars().filter(|&c| c != '\r').collect()
}
