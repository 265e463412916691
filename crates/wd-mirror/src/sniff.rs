//! Content sniffing.
//!
//! Decides whether a file is HTML by looking at its bytes rather than its
//! name, following the HTML rows of the WHATWG MIME sniffing table.

/// Number of leading bytes considered when sniffing.
const SNIFF_LEN: usize = 512;

/// Tags that mark a document as HTML when they open it.
///
/// Each must be followed by a space or `>` to count as a match.
const HTML_SIGNATURES: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Detected content class of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    /// Markup that the reload script can be injected into.
    Html,
    /// Anything else, mirrored byte for byte.
    Other,
}

/// Classify `content` by its leading bytes.
#[must_use]
pub fn sniff(content: &[u8]) -> ContentType {
    let head = &content[..content.len().min(SNIFF_LEN)];
    let start = head
        .iter()
        .position(|b| !is_sniff_whitespace(*b))
        .unwrap_or(head.len());
    let head = &head[start..];

    if HTML_SIGNATURES.iter().any(|sig| opens_with_tag(head, sig)) {
        ContentType::Html
    } else {
        ContentType::Other
    }
}

fn is_sniff_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | 0x0c | b'\r' | b' ')
}

fn opens_with_tag(data: &[u8], signature: &[u8]) -> bool {
    data.len() > signature.len()
        && data[..signature.len()].eq_ignore_ascii_case(signature)
        && matches!(data[signature.len()], b' ' | b'>')
}
