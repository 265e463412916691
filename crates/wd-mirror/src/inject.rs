//! Reload script injection.
//!
//! Inserts a fixed comment and `<script type="module">` tag immediately
//! before the first literal `</head>` of an HTML document. Documents
//! without a `</head>` (fragments, partials) are left as they are; that
//! is not an error.

use std::borrow::Cow;

use crate::sniff::{ContentType, sniff};

/// Marker inserted before `</head>`.
///
/// References the generated client script by its absolute mirror-root path
/// so that pages in nested directories load the same file.
pub const RELOAD_MARKER: &str = "<!-- This script has been injected by wd and allows hot reloads -->\n\
<script type=\"module\" src=\"/delta-streamer.js\"></script>";

const HEAD_CLOSE: &[u8] = b"</head>";

/// Inject the reload marker into `content` of the given type.
///
/// Returns `Some` with the rewritten document when the marker was inserted,
/// `None` when the content is not HTML or has no `</head>`. In the `None`
/// case the caller's bytes are the output.
#[must_use]
pub fn inject(content: &[u8], content_type: ContentType) -> Option<Vec<u8>> {
    if content_type != ContentType::Html {
        return None;
    }

    let at = find(content, HEAD_CLOSE)?;

    let mut out = Vec::with_capacity(content.len() + RELOAD_MARKER.len());
    out.extend_from_slice(&content[..at]);
    out.extend_from_slice(RELOAD_MARKER.as_bytes());
    out.extend_from_slice(&content[at..]);
    Some(out)
}

/// Sniff `content` and inject the reload marker if it applies.
///
/// Borrows the input when nothing was injected.
#[must_use]
pub fn inject_reload_script(content: &[u8]) -> Cow<'_, [u8]> {
    match inject(content, sniff(content)) {
        Some(injected) => Cow::Owned(injected),
        None => Cow::Borrowed(content),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
