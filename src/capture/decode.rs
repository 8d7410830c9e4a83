//! Content-type sniffing and charset resolution for recorded bodies.
//!
//! Whether a body is text is decided from the declared content type alone;
//! the bytes themselves are never inspected.

use std::sync::OnceLock;

use encoding_rs::{mem, Encoding, UTF_8};
use regex::Regex;

/// Content-type prefixes whose bodies are decoded as text. Matching is
/// case-sensitive.
const TEXT_CONTENT_TYPES: [&str; 3] = ["application/json", "application/xml", "text/"];

/// Label used in placeholders when the content type is absent or empty.
const UNKNOWN_CONTENT_TYPE: &str = "N/A";

/// Returns true if `content_type` declares a textual body.
pub fn is_text_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| TEXT_CONTENT_TYPES.iter().any(|prefix| ct.starts_with(prefix)))
}

/// Labels that name true ISO-8859-1. WHATWG folds these into windows-1252,
/// which disagrees on 0x80..=0x9F, so they are resolved before the label table.
const LATIN1_LABELS: [&str; 11] = [
    "iso-8859-1",
    "iso8859-1",
    "iso88591",
    "iso_8859-1",
    "iso_8859-1:1987",
    "latin1",
    "l1",
    "iso-ir-100",
    "cp819",
    "ibm819",
    "csisolatin1",
];

/// Charset named by a content type.
#[derive(Debug, Clone, PartialEq)]
pub enum Charset {
    /// A `charset=` parameter naming a supported encoding.
    Declared(&'static Encoding),
    /// A `charset=` parameter naming ISO-8859-1. Every byte maps to the code
    /// point of the same value.
    Latin1,
    /// A `charset=` parameter whose label no encoding answers to.
    Unrecognized(String),
    /// No `charset=` parameter.
    Absent,
}

impl Charset {
    /// Decode `bytes`. Unrecognized and absent charsets decode as UTF-8.
    /// Malformed sequences become U+FFFD.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Charset::Latin1 => mem::decode_latin1(bytes).into_owned(),
            Charset::Declared(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
            Charset::Unrecognized(_) | Charset::Absent => {
                UTF_8.decode_without_bom_handling(bytes).0.into_owned()
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Charset::Unrecognized(_) | Charset::Absent)
    }
}

fn charset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r";\s*charset=([^\s;]+)").expect("charset pattern is a valid regex")
    })
}

/// Resolve the charset from the first `; charset=<value>` parameter.
pub fn resolve_charset(content_type: &str) -> Charset {
    let label = match charset_pattern()
        .captures(content_type)
        .and_then(|captures| captures.get(1))
    {
        Some(m) => m.as_str().trim_matches('"'),
        None => return Charset::Absent,
    };

    if LATIN1_LABELS.iter().any(|latin1| latin1.eq_ignore_ascii_case(label)) {
        return Charset::Latin1;
    }

    // The "replacement" encoding would turn every body into U+FFFD, so labels
    // mapping to it count as unrecognized.
    match Encoding::for_label_no_replacement(label.as_bytes()) {
        Some(encoding) => Charset::Declared(encoding),
        None => Charset::Unrecognized(label.to_string()),
    }
}

/// Decode `bytes` using the charset declared by `content_type`.
/// Malformed sequences are replaced with U+FFFD.
pub fn decode_text(bytes: &[u8], content_type: &str) -> String {
    let charset = resolve_charset(content_type);
    if let Charset::Unrecognized(label) = &charset {
        tracing::debug!(charset = %label, "Unrecognized charset, decoding as UTF-8");
    }
    charset.decode(bytes)
}

/// Describe a body that is not decoded: `"<content-type> [<n> bytes]"`.
pub fn placeholder(content_type: Option<&str>, observed_length: u64) -> String {
    let content_type = content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or(UNKNOWN_CONTENT_TYPE);
    format!("{} [{} bytes]", content_type, observed_length)
}
