//! Entry-name encoding detection for legacy zip archives
//!
//! Zip tools on different hosts write entry names in whatever code page the
//! host uses. Candidates are tried in order and the first one under which no
//! name shows signs of mis-decoding wins.

use encoding_rs::{Encoding, BIG5, GBK, UTF_8};

/// Ordered list of encodings tried when decoding entry names
#[derive(Debug, Clone)]
pub struct EncodingCandidates {
    encodings: Vec<&'static Encoding>,
}

impl EncodingCandidates {
    /// UTF-8, then the host default (if any), then cp950 (Big5), then cp936 (GBK).
    /// Duplicates are dropped keeping the first position.
    pub fn with_host(host: Option<&'static Encoding>) -> Self {
        let mut encodings: Vec<&'static Encoding> = Vec::with_capacity(4);
        for encoding in [Some(UTF_8), host, Some(BIG5), Some(GBK)].into_iter().flatten() {
            if !encodings.contains(&encoding) {
                encodings.push(encoding);
            }
        }
        Self { encodings }
    }

    /// Candidates using the host default derived from the locale environment
    pub fn from_env() -> Self {
        Self::with_host(host_encoding_from_env())
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static Encoding> + '_ {
        self.encodings.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.encodings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }
}

impl Default for EncodingCandidates {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Resolve an encoding label such as `big5`, `gbk`, `windows-1252`
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Host default code page taken from `LC_ALL`, `LC_CTYPE` or `LANG`
/// (e.g. `zh_TW.Big5` -> Big5). Returns `None` when no charset is named.
pub fn host_encoding_from_env() -> Option<&'static Encoding> {
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .and_then(|locale| charset_of_locale(&locale))
}

/// Extract the charset part of a POSIX locale name
pub fn charset_of_locale(locale: &str) -> Option<&'static Encoding> {
    let (_, rest) = locale.split_once('.')?;
    let charset = rest.split('@').next()?;
    encoding_for_label(charset)
}

/// A decoded name is suspect when it contains a replacement character or a
/// control character other than CR, LF or TAB.
pub fn looks_misdecoded(name: &str) -> bool {
    name.chars().any(|c| {
        c == char::REPLACEMENT_CHARACTER || (c.is_control() && !matches!(c, '\r' | '\n' | '\t'))
    })
}

/// Decode a raw name, returning `None` when the result looks mis-decoded
pub fn decode_name(raw: &[u8], encoding: &'static Encoding) -> Option<String> {
    let (decoded, _had_errors) = encoding.decode_without_bom_handling(raw);
    if looks_misdecoded(&decoded) {
        None
    } else {
        Some(decoded.into_owned())
    }
}

/// Pick the first candidate under which every raw name decodes cleanly
pub fn detect_encoding(
    raw_names: &[Vec<u8>],
    candidates: &EncodingCandidates,
) -> Option<&'static Encoding> {
    candidates
        .iter()
        .find(|&encoding| raw_names.iter().all(|raw| decode_name(raw, encoding).is_some()))
}
