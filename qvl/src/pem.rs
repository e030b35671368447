//! PEM extraction and decoding.
//!
//! The `cert_data` region of a DCAP quote is a PEM concatenation embedded
//! in a binary context, frequently with a trailing NUL or other padding, so
//! the extractor scans for BEGIN/END CERTIFICATE marker pairs and ignores
//! everything around them.

use base64::Engine;

use crate::error::{Error, Result};

const BEGIN_CERT: &str = "-----BEGIN CERTIFICATE-----";
const END_CERT: &str = "-----END CERTIFICATE-----";

/// Scan a byte buffer for PEM certificate blocks, in order. Surrounding
/// binary garbage is ignored; each returned string spans one full
/// BEGIN..END block inclusive.
pub fn extract_pem_certificates(bytes: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut pos = 0;

    while let Some(begin) = find(bytes, BEGIN_CERT.as_bytes(), pos) {
        let Some(end) = find(bytes, END_CERT.as_bytes(), begin) else {
            break;
        };
        let block = &bytes[begin..end + END_CERT.len()];
        // Marker-delimited PEM is ASCII unless corrupted; skip it if not.
        if let Ok(block) = std::str::from_utf8(block) {
            out.push(block.to_owned());
        }
        pos = end + END_CERT.len();
    }

    out
}

/// Decode the first PEM certificate block in `pem` to DER.
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    let malformed = |what| Error::invalid("PEM certificate", 0, what);

    let start = pem
        .find(BEGIN_CERT)
        .ok_or_else(|| malformed("missing BEGIN CERTIFICATE marker"))?
        + BEGIN_CERT.len();
    let end = pem[start..]
        .find(END_CERT)
        .ok_or_else(|| malformed("missing END CERTIFICATE marker"))?
        + start;

    let body: String = pem[start..end]
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|_| malformed("invalid base64 body"))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
