//! Hex, PEM and fingerprint helpers.
//!
//! Pure functions; nothing here touches the native engine.
//!
//! PEM decoding comes in two strengths:
//!
//! - [`from_pem`] / [`from_pem_labeled`]: require a `BEGIN` line and a
//!   matching `END` line, reject anything else around them
//! - [`from_pem_lenient`]: strip the first marker pair and all whitespace,
//!   decode whatever remains (for artifacts produced by older tooling)

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::PkiError;

/// PEM label for private keys.
pub const LABEL_PRIVATE_KEY: &str = "PRIVATE KEY";
/// PEM label for public keys.
pub const LABEL_PUBLIC_KEY: &str = "PUBLIC KEY";
/// PEM label for signatures.
pub const LABEL_SIGNATURE: &str = "SIGNATURE";
/// PEM label for certificate signing requests.
pub const LABEL_CSR: &str = "CERTIFICATE REQUEST";
/// PEM label for certificates.
pub const LABEL_CERTIFICATE: &str = "CERTIFICATE";

const PEM_LINE_WIDTH: usize = 64;
const BEGIN_PREFIX: &str = "-----BEGIN ";
const END_PREFIX: &str = "-----END ";
const MARKER_SUFFIX: &str = "-----";

/// Lowercase hex, two digits per byte.
#[must_use]
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex in either case.
///
/// # Errors
///
/// Returns [`PkiError::InvalidHex`] on odd length or a non-hex character.
pub fn hex_to_bytes(text: &str) -> Result<Vec<u8>, PkiError> {
    hex::decode(text).map_err(|e| PkiError::InvalidHex {
        reason: e.to_string(),
    })
}

/// Frame bytes as PEM with 64-character base64 lines and a trailing newline.
#[must_use]
pub fn to_pem(bytes: &[u8], label: &str) -> String {
    let body = STANDARD.encode(bytes);
    let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE_WIDTH + 2 * label.len() + 40);
    pem.push_str(BEGIN_PREFIX);
    pem.push_str(label);
    pem.push_str(MARKER_SUFFIX);
    pem.push('\n');
    // base64 output is ASCII, so byte chunks are char boundaries
    for line in body.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(std::str::from_utf8(line).unwrap_or_default());
        pem.push('\n');
    }
    pem.push_str(END_PREFIX);
    pem.push_str(label);
    pem.push_str(MARKER_SUFFIX);
    pem.push('\n');
    pem
}

/// Strictly decode a PEM block with any label.
///
/// # Errors
///
/// Returns [`PkiError::InvalidPem`] if framing is missing or inconsistent,
/// or the body is not base64.
pub fn from_pem(text: &str) -> Result<Vec<u8>, PkiError> {
    parse_strict(text).map(|(_, bytes)| bytes)
}

/// Strictly decode a PEM block, requiring `label`.
///
/// # Errors
///
/// As [`from_pem`], plus a label mismatch.
pub fn from_pem_labeled(text: &str, label: &str) -> Result<Vec<u8>, PkiError> {
    let (found, bytes) = parse_strict(text)?;
    if found != label {
        return Err(PkiError::invalid_pem(format!(
            "expected label {label:?}, found {found:?}"
        )));
    }
    Ok(bytes)
}

/// Permissively decode PEM-ish text.
///
/// Removes the first `-----BEGIN ...-----` and `-----END ...-----` markers if
/// present, drops all whitespace, and decodes the remainder. Mismatched or
/// missing markers are accepted.
///
/// # Errors
///
/// Returns [`PkiError::InvalidPem`] if the remainder is not base64.
pub fn from_pem_lenient(text: &str) -> Result<Vec<u8>, PkiError> {
    let stripped = strip_marker(&strip_marker(text, BEGIN_PREFIX), END_PREFIX);
    let body: String = stripped.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(body)
        .map_err(|e| PkiError::invalid_pem(format!("base64: {e}")))
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn parse_strict(text: &str) -> Result<(String, Vec<u8>), PkiError> {
    let mut lines = text.trim().lines().map(str::trim);

    let first = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| PkiError::invalid_pem("empty input"))?;
    let label = first
        .strip_prefix(BEGIN_PREFIX)
        .and_then(|rest| rest.strip_suffix(MARKER_SUFFIX))
        .filter(|label| !label.is_empty() && !label.contains('-'))
        .ok_or_else(|| PkiError::invalid_pem("missing BEGIN line"))?;

    let mut body = String::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if let Some(rest) = line.strip_prefix(END_PREFIX) {
            let end_label = rest
                .strip_suffix(MARKER_SUFFIX)
                .ok_or_else(|| PkiError::invalid_pem("malformed END line"))?;
            if end_label != label {
                return Err(PkiError::invalid_pem(format!(
                    "BEGIN {label:?} closed by END {end_label:?}"
                )));
            }
            closed = true;
            break;
        }
        if line.starts_with(MARKER_SUFFIX) {
            return Err(PkiError::invalid_pem("unexpected marker inside body"));
        }
        body.push_str(line);
    }

    if !closed {
        return Err(PkiError::invalid_pem("missing END line"));
    }
    if lines.any(|line| !line.is_empty()) {
        return Err(PkiError::invalid_pem("data after END line"));
    }

    let bytes = STANDARD
        .decode(body)
        .map_err(|e| PkiError::invalid_pem(format!("base64: {e}")))?;
    Ok((label.to_string(), bytes))
}

/// Remove the first `<prefix>...-----` marker from `text`.
fn strip_marker(text: &str, prefix: &str) -> String {
    let Some(start) = text.find(prefix) else {
        return text.to_string();
    };
    let after = start + prefix.len();
    // label runs up to the next '-', as in `-----BEGIN [^-]+-----`
    let label_len = text[after..].find('-').unwrap_or(text.len() - after);
    let close = after + label_len;
    if label_len == 0 || !text[close..].starts_with(MARKER_SUFFIX) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..start]);
    out.push_str(&text[close + MARKER_SUFFIX.len()..]);
    out
}
