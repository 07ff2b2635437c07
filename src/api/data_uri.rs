//! `data:` URI helpers for images on the wire

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub const JPEG_MIME: &str = "image/jpeg";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DataUriError {
    #[error("data URI is not base64 encoded")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Payload(String),
    #[error("empty image payload")]
    Empty,
}

pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Decode the payload of a `data:<mime>;base64,<payload>` URI.
///
/// A bare base64 string without the `data:` header is accepted as well.
pub fn decode(uri: &str) -> Result<Vec<u8>, DataUriError> {
    let payload = match uri.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').ok_or(DataUriError::NotBase64)?;
            if !header.ends_with(";base64") {
                return Err(DataUriError::NotBase64);
            }
            payload
        }
        None => uri,
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| DataUriError::Payload(e.to_string()))?;
    if bytes.is_empty() {
        return Err(DataUriError::Empty);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_has_header() {
        assert_eq!(encode(JPEG_MIME, b"abc"), "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn test_decode_data_uri_and_bare_payload() {
        assert_eq!(decode("data:image/jpeg;base64,YWJj").unwrap(), b"abc");
        assert_eq!(decode("YWJj").unwrap(), b"abc");
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        assert_eq!(decode("data:image/jpeg,abc"), Err(DataUriError::NotBase64));
        assert_eq!(decode("data:image/jpeg;base64"), Err(DataUriError::NotBase64));
        assert_eq!(decode("data:image/jpeg;base64,"), Err(DataUriError::Empty));
        assert!(matches!(decode("not base64!"), Err(DataUriError::Payload(_))));
    }
}
