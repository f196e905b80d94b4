//! Base64 relay envelope
//!
//! Bodies cross the browser boundary as standard base64 text in both
//! directions. Encoding is canonical (padded, standard alphabet). Decoding
//! accepts what browser encoders produce in practice: missing padding,
//! embedded line breaks, and the URL-safe alphabet.

use crate::{Error, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

/// Content type of relay responses
pub const ENVELOPE_CONTENT_TYPE: &str = "X-user/base64-data; charset=utf-8";

const ENCODER: GeneralPurpose = base64::engine::general_purpose::STANDARD;

const DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode raw bytes as envelope text
pub fn encode(bytes: &[u8]) -> String {
    ENCODER.encode(bytes)
}

/// Decode envelope text into raw bytes
pub fn decode(text: &[u8]) -> Result<Vec<u8>> {
    let normalised: Vec<u8> = text
        .iter()
        .filter(|b| !b.is_ascii_whitespace())
        .map(|&b| match b {
            b'-' => b'+',
            b'_' => b'/',
            other => other,
        })
        .collect();

    DECODER
        .decode(&normalised)
        .map_err(|e| Error::InvalidEnvelope(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_round_trip() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode(b"").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_lenient_decoding() {
        // 0xfb 0xff encodes to "+/8=" in the standard alphabet
        assert_eq!(decode(b"+/8=").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(decode(b"-_8").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(decode(b"aGVs\r\nbG8=\n").unwrap(), b"hello");
    }

    #[test]
    fn test_invalid_characters_rejected() {
        let err = decode(b"not*base64!").unwrap_err();
        assert!(matches!(err, Error::InvalidEnvelope(_)));

        assert!(decode(b"a").is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let text = encode(&bytes);
            prop_assert_eq!(decode(text.as_bytes()).unwrap(), bytes);
        }
    }
}
