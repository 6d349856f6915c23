//! Copy/paste wire format of the manual exchange.
//!
//! Every blob is JSON, gzip-compressed and base64url-encoded so it survives
//! chat clients and URL query parameters. Decoding is lenient about the outer
//! layers: standard base64 and uncompressed JSON are accepted too.

use std::io::{Read, Write};

use base64::{engine::general_purpose, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CallError, Result};
use crate::peer::types::{Candidate, SessionDescription, SessionId};

/// Upper bound on decompressed blob size, guards against zip bombs.
pub const MAX_DECOMPRESSED_SIZE: u64 = 256 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Description plus the metadata the exporting side attaches.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SdpPayload {
    #[serde(flatten)]
    pub description: SessionDescription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl SdpPayload {
    pub fn new(description: SessionDescription, id: &SessionId) -> Self {
        Self {
            description,
            id: Some(id.clone()),
            ts: Some(chrono::Utc::now().timestamp()),
        }
    }
}

/// Description and the complete local candidate batch in one blob.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionBundle {
    pub sdp_payload: SdpPayload,
    pub ice_candidates: Vec<Candidate>,
}

/// Any blob an operator may paste.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PastedBlob {
    Bundle(ConnectionBundle),
    Description(SdpPayload),
    Candidates(Vec<Candidate>),
}

pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    // 1. JSON -> байты
    let json = serde_json::to_vec(value)?;

    // 2. сжатие GZIP
    let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
    gz.write_all(&json)?;
    let compressed = gz.finish()?;

    // 3. base64
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(compressed))
}

pub fn decode<T: DeserializeOwned>(blob: &str) -> Result<T> {
    let json = unwrap_layers(blob)?;
    serde_json::from_slice(&json).map_err(|e| malformed(format!("invalid JSON payload: {e}")))
}

pub fn encode_description(description: &SessionDescription, id: &SessionId) -> Result<String> {
    encode(&SdpPayload::new(description.clone(), id))
}

pub fn decode_description(blob: &str) -> Result<SdpPayload> {
    decode(blob)
}

pub fn encode_candidates(candidates: &[Candidate]) -> Result<String> {
    encode(&candidates)
}

pub fn decode_candidates(blob: &str) -> Result<Vec<Candidate>> {
    decode(blob)
}

pub fn encode_bundle(bundle: &ConnectionBundle) -> Result<String> {
    encode(bundle)
}

pub fn decode_any(blob: &str) -> Result<PastedBlob> {
    decode(blob)
}

fn unwrap_layers(blob: &str) -> Result<Vec<u8>> {
    let blob = blob.trim();
    if blob.is_empty() {
        return Err(malformed("empty input"));
    }

    let bytes = if blob.starts_with('{') || blob.starts_with('[') {
        blob.as_bytes().to_vec()
    } else {
        general_purpose::URL_SAFE_NO_PAD
            .decode(blob)
            .or_else(|_| general_purpose::STANDARD.decode(blob))
            .map_err(|e| malformed(format!("not valid base64: {e}")))?
    };

    if !bytes.starts_with(&GZIP_MAGIC) {
        if bytes.len() as u64 > MAX_DECOMPRESSED_SIZE {
            return Err(malformed("payload too large"));
        }
        return Ok(bytes);
    }

    let mut json = Vec::new();
    GzDecoder::new(&bytes[..])
        .take(MAX_DECOMPRESSED_SIZE + 1)
        .read_to_end(&mut json)
        .map_err(|e| malformed(format!("corrupt gzip stream: {e}")))?;
    if json.len() as u64 > MAX_DECOMPRESSED_SIZE {
        return Err(malformed("payload too large"));
    }
    Ok(json)
}

fn malformed(reason: impl Into<String>) -> CallError {
    CallError::MalformedRemoteInput(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::SdpKind;

    const OFFER_SDP: &str = "v=0\r\no=- 4215 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=group:BUNDLE 0 1\r\n";

    #[test]
    fn offer_survives_blob_round_trip() {
        let offer = SessionDescription::offer(OFFER_SDP);
        let blob = encode_description(&offer, &SessionId::new("abc")).unwrap();
        assert!(!blob.contains('+') && !blob.contains('/') && !blob.contains('='));

        let payload = decode_description(&blob).unwrap();
        assert_eq!(payload.description.kind, SdpKind::Offer);
        assert_eq!(payload.description.sdp, OFFER_SDP);
        assert_eq!(payload.id, Some(SessionId::new("abc")));
    }

    #[test]
    fn plain_type_sdp_payload_is_accepted() {
        let raw = r#"{"type":"answer","sdp":"v=0"}"#;
        let from_text = decode_description(raw).unwrap();
        assert_eq!(from_text.description, SessionDescription::answer("v=0"));
        assert_eq!(from_text.id, None);

        let standard = general_purpose::STANDARD.encode(raw);
        assert_eq!(decode_description(&standard).unwrap(), from_text);
    }

    #[test]
    fn candidate_batch_keeps_order() {
        let batch = vec![
            Candidate::new("candidate:2 1 udp 1 10.0.0.2 2 typ host"),
            Candidate::new("candidate:1 1 udp 1 10.0.0.1 1 typ host"),
        ];
        let blob = encode_candidates(&batch).unwrap();
        assert_eq!(decode_candidates(&blob).unwrap(), batch);
    }

    #[test]
    fn pasted_blobs_are_told_apart() {
        let offer = SessionDescription::offer("v=0");
        let id = SessionId::new("x");
        let candidates = vec![Candidate::new("candidate:1 1 udp 1 10.0.0.1 1 typ host")];

        let bundle = ConnectionBundle {
            sdp_payload: SdpPayload::new(offer.clone(), &id),
            ice_candidates: candidates.clone(),
        };

        assert!(matches!(decode_any(&encode_bundle(&bundle).unwrap()).unwrap(), PastedBlob::Bundle(b) if b == bundle));
        assert!(matches!(decode_any(&encode_description(&offer, &id).unwrap()).unwrap(), PastedBlob::Description(p) if p.description == offer));
        assert!(matches!(decode_any(&encode_candidates(&candidates).unwrap()).unwrap(), PastedBlob::Candidates(c) if c == candidates));
    }

    #[test]
    fn garbage_is_malformed() {
        for blob in ["", "   ", "not base64 at all!", "{\"type\":\"pranswer\"}", "eyJmb28iOjF9"] {
            assert!(
                matches!(decode_description(blob), Err(CallError::MalformedRemoteInput(_))),
                "{blob:?} should be rejected"
            );
        }
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let huge = SessionDescription::offer("a".repeat(MAX_DECOMPRESSED_SIZE as usize + 10));
        let blob = encode_description(&huge, &SessionId::new("x")).unwrap();
        assert!(matches!(decode_description(&blob), Err(CallError::MalformedRemoteInput(_))));
    }
}
