//! Key and value byte layout.
//!
//! All ordering is plain lexicographic byte order. Committed record keys are
//! document keys with an appended [`DocHybridTime`]; the time suffix is
//! encoded bit-inverted so that for one logical key the *newest* version
//! sorts first. Intent keys live in a separate keyspace, prefixed with
//! [`INTENT_MARKER`] and suffixed with the intent type and write time.
//! Intent values embed the owning transaction id before the payload.

use uuid::Uuid;

use crate::hybrid_time::{DocHybridTime, HybridTime};
use crate::txn::{IntentType, TransactionId};

/// Terminates the document-id portion of a key; subkeys follow it.
pub const GROUP_END: u8 = 0x05;
/// Precedes an appended time suffix on committed record keys.
pub const TIME_MARKER: u8 = 0x10;
/// First byte of every intent-keyspace key.
pub const INTENT_MARKER: u8 = 0x01;
/// Separates the document key from the intent-type byte in intent keys.
pub const INTENT_TYPE_MARKER: u8 = 0x11;
/// Sorts after every possible key extension.
pub const MAX_BYTE: u8 = 0xFF;

/// Marker byte plus 8 time bytes plus 4 write-id bytes.
pub const TIME_SUFFIX_LEN: usize = 13;

const TXN_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated input")]
    Truncated,

    #[error("expected marker {expected:#04x}, found {found:#04x}")]
    BadMarker { expected: u8, found: u8 },

    #[error("unknown intent type: {0}")]
    UnknownIntentType(u8),

    #[error("document key lacks a group-end terminator")]
    MissingGroupEnd,
}

/// Appends `TIME_MARKER` plus the descending time encoding to `buf`.
pub fn append_doc_time(buf: &mut Vec<u8>, dht: DocHybridTime) {
    buf.push(TIME_MARKER);
    buf.extend_from_slice(&(!dht.time.0).to_be_bytes());
    buf.extend_from_slice(&(!dht.write_id).to_be_bytes());
}

/// Full committed-record key: `doc_key ++ TIME_MARKER ++ enc(dht)`.
pub fn record_key(doc_key: &[u8], dht: DocHybridTime) -> Vec<u8> {
    let mut key = Vec::with_capacity(doc_key.len() + TIME_SUFFIX_LEN);
    key.extend_from_slice(doc_key);
    append_doc_time(&mut key, dht);
    key
}

/// Seek target landing on the newest version of `doc_key` at or before
/// `limit`.
pub fn upper_bound_key(doc_key: &[u8], limit: HybridTime) -> Vec<u8> {
    record_key(doc_key, DocHybridTime::latest_at(limit))
}

/// Seek target sorting after every timed version of exactly `doc_key`, but
/// before any of its subkeys.
pub fn past_subkey_key(doc_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(doc_key.len() + 1);
    key.extend_from_slice(doc_key);
    key.push(TIME_MARKER + 1);
    key
}

/// Seek target sorting after `doc_key` and everything nested under it.
pub fn out_of_subtree_key(doc_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(doc_key.len() + 1);
    key.extend_from_slice(doc_key);
    key.push(MAX_BYTE);
    key
}

/// Decodes the trailing time suffix of a committed-record key.
pub fn decode_doc_time_from_end(key: &[u8]) -> Result<DocHybridTime, DecodeError> {
    if key.len() < TIME_SUFFIX_LEN {
        return Err(DecodeError::Truncated);
    }
    let suffix = &key[key.len() - TIME_SUFFIX_LEN..];
    if suffix[0] != TIME_MARKER {
        return Err(DecodeError::BadMarker {
            expected: TIME_MARKER,
            found: suffix[0],
        });
    }
    let time = !u64::from_be_bytes(suffix[1..9].try_into().expect("slice length checked"));
    let write_id = !u32::from_be_bytes(suffix[9..13].try_into().expect("slice length checked"));
    Ok(DocHybridTime::new(HybridTime(time), write_id))
}

/// Drops a validated time suffix, leaving the document key.
pub fn strip_time_suffix(key: &[u8]) -> Result<&[u8], DecodeError> {
    decode_doc_time_from_end(key)?;
    Ok(&key[..key.len() - TIME_SUFFIX_LEN])
}

/// True when `candidate` is exactly `doc_key` with only a time suffix
/// appended.
pub fn only_lacks_time_suffix(doc_key: &[u8], candidate: &[u8]) -> bool {
    candidate.len() == doc_key.len() + TIME_SUFFIX_LEN
        && candidate.starts_with(doc_key)
        && candidate[doc_key.len()] == TIME_MARKER
}

/// The leading document key of an encoded key: everything up to and including
/// the first group-end byte.
///
/// Document-id bytes must not contain [`GROUP_END`]; ids that could embed it
/// need an escaping encoding before they reach this keyspace.
pub fn first_doc_key(encoded: &[u8]) -> Result<&[u8], DecodeError> {
    match encoded.iter().position(|&b| b == GROUP_END) {
        Some(pos) => Ok(&encoded[..=pos]),
        None => Err(DecodeError::MissingGroupEnd),
    }
}

/// Prefix covering every intent for keys starting with `doc_key`.
pub fn intent_prefix(doc_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(doc_key.len() + 1);
    key.push(INTENT_MARKER);
    key.extend_from_slice(doc_key);
    key
}

/// Full intent key: `INTENT_MARKER ++ doc_key ++ INTENT_TYPE_MARKER ++ type
/// ++ enc(dht)`.
pub fn intent_key(doc_key: &[u8], intent_type: IntentType, dht: DocHybridTime) -> Vec<u8> {
    let mut key = intent_prefix(doc_key);
    key.push(INTENT_TYPE_MARKER);
    key.push(intent_type.to_byte());
    key.extend_from_slice(&(!dht.time.0).to_be_bytes());
    key.extend_from_slice(&(!dht.write_id).to_be_bytes());
    key
}

/// Intent-space seek target skipping every intent for exactly `doc_key`.
pub fn intent_past_subkey_target(doc_key: &[u8]) -> Vec<u8> {
    let mut key = intent_prefix(doc_key);
    key.push(INTENT_TYPE_MARKER + 1);
    key
}

/// Intent-space seek target skipping `doc_key` and everything nested under
/// it.
pub fn intent_out_of_subtree_target(doc_key: &[u8]) -> Vec<u8> {
    let mut key = intent_prefix(doc_key);
    key.push(MAX_BYTE);
    key
}

pub fn is_intent_key(key: &[u8]) -> bool {
    key.first() == Some(&INTENT_MARKER)
}

/// True when `key` is an intent key for exactly the document key `doc_key`.
pub fn is_intent_for_same_key(key: &[u8], doc_key: &[u8]) -> bool {
    key.first() == Some(&INTENT_MARKER)
        && key.len() > 1 + doc_key.len()
        && key[1..1 + doc_key.len()] == *doc_key
        && key[1 + doc_key.len()] == INTENT_TYPE_MARKER
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedIntentKey<'a> {
    pub doc_key: &'a [u8],
    pub intent_type: IntentType,
    pub doc_ht: DocHybridTime,
}

pub fn decode_intent_key(key: &[u8]) -> Result<DecodedIntentKey<'_>, DecodeError> {
    // Marker, at least one key byte, type marker, type, 12 time bytes.
    if key.len() < 1 + 1 + 1 + 1 + 12 {
        return Err(DecodeError::Truncated);
    }
    if key[0] != INTENT_MARKER {
        return Err(DecodeError::BadMarker {
            expected: INTENT_MARKER,
            found: key[0],
        });
    }
    let type_marker_pos = key.len() - 14;
    if key[type_marker_pos] != INTENT_TYPE_MARKER {
        return Err(DecodeError::BadMarker {
            expected: INTENT_TYPE_MARKER,
            found: key[type_marker_pos],
        });
    }
    let intent_type = IntentType::from_byte(key[type_marker_pos + 1])
        .ok_or(DecodeError::UnknownIntentType(key[type_marker_pos + 1]))?;
    let time_bytes = &key[type_marker_pos + 2..];
    let time = !u64::from_be_bytes(time_bytes[..8].try_into().expect("slice length checked"));
    let write_id = !u32::from_be_bytes(time_bytes[8..].try_into().expect("slice length checked"));
    Ok(DecodedIntentKey {
        doc_key: &key[1..type_marker_pos],
        intent_type,
        doc_ht: DocHybridTime::new(HybridTime(time), write_id),
    })
}

/// Intent value: 16-byte transaction id followed by the payload.
pub fn encode_intent_value(txn_id: TransactionId, payload: &[u8]) -> Vec<u8> {
    let mut value = Vec::with_capacity(TXN_ID_LEN + payload.len());
    value.extend_from_slice(txn_id.0.as_bytes());
    value.extend_from_slice(payload);
    value
}

pub fn decode_intent_value(value: &[u8]) -> Result<(TransactionId, &[u8]), DecodeError> {
    if value.len() < TXN_ID_LEN {
        return Err(DecodeError::Truncated);
    }
    let id = Uuid::from_bytes(
        value[..TXN_ID_LEN]
            .try_into()
            .expect("slice length checked"),
    );
    Ok((TransactionId(id), &value[TXN_ID_LEN..]))
}
