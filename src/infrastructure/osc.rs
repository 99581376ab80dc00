//! OSC wire codec.
//!
//! Encodes one address path plus a value list into a single binary message,
//! exactly as it goes on the wire: NUL-terminated padded address,
//! NUL-terminated padded type-tag string, then the big-endian 4-byte values.
//! No length prefix, no checksum; one message per datagram. The bridge never
//! receives OSC, but a decoder is provided so the format can be verified
//! round-trip.

use crate::domain::models::Value;
use thiserror::Error;

/// Encode `path` and `values` as one OSC message body.
///
/// `path` must start with `/` and contain no NUL byte; both are upheld by
/// the channel table.
pub fn encode(path: &str, values: &[Value]) -> Vec<u8> {
    debug_assert!(path.starts_with('/'));
    debug_assert!(!path.bytes().any(|b| b == 0));

    let mut out = Vec::with_capacity(
        padded_len(path.len() + 1) + padded_len(values.len() + 2) + values.len() * 4,
    );

    write_padded(&mut out, path.as_bytes());

    let mut type_tags = String::with_capacity(values.len() + 1);
    type_tags.push(',');
    for value in values {
        type_tags.push(value.type_tag());
    }
    write_padded(&mut out, type_tags.as_bytes());

    for value in values {
        out.extend_from_slice(&value.to_be_bytes());
    }

    out
}

/// Append `bytes`, a NUL terminator, then NUL padding to a 4-byte boundary.
///
/// Sections always begin 4-aligned, so padding against the total length is
/// equivalent to padding the section.
fn write_padded(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes);
    out.push(0);
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

/// Length of a string section of `len` bytes (terminator included) after
/// padding to a multiple of 4.
fn padded_len(len: usize) -> usize {
    let remainder = len % 4;
    if remainder == 0 {
        len
    } else {
        len + (4 - remainder)
    }
}

/// A decoded OSC message.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub path: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("message truncated")]
    Truncated,
    #[error("string section is not valid UTF-8")]
    InvalidUtf8,
    #[error("address must start with '/'")]
    BadAddress,
    #[error("type tag string must start with ','")]
    MissingTypeTags,
    #[error("unknown type tag '{0}'")]
    UnknownTypeTag(char),
}

/// Decode one OSC message body.
pub fn decode(bytes: &[u8]) -> Result<OscMessage, DecodeError> {
    let (path, rest) = read_padded_str(bytes)?;
    if !path.starts_with('/') {
        return Err(DecodeError::BadAddress);
    }

    let (type_tags, mut rest) = read_padded_str(rest)?;
    let type_tags = type_tags
        .strip_prefix(',')
        .ok_or(DecodeError::MissingTypeTags)?;

    let mut values = Vec::with_capacity(type_tags.len());
    for tag in type_tags.chars() {
        if rest.len() < 4 {
            return Err(DecodeError::Truncated);
        }
        let (word, tail) = rest.split_at(4);
        let raw = [word[0], word[1], word[2], word[3]];
        values.push(match tag {
            'f' => Value::Float(f32::from_be_bytes(raw)),
            'i' => Value::Int(i32::from_be_bytes(raw)),
            other => return Err(DecodeError::UnknownTypeTag(other)),
        });
        rest = tail;
    }

    Ok(OscMessage {
        path: path.to_string(),
        values,
    })
}

/// Read one NUL-terminated, 4-byte-padded string section.
fn read_padded_str(bytes: &[u8]) -> Result<(&str, &[u8]), DecodeError> {
    let nul = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::Truncated)?;
    let text = std::str::from_utf8(&bytes[..nul]).map_err(|_| DecodeError::InvalidUtf8)?;

    let consumed = padded_len(nul + 1);
    if consumed > bytes.len() {
        return Err(DecodeError::Truncated);
    }
    Ok((text, &bytes[consumed..]))
}
