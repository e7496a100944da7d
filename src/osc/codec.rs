//! OSC 1.0 binary encoding
//!
//! Layout of the pieces this crate speaks:
//! - Strings: UTF-8 bytes, NUL-terminated, zero-padded to a multiple of 4
//! - Message: address string, type tag string (`,` + one char per arg), args
//! - `i` / `f`: 4-byte big-endian int32 / float32
//! - Bundle: `#bundle\0`, 8-byte time tag, then elements each prefixed with
//!   a big-endian int32 size

use bytes::{Buf, BufMut, BytesMut};

use super::types::{OscArg, OscMessage, OscPacket};
use crate::error::{AppError, Result};

const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Time tag meaning "immediately"
const TIMETAG_IMMEDIATE: u64 = 1;

/// Nested bundle depth accepted on decode
const MAX_BUNDLE_DEPTH: usize = 8;

/// Encode a packet into a datagram payload
pub fn encode(packet: &OscPacket) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(128);
    encode_into(packet, &mut buf);
    buf.to_vec()
}

/// Encode a packet into an existing buffer
pub fn encode_into(packet: &OscPacket, buf: &mut BytesMut) {
    match packet {
        OscPacket::Message(msg) => encode_message(msg, buf),
        OscPacket::Bundle(elements) => {
            buf.put_slice(BUNDLE_TAG);
            buf.put_u64(TIMETAG_IMMEDIATE);
            for element in elements {
                let mut inner = BytesMut::new();
                encode_into(element, &mut inner);
                buf.put_i32(inner.len() as i32);
                buf.put_slice(&inner);
            }
        }
    }
}

fn encode_message(msg: &OscMessage, buf: &mut BytesMut) {
    put_padded_str(buf, &msg.address);
    put_padded_str(buf, &msg.type_tags());
    for arg in &msg.args {
        match arg {
            OscArg::Int(v) => buf.put_i32(*v),
            OscArg::Float(v) => buf.put_f32(*v),
            OscArg::Str(s) => put_padded_str(buf, s),
        }
    }
}

fn put_padded_str(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    // At least one NUL, then pad to 4
    let pad = 4 - (s.len() % 4);
    buf.put_bytes(0, pad);
}

/// Decode a datagram payload
pub fn decode(data: &[u8]) -> Result<OscPacket> {
    decode_packet(data, 0)
}

fn decode_packet(data: &[u8], depth: usize) -> Result<OscPacket> {
    if data.starts_with(BUNDLE_TAG) {
        if depth >= MAX_BUNDLE_DEPTH {
            return Err(malformed("bundle nesting too deep"));
        }
        decode_bundle(&data[BUNDLE_TAG.len()..], depth)
    } else {
        decode_message(data).map(OscPacket::Message)
    }
}

fn decode_bundle(mut data: &[u8], depth: usize) -> Result<OscPacket> {
    if data.remaining() < 8 {
        return Err(malformed("bundle without time tag"));
    }
    let _timetag = data.get_u64();

    let mut elements = Vec::new();
    while data.has_remaining() {
        if data.remaining() < 4 {
            return Err(malformed("truncated bundle element size"));
        }
        let size = data.get_i32();
        if size < 0 || size as usize > data.remaining() || size % 4 != 0 {
            return Err(malformed(&format!("invalid bundle element size {}", size)));
        }
        let (element, rest) = data.split_at(size as usize);
        elements.push(decode_packet(element, depth + 1)?);
        data = rest;
    }
    Ok(OscPacket::Bundle(elements))
}

fn decode_message(mut data: &[u8]) -> Result<OscMessage> {
    let address = take_padded_str(&mut data)?;
    if !address.starts_with('/') {
        return Err(malformed(&format!("invalid address pattern {:?}", address)));
    }

    // A message with no type tag string is legal and has no arguments
    if !data.has_remaining() {
        return Ok(OscMessage::new(address, Vec::new()));
    }

    let tags = take_padded_str(&mut data)?;
    let mut chars = tags.chars();
    if chars.next() != Some(',') {
        return Err(malformed(&format!("{}: type tags must start with ','", address)));
    }

    let mut args = Vec::with_capacity(tags.len().saturating_sub(1));
    for tag in chars {
        let arg = match tag {
            'i' => {
                ensure_remaining(&data, 4, &address)?;
                OscArg::Int(data.get_i32())
            }
            'f' => {
                ensure_remaining(&data, 4, &address)?;
                OscArg::Float(data.get_f32())
            }
            's' => OscArg::Str(take_padded_str(&mut data)?),
            other => {
                return Err(malformed(&format!(
                    "{}: unsupported type tag '{}'",
                    address, other
                )))
            }
        };
        args.push(arg);
    }

    Ok(OscMessage::new(address, args))
}

fn take_padded_str(data: &mut &[u8]) -> Result<String> {
    let end = data
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| malformed("unterminated string"))?;
    let padded = (end / 4 + 1) * 4;
    if padded > data.len() {
        return Err(malformed("string padding runs past end of packet"));
    }
    let s = std::str::from_utf8(&data[..end])
        .map_err(|e| malformed(&format!("invalid UTF-8: {}", e)))?
        .to_string();
    data.advance(padded);
    Ok(s)
}

fn ensure_remaining(data: &[u8], needed: usize, address: &str) -> Result<()> {
    if data.remaining() < needed {
        return Err(malformed(&format!("{}: truncated argument", address)));
    }
    Ok(())
}

fn malformed(reason: &str) -> AppError {
    AppError::MalformedMessage(reason.to_string())
}
