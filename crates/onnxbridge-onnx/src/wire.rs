//! Field-level protobuf walking.
//!
//! Only the handful of ONNX fields we rewrite are interpreted; every other
//! field is surfaced with its raw encoding so it can be copied through
//! untouched, unknown fields included.

use bytes::{Buf, BufMut};
use prost::encoding::{decode_key, decode_varint, encode_key, encode_varint, WireType};

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Value<'a> {
    Varint(u64),
    Fixed64(u64),
    Fixed32(u32),
    Bytes(&'a [u8]),
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Field<'a> {
    pub tag: u32,
    pub value: Value<'a>,
    /// Key and payload exactly as encoded.
    pub raw: &'a [u8],
    /// Absolute position in the model file, for error messages.
    pub offset: usize,
}

impl<'a> Field<'a> {
    pub fn varint(&self, what: &str) -> Result<u64> {
        match self.value {
            Value::Varint(v) => Ok(v),
            _ => Err(Error::decode(self.offset, format!("{what} is not a varint"))),
        }
    }

    pub fn bytes(&self, what: &str) -> Result<&'a [u8]> {
        match self.value {
            Value::Bytes(b) => Ok(b),
            _ => Err(Error::decode(
                self.offset,
                format!("{what} is not length-delimited"),
            )),
        }
    }

    pub fn string(&self, what: &str) -> Result<&'a str> {
        std::str::from_utf8(self.bytes(what)?)
            .map_err(|_| Error::decode(self.offset, format!("{what} is not valid UTF-8")))
    }

    /// Offset of the payload of a length-delimited field.
    pub fn payload_offset(&self) -> usize {
        match self.value {
            Value::Bytes(b) => self.offset + self.raw.len() - b.len(),
            _ => self.offset,
        }
    }
}

pub(crate) struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
    failed: bool,
}

impl<'a> Fields<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::at(buf, 0)
    }

    /// Walks a nested message whose payload starts at `base` in the file.
    pub fn at(buf: &'a [u8], base: usize) -> Self {
        Self {
            buf,
            pos: 0,
            base,
            failed: false,
        }
    }

    fn read(&mut self) -> Result<Field<'a>> {
        let buf: &'a [u8] = self.buf;
        let start = self.pos;
        let offset = self.base + start;
        let mut cur = &buf[start..];
        let before = cur.len();

        let (tag, wire_type) =
            decode_key(&mut cur).map_err(|e| Error::decode(offset, e.to_string()))?;
        let truncated = || Error::decode(offset, format!("field {tag} is truncated"));

        let value = match wire_type {
            WireType::Varint => {
                Value::Varint(decode_varint(&mut cur).map_err(|e| Error::decode(offset, e.to_string()))?)
            }
            WireType::SixtyFourBit => {
                if cur.remaining() < 8 {
                    return Err(truncated());
                }
                Value::Fixed64(cur.get_u64_le())
            }
            WireType::ThirtyTwoBit => {
                if cur.remaining() < 4 {
                    return Err(truncated());
                }
                Value::Fixed32(cur.get_u32_le())
            }
            WireType::LengthDelimited => {
                let len = decode_varint(&mut cur).map_err(|e| Error::decode(offset, e.to_string()))?;
                let len = usize::try_from(len)
                    .ok()
                    .filter(|&len| len <= cur.len())
                    .ok_or_else(truncated)?;
                let (payload, rest) = cur.split_at(len);
                cur = rest;
                Value::Bytes(payload)
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(Error::decode(offset, "group encoding is not used by ONNX"));
            }
        };

        let consumed = before - cur.len();
        self.pos += consumed;
        Ok(Field {
            tag,
            value,
            raw: &buf[start..start + consumed],
            offset,
        })
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Result<Field<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let field = self.read();
        self.failed = field.is_err();
        Some(field)
    }
}

pub(crate) fn put_varint_field(out: &mut Vec<u8>, tag: u32, value: u64) {
    encode_key(tag, WireType::Varint, out);
    encode_varint(value, out);
}

pub(crate) fn put_bytes_field(out: &mut Vec<u8>, tag: u32, payload: &[u8]) {
    encode_key(tag, WireType::LengthDelimited, out);
    encode_varint(payload.len() as u64, out);
    out.put_slice(payload);
}
