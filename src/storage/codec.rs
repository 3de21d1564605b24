//! Varint-based binary codec shared by the property overflow store, the
//! WAL delta log, and the snapshot format.

use std::collections::BTreeMap;

use crate::error::{GraphError, Result};
use crate::storage::property_value::PropertyValue;

const TYPE_NULL: u8 = 0;
const TYPE_BOOL: u8 = 1;
const TYPE_INT: u8 = 2;
const TYPE_DOUBLE: u8 = 3;
const TYPE_STRING: u8 = 4;
const TYPE_LIST: u8 = 5;
const TYPE_MAP: u8 = 6;

const VARINT_PAYLOAD_BITS: u8 = 0x7f;
const VARINT_CONTINUE: u8 = 0x80;

/// LEB128-style unsigned varint: seven payload bits per byte, high bit
/// set on every byte but the last.
pub fn write_var_u64(value: u64, out: &mut Vec<u8>) {
    let mut rest = value;
    while rest >= u64::from(VARINT_CONTINUE) {
        out.push(rest as u8 | VARINT_CONTINUE);
        rest >>= 7;
    }
    out.push(rest as u8);
}

pub fn read_var_u64(buf: &[u8], cursor: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = *buf
            .get(*cursor)
            .ok_or_else(|| GraphError::Corruption("varint truncated".into()))?;
        *cursor += 1;
        value |= u64::from(byte & VARINT_PAYLOAD_BITS) << shift;
        if byte & VARINT_CONTINUE == 0 {
            return Ok(value);
        }
    }
    Err(GraphError::Corruption("varint too long".into()))
}

/// Signed values are zigzag-folded so small magnitudes of either sign
/// stay short on the wire.
fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(folded: u64) -> i64 {
    ((folded >> 1) as i64) ^ -((folded & 1) as i64)
}

pub fn write_var_i64(value: i64, out: &mut Vec<u8>) {
    write_var_u64(zigzag(value), out);
}

pub fn read_var_i64(buf: &[u8], cursor: &mut usize) -> Result<i64> {
    Ok(unzigzag(read_var_u64(buf, cursor)?))
}

pub fn write_string(s: &str, out: &mut Vec<u8>) {
    write_var_u64(s.len() as u64, out);
    out.extend_from_slice(s.as_bytes());
}

pub fn read_string(buf: &[u8], cursor: &mut usize) -> Result<String> {
    let len = read_var_u64(buf, cursor)? as usize;
    if *cursor + len > buf.len() {
        return Err(GraphError::Corruption("string payload truncated".into()));
    }
    let bytes = &buf[*cursor..*cursor + len];
    *cursor += len;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| GraphError::Corruption("stored string not utf8".into()))
}

pub fn write_value(value: &PropertyValue, out: &mut Vec<u8>) {
    match value {
        PropertyValue::Null => out.push(TYPE_NULL),
        PropertyValue::Bool(v) => {
            out.push(TYPE_BOOL);
            out.push(u8::from(*v));
        }
        PropertyValue::Int(v) => {
            out.push(TYPE_INT);
            write_var_i64(*v, out);
        }
        PropertyValue::Double(v) => {
            out.push(TYPE_DOUBLE);
            out.extend_from_slice(&v.to_le_bytes());
        }
        PropertyValue::String(s) => {
            out.push(TYPE_STRING);
            write_string(s, out);
        }
        PropertyValue::List(values) => {
            out.push(TYPE_LIST);
            write_var_u64(values.len() as u64, out);
            for value in values {
                write_value(value, out);
            }
        }
        PropertyValue::Map(entries) => {
            out.push(TYPE_MAP);
            write_var_u64(entries.len() as u64, out);
            for (key, value) in entries {
                write_string(key, out);
                write_value(value, out);
            }
        }
    }
}

pub fn read_value(buf: &[u8], cursor: &mut usize) -> Result<PropertyValue> {
    if *cursor >= buf.len() {
        return Err(GraphError::Corruption("value payload truncated".into()));
    }
    let tag = buf[*cursor];
    *cursor += 1;
    match tag {
        TYPE_NULL => Ok(PropertyValue::Null),
        TYPE_BOOL => {
            if *cursor >= buf.len() {
                return Err(GraphError::Corruption("bool payload truncated".into()));
            }
            let byte = buf[*cursor];
            *cursor += 1;
            if byte > 1 {
                return Err(GraphError::Corruption("bool payload invalid".into()));
            }
            Ok(PropertyValue::Bool(byte == 1))
        }
        TYPE_INT => Ok(PropertyValue::Int(read_var_i64(buf, cursor)?)),
        TYPE_DOUBLE => {
            if *cursor + 8 > buf.len() {
                return Err(GraphError::Corruption("double payload truncated".into()));
            }
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&buf[*cursor..*cursor + 8]);
            *cursor += 8;
            Ok(PropertyValue::Double(f64::from_le_bytes(arr)))
        }
        TYPE_STRING => Ok(PropertyValue::String(read_string(buf, cursor)?)),
        TYPE_LIST => {
            let len = read_var_u64(buf, cursor)? as usize;
            let mut values = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                values.push(read_value(buf, cursor)?);
            }
            Ok(PropertyValue::List(values))
        }
        TYPE_MAP => {
            let len = read_var_u64(buf, cursor)? as usize;
            let mut entries = BTreeMap::new();
            for _ in 0..len {
                let key = read_string(buf, cursor)?;
                let value = read_value(buf, cursor)?;
                entries.insert(key, value);
            }
            Ok(PropertyValue::Map(entries))
        }
        _ => Err(GraphError::Corruption("unknown value type tag".into())),
    }
}

pub fn encode_value(value: &PropertyValue) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(value, &mut out);
    out
}

pub fn decode_value(buf: &[u8]) -> Result<PropertyValue> {
    let mut cursor = 0usize;
    let value = read_value(buf, &mut cursor)?;
    if cursor != buf.len() {
        return Err(GraphError::Corruption("trailing bytes after value".into()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: PropertyValue) {
        let encoded = encode_value(&value);
        let decoded = decode_value(&encoded).expect("decode succeeds");
        assert_eq!(decoded, value);
    }

    #[test]
    fn value_roundtrips() {
        roundtrip(PropertyValue::Null);
        roundtrip(PropertyValue::Bool(true));
        roundtrip(PropertyValue::Int(-42));
        roundtrip(PropertyValue::Int(i64::MAX));
        roundtrip(PropertyValue::Double(2.5));
        roundtrip(PropertyValue::String("hello".into()));
        roundtrip(PropertyValue::List(vec![
            PropertyValue::Int(1),
            PropertyValue::String("two".into()),
            PropertyValue::List(vec![PropertyValue::Null]),
        ]));
        let mut map = BTreeMap::new();
        map.insert("a".into(), PropertyValue::Bool(false));
        map.insert("b".into(), PropertyValue::Double(0.0));
        roundtrip(PropertyValue::Map(map));
    }

    #[test]
    fn truncated_value_is_corruption() {
        let encoded = encode_value(&PropertyValue::String("payload".into()));
        let err = decode_value(&encoded[..encoded.len() - 2]).unwrap_err();
        assert!(matches!(err, crate::error::GraphError::Corruption(_)));
    }
}
