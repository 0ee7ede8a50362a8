//! Attribute TLV store. Attributes are packed
//! `{type:u32 BE, length:u16 BE, value}` records in a block's attribute
//! byte area; at most one attribute of a given type may exist at a time.

use crate::error::KsError;

const HEADER_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrView {
    pub attr_type: u32,
    pub offset: usize,
    pub len: usize,
}

/// Walk the TLV stream, refusing to overrun `bytes`. Returns each
/// attribute's type/length and the byte offset of its value.
pub fn scan(bytes: &[u8]) -> Result<Vec<AttrView>, KsError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        if pos + HEADER_LEN > bytes.len() {
            return Err(KsError::BadBlockType);
        }
        let attr_type = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap());
        let len = u16::from_be_bytes(bytes[pos + 4..pos + 6].try_into().unwrap()) as usize;
        let value_off = pos + HEADER_LEN;
        if value_off + len > bytes.len() {
            return Err(KsError::BadBlockType);
        }
        out.push(AttrView { attr_type, offset: value_off, len });
        pos = value_off + len;
    }
    Ok(out)
}

/// Remove the (at most one) attribute of `attr_type`, shifting the tail
/// forward over it. No-op if no such attribute exists.
pub fn delete(bytes: &mut Vec<u8>, attr_type: u32) -> Result<(), KsError> {
    let views = scan(bytes)?;
    if let Some(v) = views.iter().find(|v| v.attr_type == attr_type) {
        let start = v.offset - HEADER_LEN;
        let end = v.offset + v.len;
        bytes.drain(start..end);
    }
    Ok(())
}

/// Delete any existing attribute of `attr_type`, then append a new one,
/// failing *result-too-long* if it would not fit in `max_len`.
pub fn insert(bytes: &mut Vec<u8>, attr_type: u32, value: &[u8], max_len: usize) -> Result<(), KsError> {
    delete(bytes, attr_type)?;
    if bytes.len() + HEADER_LEN + value.len() > max_len {
        return Err(KsError::ResultTooLong);
    }
    bytes.extend_from_slice(&attr_type.to_be_bytes());
    bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
    bytes.extend_from_slice(value);
    Ok(())
}

/// Sentinel length carried by `set_attributes` callers to mean "delete this
/// attribute" rather than "set it to an empty value".
pub const DELETE_SENTINEL_LEN: u32 = 0xFFFF_FFFF;

pub struct AttrRequest {
    pub attr_type: u32,
    pub value: Vec<u8>,
    pub delete: bool,
}

/// Apply a batch of attribute sets/deletes in order.
pub fn set_attributes(bytes: &mut Vec<u8>, requests: &[AttrRequest], max_len: usize) -> Result<(), KsError> {
    for req in requests {
        if req.delete {
            delete(bytes, req.attr_type)?;
        } else {
            insert(bytes, req.attr_type, &req.value, max_len)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AttrResult {
    pub attr_type: u32,
    pub length: u32,
    pub value: Option<Vec<u8>>,
}

/// Fill in `length` for each requested type, and — if `buf_len > 0` — a
/// copy of its value. Missing attributes report length 0.
pub fn get_attributes(bytes: &[u8], requested_types: &[u32], buf_len: usize) -> Result<Vec<AttrResult>, KsError> {
    let views = scan(bytes)?;
    let mut out = Vec::with_capacity(requested_types.len());
    for &attr_type in requested_types {
        match views.iter().find(|v| v.attr_type == attr_type) {
            Some(v) => {
                let value = if buf_len > 0 { Some(bytes[v.offset..v.offset + v.len].to_vec()) } else { None };
                out.push(AttrResult { attr_type, length: v.len as u32, value });
            }
            None => out.push(AttrResult { attr_type, length: 0, value: None }),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_scan_round_trips() {
        let mut bytes = Vec::new();
        insert(&mut bytes, 1, b"hello", 256).unwrap();
        insert(&mut bytes, 2, b"world", 256).unwrap();
        let views = scan(&bytes).unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(&bytes[views[0].offset..views[0].offset + views[0].len], b"hello");
        assert_eq!(&bytes[views[1].offset..views[1].offset + views[1].len], b"world");
    }

    #[test]
    fn insert_replaces_existing_type() {
        let mut bytes = Vec::new();
        insert(&mut bytes, 1, b"old", 256).unwrap();
        insert(&mut bytes, 1, b"new-value", 256).unwrap();
        let views = scan(&bytes).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(&bytes[views[0].offset..views[0].offset + views[0].len], b"new-value");
    }

    #[test]
    fn insert_fails_when_over_budget() {
        let mut bytes = Vec::new();
        assert_eq!(insert(&mut bytes, 1, &[0u8; 250], 10), Err(KsError::ResultTooLong));
    }

    #[test]
    fn get_attributes_reports_zero_length_for_missing() {
        let mut bytes = Vec::new();
        insert(&mut bytes, 1, b"x", 64).unwrap();
        let results = get_attributes(&bytes, &[1, 2], 64).unwrap();
        assert_eq!(results[0].length, 1);
        assert_eq!(results[1].length, 0);
        assert_eq!(results[1].value, None);
    }

    #[test]
    fn set_attributes_applies_deletes_and_inserts_in_order() {
        let mut bytes = Vec::new();
        insert(&mut bytes, 1, b"keep-me-out", 256).unwrap();
        let reqs = vec![
            AttrRequest { attr_type: 1, value: vec![], delete: true },
            AttrRequest { attr_type: 2, value: b"added".to_vec(), delete: false },
        ];
        set_attributes(&mut bytes, &reqs, 256).unwrap();
        let views = scan(&bytes).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].attr_type, 2);
    }
}
