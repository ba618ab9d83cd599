//! JSON body helpers backing [`json_message!`](crate::json_message).

use std::io::Write;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::MessageError;

struct CountingWriter(usize);

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Length of the JSON encoding of `value`; zero if it cannot be encoded.
pub fn byte_size<T: Serialize + ?Sized>(value: &T) -> usize {
    let mut counter = CountingWriter(0);
    match serde_json::to_writer(&mut counter, value) {
        Ok(()) => counter.0,
        Err(_) => 0,
    }
}

/// Write the JSON encoding of `value` into `buf`.
pub fn serialize_into<T: Serialize + ?Sized>(
    value: &T,
    type_name: &'static str,
    buf: &mut [u8],
) -> Result<usize, MessageError> {
    let needed = byte_size(value);
    if needed > buf.len() {
        return Err(MessageError::BufferTooSmall {
            needed,
            available: buf.len(),
        });
    }

    let available = buf.len();
    let mut cursor = std::io::Cursor::new(buf);
    serde_json::to_writer(&mut cursor, value).map_err(|err| MessageError::Encode {
        type_name,
        reason: err.to_string(),
    })?;

    let written = cursor.position() as usize;
    debug_assert!(written <= available);
    Ok(written)
}

/// Decode a JSON body.
pub fn parse<T: DeserializeOwned>(type_name: &'static str, buf: &[u8]) -> Result<T, MessageError> {
    serde_json::from_slice(buf).map_err(|err| MessageError::Decode {
        type_name,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_matches_encoding() {
        let value = serde_json::json!({ "seq": 7, "text": "héllo" });
        assert_eq!(byte_size(&value), serde_json::to_vec(&value).unwrap().len());
    }

    #[test]
    fn serialize_into_small_buffer_fails() {
        let mut buf = [0u8; 4];
        let err = serialize_into(&"a long string", "Text", &mut buf).unwrap_err();
        assert!(matches!(err, MessageError::BufferTooSmall { available: 4, .. }));
    }
}
