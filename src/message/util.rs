//! Byte-level helpers shared by the wire codecs and the TCP transport.

use std::io::prelude::*;

pub fn put_u32(buf: &mut Vec<u8>, x: u32) {
    buf.extend_from_slice(&x.to_le_bytes())
}

pub fn put_i32(buf: &mut Vec<u8>, x: i32) {
    buf.extend_from_slice(&x.to_le_bytes())
}

pub fn put_f64(buf: &mut Vec<u8>, x: f64) {
    buf.extend_from_slice(&x.to_le_bytes())
}

pub fn get_u32(bytes: &[u8], at: usize) -> u32 {
    let mut b = [0; 4];
    b.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(b)
}

pub fn get_i32(bytes: &[u8], at: usize) -> i32 {
    let mut b = [0; 4];
    b.copy_from_slice(&bytes[at..at + 4]);
    i32::from_le_bytes(b)
}

pub fn get_f64(bytes: &[u8], at: usize) -> f64 {
    let mut b = [0; 8];
    b.copy_from_slice(&bytes[at..at + 8]);
    f64::from_le_bytes(b)
}

/// Encodes a list of element ids into one CELL_ID payload.
pub fn encode_ids(ids: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ids.len() * 4);
    for &id in ids {
        put_u32(&mut buf, id);
    }
    buf
}

/// Decodes a CELL_ID payload; `None` if the length is not a whole number
/// of ids.
pub fn decode_ids(bytes: &[u8]) -> Option<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(bytes.chunks(4).map(|c| get_u32(c, 0)).collect())
}

/// Read a `u64` out of the given stream.
pub fn read_u64<R: Read>(stream: &mut R) -> u64 {
    u64::from_le_bytes(read_bytes_array(stream))
}

/// If any bytes can be read immediately from a stream, then read a `u64`
/// from it and return `Some`. Otherwise return `None`.
pub fn read_u64_non_blocking<R: Read>(stream: &mut R) -> Option<u64> {
    read_bytes_array_non_blocking(stream).map(u64::from_le_bytes)
}

/// Read a `u32` out of the given stream.
pub fn read_u32<R: Read>(stream: &mut R) -> u32 {
    u32::from_le_bytes(read_bytes_array(stream))
}

/// Read the given number of bytes from a stream, into a `Vec<u8>`.
pub fn read_bytes_vec<R: Read>(stream: &mut R, size: usize) -> Vec<u8> {
    let mut buffer = vec![0; size];
    read_bytes_into(stream, &mut buffer);
    buffer
}

/// Read the given (const) number of bytes from a stream, into an array.
pub fn read_bytes_array<R: Read, const SIZE: usize>(stream: &mut R) -> [u8; SIZE] {
    let mut buffer = [0; SIZE];
    read_bytes_into(stream, &mut buffer);
    buffer
}

/// If any bytes can be read immediately from a stream, then read the
/// given (const) number of bytes from it, returning `Some([u8; SIZE])`.
/// Otherwise, return `None`.
pub fn read_bytes_array_non_blocking<R: Read, const SIZE: usize>(
    stream: &mut R,
) -> Option<[u8; SIZE]> {
    let mut buffer = [0; SIZE];
    read_bytes_into_non_blocking(stream, &mut buffer).map(|_| buffer)
}

/// Fill up the given buffer by reading bytes from a stream repeatedly
/// until the buffer is full.
pub fn read_bytes_into<R: Read>(stream: &mut R, buffer: &mut [u8]) {
    let mut cursor = 0;
    while cursor < buffer.len() {
        cursor += stream.read(&mut buffer[cursor..]).unwrap_or(0);
    }
}

/// If a message is ready to be received, then fill up the given buffer by
/// reading bytes from a stream repeatedly until the buffer is full.
/// Otherwise, return immediately.
pub fn read_bytes_into_non_blocking<R: Read>(stream: &mut R, buffer: &mut [u8]) -> Option<()> {
    let cursor = stream.read(&mut *buffer).unwrap_or(0);
    if cursor == 0 {
        None
    } else {
        read_bytes_into(stream, &mut buffer[cursor..]);
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_list_round_trip() {
        let ids = vec![0, 1, 7, u32::MAX];
        assert_eq!(decode_ids(&encode_ids(&ids)).unwrap(), ids);
    }

    #[test]
    fn id_list_rejects_ragged_length() {
        assert!(decode_ids(&[0, 1, 2]).is_none());
    }

    #[test]
    fn scalar_round_trips() {
        let mut buf = Vec::new();
        put_u32(&mut buf, 0xdead_beef);
        put_i32(&mut buf, -3);
        put_f64(&mut buf, 0.15625);
        assert_eq!(get_u32(&buf, 0), 0xdead_beef);
        assert_eq!(get_i32(&buf, 4), -3);
        assert_eq!(get_f64(&buf, 8), 0.15625);
    }
}
