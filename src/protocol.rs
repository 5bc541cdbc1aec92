//! Binary line-retrieval protocol.
//!
//! All integers are little-endian and fixed width.
//!
//! ```text
//! Request:  <u32 index>
//! Response: <u32 length><length bytes of line data>
//!
//! Example (table = ["olle", "dlro"]):
//! Request:  01 00 00 00
//! Response: 04 00 00 00 64 6c 72 6f      ("dlro")
//! ```
//!
//! A request whose index is past the end of the table gets no response:
//! the server flushes any pending responses and closes the connection.
//! Clients use this as the end-of-data signal.

use crate::table::LineTable;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of an encoded request.
pub const REQUEST_LEN: usize = 4;

/// Size of the length prefix in front of every response payload.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Longest line a response can carry.
pub const MAX_LINE_LEN: usize = u32::MAX as usize;

/// Result of decoding from a partially filled buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult<T> {
    /// A complete value and the number of bytes it occupied.
    Complete(T, usize),
    /// Not enough bytes buffered yet.
    Incomplete,
}

/// What the server does with one decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Send this line back.
    Line(Bytes),
    /// Index out of range: flush and close.
    Close,
}

impl Reply {
    /// Resolve a request index against the table.
    #[inline]
    pub fn lookup(table: &LineTable, index: u32) -> Self {
        match table.get(index) {
            Some(line) => Reply::Line(line.clone()),
            None => Reply::Close,
        }
    }

    /// Append the wire form of this reply to `dst`.
    ///
    /// `Close` writes nothing. Returns whether the connection stays open.
    pub fn encode(&self, dst: &mut BytesMut) -> bool {
        match self {
            Reply::Line(line) => {
                encode_response(line, dst);
                true
            }
            Reply::Close => false,
        }
    }
}

/// Append an index request to `dst`.
#[inline]
pub fn encode_request(index: u32, dst: &mut BytesMut) {
    dst.put_u32_le(index);
}

/// Decode one index request from the front of `input`.
#[inline]
pub fn parse_request(input: &[u8]) -> ParseResult<u32> {
    match input.get(..REQUEST_LEN) {
        Some(mut header) => ParseResult::Complete(header.get_u32_le(), REQUEST_LEN),
        None => ParseResult::Incomplete,
    }
}

/// Append a length-prefixed response carrying `line` to `dst`.
///
/// Lines longer than [`MAX_LINE_LEN`] are rejected when the table is built.
pub fn encode_response(line: &[u8], dst: &mut BytesMut) {
    debug_assert!(line.len() <= MAX_LINE_LEN);
    dst.reserve(LENGTH_PREFIX_LEN + line.len());
    dst.put_u32_le(line.len() as u32);
    dst.extend_from_slice(line);
}

/// Decode one complete response from the front of `input`.
///
/// Returns the payload slice and the total bytes consumed.
#[cfg(test)]
pub fn parse_response(input: &[u8]) -> ParseResult<&[u8]> {
    let Some(mut header) = input.get(..LENGTH_PREFIX_LEN) else {
        return ParseResult::Incomplete;
    };
    let len = header.get_u32_le() as usize;
    let total = LENGTH_PREFIX_LEN + len;

    match input.get(LENGTH_PREFIX_LEN..total) {
        Some(payload) => ParseResult::Complete(payload, total),
        None => ParseResult::Incomplete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::LineIndexer;

    fn table() -> LineTable {
        LineTable::build(b"hello\nworld\n", LineIndexer::new(1)).unwrap()
    }

    #[test]
    fn test_request_round_trip() {
        let mut buf = BytesMut::new();
        encode_request(42, &mut buf);
        assert_eq!(&buf[..], &[42, 0, 0, 0]);
        assert_eq!(parse_request(&buf), ParseResult::Complete(42, 4));
    }

    #[test]
    fn test_request_little_endian() {
        let mut buf = BytesMut::new();
        encode_request(0x0102_0304, &mut buf);
        assert_eq!(&buf[..], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_request_incomplete() {
        assert_eq!(parse_request(&[]), ParseResult::Incomplete);
        assert_eq!(parse_request(&[1, 0, 0]), ParseResult::Incomplete);
    }

    #[test]
    fn test_pipelined_requests() {
        let mut buf = BytesMut::new();
        encode_request(1, &mut buf);
        encode_request(2, &mut buf);
        buf.put_u8(7);

        let mut seen = Vec::new();
        while let ParseResult::Complete(index, n) = parse_request(&buf) {
            seen.push(index);
            buf.advance(n);
        }
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_response_round_trip() {
        let mut buf = BytesMut::new();
        encode_response(b"dlro", &mut buf);
        assert_eq!(&buf[..], b"\x04\x00\x00\x00dlro");
        assert_eq!(parse_response(&buf), ParseResult::Complete(&b"dlro"[..], 8));
        assert_eq!(parse_response(&buf[..6]), ParseResult::Incomplete);
        assert_eq!(parse_response(&buf[..2]), ParseResult::Incomplete);
    }

    #[test]
    fn test_empty_response() {
        let mut buf = BytesMut::new();
        encode_response(b"", &mut buf);
        assert_eq!(parse_response(&buf), ParseResult::Complete(&b""[..], 4));
    }

    #[test]
    fn test_lookup_in_range() {
        let table = table();
        let reply = Reply::lookup(&table, 0);
        assert_eq!(reply, Reply::Line(Bytes::from_static(b"olle")));

        let mut buf = BytesMut::new();
        assert!(reply.encode(&mut buf));
        assert_eq!(&buf[..], b"\x04\x00\x00\x00olle");
    }

    #[test]
    fn test_lookup_out_of_range_writes_nothing() {
        let table = table();
        let reply = Reply::lookup(&table, table.len() as u32);
        assert_eq!(reply, Reply::Close);

        let mut buf = BytesMut::new();
        assert!(!reply.encode(&mut buf));
        assert!(buf.is_empty());
    }
}
