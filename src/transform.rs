//! Per-line text transform applied while indexing.
//!
//! A line of `L` bytes loses its first `L / 3` bytes and the remainder is
//! reversed. Lines shorter than three bytes are only reversed.

use bytes::BytesMut;

/// Number of leading bytes dropped from a line of `len` bytes.
#[inline]
pub fn drop_count(len: usize) -> usize {
    len / 3
}

/// Length of the transformed output for a line of `len` bytes.
#[cfg(test)]
#[inline]
pub fn transformed_len(len: usize) -> usize {
    len - drop_count(len)
}

/// Append the transformed form of `line` to `out`.
///
/// The source is never modified, so this works directly on a read-only
/// memory map.
pub fn transform_into(line: &[u8], out: &mut BytesMut) {
    let kept = &line[drop_count(line.len())..];
    out.reserve(kept.len());
    out.extend(kept.iter().rev());
}

/// Transform a single line into a freshly allocated buffer.
#[cfg(test)]
pub fn transform(line: &[u8]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(transformed_len(line.len()));
    transform_into(line, &mut out);
    out.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_and_reverse() {
        assert_eq!(transform(b"abcdefghi"), b"ihgfed");
        assert_eq!(transform(b"hello"), b"olle");
        assert_eq!(transform(b"world"), b"dlro");
    }

    #[test]
    fn test_short_lines_only_reverse() {
        assert_eq!(transform(b""), b"");
        assert_eq!(transform(b"a"), b"a");
        assert_eq!(transform(b"ab"), b"ba");
        // L = 3 drops one byte
        assert_eq!(transform(b"abc"), b"cb");
    }

    #[test]
    fn test_output_length() {
        for len in 0..64usize {
            let line: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
            let out = transform(&line);
            assert_eq!(out.len(), len - len / 3);
            assert_eq!(out.len(), transformed_len(len));

            let mut expected = line[len / 3..].to_vec();
            expected.reverse();
            assert_eq!(out, expected);
        }
    }

    #[test]
    fn test_transform_into_appends() {
        let mut out = BytesMut::new();
        transform_into(b"abcdefghi", &mut out);
        transform_into(b"xy", &mut out);
        assert_eq!(&out[..], b"ihgfedyx");
    }
}
