//! Newline framing.
//!
//! A frame is any run of bytes ending in a single `\n` (0x0A). There is no
//! length prefix and no escaping; every other byte is opaque payload.
//!
//! Every delimiter completes a frame, not just the first one in a receive.
//! A chunk holding `n` newlines yields `n` complete segments, each of which
//! triggers its own echo, so the echoes a client sees do not depend on how
//! its bytes were split across reads.

/// Frame terminator.
pub const DELIMITER: u8 = b'\n';

/// Result of scanning received bytes for the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    /// A frame of `len` bytes, delimiter included, starts the input.
    Frame { len: usize },
    /// Input holds bytes but no delimiter.
    Partial,
    /// Nothing to scan.
    Empty,
}

/// Scan `input` for the first complete frame.
pub fn parse(input: &[u8]) -> ParseResult {
    if input.is_empty() {
        return ParseResult::Empty;
    }
    match find_delimiter(input) {
        Some(pos) => ParseResult::Frame { len: pos + 1 },
        None => ParseResult::Partial,
    }
}

/// Position of the first delimiter in `input`.
pub fn find_delimiter(input: &[u8]) -> Option<usize> {
    input.iter().position(|&b| b == DELIMITER)
}

/// A piece of a received chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub bytes: &'a [u8],
    /// Whether `bytes` ends a frame.
    pub complete: bool,
}

/// Split a chunk after every delimiter.
///
/// Each complete segment is a separate frame; a trailing segment without a
/// delimiter is the start of the next frame.
///
/// ```text
/// b"ab\ncd\nef" -> [b"ab\n" (complete), b"cd\n" (complete), b"ef" (partial)]
/// ```
pub fn segments(input: &[u8]) -> Segments<'_> {
    Segments { rest: input }
}

/// Iterator returned by [`segments`].
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Segment<'a>> {
        match parse(self.rest) {
            ParseResult::Empty => None,
            ParseResult::Frame { len } => {
                let (bytes, rest) = self.rest.split_at(len);
                self.rest = rest;
                Some(Segment {
                    bytes,
                    complete: true,
                })
            }
            ParseResult::Partial => {
                let bytes = std::mem::take(&mut self.rest);
                Some(Segment {
                    bytes,
                    complete: false,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame() {
        assert_eq!(parse(b"hello\n"), ParseResult::Frame { len: 6 });
        assert_eq!(parse(b"\n"), ParseResult::Frame { len: 1 });
        assert_eq!(parse(b"a\nb\n"), ParseResult::Frame { len: 2 });
    }

    #[test]
    fn test_parse_partial_and_empty() {
        assert_eq!(parse(b"abc"), ParseResult::Partial);
        assert_eq!(parse(b"trailing\r"), ParseResult::Partial);
        assert_eq!(parse(b""), ParseResult::Empty);
    }

    #[test]
    fn test_binary_payload_is_opaque() {
        let payload = [0u8, 0xff, 0x0d, 0x0b, 0x0c, 0x80];
        assert_eq!(parse(&payload), ParseResult::Partial);

        let mut framed = payload.to_vec();
        framed.push(b'\n');
        assert_eq!(parse(&framed), ParseResult::Frame { len: 7 });
    }

    #[test]
    fn test_segments_split_after_every_newline() {
        let parts: Vec<_> = segments(b"ab\ncd\nef").collect();
        assert_eq!(
            parts,
            vec![
                Segment { bytes: b"ab\n", complete: true },
                Segment { bytes: b"cd\n", complete: true },
                Segment { bytes: b"ef", complete: false },
            ]
        );
    }

    #[test]
    fn test_segments_without_remainder() {
        let parts: Vec<_> = segments(b"x\n\n").collect();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|s| s.complete));
        assert_eq!(parts[1].bytes, b"\n");
        assert_eq!(segments(b"").count(), 0);
    }

    #[test]
    fn test_segments_preserve_bytes() {
        let input = b"one\ntwo\nthree";
        let joined: Vec<u8> = segments(input).flat_map(|s| s.bytes.to_vec()).collect();
        assert_eq!(joined, input);
    }
}
