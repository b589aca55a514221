//! Incremental UTF-8 decoding of response chunks

use encoding_rs::{CoderResult, Decoder, UTF_8};

/// Decodes a byte stream chunk by chunk, holding back an incomplete trailing
/// sequence until the bytes that complete it arrive
pub struct Utf8Decoder {
    inner: Decoder,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self {
            inner: UTF_8.new_decoder_without_bom_handling(),
        }
    }

    /// Decode the next chunk; may return an empty string
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.run(bytes, false)
    }

    /// Flush at end of input; a dangling partial sequence becomes U+FFFD
    pub fn finish(&mut self) -> String {
        self.run(&[], true)
    }

    fn run(&mut self, mut src: &[u8], last: bool) -> String {
        let mut out = String::new();
        loop {
            let needed = self
                .inner
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len() * 3 + 16);
            out.reserve(needed);

            let (result, read, _replaced) = self.inner.decode_to_string(src, &mut out, last);
            src = &src[read..];
            match result {
                CoderResult::InputEmpty => return out,
                CoderResult::OutputFull => continue,
            }
        }
    }
}

impl Default for Utf8Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multibyte_split_across_chunks() {
        let text = "héllo wörld ✓";
        let bytes = text.as_bytes();
        // 'é' is two bytes starting at index 1; split between them
        let mut decoder = Utf8Decoder::new();
        let first = decoder.decode(&bytes[..2]);
        let second = decoder.decode(&bytes[2..]);

        assert_eq!(first, "h");
        assert_eq!(format!("{first}{second}{}", decoder.finish()), text);
    }

    #[test]
    fn test_byte_at_a_time() {
        let text = "日本語 ok 🎉";
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        for byte in text.as_bytes() {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, text);
    }

    #[test]
    fn test_truncated_sequence_replaced_at_finish() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"ok\xE2\x9C"), "ok");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
