use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::{FrameError, Result};

/// Frame terminator.
pub const DELIMITER: u8 = b'\n';

/// Byte substituted for delimiters found inside a payload.
pub const REPLACEMENT: u8 = b' ';

/// Default line buffer capacity: 4 KiB, delimiter included.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 4 * 1024;

/// Encode a message into its wire form.
///
/// ```text
/// ┌──────────────────────────────────┬──────┐
/// │ payload, each 0x0A → 0x20        │ 0x0A │
/// └──────────────────────────────────┴──────┘
/// ```
pub fn encode(message: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(message.len() + 1);
    encode_into(message, &mut dst);
    dst.freeze()
}

/// Encode a message, appending the frame to `dst`.
pub fn encode_into(message: &[u8], dst: &mut BytesMut) {
    dst.reserve(message.len() + 1);
    dst.extend(message.iter().map(|&b| if b == DELIMITER { REPLACEMENT } else { b }));
    dst.put_u8(DELIMITER);
}

/// Decode a frame: strip one trailing delimiter, if present.
pub fn decode(frame: &[u8]) -> &[u8] {
    frame.strip_suffix(&[DELIMITER]).unwrap_or(frame)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest accepted frame in bytes, delimiter included. Default: 4 KiB.
    pub max_frame_length: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// Streaming line codec.
///
/// Decodes one message per `\n`-terminated frame and encodes messages with
/// [`encode`]. A buffer holding `max_frame_length` bytes without a
/// delimiter is reported as [`FrameError::FrameTooLong`].
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_frame_length: usize,
    // Bytes before this offset are known not to contain a delimiter.
    next_index: usize,
}

impl LineCodec {
    /// Create a codec with the default frame limit.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    /// Create a codec with an explicit frame limit.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            max_frame_length: config.max_frame_length.max(1),
            next_index: 0,
        }
    }

    /// Largest accepted frame in bytes.
    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let scan_end = src.len().min(self.max_frame_length);
        let start = self.next_index.min(scan_end);

        match src[start..scan_end].iter().position(|&b| b == DELIMITER) {
            Some(offset) => {
                let end = start + offset;
                self.next_index = 0;
                let mut frame = src.split_to(end + 1);
                frame.truncate(end);
                Ok(Some(frame.freeze()))
            }
            None if src.len() >= self.max_frame_length => {
                debug!(
                    max = self.max_frame_length,
                    buffered = src.len(),
                    "no delimiter within line capacity"
                );
                Err(FrameError::FrameTooLong {
                    max: self.max_frame_length,
                })
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // Unterminated last line.
        self.next_index = 0;
        Ok(Some(src.split().freeze()))
    }
}

impl Encoder<&[u8]> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<()> {
        encode_into(item, dst);
        Ok(())
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        encode_into(&item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[test]
    fn encode_appends_delimiter() {
        assert_eq!(encode(b"hello").as_ref(), b"hello\n");
        assert_eq!(encode(b"").as_ref(), b"\n");
    }

    #[test]
    fn encode_replaces_inner_delimiters() {
        assert_eq!(encode(b"a\nb\n").as_ref(), b"a b \n");
    }

    #[test]
    fn decode_strips_single_delimiter() {
        assert_eq!(decode(b"hello\n"), b"hello");
        assert_eq!(decode(b"hello"), b"hello");
        assert_eq!(decode(b"hello\n\n"), b"hello\n");
    }

    #[test]
    fn roundtrip_without_delimiter_is_exact() {
        for message in [
            &b""[..],
            &b"x"[..],
            &b"HELLO"[..],
            &b"tab\tand\rcarriage"[..],
            &[0u8, 255, 7][..],
        ] {
            assert_eq!(decode(&encode(message)), message);
        }
    }

    #[test]
    fn roundtrip_with_delimiter_is_lossy() {
        assert_eq!(decode(&encode(b"one\ntwo")), b"one two");
    }

    #[test]
    fn decoder_yields_frames_in_order() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"first\nsecond\nthi"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"first");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"second");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"rd\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"third");
        assert!(buf.is_empty());
    }

    #[test]
    fn decoder_rejects_unterminated_frame_at_capacity() {
        let mut codec = LineCodec::with_config(&FrameConfig {
            max_frame_length: 8,
        });
        let mut buf = BytesMut::from(&b"1234567"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"8");
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLong { max: 8 }));
    }

    #[test]
    fn decoder_rejects_delimiter_past_capacity() {
        let mut codec = LineCodec::with_config(&FrameConfig {
            max_frame_length: 4,
        });
        let mut buf = BytesMut::from(&b"abcd\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::FrameTooLong { max: 4 })
        ));
    }

    #[test]
    fn decoder_accepts_frame_exactly_at_capacity() {
        let mut codec = LineCodec::with_config(&FrameConfig {
            max_frame_length: 4,
        });
        let mut buf = BytesMut::from(&b"abc\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"abc");
    }

    #[test]
    fn decode_eof_returns_trailing_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"done\npartial"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().unwrap().as_ref(), b"done");
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap().unwrap().as_ref(),
            b"partial"
        );
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[tokio::test]
    async fn framed_read_over_byte_stream() {
        let wire: &[u8] = b"hello\nworld\n";
        let mut frames = FramedRead::new(wire, LineCodec::new());

        assert_eq!(frames.next().await.unwrap().unwrap().as_ref(), b"hello");
        assert_eq!(frames.next().await.unwrap().unwrap().as_ref(), b"world");
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_write_encodes_messages() {
        let mut sink = FramedWrite::new(Vec::new(), LineCodec::new());
        sink.send(Bytes::from_static(b"one")).await.unwrap();
        sink.send(&b"two\nlines"[..]).await.unwrap();

        assert_eq!(sink.get_ref().as_slice(), b"one\ntwo lines\n");
    }
}
