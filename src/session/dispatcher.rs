//! Transactional frame extraction from a growing receive buffer.
//!
//! Grows a `Vec<u8>` as bytes arrive and never mistakes a partially buffered
//! frame for a complete one: a peeked header is never thrown away, only
//! re-peeked, until its payload is complete, and the buffer is then drained
//! by exactly the bytes one full frame consumed.

use crate::protocol::message::MessageHeader;
use crate::protocol::{ProtocolError, HEADER_SIZE};

/// Accumulates inbound bytes and yields complete `(header, payload)` frames.
#[derive(Debug, Default)]
pub struct FrameExtractor {
    buf: Vec<u8>,
}

impl FrameExtractor {
    /// Creates an empty extractor.
    pub fn new() -> Self {
        FrameExtractor::default()
    }

    /// Appends freshly read bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Attempts to pull one complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` if the buffer doesn't yet hold a full frame; in
    /// that case nothing is consumed, so a later `feed` can complete it.
    /// Returns `Err` only for a corrupt header (bad magic or a short buffer)
    /// — these are fatal, and the caller should close the connection without
    /// calling `next_frame` again. A command byte that doesn't match any
    /// known application or control code is not an error: the frame is
    /// extracted normally with `header.command` set to
    /// [`MessageCommand::Unknown`](crate::protocol::message::MessageCommand::Unknown),
    /// and it's up to the session layer to skip it.
    pub fn next_frame(&mut self) -> Result<Option<(MessageHeader, Vec<u8>)>, ProtocolError> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = MessageHeader::from_bytes(&self.buf[..HEADER_SIZE])?;
        let total = HEADER_SIZE + header.payload_size as usize;
        if self.buf.len() < total {
            log::trace!(
                "partial read ({}/{} bytes) for {:?}",
                self.buf.len(),
                total,
                header.command
            );
            return Ok(None);
        }

        let payload = self.buf[HEADER_SIZE..total].to_vec();
        self.buf.drain(..total);

        Ok(Some((header, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{ApplicationMessageCode, MessageCommand};

    fn search_request_frame() -> Vec<u8> {
        let header = MessageHeader::application(ApplicationMessageCode::SearchRequest, 4, Default::default());
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        bytes
    }

    #[test]
    fn extracts_a_complete_frame() {
        let mut extractor = FrameExtractor::new();
        extractor.feed(&search_request_frame());

        let (header, payload) = extractor.next_frame().unwrap().unwrap();
        assert_eq!(
            header.command,
            MessageCommand::Application(ApplicationMessageCode::SearchRequest)
        );
        assert_eq!(payload, vec![1, 2, 3, 4]);
        assert!(extractor.next_frame().unwrap().is_none());
    }

    #[test]
    fn partial_header_yields_none_and_keeps_bytes() {
        let mut extractor = FrameExtractor::new();
        let frame = search_request_frame();
        extractor.feed(&frame[..4]);
        assert!(extractor.next_frame().unwrap().is_none());

        extractor.feed(&frame[4..]);
        let (_, payload) = extractor.next_frame().unwrap().unwrap();
        assert_eq!(payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn split_feed_matches_single_feed() {
        let frame = search_request_frame();

        let mut whole = FrameExtractor::new();
        whole.feed(&frame);
        let whole_result = whole.next_frame().unwrap().unwrap();

        let mut split = FrameExtractor::new();
        split.feed(&frame[..5]);
        assert!(split.next_frame().unwrap().is_none());
        split.feed(&frame[5..]);
        let split_result = split.next_frame().unwrap().unwrap();

        assert_eq!(whole_result, split_result);
    }

    #[test]
    fn two_frames_back_to_back() {
        let mut extractor = FrameExtractor::new();
        let frame = search_request_frame();
        extractor.feed(&frame);
        extractor.feed(&frame);

        assert!(extractor.next_frame().unwrap().is_some());
        assert!(extractor.next_frame().unwrap().is_some());
        assert!(extractor.next_frame().unwrap().is_none());
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut extractor = FrameExtractor::new();
        let mut frame = search_request_frame();
        frame[0] = 0x00;
        extractor.feed(&frame);
        assert!(matches!(extractor.next_frame(), Err(ProtocolError::BadMagic(0))));
    }

    #[test]
    fn unrecognized_command_is_extracted_not_rejected() {
        let mut extractor = FrameExtractor::new();
        let mut frame = search_request_frame();
        frame[3] = 0xEE; // not a valid ApplicationMessageCode
        extractor.feed(&frame);

        let (header, payload) = extractor.next_frame().unwrap().unwrap();
        assert_eq!(header.command, MessageCommand::Unknown(0xEE));
        assert_eq!(payload, vec![1, 2, 3, 4]);
        assert!(extractor.next_frame().unwrap().is_none());
    }
}
