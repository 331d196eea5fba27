//! Stateful assembly of a [`Message`] from a stream of arbitrarily-chunked bytes, and the
//! CRC-32/IEEE check that decides whether an assembled message is trustworthy.

use crate::header::{Header, HEADER_LEN};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Phase {
    Header,
    Payload,
    Complete,
}

/// A single message: header plus payload, plus the bookkeeping needed to assemble it
/// incrementally from a byte stream.
#[derive(Debug, Clone)]
pub struct Message {
    header: Header,
    header_buf: [u8; HEADER_LEN],
    header_filled: usize,
    payload: Vec<u8>,
    phase: Phase,
    /// Per-send timeout in seconds, clamped to `[1, 300]` with a default of 15. Only
    /// meaningful for outbound messages; ignored while assembling an inbound one.
    pub timeout_secs: u32,
}

pub const DEFAULT_TIMEOUT_SECS: u32 = 15;
pub const MIN_TIMEOUT_SECS: u32 = 1;
pub const MAX_TIMEOUT_SECS: u32 = 300;

#[inline]
pub fn clamp_timeout(secs: u32) -> u32 {
    secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
}

impl Default for Message {
    fn default() -> Self {
        Message::new()
    }
}

impl Message {
    /// A fresh, empty message ready to receive bytes via [`Message::add_data`].
    pub fn new() -> Message {
        Message {
            header: Header::new(),
            header_buf: [0u8; HEADER_LEN],
            header_filled: 0,
            payload: Vec::new(),
            phase: Phase::Header,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Builds a complete, outbound message from a signature and a payload. The header's
    /// size and checksum fields are computed from `payload`; the compressed and
    /// encrypted flags are left clear.
    pub fn build(signature: u16, payload: Vec<u8>) -> Result<Message, crate::WireError> {
        Message::build_with_flags(signature, payload, false, false)
    }

    /// Like [`Message::build`], additionally setting the header's compressed and
    /// encrypted flags. Used by callers that apply those transforms to the payload
    /// themselves and need the header to record that fact.
    pub fn build_with_flags(signature: u16, payload: Vec<u8>, compressed: bool, encrypted: bool) -> Result<Message, crate::WireError> {
        let mut header = Header::new();
        header.set_signature(signature)?;
        header.set_size(payload.len())?;
        header.set_checksum(crate::crc::checksum(&payload));
        header.set_compressed(compressed);
        header.set_encrypted(encrypted);
        Ok(Message {
            header,
            header_buf: header.to_bytes(),
            header_filled: HEADER_LEN,
            payload,
            phase: Phase::Complete,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    #[inline]
    pub fn header(&self) -> Header {
        self.header
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Whether the payload's CRC-32 matches the header's checksum field. Only
    /// meaningful once the message is complete.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.phase == Phase::Complete && crate::crc::checksum(&self.payload) == self.header.checksum()
    }

    /// Encodes this message onto the wire: header followed by payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Feeds `bytes` into the assembler. Returns the bytes left over past the end of
    /// this message (the start of the next one) and whether this message is now
    /// complete.
    ///
    /// Panics if called again after the message is already complete: that indicates a
    /// transport-layer bug, not bad network input, since the caller is expected to
    /// start a fresh `Message` with the leftover bytes from the previous call.
    pub fn add_data<'a>(&mut self, bytes: &'a [u8]) -> (&'a [u8], bool) {
        assert_ne!(
            self.phase,
            Phase::Complete,
            "add_data called on an already-complete message"
        );

        let mut cursor = bytes;

        if self.phase == Phase::Header {
            let need = HEADER_LEN - self.header_filled;
            let take = need.min(cursor.len());
            self.header_buf[self.header_filled..self.header_filled + take]
                .copy_from_slice(&cursor[..take]);
            self.header_filled += take;
            cursor = &cursor[take..];

            if self.header_filled == HEADER_LEN {
                self.header = Header::read(&self.header_buf).expect("header buffer is exactly HEADER_LEN");
                self.payload = Vec::with_capacity(self.header.size());
                self.phase = if self.header.size() == 0 {
                    Phase::Complete
                } else {
                    Phase::Payload
                };
            } else {
                return (cursor, false);
            }
        }

        if self.phase == Phase::Payload {
            let need = self.header.size() - self.payload.len();
            let take = need.min(cursor.len());
            self.payload.extend_from_slice(&cursor[..take]);
            cursor = &cursor[take..];

            if self.payload.len() == self.header.size() {
                self.phase = Phase::Complete;
            }
        }

        (cursor, self.phase == Phase::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(signature: u16, payload: &[u8]) -> Vec<u8> {
        Message::build(signature, payload.to_vec()).unwrap().to_bytes()
    }

    #[test]
    fn single_shot_assembly() {
        let wire = encode(25, b"ping");
        let mut msg = Message::new();
        let (leftover, complete) = msg.add_data(&wire);
        assert!(complete);
        assert!(leftover.is_empty());
        assert!(msg.is_valid());
        assert_eq!(msg.header().signature(), 25);
        assert_eq!(msg.payload(), b"ping");
    }

    #[test]
    fn byte_at_a_time_assembly() {
        let wire = encode(3, b"hello world");
        let mut msg = Message::new();
        let mut complete = false;
        for b in &wire {
            let (_, c) = msg.add_data(std::slice::from_ref(b));
            complete = c;
            if complete {
                break;
            }
        }
        assert!(complete);
        assert!(msg.is_valid());
        assert_eq!(msg.payload(), b"hello world");
    }

    #[test]
    fn leftover_bytes_start_the_next_message() {
        let first = encode(1, b"abc");
        let second = encode(2, b"defgh");
        let mut combined = first.clone();
        combined.extend_from_slice(&second);

        let mut msg = Message::new();
        let (leftover, complete) = msg.add_data(&combined);
        assert!(complete);
        assert_eq!(leftover, &second[..]);

        let mut msg2 = Message::new();
        let (leftover2, complete2) = msg2.add_data(leftover);
        assert!(complete2);
        assert!(leftover2.is_empty());
        assert_eq!(msg2.payload(), b"defgh");
    }

    #[test]
    fn empty_payload_completes_on_header_alone() {
        let wire = encode(9, b"");
        let mut msg = Message::new();
        let (leftover, complete) = msg.add_data(&wire);
        assert!(complete);
        assert!(leftover.is_empty());
        assert!(msg.is_valid());
    }

    #[test]
    fn corrupted_payload_fails_validity() {
        let mut wire = encode(25, b"ping");
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        let mut msg = Message::new();
        let (_, complete) = msg.add_data(&wire);
        assert!(complete);
        assert!(!msg.is_valid());
    }

    #[test]
    fn build_with_flags_sets_both_flags() {
        let msg = Message::build_with_flags(5, b"payload".to_vec(), true, true).unwrap();
        assert!(msg.header().compressed());
        assert!(msg.header().encrypted());
    }

    #[test]
    fn timeout_defaults_and_clamping() {
        assert_eq!(clamp_timeout(0), MIN_TIMEOUT_SECS);
        assert_eq!(clamp_timeout(1_000), MAX_TIMEOUT_SECS);
        assert_eq!(clamp_timeout(42), 42);
    }

    #[test]
    #[should_panic(expected = "add_data called on an already-complete message")]
    fn add_data_after_complete_panics() {
        let wire = encode(1, b"x");
        let mut msg = Message::new();
        msg.add_data(&wire);
        msg.add_data(&[0]);
    }
}
