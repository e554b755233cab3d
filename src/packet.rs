//! Source RCON wire format.
//!
//! ```text
//! size: u32 LE | id: i32 LE | type: i32 LE | body | 0x00 0x00
//! ```
//! where `size` counts everything after itself, i.e. `8 + body.len() + 2`.

use bytes::{Buf, BytesMut};
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;

use crate::error::RconError;

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Named packet types. `Exec` and `AuthResponse` share the value 2 on the
/// wire, so a decoded type can only be told apart by whether we sent or
/// received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    // SERVERDATA_AUTH
    Auth,
    // SERVERDATA_EXECCOMMAND
    Exec,
    // SERVERDATA_AUTH_RESPONSE
    AuthResponse,
    // SERVERDATA_RESPONSE_VALUE
    Response,
}

impl PacketType {
    pub fn value(self) -> i32 {
        match self {
            PacketType::Auth => SERVERDATA_AUTH,
            PacketType::Exec => SERVERDATA_EXECCOMMAND,
            PacketType::AuthResponse => SERVERDATA_AUTH_RESPONSE,
            PacketType::Response => SERVERDATA_RESPONSE_VALUE,
        }
    }
}

impl From<PacketType> for i32 {
    fn from(packet_type: PacketType) -> i32 {
        packet_type.value()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: i32,
    packet_type: i32,
    body: Vec<u8>,
}

impl Packet {
    /// id + type + the two terminating NULs.
    pub const BASE_PACKET_SIZE: usize = 10;
    /// Upper bound on an incoming size field. Anything larger is treated as a
    /// corrupted stream rather than an allocation request.
    pub const MAX_PACKET_SIZE: usize = 1024 * 1024;
    /// Largest body that still decodes. [Packet::encode] writes longer ones,
    /// but no decoder on our side would accept them back.
    pub const MAX_BODY_SIZE: usize = Self::MAX_PACKET_SIZE - Self::BASE_PACKET_SIZE;

    pub fn new(id: i32, packet_type: impl Into<i32>, body: impl Into<Vec<u8>>) -> Self {
        Packet {
            id,
            packet_type: packet_type.into(),
            body: body.into(),
        }
    }

    pub fn auth(id: i32, password: &str) -> Self {
        Self::new(id, PacketType::Auth, password)
    }

    pub fn exec(id: i32, command: &str) -> Self {
        Self::new(id, PacketType::Exec, command)
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn packet_type(&self) -> i32 {
        self.packet_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Lossy UTF-8 view of the body; servers are not consistent about
    /// encodings.
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    // Since the only one of these values that can change in length is the body,
    // an easy way to calculate the size of a packet is to find the byte-length
    // of the packet body, then add 10 to it.
    pub fn size(&self) -> u32 {
        (self.body.len() + Self::BASE_PACKET_SIZE) as u32
    }

    pub fn encode(&self) -> Vec<u8> {
        let size = self.size();
        trace!("encoding packet {} of size {}", self.id, size);

        // Size, ID, Type, Body, Terminator
        let mut payload = Vec::<u8>::with_capacity(4 + size as usize);
        payload.extend_from_slice(&size.to_le_bytes());
        payload.extend_from_slice(&self.id.to_le_bytes());
        payload.extend_from_slice(&self.packet_type.to_le_bytes());
        payload.extend_from_slice(&self.body);
        // null terminate the body (C++ interop 🤢), then null terminate the entire package
        payload.extend_from_slice(&[0u8, 0u8]);
        payload
    }
}

/// Reads one frame from `reader`. Trailing NULs are stripped from the body.
///
/// A frame whose size field is out of range is read past and reported as
/// [RconError::MalformedPacket], so the next call starts on a frame boundary.
pub async fn decode<R>(reader: &mut R) -> Result<Packet, RconError>
where
    R: AsyncRead + Unpin,
{
    let mut size_field = [0u8; 4];
    reader
        .read_exact(&mut size_field)
        .await
        .map_err(RconError::from_read)?;
    let size = u32::from_le_bytes(size_field) as usize;

    if let Err(err) = check_size(size) {
        let mut rest = (&mut *reader).take(size as u64);
        let skipped = tokio::io::copy(&mut rest, &mut tokio::io::sink())
            .await
            .map_err(RconError::from_read)?;
        debug!("skipped {} of {} bytes of a rejected frame", skipped, size);
        return Err(err);
    }

    let mut remainder = vec![0u8; size];
    reader
        .read_exact(&mut remainder)
        .await
        .map_err(RconError::from_read)?;
    Ok(parse_frame(&remainder))
}

fn check_size(size: usize) -> Result<(), RconError> {
    if size < Packet::BASE_PACKET_SIZE {
        return Err(RconError::MalformedPacket(format!(
            "size field {size} is too small for a packet header"
        )));
    }
    if size > Packet::MAX_PACKET_SIZE {
        return Err(RconError::MalformedPacket(format!(
            "size field {size} exceeds the {} byte limit",
            Packet::MAX_PACKET_SIZE
        )));
    }
    Ok(())
}

// `frame` is everything after the size field.
fn parse_frame(frame: &[u8]) -> Packet {
    let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    let packet_type = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);

    let body = &frame[8..];
    let trimmed = body.iter().rposition(|b| *b != 0).map_or(0, |last| last + 1);

    trace!("decoded packet {} of type {} ({} byte body)", id, packet_type, trimmed);
    Packet::new(id, packet_type, &body[..trimmed])
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Header,
    /// Reading past a rejected frame.
    Skipping { remaining: usize },
}

/// Incremental frame decoder for buffered reads.
///
/// Partial frames stay in the caller's buffer between calls, so a read that
/// is abandoned halfway (a deadline, a cancelled select) loses nothing.
/// Frames with an out-of-range size field are reported once as
/// [RconError::MalformedPacket] and then skipped as their bytes arrive.
#[derive(Debug, Default)]
pub struct RconCodec {
    state: State,
}

impl RconCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the codec sits on a frame boundary with nothing left over.
    pub fn is_idle(&self, buf: &BytesMut) -> bool {
        matches!(self.state, State::Header) && buf.is_empty()
    }
}

impl Decoder for RconCodec {
    type Item = Packet;
    type Error = RconError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, RconError> {
        if let State::Skipping { remaining } = &mut self.state {
            let skipped = (*remaining).min(src.len());
            src.advance(skipped);
            *remaining -= skipped;
            if *remaining > 0 {
                return Ok(None);
            }
            self.state = State::Header;
        }

        if src.len() < 4 {
            return Ok(None);
        }
        let size = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if let Err(err) = check_size(size) {
            src.advance(4);
            self.state = State::Skipping { remaining: size };
            return Err(err);
        }

        if src.len() < 4 + size {
            src.reserve(4 + size - src.len());
            return Ok(None);
        }
        src.advance(4);
        let frame = src.split_to(size);
        Ok(Some(parse_frame(&frame)))
    }
}

/// Like [decode], but fails with [RconError::IdMismatch] when the decoded id
/// differs from `expected_id`. The mismatching packet travels inside the error.
pub async fn decode_with_id<R>(reader: &mut R, expected_id: i32) -> Result<Packet, RconError>
where
    R: AsyncRead + Unpin,
{
    let packet = decode(reader).await?;
    if packet.id() != expected_id {
        debug!("expected packet {} but got {}", expected_id, packet.id());
        return Err(RconError::IdMismatch {
            expected: expected_id,
            packet,
        });
    }
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame(id: i32, packet_type: i32, body: &[u8], terminator: &[u8]) -> Vec<u8> {
        let size = (8 + body.len() + terminator.len()) as u32;
        let mut frame = Vec::new();
        frame.extend_from_slice(&size.to_le_bytes());
        frame.extend_from_slice(&id.to_le_bytes());
        frame.extend_from_slice(&packet_type.to_le_bytes());
        frame.extend_from_slice(body);
        frame.extend_from_slice(terminator);
        frame
    }

    #[test]
    fn encode_lays_out_fields_little_endian() {
        let packet = Packet::new(0x11223344, 0x55667788, "hello");
        let frame = packet.encode();

        assert_eq!(frame.len(), 4 + 8 + 5 + 2);
        assert_eq!(u32::from_le_bytes(frame[0..4].try_into().unwrap()), 8 + 5 + 2);
        assert_eq!(i32::from_le_bytes(frame[4..8].try_into().unwrap()), 0x11223344);
        assert_eq!(i32::from_le_bytes(frame[8..12].try_into().unwrap()), 0x55667788);
        assert_eq!(&frame[12..17], b"hello");
        assert_eq!(&frame[17..], &[0, 0]);
    }

    #[test]
    fn empty_body_is_a_ten_byte_frame() {
        let frame = Packet::exec(7, "").encode();
        assert_eq!(frame.len(), 14);
        assert_eq!(u32::from_le_bytes(frame[0..4].try_into().unwrap()), 10);
    }

    #[test]
    fn size_field_tracks_body_length() {
        for len in [0usize, 1, 17, 4086, 70_000] {
            let packet = Packet::new(1, SERVERDATA_EXECCOMMAND, vec![b'x'; len]);
            let frame = packet.encode();
            let size = u32::from_le_bytes(frame[0..4].try_into().unwrap()) as usize;
            assert_eq!(size, 8 + len + 2);
            assert_eq!(frame.len(), 4 + size);
        }
    }

    #[test]
    fn exec_and_auth_response_share_a_value() {
        assert_eq!(PacketType::Exec.value(), PacketType::AuthResponse.value());
        assert_eq!(PacketType::Auth.value(), 3);
        assert_eq!(PacketType::Response.value(), 0);
    }

    #[tokio::test]
    async fn decode_reads_a_server_response() {
        let frame = raw_frame(42, SERVERDATA_AUTH_RESPONSE, b"server response body", &[0, 0]);
        let packet = decode_with_id(&mut frame.as_slice(), 42).await.unwrap();

        assert_eq!(packet.id(), 42);
        assert_eq!(packet.packet_type(), SERVERDATA_AUTH_RESPONSE);
        assert_eq!(packet.body_str(), "server response body");
    }

    #[tokio::test]
    async fn decode_round_trips_arbitrary_headers() {
        let cases: [(i32, i32, &[u8]); 4] = [
            (i32::MIN, i32::MAX, b"status"),
            (-1, SERVERDATA_RESPONSE_VALUE, b""),
            (0, -42, b"multi\nline\r\n"),
            (i32::MAX, SERVERDATA_AUTH, &[0xff, 0x00, 0x01]),
        ];
        for (id, packet_type, body) in cases {
            let frame = Packet::new(id, packet_type, body).encode();
            let packet = decode_with_id(&mut frame.as_slice(), id).await.unwrap();
            assert_eq!(packet, Packet::new(id, packet_type, body));
        }
    }

    #[tokio::test]
    async fn decode_consumes_exactly_one_frame() {
        let mut stream = Packet::exec(1, "first").encode();
        stream.extend(Packet::exec(2, "second").encode());
        let mut reader = stream.as_slice();

        assert_eq!(decode(&mut reader).await.unwrap().body(), b"first");
        assert_eq!(decode(&mut reader).await.unwrap().body(), b"second");
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn mismatched_id_still_exposes_the_packet() {
        let frame = raw_frame(42, SERVERDATA_AUTH_RESPONSE, b"test", &[]);
        let err = decode_with_id(&mut frame.as_slice(), 99).await.unwrap_err();

        match err {
            RconError::IdMismatch { expected, packet } => {
                assert_eq!(expected, 99);
                assert_eq!(packet.id(), 42);
                assert_eq!(packet.packet_type(), SERVERDATA_AUTH_RESPONSE);
            }
            other => panic!("expected id mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_body_decodes_empty() {
        let frame = raw_frame(1, SERVERDATA_RESPONSE_VALUE, b"", &[0, 0]);
        let packet = decode_with_id(&mut frame.as_slice(), 1).await.unwrap();
        assert!(packet.body().is_empty());
    }

    #[tokio::test]
    async fn truncated_frame_reports_closed_connection() {
        let frame = Packet::exec(3, "cut short").encode();
        let err = decode(&mut &frame[..frame.len() - 4]).await.unwrap_err();
        assert!(err.is_connection_closed());

        let err = decode(&mut &b""[..]).await.unwrap_err();
        assert!(err.is_connection_closed());
    }

    #[tokio::test]
    async fn bogus_size_fields_are_rejected() {
        let tiny = 4u32.to_le_bytes();
        assert!(matches!(
            decode(&mut &tiny[..]).await,
            Err(RconError::MalformedPacket(_))
        ));

        let huge = u32::MAX.to_le_bytes();
        assert!(matches!(
            decode(&mut &huge[..]).await,
            Err(RconError::MalformedPacket(_))
        ));
    }

    #[tokio::test]
    async fn header_without_terminator_is_too_small() {
        let mut stream = raw_frame(5, SERVERDATA_RESPONSE_VALUE, b"", &[]);
        stream.extend(Packet::new(6, SERVERDATA_RESPONSE_VALUE, "after").encode());
        let mut reader = stream.as_slice();

        assert!(matches!(
            decode(&mut reader).await,
            Err(RconError::MalformedPacket(_))
        ));
        assert_eq!(decode(&mut reader).await.unwrap().id(), 6);
    }

    #[tokio::test]
    async fn oversized_frame_is_read_past() {
        let size = Packet::MAX_PACKET_SIZE + 1;
        let mut stream = (size as u32).to_le_bytes().to_vec();
        stream.extend(vec![b'z'; size]);
        stream.extend(Packet::new(8, SERVERDATA_RESPONSE_VALUE, "next").encode());
        let mut reader = stream.as_slice();

        assert!(matches!(
            decode(&mut reader).await,
            Err(RconError::MalformedPacket(_))
        ));
        let packet = decode(&mut reader).await.unwrap();
        assert_eq!((packet.id(), packet.body_str()), (8, "next".to_owned()));
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn largest_body_round_trips() {
        let packet = Packet::new(1, SERVERDATA_RESPONSE_VALUE, vec![b'x'; Packet::MAX_BODY_SIZE]);
        let frame = packet.encode();
        assert_eq!(frame.len(), 4 + Packet::MAX_PACKET_SIZE);
        assert_eq!(decode_with_id(&mut frame.as_slice(), 1).await.unwrap(), packet);
    }

    #[test]
    fn codec_keeps_partial_frames_buffered() {
        let frame = Packet::new(7, SERVERDATA_RESPONSE_VALUE, "split across reads").encode();
        let mut codec = RconCodec::new();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&frame[..6]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 6);

        buf.extend_from_slice(&frame[6..]);
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.body_str(), "split across reads");
        assert!(codec.is_idle(&buf));
    }

    #[test]
    fn codec_skips_a_rejected_frame_as_it_arrives() {
        let size = Packet::MAX_PACKET_SIZE + 100;
        let mut codec = RconCodec::new();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&(size as u32).to_le_bytes());
        buf.extend_from_slice(&vec![0xaa; 60]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(RconError::MalformedPacket(_))
        ));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
        assert!(!codec.is_idle(&buf));

        buf.extend_from_slice(&vec![0xaa; size - 60]);
        buf.extend_from_slice(&Packet::new(8, SERVERDATA_RESPONSE_VALUE, "next").encode());
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!((packet.id(), packet.body_str()), (8, "next".to_owned()));
    }

    #[test]
    fn codec_decodes_several_frames_from_one_buffer() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Packet::exec(1, "first").encode());
        buf.extend_from_slice(&Packet::exec(2, "second").encode());
        let mut codec = RconCodec::new();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().body(), b"first");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().body(), b"second");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
