use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use gbsim_transport::Endpoint;
use tracing::debug;

use crate::codec::{decode_frame, decode_message, FrameConfig, Message};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete operation messages from any `Read` stream.
///
/// In stream mode partial reads are reassembled internally. In packetized
/// mode every read is one transfer and must hold one whole message; a
/// transfer shorter than its declared size is a `Malformed` error rather
/// than the start of a longer message.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    transfer: Vec<u8>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new stream-mode frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            transfer: Vec::new(),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// After a `Malformed` or `TooLarge` error the offending bytes have
    /// been dropped and the reader can be used again.
    pub fn read_message(&mut self) -> Result<Message> {
        if self.config.packetized {
            self.read_transfer()
        } else {
            self.read_stream()
        }
    }

    /// Read whatever one `read` call delivers and decode from it.
    ///
    /// Unlike [`read_message`](Self::read_message) this never waits for the
    /// rest of a partial stream frame: the bytes stay buffered and `None` is
    /// returned. In packetized mode one transfer is one message.
    pub fn read_available(&mut self) -> Result<Option<Message>> {
        if self.config.packetized {
            return self.read_transfer().map(Some);
        }
        if let Some(message) = self.next_buffered()? {
            return Ok(Some(message));
        }
        self.fill()?;
        self.next_buffered()
    }

    /// Decode one complete message from already buffered stream bytes.
    pub fn next_buffered(&mut self) -> Result<Option<Message>> {
        if self.config.packetized {
            return Ok(None);
        }
        match decode_frame(&mut self.buf, self.config.max_message_size) {
            Ok(message) => Ok(message),
            Err(err) => {
                // No way to find the next frame boundary; start over.
                self.buf.clear();
                Err(err)
            }
        }
    }

    fn read_stream(&mut self) -> Result<Message> {
        loop {
            if let Some(message) = self.next_buffered()? {
                return Ok(message);
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(read) => {
                    self.buf.extend_from_slice(&chunk[..read]);
                    return Ok(read);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn read_transfer(&mut self) -> Result<Message> {
        if self.transfer.len() != self.config.max_message_size {
            self.transfer.resize(self.config.max_message_size, 0);
        }

        let read = loop {
            match self.inner.read(&mut self.transfer) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        };

        if read == 0 {
            return Err(FrameError::ConnectionClosed);
        }

        let message = decode_message(&self.transfer[..read])?;
        if message.wire_size() < read {
            debug!(
                declared = message.wire_size(),
                received = read,
                "ignoring bytes past end of message"
            );
        }
        Ok(message)
    }

    /// Number of buffered bytes not yet returned as a message.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partially received message.
    pub fn discard_buffered(&mut self) {
        self.buf.clear();
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<Endpoint> {
    /// Create a frame reader whose mode follows the endpoint kind.
    pub fn for_endpoint(inner: Endpoint, config: FrameConfig) -> Self {
        let config = FrameConfig {
            packetized: inner.is_packetized(),
            ..config
        };
        Self::with_config(inner, config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::Bytes;

    use super::*;
    use crate::codec::HEADER_SIZE;

    fn wire(operation_id: u16, op_type: u8, cport: u16, payload: &[u8]) -> Vec<u8> {
        Message::request(operation_id, op_type, cport, Bytes::copy_from_slice(payload))
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    #[test]
    fn read_single_message() {
        let mut reader = FrameReader::new(Cursor::new(wire(1, 0x01, 4, b"")));
        let msg = reader.read_message().unwrap();

        assert_eq!(msg.header.operation_id, 1);
        assert_eq!(msg.header.op_type, 0x01);
        assert_eq!(msg.header.cport_tag(), 4);
    }

    #[test]
    fn read_multiple_messages() {
        let mut bytes = wire(1, 0x01, 4, b"one");
        bytes.extend(wire(2, 0x02, 5, b"two"));
        bytes.extend(wire(3, 0x03, 6, b"three"));

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let m1 = reader.read_message().unwrap();
        let m2 = reader.read_message().unwrap();
        let m3 = reader.read_message().unwrap();

        assert_eq!((m1.header.operation_id, m1.payload.as_ref()), (1, b"one".as_ref()));
        assert_eq!((m2.header.operation_id, m2.payload.as_ref()), (2, b"two".as_ref()));
        assert_eq!(
            (m3.header.operation_id, m3.payload.as_ref()),
            (3, b"three".as_ref())
        );
    }

    #[test]
    fn partial_read_handling() {
        let reader = ByteByByteReader {
            bytes: wire(7, 0x05, 1, b"slow"),
            pos: 0,
        };
        let mut reader = FrameReader::new(reader);

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.header.operation_id, 7);
        assert_eq!(msg.payload.as_ref(), b"slow");
    }

    #[test]
    fn read_available_keeps_partial_frame_buffered() {
        let bytes = wire(4, 0x02, 9, b"split");
        let reader = TransferReader {
            transfers: vec![bytes[..3].to_vec(), bytes[3..].to_vec()],
        };
        let mut reader = FrameReader::new(reader);

        assert!(reader.read_available().unwrap().is_none());
        assert_eq!(reader.buffered(), 3);

        let msg = reader
            .read_available()
            .unwrap()
            .expect("second chunk should complete the frame");
        assert_eq!(msg.header.operation_id, 4);
        assert_eq!(msg.payload.as_ref(), b"split");
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn next_buffered_returns_queued_frames_without_reading() {
        let mut bytes = wire(1, 0x01, 2, b"a");
        bytes.extend(wire(2, 0x01, 2, b"b"));
        let mut reader = FrameReader::new(TransferReader {
            transfers: vec![bytes],
        });

        assert!(reader.next_buffered().unwrap().is_none());
        let first = reader.read_available().unwrap().expect("first frame");
        assert_eq!(first.header.operation_id, 1);
        let second = reader.next_buffered().unwrap().expect("second frame");
        assert_eq!(second.header.operation_id, 2);
        assert!(matches!(
            reader.read_available(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_message() {
        let mut bytes = wire(1, 0x01, 0, b"payload");
        bytes.truncate(HEADER_SIZE + 2);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn malformed_stream_is_dropped_and_reader_recovers() {
        let bytes = vec![0x03, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00];
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::Malformed { declared: 3, .. }));
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn oversized_message_in_stream() {
        let cfg = FrameConfig {
            max_message_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire(1, 1, 0, &[0u8; 32])), cfg);
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }

    #[test]
    fn packetized_short_transfer_is_malformed() {
        let mut transfer = wire(9, 0x05, 2, &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        transfer.truncate(12);
        let next = wire(10, 0x01, 2, b"");

        let reader = TransferReader {
            transfers: vec![transfer, next],
        };
        let cfg = FrameConfig {
            packetized: true,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(reader, cfg);

        let err = reader.read_message().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Malformed {
                declared: 17,
                received: 12
            }
        ));

        // The next transfer is not glued onto the short one.
        let msg = reader.read_message().unwrap();
        assert_eq!(msg.header.operation_id, 10);
    }

    #[test]
    fn packetized_ignores_trailing_transfer_bytes() {
        let mut transfer = wire(3, 0x02, 1, b"ab");
        transfer.extend_from_slice(&[0, 0, 0]);
        let cfg = FrameConfig {
            packetized: true,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(
            TransferReader {
                transfers: vec![transfer],
            },
            cfg,
        );

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.payload.as_ref(), b"ab");
        assert!(matches!(
            reader.read_message(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(8, 0x01, 3, b"ok")),
        };
        let mut framed = FrameReader::new(reader);
        let msg = framed.read_message().unwrap();

        assert_eq!(msg.header.operation_id, 8);
        assert_eq!(msg.payload.as_ref(), b"ok");
    }

    #[test]
    fn endpoint_reader_uses_stream_mode_for_sockets() {
        let (left, right) = Endpoint::pair("ep3").unwrap();
        let reader = FrameReader::for_endpoint(left, FrameConfig::default());
        assert!(!reader.config().packetized);
        drop(right);
    }

    #[test]
    fn roundtrip_over_endpoint_pair() {
        let (left, right) = Endpoint::pair("ep3").unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::for_endpoint(right, FrameConfig::default());

        let msg = Message::request(42, 0x07, 11, vec![1u8]).unwrap();
        writer.write_message(&msg).unwrap();

        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn buffered_bytes_can_be_discarded() {
        let mut bytes = wire(1, 1, 0, b"");
        bytes.extend_from_slice(&[0x20, 0x00]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        reader.read_message().unwrap();
        assert_eq!(reader.buffered(), 2);
        reader.discard_buffered();
        assert_eq!(reader.buffered(), 0);
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct TransferReader {
        transfers: Vec<Vec<u8>>,
    }

    impl Read for TransferReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.transfers.is_empty() {
                return Ok(0);
            }
            let transfer = self.transfers.remove(0);
            let n = transfer.len().min(buf.len());
            buf[..n].copy_from_slice(&transfer[..n]);
            Ok(n)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
