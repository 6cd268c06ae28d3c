use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{FrameConfig, Message};
use crate::error::{FrameError, Result};
use crate::svc::SvcMessage;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete operation and SVC messages to any `Write` stream.
///
/// Every message is written with as many `write` calls as needed and then
/// flushed; callers block until the whole message has left.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete operation message (blocking).
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        if message.wire_size() > self.config.max_message_size {
            return Err(FrameError::TooLarge {
                size: message.wire_size(),
                max: self.config.max_message_size,
            });
        }

        self.buf.clear();
        message.encode(&mut self.buf);
        self.write_buffered()
    }

    /// Write a complete SVC message (blocking).
    pub fn write_svc(&mut self, message: &SvcMessage) -> Result<()> {
        self.buf.clear();
        message.encode(&mut self.buf)?;
        self.write_buffered()
    }

    /// Bytes of the last message written, for verbose dumps.
    pub fn last_written(&self) -> &[u8] {
        &self.buf
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::{Bytes, BytesMut};

    use super::*;
    use crate::codec::decode_frame;
    use crate::svc::decode_svc_message;

    #[test]
    fn write_single_message() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let msg = Message::request(5, 0x02, 9, vec![0x11u8]).unwrap();

        writer.write_message(&msg).unwrap();

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let decoded = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(decoded, msg);
        assert!(wire.is_empty());
    }

    #[test]
    fn write_multiple_messages_in_order() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        for id in 1..=3u16 {
            let msg = Message::request(id, 0x01, id, Bytes::new()).unwrap();
            writer.write_message(&msg).unwrap();
        }

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        for id in 1..=3u16 {
            let msg = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
            assert_eq!(msg.header.operation_id, id);
            assert_eq!(msg.header.cport_tag(), id);
        }
    }

    #[test]
    fn write_svc_message() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_svc(&SvcMessage::svc_hello()).unwrap();
        assert_eq!(writer.last_written().len(), 7);

        let wire = writer.into_inner().into_inner();
        assert_eq!(decode_svc_message(&wire).unwrap(), SvcMessage::svc_hello());
    }

    #[test]
    fn message_too_large_rejected() {
        let cfg = FrameConfig {
            max_message_size: 10,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        let msg = Message::request(1, 1, 0, vec![0u8; 8]).unwrap();

        let err = writer.write_message(&msg).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { size: 16, max: 10 }));
    }

    #[test]
    fn flush_reaches_endpoint() {
        let sink = FlushProbe::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer
            .write_message(&Message::request(1, 1, 0, Bytes::new()).unwrap())
            .unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_and_would_block_writes() {
        let mut writer = FrameWriter::new(FlakyWriter {
            failures: vec![ErrorKind::Interrupted, ErrorKind::WouldBlock],
            data: Vec::new(),
        });
        let msg = Message::request(2, 3, 4, vec![1u8, 2]).unwrap();
        writer.write_message(&msg).unwrap();

        assert_eq!(writer.into_inner().data, msg.to_bytes().to_vec());
    }

    #[test]
    fn zero_length_write_means_closed() {
        let mut writer = FrameWriter::new(ClosedSink);
        let err = writer
            .write_message(&Message::request(1, 1, 0, Bytes::new()).unwrap())
            .unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[derive(Default)]
    struct FlushProbe {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushProbe {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FlakyWriter {
        failures: Vec<ErrorKind>,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.failures.is_empty() {
                return Err(std::io::Error::from(self.failures.remove(0)));
            }
            // Short writes exercise the offset loop.
            let n = buf.len().min(3);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ClosedSink;

    impl Write for ClosedSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
