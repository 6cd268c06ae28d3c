use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::Result;

/// A physical simulator endpoint implementing `Read` and `Write`.
///
/// FunctionFS endpoints are files: every `read` returns exactly one USB
/// transfer, so frames never span reads. Socket endpoints are byte streams
/// used for loopback operation and tests.
pub struct Endpoint {
    inner: EndpointInner,
    name: String,
}

enum EndpointInner {
    File(std::fs::File),
    Unix(UnixStream),
}

impl Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            EndpointInner::File(file) => file.read(buf),
            EndpointInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            EndpointInner::File(file) => file.write(buf),
            EndpointInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            EndpointInner::File(file) => file.flush(),
            EndpointInner::Unix(stream) => stream.flush(),
        }
    }
}

impl AsRawFd for Endpoint {
    fn as_raw_fd(&self) -> RawFd {
        match &self.inner {
            EndpointInner::File(file) => file.as_raw_fd(),
            EndpointInner::Unix(stream) => stream.as_raw_fd(),
        }
    }
}

impl Endpoint {
    /// Wrap an opened FunctionFS endpoint file.
    pub(crate) fn from_file(file: std::fs::File, name: impl Into<String>) -> Self {
        Self {
            inner: EndpointInner::File(file),
            name: name.into(),
        }
    }

    /// Wrap a connected Unix stream.
    pub fn from_unix(stream: UnixStream, name: impl Into<String>) -> Self {
        Self {
            inner: EndpointInner::Unix(stream),
            name: name.into(),
        }
    }

    /// Create a connected pair of stream endpoints sharing a name.
    pub fn pair(name: &str) -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::from_unix(left, name), Self::from_unix(right, name)))
    }

    /// Endpoint name used in logs (`ep2`, `svc`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true when every read yields exactly one complete transfer.
    pub fn is_packetized(&self) -> bool {
        matches!(self.inner, EndpointInner::File(_))
    }

    /// Wait until the endpoint is readable or `timeout` elapses.
    ///
    /// Returns `Ok(true)` when a read will not block: data is pending, or
    /// the peer hung up and the read will report EOF or an error.
    /// `None` waits forever.
    pub fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        let timeout_ms = match timeout {
            Some(timeout) => timeout.as_millis().min(i32::MAX as u128) as i32,
            None => -1,
        };
        let mut pfd = libc::pollfd {
            fd: self.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: `pfd` is a valid pollfd for the duration of the call and
        // the descriptor is owned by this endpoint.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err.into());
        }

        Ok(rc > 0 && pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
    }

    /// Set read timeout on socket endpoints. No-op for endpoint files.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            EndpointInner::File(_) => Ok(()),
            EndpointInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Flush pending output, then close the endpoint.
    pub fn close(mut self) -> Result<()> {
        let flushed = self.flush();
        if let EndpointInner::Unix(stream) = &self.inner {
            match stream.shutdown(std::net::Shutdown::Both) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotConnected => {}
                Err(err) => return Err(err.into()),
            }
        }
        tracing::debug!(endpoint = %self.name, "endpoint closed");
        flushed.map_err(Into::into)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            EndpointInner::File(_) => "functionfs",
            EndpointInner::Unix(_) => "unix",
        };
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("type", &kind)
            .finish()
    }
}
