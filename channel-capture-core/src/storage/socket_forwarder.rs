use std::io::Write;
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use num_complex::Complex32;

use crate::models::config::{ForwarderConfig, Transport};
use crate::models::error::CaptureError;
use crate::models::events::BackendKind;
use crate::processing::sample_format;
use crate::traits::data_writer::DataWriter;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

enum Socket {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// Forwards captured samples to a remote endpoint in fixed-length frames.
///
/// Bytes are queued until a whole frame of `frame_len` bytes is available;
/// over UDP each frame is one datagram. The tail that does not fill a frame
/// is sent as a short frame on close.
///
/// A failed send is final: frames already on the wire leave the queue, the
/// rest is discarded and nothing is sent again, not even on close.
pub struct SocketForwarder {
    config: ForwarderConfig,
    write_timeout: Option<Duration>,
    socket: Option<Socket>,
    pending: Vec<u8>,
    encode_buffer: Vec<u8>,
    bytes_sent: u64,
    failed: bool,
    last_error: String,
}

impl SocketForwarder {
    pub fn new(config: ForwarderConfig, write_timeout: Option<Duration>) -> Self {
        Self {
            config,
            write_timeout,
            socket: None,
            pending: Vec::new(),
            encode_buffer: Vec::new(),
            bytes_sent: 0,
            failed: false,
            last_error: String::new(),
        }
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    /// Bytes put on the wire so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Bytes waiting for a complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, CaptureError> {
        let addrs: Vec<SocketAddr> = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .map_err(|e| CaptureError::Network(format!("cannot resolve {}: {}", self.config.endpoint(), e)))?
            .collect();
        if addrs.is_empty() {
            return Err(CaptureError::Network(format!(
                "{} resolved to no address",
                self.config.endpoint()
            )));
        }
        Ok(addrs)
    }

    fn connect(&self) -> Result<Socket, CaptureError> {
        let addrs = self.resolve()?;
        let mut last = String::new();

        for addr in addrs {
            let attempt = match self.config.transport {
                Transport::Tcp => TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).and_then(|s| {
                    s.set_write_timeout(self.write_timeout)?;
                    s.set_nodelay(true).ok();
                    Ok(Socket::Tcp(s))
                }),
                Transport::Udp => {
                    let local = if addr.is_ipv4() {
                        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
                    } else {
                        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
                    };
                    UdpSocket::bind(local).and_then(|s| {
                        s.connect(addr)?;
                        s.set_write_timeout(self.write_timeout)?;
                        Ok(Socket::Udp(s))
                    })
                }
            };

            match attempt {
                Ok(socket) => return Ok(socket),
                Err(e) => last = format!("cannot connect to {}: {}", addr, e),
            }
        }

        Err(CaptureError::Network(last))
    }

    fn send_frame(socket: &mut Socket, frame: &[u8]) -> std::io::Result<()> {
        match socket {
            Socket::Tcp(stream) => stream.write_all(frame),
            Socket::Udp(udp) => udp.send(frame).map(|_| ()),
        }
    }

    /// Send every complete frame in the queue, and the short tail too if
    /// `include_partial`. Sent frames leave the queue even when a later
    /// frame fails.
    fn flush_frames(&mut self, include_partial: bool) -> Result<(), CaptureError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(CaptureError::Network("socket is not connected".into()));
        };

        let frame_len = self.config.frame_len;
        let mut offset = 0;
        let mut result = Ok(());
        while offset < self.pending.len() {
            let len = (self.pending.len() - offset).min(frame_len);
            if len < frame_len && !include_partial {
                break;
            }
            if let Err(e) = Self::send_frame(socket, &self.pending[offset..offset + len]) {
                result = Err(CaptureError::Network(format!("send() failed: {}", e)));
                break;
            }
            offset += len;
            self.bytes_sent += len as u64;
        }

        self.pending.drain(..offset);
        result
    }

    /// Give up on the sink. Whatever is still queued, including a frame
    /// that may have gone out partially, is dropped.
    fn fail(&mut self, error: CaptureError) {
        log::error!("forwarder {}: {}", self.config.endpoint(), error);
        self.failed = true;
        self.pending.clear();
        self.last_error = error.to_string();
    }

    fn enqueue(&mut self, data: &[u8]) -> isize {
        if self.failed {
            return -1;
        }
        if self.socket.is_none() {
            self.last_error = "write() failed: socket is not connected".into();
            return 0;
        }

        self.pending.extend_from_slice(data);
        match self.flush_frames(false) {
            Ok(()) => data.len() as isize,
            Err(e) => {
                self.fail(e);
                -1
            }
        }
    }
}

impl DataWriter for SocketForwarder {
    fn kind(&self) -> BackendKind {
        BackendKind::Network
    }

    fn prepare(&mut self) -> bool {
        if self.socket.is_some() {
            return true;
        }

        match self.connect() {
            Ok(socket) => {
                log::info!(
                    "forwarding to {} over {:?}, {}-byte frames",
                    self.config.endpoint(),
                    self.config.transport,
                    self.config.frame_len
                );
                self.socket = Some(socket);
                true
            }
            Err(e) => {
                self.last_error = e.to_string();
                false
            }
        }
    }

    fn can_write(&self) -> bool {
        self.socket.is_some() && !self.failed
    }

    fn write(&mut self, samples: &[Complex32]) -> isize {
        let mut buffer = std::mem::take(&mut self.encode_buffer);
        buffer.clear();
        sample_format::encode_samples(samples, &mut buffer);
        let result = self.enqueue(&buffer);
        self.encode_buffer = buffer;
        result
    }

    fn write_blob(&mut self, data: &[u8]) -> isize {
        self.enqueue(data)
    }

    /// Flush the tail and shut the connection down. A forwarder that already
    /// failed only releases the socket and returns `false`.
    fn close(&mut self) -> bool {
        if self.socket.is_none() {
            return !self.failed;
        }

        if !self.failed {
            if let Err(e) = self.flush_frames(true) {
                self.fail(e);
            }
        }

        if let Some(Socket::Tcp(stream)) = self.socket.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        !self.failed
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }

    fn signals_ready(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        self.config.endpoint()
    }
}

impl Drop for SocketForwarder {
    fn drop(&mut self) {
        self.close();
    }
}
