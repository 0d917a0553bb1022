// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon-side transports.
//!
//! A [`DaemonLink`] carries fully framed messages to the DLT daemon. Two
//! real transports exist: the daemon's named FIFO and a unix stream socket.
//! Both map backpressure to [`DltError::PipeFull`] and broken peers to
//! [`DltError::PipeError`], so the routing layer can apply its
//! drop-and-count policy without knowing the transport.
//!
//! Writes are synchronous; with `force_blocking` the FIFO is opened without
//! `O_NONBLOCK` and a full pipe stalls the caller instead of dropping.

use crate::error::{DltError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Framed write channel to the daemon.
pub trait DaemonLink: Send {
    /// Write one complete frame (standard header onward).
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Human-readable endpoint for diagnostics.
    fn describe(&self) -> String;
}

fn map_write_error(e: io::Error) -> DltError {
    match e.kind() {
        io::ErrorKind::WouldBlock => DltError::PipeFull,
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => DltError::PipeError,
        _ => DltError::Io(e),
    }
}

/// The daemon's named pipe.
pub struct FifoLink {
    file: File,
    path: PathBuf,
}

impl FifoLink {
    /// Open the daemon FIFO for writing. Non-blocking unless `blocking` is
    /// set (`DLT_FORCE_BLOCKING`); a non-blocking open fails immediately
    /// when no daemon is reading, which the caller treats as "daemon not
    /// up yet" and falls back to ring buffering.
    pub fn open(path: &Path, blocking: bool) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true);
        if !blocking {
            options.custom_flags(libc::O_NONBLOCK);
        }
        let file = options.open(path).map_err(DltError::Io)?;
        log::debug!(
            "[FIFO] opened {} ({})",
            path.display(),
            if blocking { "blocking" } else { "non-blocking" }
        );
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl DaemonLink for FifoLink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        // POSIX guarantees atomicity for pipe writes up to PIPE_BUF, which
        // covers the 1390-byte message bound; a frame is one write.
        self.file.write_all(frame).map_err(map_write_error)
    }

    fn describe(&self) -> String {
        format!("fifo:{}", self.path.display())
    }
}

/// Unix stream socket to the daemon.
pub struct SocketLink {
    stream: UnixStream,
    path: PathBuf,
}

impl SocketLink {
    /// Connect to the daemon's socket and size its send buffer for a burst
    /// of maximum-size messages.
    pub fn connect(path: &Path, send_buffer: Option<usize>) -> Result<Self> {
        let stream = UnixStream::connect(path).map_err(DltError::Io)?;
        if let Some(size) = send_buffer {
            let sock = socket2::SockRef::from(&stream);
            if let Err(e) = sock.set_send_buffer_size(size) {
                log::warn!("[SOCK] could not set send buffer to {size}: {e}");
            }
        }
        log::debug!("[SOCK] connected to {}", path.display());
        Ok(Self {
            stream,
            path: path.to_path_buf(),
        })
    }
}

impl DaemonLink for SocketLink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.stream.write_all(frame).map_err(map_write_error)
    }

    fn describe(&self) -> String {
        format!("socket:{}", self.path.display())
    }
}

/// In-memory link capturing frames; used by tests and local capture. Clones
/// share the captured frames, so a handle kept outside the routing layer
/// still sees what a boxed clone wrote.
#[derive(Clone, Default)]
pub struct MemoryLink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: Arc<Mutex<Option<FailMode>>>,
}

/// Failure injection for [`MemoryLink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailMode {
    PipeFull,
    PipeError,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the frames written so far, in order.
    pub fn frames(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.frames)
    }

    /// Make the next write fail once with the given flow-control status.
    pub fn fail_next(&self, mode: FailMode) {
        *self.fail.lock() = Some(mode);
    }
}

impl DaemonLink for MemoryLink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        match self.fail.lock().take() {
            Some(FailMode::PipeFull) => Err(DltError::PipeFull),
            Some(FailMode::PipeError) => Err(DltError::PipeError),
            None => {
                self.frames.lock().push(frame.to_vec());
                Ok(())
            }
        }
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixListener;

    #[test]
    fn error_mapping_covers_backpressure_and_disconnect() {
        let full = io::Error::from(io::ErrorKind::WouldBlock);
        assert!(matches!(map_write_error(full), DltError::PipeFull));
        let broken = io::Error::from(io::ErrorKind::BrokenPipe);
        assert!(matches!(map_write_error(broken), DltError::PipeError));
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(matches!(map_write_error(reset), DltError::PipeError));
        let other = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(map_write_error(other), DltError::Io(_)));
    }

    #[test]
    fn memory_link_captures_and_injects_failures() {
        let mut link = MemoryLink::new();
        link.write_frame(b"frame-1").unwrap();
        link.fail_next(FailMode::PipeFull);
        assert!(matches!(link.write_frame(b"frame-2"), Err(DltError::PipeFull)));
        // failure injection is one-shot
        link.write_frame(b"frame-3").unwrap();
        let frames = link.frames();
        let frames = frames.lock();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], b"frame-1");
        assert_eq!(frames[1], b"frame-3");
    }

    #[test]
    fn socket_link_delivers_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let mut link = SocketLink::connect(&path, Some(64 * 1024)).unwrap();
        assert!(link.describe().starts_with("socket:"));
        link.write_frame(b"ping").unwrap();

        let (mut peer, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn fifo_open_fails_cleanly_without_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlt-fifo");
        let c_path = std::ffi::CString::new(path.to_str().unwrap()).unwrap();
        // SAFETY: c_path is a valid NUL-terminated path.
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        assert_eq!(rc, 0);

        // Non-blocking open of a FIFO with no reader fails with ENXIO; the
        // user layer treats that as "daemon not up" and buffers.
        assert!(matches!(
            FifoLink::open(&path, false),
            Err(DltError::Io(_))
        ));
    }
}
