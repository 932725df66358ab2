//! Low-level pipe primitives for worker communication.
//!
//! Provides an EINTR-safe file descriptor wrapper and the fixed-width binary
//! encoding of a result pair used by the pipe transport.

use crate::array::MinMax;
use crate::error::{EngineError, Result};
use nix::fcntl::OFlag;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

/// Size of one encoded (min, max) pair on the wire.
pub const PAIR_LEN: usize = 2 * std::mem::size_of::<i32>();

/// A file descriptor wrapper that implements Read/Write with EINTR handling.
pub struct PipeFd {
    fd: OwnedFd,
}

impl PipeFd {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }
}

impl From<OwnedFd> for PipeFd {
    fn from(fd: OwnedFd) -> Self {
        Self::new(fd)
    }
}

impl AsFd for PipeFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for PipeFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Read for PipeFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

impl Write for PipeFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Create a unidirectional pipe, returning `(read_end, write_end)`.
///
/// Both ends are close-on-exec so sibling workers never inherit each other's
/// channels; the write end only survives into the one child that gets it
/// installed as stdout.
pub fn create_pipe() -> Result<(PipeFd, OwnedFd)> {
    let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| EngineError::Resource(format!("pipe2 failed: {}", e)))?;
    Ok((PipeFd::new(read), write))
}

/// Encode a pair as two little-endian `i32`s.
pub fn encode_pair(pair: MinMax) -> [u8; PAIR_LEN] {
    let mut buf = [0u8; PAIR_LEN];
    buf[..4].copy_from_slice(&pair.min.to_le_bytes());
    buf[4..].copy_from_slice(&pair.max.to_le_bytes());
    buf
}

/// Read one encoded pair.
///
/// Returns `Ok(None)` when the writer went away before a full pair arrived
/// (zero or partial bytes followed by EOF).
pub fn read_pair<R: Read>(reader: &mut R) -> io::Result<Option<MinMax>> {
    let mut buf = [0u8; PAIR_LEN];
    let mut filled = 0;
    while filled < PAIR_LEN {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled > 0 {
                    tracing::debug!(bytes = filled, "Short read on result pipe");
                }
                return Ok(None);
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    let min = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let max = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    Ok(Some(MinMax { min, max }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe_pair() -> (PipeFd, PipeFd) {
        let (read, write) = create_pipe().expect("Failed to create pipe");
        (read, PipeFd::new(write))
    }

    #[test]
    fn test_pair_over_pipe() {
        let (mut read, mut write) = pipe_pair();
        write
            .write_all(&encode_pair(MinMax::new(-17, 4096)))
            .unwrap();
        drop(write);

        assert_eq!(
            read_pair(&mut read).unwrap(),
            Some(MinMax::new(-17, 4096))
        );
    }

    #[test]
    fn test_empty_pipe_is_absent() {
        let (mut read, write) = pipe_pair();
        drop(write);
        assert_eq!(read_pair(&mut read).unwrap(), None);
    }

    #[test]
    fn test_short_write_is_absent() {
        let (mut read, mut write) = pipe_pair();
        // Only the min made it out before the writer died.
        write.write_all(&7i32.to_le_bytes()).unwrap();
        drop(write);
        assert_eq!(read_pair(&mut read).unwrap(), None);
    }

    #[test]
    fn test_extreme_values_survive_encoding() {
        let mut bytes: &[u8] = &encode_pair(MinMax::new(i32::MIN, i32::MAX));
        assert_eq!(
            read_pair(&mut bytes).unwrap(),
            Some(MinMax::new(i32::MIN, i32::MAX))
        );
    }

    #[test]
    fn test_pipe_ends_are_cloexec() {
        use nix::fcntl::{FcntlArg, FdFlag, fcntl};

        let (read, write) = create_pipe().unwrap();
        for fd in [read.as_fd(), write.as_fd()] {
            let flags = FdFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFD).unwrap());
            assert!(flags.contains(FdFlag::FD_CLOEXEC));
        }
    }
}
