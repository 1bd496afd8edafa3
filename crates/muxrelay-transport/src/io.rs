use std::io::{ErrorKind, Read, Write};

use bytes::{BufMut, BytesMut};

use crate::error::{Result, TransportError};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Write every byte of `data`, looping over partial writes.
///
/// A zero-length write means the peer stopped accepting data and fails with
/// [`TransportError::ConnectionBroken`].
pub fn send_all<W: Write + ?Sized>(writer: &mut W, data: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < data.len() {
        match writer.write(&data[offset..]) {
            Ok(0) => return Err(TransportError::ConnectionBroken),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    loop {
        match writer.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

/// Read exactly `len` bytes, accumulating partial reads.
///
/// Never reads past `len`, so the stream position is exact afterwards. An
/// empty read before `len` bytes arrive fails with
/// [`TransportError::ConnectionBroken`].
pub fn recv_exact<R: Read + ?Sized>(reader: &mut R, len: usize) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(len);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    while buf.len() < len {
        let want = (len - buf.len()).min(READ_CHUNK_SIZE);
        match reader.read(&mut chunk[..want]) {
            Ok(0) => return Err(TransportError::ConnectionBroken),
            Ok(n) => buf.put_slice(&chunk[..n]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    Ok(buf)
}
