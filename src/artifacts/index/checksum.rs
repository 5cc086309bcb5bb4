//! SHA-1 checksummed reader/writer for the index file
//!
//! Wraps the locked index file handle and hashes every byte that passes
//! through, so the trailing 20-byte digest can be verified on read and
//! appended on write.

use crate::artifacts::index::CHECKSUM_SIZE;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

pub struct Checksum<F> {
    inner: F,
    hasher: Sha1,
}

impl<F> Checksum<F> {
    pub fn new(inner: F) -> Self {
        Checksum {
            inner,
            hasher: Sha1::new(),
        }
    }
}

impl<F: Read> Checksum<F> {
    /// Read exactly `size` bytes, feeding them into the running digest.
    pub fn read(&mut self, size: usize) -> anyhow::Result<Bytes> {
        let mut buffer = vec![0u8; size];
        self.inner.read_exact(&mut buffer)?;
        self.hasher.update(&buffer);

        Ok(Bytes::from(buffer))
    }

    /// Read the trailing digest and compare it to everything read so far.
    pub fn verify(mut self) -> anyhow::Result<()> {
        let mut stored = [0u8; CHECKSUM_SIZE];
        self.inner.read_exact(&mut stored)?;

        let computed = self.hasher.finalize();
        if computed.as_slice() != stored {
            anyhow::bail!("index file checksum mismatch");
        }

        Ok(())
    }
}

impl<F: Write> Checksum<F> {
    /// Write bytes, feeding them into the running digest.
    pub fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.inner.write_all(data)?;
        self.hasher.update(data);

        Ok(())
    }

    /// Append the digest of everything written so far.
    pub fn write_checksum(mut self) -> anyhow::Result<()> {
        let digest = self.hasher.finalize();
        self.inner.write_all(&digest)?;

        Ok(())
    }
}
