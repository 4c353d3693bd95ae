//! Binary persistence of leaf parameters.
//!
//! Format: a little-endian `u64` count `N` followed by `N` little-endian
//! IEEE-754 `f64` values. Identity is not persisted; a decoded variable
//! gets a fresh [`VarId`](crate::VarId).

use crate::error::SerializeError;
use crate::variable::Variable;
use std::io::{ErrorKind, Read, Write};

const HEADER_LEN: usize = 8;
const VALUE_LEN: usize = 8;
/// Values decoded per read from a stream.
const CHUNK_VALUES: usize = 1024;

/// Total encoded size for `length` values, header included.
fn encoded_len(length: u64) -> Result<usize, SerializeError> {
    usize::try_from(length)
        .ok()
        .and_then(|n| n.checked_mul(VALUE_LEN))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or(SerializeError::LengthOverflow { length })
}

fn decode_values(bytes: &[u8], out: &mut Vec<f64>) {
    out.extend(bytes.chunks_exact(VALUE_LEN).map(|chunk| {
        let mut raw = [0u8; VALUE_LEN];
        raw.copy_from_slice(chunk);
        f64::from_le_bytes(raw)
    }));
}

/// Read until `buf` is full or the stream ends; returns the bytes read.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, SerializeError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

impl Variable {
    /// Encode the current values.
    ///
    /// # Example
    ///
    /// ```
    /// use autofunc::Variable;
    ///
    /// let x = Variable::new(vec![1.5, -2.0]);
    /// let bytes = x.to_bytes();
    /// assert_eq!(bytes.len(), 8 + 2 * 8);
    ///
    /// let y = Variable::from_bytes(&bytes).unwrap();
    /// assert_eq!(y.vector(), x.vector());
    /// assert_ne!(y.id(), x.id());
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + VALUE_LEN * self.len());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for v in self.vector() {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Write the encoding to `writer`.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), SerializeError> {
        writer.write_all(&(self.len() as u64).to_le_bytes())?;
        for chunk in self.vector().chunks(CHUNK_VALUES) {
            let mut buf = Vec::with_capacity(chunk.len() * VALUE_LEN);
            for v in chunk {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            writer.write_all(&buf)?;
        }
        Ok(())
    }

    /// Decode a variable from exactly the bytes of one encoding.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::Truncated`] if `bytes` ends early,
    /// [`SerializeError::TrailingBytes`] if it continues past the encoding,
    /// and [`SerializeError::LengthOverflow`] if the count is unrepresentable.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializeError> {
        let Some((header, body)) = bytes.split_first_chunk::<HEADER_LEN>() else {
            return Err(SerializeError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        };
        let length = u64::from_le_bytes(*header);
        let expected = encoded_len(length)?;
        if bytes.len() < expected {
            return Err(SerializeError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }
        if bytes.len() > expected {
            return Err(SerializeError::TrailingBytes {
                extra: bytes.len() - expected,
            });
        }
        let mut values = Vec::with_capacity(body.len() / VALUE_LEN);
        decode_values(body, &mut values);
        Ok(Self::new(values))
    }

    /// Read one encoding from `reader`.
    ///
    /// Bytes after the encoding are left unread.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::Truncated`] if the stream ends early and
    /// [`SerializeError::Io`] if reading fails.
    pub fn read_from(reader: &mut impl Read) -> Result<Self, SerializeError> {
        let mut header = [0u8; HEADER_LEN];
        let got = read_up_to(reader, &mut header)?;
        if got < HEADER_LEN {
            return Err(SerializeError::Truncated {
                expected: HEADER_LEN,
                actual: got,
            });
        }
        let length = u64::from_le_bytes(header);
        let expected = encoded_len(length)?;

        // Grow with the data actually received rather than trusting the
        // header for the allocation size.
        let mut values = Vec::new();
        let mut remaining = expected - HEADER_LEN;
        let mut buf = vec![0u8; CHUNK_VALUES.min(remaining / VALUE_LEN) * VALUE_LEN];
        while remaining > 0 {
            let want = remaining.min(buf.len());
            let got = read_up_to(reader, &mut buf[..want])?;
            decode_values(&buf[..got - got % VALUE_LEN], &mut values);
            remaining -= got;
            if got < want {
                return Err(SerializeError::Truncated {
                    expected,
                    actual: expected - remaining,
                });
            }
        }
        Ok(Self::new(values))
    }
}
