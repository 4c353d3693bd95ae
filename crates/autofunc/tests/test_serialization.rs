//! Integration tests for variable persistence.

use autofunc::linalg::LinTran;
use autofunc::{SerializeError, Variable};
use std::io::{self, Read};

/// Reader that fails after yielding `ok` bytes.
struct FailingReader {
    data: Vec<u8>,
    ok: usize,
    pos: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.ok {
            return Err(io::Error::other("disk on fire"));
        }
        let n = buf.len().min(self.ok - self.pos).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[test]
fn test_parameters_survive_round_trip() {
    let lin = LinTran::new(Variable::new(vec![1.0, -2.0, 3.5, 0.0, 1e-300, -1e300]), 2, 3);
    let mut file = Vec::new();
    lin.data().write_to(&mut file).unwrap();

    let restored = Variable::read_from(&mut file.as_slice()).unwrap();
    let copy = LinTran::new(restored, 2, 3);
    assert_eq!(copy.data().vector(), lin.data().vector());
    assert_ne!(copy.data().id(), lin.data().id());
}

#[test]
fn test_special_values_are_bit_exact() {
    let x = Variable::new(vec![f64::INFINITY, -0.0, f64::NAN, f64::MIN_POSITIVE / 2.0]);
    let y = Variable::from_bytes(&x.to_bytes()).unwrap();
    for (a, b) in x.vector().iter().zip(y.vector()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn test_header_only_claims_more() {
    let mut bytes = 3u64.to_le_bytes().to_vec();
    bytes.extend_from_slice(&1.0f64.to_le_bytes());
    match Variable::from_bytes(&bytes) {
        Err(SerializeError::Truncated { expected, actual }) => {
            assert_eq!(expected, 32);
            assert_eq!(actual, 16);
        }
        other => panic!("expected Truncated, got {other:?}"),
    }
}

#[test]
fn test_overflowing_length() {
    let bytes = u64::MAX.to_le_bytes();
    assert!(matches!(
        Variable::from_bytes(&bytes),
        Err(SerializeError::LengthOverflow { length: u64::MAX })
    ));
}

#[test]
fn test_io_error_is_reported() {
    let data = Variable::new(vec![1.0, 2.0]).to_bytes();
    let mut reader = FailingReader { data, ok: 12, pos: 0 };
    let err = Variable::read_from(&mut reader).unwrap_err();
    assert!(matches!(err, SerializeError::Io(_)));
    assert!(err.to_string().contains("disk on fire"));
}
