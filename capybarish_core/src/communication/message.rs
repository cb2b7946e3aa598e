//! Wire contract for messages crossing a UDP boundary.
//!
//! Message types are fixed-size binary records supplied by the schema code
//! generator. The core only relies on [`WireMessage`]: a declared wire size used
//! for minimum-length validation plus `encode`/`decode`. One datagram carries
//! exactly one record.

use crate::error::{CapyError, CapyResult};

/// Fixed-size binary record that can be sent as a single datagram
pub trait WireMessage: Sized {
    /// Size of the encoded record in bytes
    const WIRE_SIZE: usize;

    /// Encode into exactly `WIRE_SIZE` bytes
    fn encode(&self) -> Vec<u8>;

    /// Decode from the first `WIRE_SIZE` bytes of `bytes`
    ///
    /// Shorter buffers are rejected; trailing bytes are ignored.
    fn decode(bytes: &[u8]) -> CapyResult<Self>;
}

/// Everything a topic payload needs: a wire form plus cheap fan-out copies
pub trait Message: WireMessage + Clone + Send + 'static {}

impl<T> Message for T where T: WireMessage + Clone + Send + 'static {}

/// Reject buffers that cannot hold a `T` record
#[inline]
pub fn check_wire_size<T: WireMessage>(bytes: &[u8]) -> CapyResult<()> {
    if bytes.len() < T::WIRE_SIZE {
        return Err(CapyError::serialization(format!(
            "{} needs {} bytes, got {}",
            std::any::type_name::<T>(),
            T::WIRE_SIZE,
            bytes.len()
        )));
    }
    Ok(())
}

// Numeric primitives travel little-endian
macro_rules! impl_wire_message_for_numeric {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WireMessage for $ty {
                const WIRE_SIZE: usize = std::mem::size_of::<$ty>();

                fn encode(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }

                fn decode(bytes: &[u8]) -> CapyResult<Self> {
                    check_wire_size::<Self>(bytes)?;
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::WIRE_SIZE]);
                    Ok(<$ty>::from_le_bytes(raw))
                }
            }
        )*
    };
}

impl_wire_message_for_numeric!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl WireMessage for bool {
    const WIRE_SIZE: usize = 1;

    fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }

    fn decode(bytes: &[u8]) -> CapyResult<Self> {
        check_wire_size::<Self>(bytes)?;
        Ok(bytes[0] != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f64_layout_is_little_endian() {
        let bytes = 1.5f64.encode();
        assert_eq!(bytes, 1.5f64.to_le_bytes().to_vec());
        assert_eq!(f64::decode(&bytes).unwrap(), 1.5);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let err = u32::decode(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, CapyError::Serialization(_)));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut bytes = 7u16.encode();
        bytes.extend_from_slice(&[0xff, 0xff]);
        assert_eq!(u16::decode(&bytes).unwrap(), 7);
    }

    #[test]
    fn test_bool() {
        assert!(bool::decode(&true.encode()).unwrap());
        assert!(!bool::decode(&[0]).unwrap());
    }
}
