//! # POD (Plain Old Data) wire records
//!
//! Generated message types are `#[repr(C)]` structs with no padding, which makes
//! them safe to copy straight to and from datagram bytes with `bytemuck`. The
//! helpers here implement [`WireMessage`](super::WireMessage) for such records
//! without any hand-written field packing.
//!
//! ## Example
//!
//! ```rust
//! use bytemuck::{Pod, Zeroable};
//! use capybarish_core::pod_wire_message;
//!
//! #[repr(C)]
//! #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
//! pub struct MotorCommand {
//!     pub target: f32,
//!     pub target_vel: f32,
//!     pub kp: f32,
//!     pub kd: f32,
//! }
//!
//! pod_wire_message!(MotorCommand);
//! ```
//!
//! ## Trade-offs
//!
//! - No schema evolution: a struct change breaks compatibility with deployed peers
//! - Byte order is the host's; every supported target is little-endian, matching
//!   the firmware side
//! - Fixed-size only (no Vec, String, etc.)

use crate::error::{CapyError, CapyResult};
use bytemuck::Pod;
use std::mem;

/// Copy a POD record into an owned datagram buffer
#[inline]
pub fn encode_pod<T: Pod>(msg: &T) -> Vec<u8> {
    bytemuck::bytes_of(msg).to_vec()
}

/// Read a POD record from the front of `bytes`
///
/// The buffer does not need to be aligned; trailing bytes are ignored.
#[inline]
pub fn decode_pod<T: Pod>(bytes: &[u8]) -> CapyResult<T> {
    let size = mem::size_of::<T>();
    if bytes.len() < size {
        return Err(CapyError::serialization(format!(
            "{} needs {} bytes, got {}",
            std::any::type_name::<T>(),
            size,
            bytes.len()
        )));
    }
    bytemuck::try_pod_read_unaligned(&bytes[..size])
        .map_err(|e| CapyError::serialization(format!("POD decode failed: {:?}", e)))
}

/// Implement [`WireMessage`](crate::communication::WireMessage) for one or more
/// `bytemuck::Pod` record types.
#[macro_export]
macro_rules! pod_wire_message {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::communication::WireMessage for $ty {
                const WIRE_SIZE: usize = ::std::mem::size_of::<$ty>();

                fn encode(&self) -> ::std::vec::Vec<u8> {
                    $crate::communication::pod::encode_pod(self)
                }

                fn decode(bytes: &[u8]) -> $crate::error::CapyResult<Self> {
                    $crate::communication::pod::decode_pod(bytes)
                }
            }
        )+
    };
}
