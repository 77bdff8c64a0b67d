// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use num_traits::{FromBytes, ToBytes};

/// The order in which the bytes of a multi-byte value are laid out in memory.
///
/// Every buffer declares one order, used by its direct accessor family (`get_u32()` and
/// friends). The foreign family (`get_u32_foreign()` and friends) uses the opposite order.
/// Buffers default to [`ByteOrder::NATIVE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Most significant byte first.
    BigEndian,

    /// Least significant byte first.
    LittleEndian,
}

impl ByteOrder {
    /// The byte order of the host CPU.
    pub const NATIVE: Self = if cfg!(target_endian = "little") {
        Self::LittleEndian
    } else {
        Self::BigEndian
    };

    /// The opposite of the byte order of the host CPU.
    pub const FOREIGN: Self = Self::NATIVE.swapped();

    /// Returns the opposite byte order.
    #[must_use]
    pub const fn swapped(self) -> Self {
        match self {
            Self::BigEndian => Self::LittleEndian,
            Self::LittleEndian => Self::BigEndian,
        }
    }

    /// Whether this is the byte order of the host CPU.
    #[must_use]
    pub const fn is_native(self) -> bool {
        matches!(
            (self, Self::NATIVE),
            (Self::BigEndian, Self::BigEndian) | (Self::LittleEndian, Self::LittleEndian)
        )
    }

    pub(crate) fn decode<T: FromBytes>(self, bytes: &T::Bytes) -> T {
        match self {
            Self::BigEndian => T::from_be_bytes(bytes),
            Self::LittleEndian => T::from_le_bytes(bytes),
        }
    }

    pub(crate) fn encode<T: ToBytes>(self, value: &T) -> T::Bytes {
        match self {
            Self::BigEndian => value.to_be_bytes(),
            Self::LittleEndian => value.to_le_bytes(),
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::NATIVE
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_matches_host() {
        assert_eq!(ByteOrder::NATIVE, ByteOrder::default());
        assert!(ByteOrder::NATIVE.is_native());
        assert!(!ByteOrder::FOREIGN.is_native());

        let host_bytes = 1_u16.to_ne_bytes();
        let decoded: u16 = ByteOrder::NATIVE.decode(&host_bytes);
        assert_eq!(decoded, 1);
    }

    #[test]
    fn swapped_is_involution() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            assert_ne!(order, order.swapped());
            assert_eq!(order, order.swapped().swapped());
        }
    }

    #[test]
    fn encode_decode_disagree_across_orders() {
        let value = 0x0102_0304_u32;

        assert_eq!(ByteOrder::BigEndian.encode(&value), [1, 2, 3, 4]);
        assert_eq!(ByteOrder::LittleEndian.encode(&value), [4, 3, 2, 1]);

        let decoded: u32 = ByteOrder::LittleEndian.decode(&[1, 2, 3, 4]);
        assert_eq!(decoded, value.swap_bytes());
    }
}
