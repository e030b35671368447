//! Support for newtypes over fixed-size byte arrays.
//!
//! The verification core is full of values that are "just N bytes with a
//! name": hardware measurements, certificate fingerprints, report data.
//! [`ByteArray`] gives those newtypes one shared surface for array/slice
//! conversions and hex formatting, and the `impl_*` macros stamp out the
//! boilerplate (including `FromStr`/`Display`/`Debug` as hex) so each
//! newtype stays a one-line declaration at its definition site.

use std::{
    array::TryFromSliceError,
    fmt::{self, Debug},
    hash::Hash,
};

// Re-exported for use by the macros below.
pub use qvl_hex as hex;
pub use ref_cast::RefCast;

/// Conversions shared by plain byte-array newtypes.
///
/// Implementors must be exactly a `[u8; N]` in memory (`RefCast` enforces
/// the transparent layout). Do not implement this for types whose contents
/// need validating; every conversion here is infallible except the
/// length-checked ones.
pub trait ByteArray<const N: usize>:
    Copy + Debug + Eq + Hash + RefCast<From = [u8; N]> + Sized
{
    /// The wrapped array length in bytes.
    const LEN: usize = N;

    // --- Required --- //

    fn from_array(array: [u8; N]) -> Self;
    fn as_array(&self) -> &[u8; N];

    // --- Provided: array / slice / vec --- //

    fn to_array(&self) -> [u8; N] {
        *self.as_array()
    }
    fn from_array_ref(array: &[u8; N]) -> &Self {
        Self::ref_cast(array)
    }
    fn as_slice(&self) -> &[u8] {
        self.as_array()
    }
    fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
    /// Copy from a slice, failing unless it is exactly `N` bytes long.
    fn try_from_slice(slice: &[u8]) -> Result<Self, TryFromSliceError> {
        slice.try_into().map(Self::from_array)
    }

    // --- Provided: hex --- //

    /// Parse from a hex string of exactly `2 * N` characters, either case.
    fn try_from_hexstr(s: &str) -> Result<Self, hex::DecodeError> {
        <[u8; N] as hex::FromHex>::from_hex(s).map(Self::from_array)
    }
    /// Write `self` as lowercase hex; the building block for the `Display`
    /// and `Debug` impls the macros below generate.
    fn fmt_hexstr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&hex::display(self.as_slice()), f)
    }
}

/// Implement [`ByteArray`] plus the standard array/slice conversions for a
/// single-field newtype around `[u8; N]`. The type must derive [`RefCast`]
/// and be `#[repr(transparent)]`.
#[macro_export]
macro_rules! impl_byte_array {
    ($type:ty, $n:expr) => {
        impl $crate::ByteArray<$n> for $type {
            fn from_array(array: [u8; $n]) -> Self {
                Self(array)
            }
            fn as_array(&self) -> &[u8; $n] {
                &self.0
            }
        }

        impl From<[u8; $n]> for $type {
            fn from(array: [u8; $n]) -> Self {
                Self(array)
            }
        }

        impl From<$type> for [u8; $n] {
            fn from(value: $type) -> Self {
                value.0
            }
        }

        impl<'a> From<&'a [u8; $n]> for &'a $type {
            fn from(array: &'a [u8; $n]) -> Self {
                <$type as $crate::RefCast>::ref_cast(array)
            }
        }

        impl TryFrom<&[u8]> for $type {
            type Error = ::std::array::TryFromSliceError;
            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                <$type as $crate::ByteArray<$n>>::try_from_slice(slice)
            }
        }
    };
}

/// Implement [`std::str::FromStr`] parsing from a hex string.
#[macro_export]
macro_rules! impl_fromstr_fromhex {
    ($type:ty, $n:expr) => {
        impl ::std::str::FromStr for $type {
            type Err = $crate::hex::DecodeError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$type as $crate::ByteArray<$n>>::try_from_hexstr(s)
            }
        }
    };
}

/// Implement `Debug` and `Display` as the lowercase hex string.
#[macro_export]
macro_rules! impl_debug_display_as_hex {
    ($type:ty) => {
        impl ::std::fmt::Display for $type {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                $crate::ByteArray::fmt_hexstr(self, f)
            }
        }

        impl ::std::fmt::Debug for $type {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}(\"{self}\")", stringify!($type))
            }
        }
    };
}
