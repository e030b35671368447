//! Utilities for encoding, decoding, and displaying hex/base16 data.
//!
//! Decoding accepts both cases; encoding is lowercase by default, with
//! uppercase variants for values that are conventionally written uppercase
//! (e.g. certificate serial numbers). The nibble-level encode/decode is
//! branchless, so timing doesn't depend on the data.

use std::{
    borrow::Cow,
    fmt::{self, Write},
};

/// Errors which can be produced while decoding a hex string.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    BadOutputLength,
    InvalidCharacter,
    OddInputLength,
}

impl std::error::Error for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BadOutputLength =>
                "output buffer length != half input length",
            Self::InvalidCharacter => "input contains non-hex character",
            Self::OddInputLength => "input string length must be even",
        };
        write!(f, "hex decode error: {s}")
    }
}

// --- Public functions --- //

/// Convert a byte slice to an owned lowercase hex string. If you simply need
/// to display a byte slice as hex, use [`display`] instead, which avoids the
/// allocation.
pub fn encode(bytes: &[u8]) -> String {
    encode_inner(bytes, Case::Lower)
}

/// Convert a byte slice to an owned UPPERCASE hex string, the conventional
/// form for certificate serial numbers.
pub fn encode_upper(bytes: &[u8]) -> String {
    encode_inner(bytes, Case::Upper)
}

/// Try to decode a hex string (either case) to owned bytes (`Vec<u8>`).
pub fn decode(hex: &str) -> Result<Vec<u8>, DecodeError> {
    let hex = hex.as_bytes();
    if hex.len() % 2 != 0 {
        return Err(DecodeError::OddInputLength);
    }
    let mut out = vec![0u8; hex.len() / 2];
    decode_to_slice_inner(hex, &mut out).map(|()| out)
}

/// A `const fn` to decode a hex string to a fixed-length array at compile
/// time. Panics if the input was not a valid hex string.
///
/// To decode to a fixed-length array without panicking on invalid inputs,
/// use the [`FromHex`] trait instead, e.g. `<[u8; 32]>::from_hex(&s)`.
pub const fn decode_const<const N: usize>(hex: &[u8]) -> [u8; N] {
    if hex.len() != N * 2 {
        panic!("hex input is the wrong length");
    }

    let mut bytes = [0u8; N];
    let mut idx = 0;
    let mut err = 0;

    while idx < N {
        let b_hi = decode_nibble(hex[2 * idx]);
        let b_lo = decode_nibble(hex[(2 * idx) + 1]);
        let byte = (b_hi << 4) | b_lo;
        err |= byte >> 8;
        bytes[idx] = byte as u8;
        idx += 1;
    }

    match err {
        0 => bytes,
        _ => panic!("invalid hex char"),
    }
}

/// Decode a hex string into an output buffer of exactly half the length.
pub fn decode_to_slice(hex: &str, out: &mut [u8]) -> Result<(), DecodeError> {
    let hex = hex.as_bytes();
    if hex.len() % 2 != 0 {
        return Err(DecodeError::OddInputLength);
    }
    decode_to_slice_inner(hex, out)
}

/// Get a [`HexDisplay`] which provides lowercase `Debug` and `Display` impls
/// for the given byte slice, without allocating.
///
/// ```
/// let bytes = [69u8; 32];
/// println!("bytes as hex: {}", qvl_hex::display(&bytes));
/// ```
#[inline]
pub fn display(bytes: &[u8]) -> HexDisplay<'_> {
    HexDisplay(bytes, Case::Lower)
}

/// Like [`display`], but UPPERCASE.
#[inline]
pub fn display_upper(bytes: &[u8]) -> HexDisplay<'_> {
    HexDisplay(bytes, Case::Upper)
}

// --- FromHex trait --- //

/// A trait to deserialize something from a hex-encoded string slice.
///
/// ```
/// # use std::borrow::Cow;
/// use qvl_hex::FromHex;
/// let s = "e7f51d925349a26f742e6eef3670f489aaf14fbbb5b5c3f209892f2f1baae1c9";
///
/// <Vec<u8>>::from_hex(s).unwrap();
/// <Cow<'_, [u8]>>::from_hex(s).unwrap();
/// <[u8; 32]>::from_hex(s).unwrap();
/// ```
pub trait FromHex: Sized {
    fn from_hex(s: &str) -> Result<Self, DecodeError>;
}

impl FromHex for Vec<u8> {
    fn from_hex(s: &str) -> Result<Self, DecodeError> {
        decode(s)
    }
}

impl FromHex for Cow<'_, [u8]> {
    fn from_hex(s: &str) -> Result<Self, DecodeError> {
        decode(s).map(Cow::Owned)
    }
}

impl<const N: usize> FromHex for [u8; N] {
    fn from_hex(s: &str) -> Result<Self, DecodeError> {
        let mut out = [0u8; N];
        decode_to_slice(s, out.as_mut_slice())?;
        Ok(out)
    }
}

// --- HexDisplay implementation --- //

/// Provides `Debug` and `Display` impls for a byte slice.
/// Useful for displaying a hex value without allocating via [`encode`].
pub struct HexDisplay<'a>(&'a [u8], Case);

impl fmt::Display for HexDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            f.write_char(encode_nibble(byte >> 4, self.1) as char)?;
            f.write_char(encode_nibble(byte & 0x0f, self.1) as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexDisplay<'_> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

// --- Internal helpers --- //

#[derive(Copy, Clone)]
enum Case {
    Lower,
    Upper,
}

fn encode_inner(bytes: &[u8], case: Case) -> String {
    let mut out = vec![0u8; bytes.len() * 2];

    for (src, dst) in bytes.iter().zip(out.chunks_exact_mut(2)) {
        dst[0] = encode_nibble(src >> 4, case);
        dst[1] = encode_nibble(src & 0x0f, case);
    }

    // SAFETY: hex characters ([0-9a-fA-F]*) are always valid UTF-8.
    unsafe { String::from_utf8_unchecked(out) }
}

fn decode_to_slice_inner(hex: &[u8], out: &mut [u8]) -> Result<(), DecodeError> {
    if hex.len() != out.len() * 2 {
        return Err(DecodeError::BadOutputLength);
    }

    let mut err = 0;
    for (pair, out_i) in hex.chunks_exact(2).zip(out) {
        let byte = (decode_nibble(pair[0]) << 4) | decode_nibble(pair[1]);
        err |= byte >> 8;
        *out_i = byte as u8;
    }

    match err {
        0 => Ok(()),
        _ => Err(DecodeError::InvalidCharacter),
    }
}

/// Encode a single nibble to hex without branching on the value.
#[inline(always)]
#[allow(non_upper_case_globals)]
const fn encode_nibble(nib: u8, case: Case) -> u8 {
    // nib ∈ [0, 15]
    //
    //                     nib >= 10
    //                         |
    //                         v
    // [         ] -- gap -- [         ]
    // 0 1 2 ... 9           a b ... e f

    const b_0: i16 = b'0' as i16;
    const b_9: i16 = b'9' as i16;

    let alpha = match case {
        Case::Lower => b'a' as i16,
        Case::Upper => b'A' as i16,
    };

    let nib = nib as i16;
    let base = nib + b_0;
    // equiv: let gap = if nib >= 10 { alpha - b'9' - 1 } else { 0 };
    let gap = ((b_9 - b_0 - nib) >> 8) & (alpha - b_9 - 1);
    (base + gap) as u8
}

/// Decode a single hex nibble of either case. Returns > 0xff on invalid
/// input so errors accumulate without branching.
#[inline(always)]
const fn decode_nibble(src: u8) -> u16 {
    let byte = src as i16;
    let mut ret: i16 = -1;

    // 0-9  0x30-0x39
    // if (byte > 0x2f && byte < 0x3a) ret += byte - 0x30 + 1; // -47
    ret += (((0x2fi16 - byte) & (byte - 0x3a)) >> 8) & (byte - 47);
    // A-F  0x41-0x46
    // if (byte > 0x40 && byte < 0x47) ret += byte - 0x41 + 10 + 1; // -54
    ret += (((0x40i16 - byte) & (byte - 0x47)) >> 8) & (byte - 54);
    // a-f  0x61-0x66
    // if (byte > 0x60 && byte < 0x67) ret += byte - 0x61 + 10 + 1; // -86
    ret += (((0x60i16 - byte) & (byte - 0x67)) >> 8) & (byte - 86);

    ret as u16
}

#[cfg(test)]
mod test {
    use proptest::{
        arbitrary::any, char, collection::vec, prop_assert_eq, proptest,
        strategy::Strategy,
    };

    use super::*;

    #[inline]
    fn is_even(x: usize) -> bool {
        x & 1 == 0
    }

    #[test]
    fn test_encode() {
        assert_eq!("", encode(&[]));
        assert_eq!(
            "01348900abff",
            encode(&[0x01, 0x34, 0x89, 0x00, 0xab, 0xff])
        );
        assert_eq!(
            "01348900ABFF",
            encode_upper(&[0x01, 0x34, 0x89, 0x00, 0xab, 0xff])
        );
    }

    #[test]
    fn test_decode_const() {
        const FOO: [u8; 6] = decode_const(b"01348900abff");
        assert_eq!(&FOO, &[0x01, 0x34, 0x89, 0x00, 0xab, 0xff]);
        const BAR: [u8; 4] = decode_const(b"DEADBEEF");
        assert_eq!(&BAR, &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_decode_mixed_case() {
        assert_eq!(decode("aAbBcC").unwrap(), vec![0xaa, 0xbb, 0xcc]);
        assert_eq!(decode("zz"), Err(DecodeError::InvalidCharacter));
        assert_eq!(decode("abc"), Err(DecodeError::OddInputLength));
    }

    #[test]
    fn test_roundtrip_b2s2b() {
        let bytes = &[0x01, 0x34, 0x89, 0x00, 0xab, 0xff];
        assert_eq!(bytes.as_slice(), decode(&encode(bytes)).unwrap());
        assert_eq!(bytes.as_slice(), decode(&encode_upper(bytes)).unwrap());

        proptest!(|(bytes in vec(any::<u8>(), 0..10))| {
            assert_eq!(bytes.as_slice(), decode(&encode(&bytes)).unwrap());
        })
    }

    #[test]
    fn test_roundtrip_s2b2s() {
        let hex = "01348900abff";
        assert_eq!(hex, encode(&decode(hex).unwrap()));

        let hex_char = char::ranges(
            ['0'..='9', 'a'..='f', 'A'..='F'].as_slice().into(),
        );
        let hex_chars = vec(hex_char, 0..10);
        let hex_strs =
            hex_chars.prop_filter_map("no odd length hex strings", |chars| {
                if is_even(chars.len()) {
                    Some(String::from_iter(chars))
                } else {
                    None
                }
            });

        proptest!(|(hex in hex_strs)| {
            assert_eq!(hex.to_ascii_lowercase(), encode(&decode(&hex).unwrap()));
            assert_eq!(hex.to_ascii_uppercase(), encode_upper(&decode(&hex).unwrap()));
        })
    }

    #[test]
    fn test_encode_display_equiv() {
        proptest!(|(bytes: Vec<u8>)| {
            prop_assert_eq!(encode(&bytes), display(&bytes).to_string());
            prop_assert_eq!(
                encode_upper(&bytes),
                display_upper(&bytes).to_string()
            );
        });
    }
}
