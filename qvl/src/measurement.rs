//! Fixed-size measurement newtypes shared by the quote and report parsers.
//!
//! Downstream policy code compares these against expected values; the
//! newtypes give them hex `Display`/`FromStr` and honest `Debug` output
//! instead of raw arrays.

use ref_cast::RefCast;

/// A 32-byte measurement register: SGX `MRENCLAVE`/`MRSIGNER`.
#[derive(Copy, Clone, Eq, Hash, PartialEq, RefCast)]
#[repr(transparent)]
pub struct Measurement(pub [u8; 32]);

impl Measurement {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

qvl_byte_array::impl_byte_array!(Measurement, 32);
qvl_byte_array::impl_fromstr_fromhex!(Measurement, 32);
qvl_byte_array::impl_debug_display_as_hex!(Measurement);

/// A 48-byte (SHA-384-sized) measurement register: TDX `MRTD`, `MRSEAM`,
/// `RTMR0..3`, and the SEV-SNP launch measurement.
#[derive(Copy, Clone, Eq, Hash, PartialEq, RefCast)]
#[repr(transparent)]
pub struct Measurement48(pub [u8; 48]);

impl Measurement48 {
    pub const fn new(bytes: [u8; 48]) -> Self {
        Self(bytes)
    }
}

qvl_byte_array::impl_byte_array!(Measurement48, 48);
qvl_byte_array::impl_fromstr_fromhex!(Measurement48, 48);
qvl_byte_array::impl_debug_display_as_hex!(Measurement48);

/// The 64-byte user-chosen report data field, common to SGX/TDX quote
/// bodies and SEV-SNP reports. Callers typically commit the hash of an
/// ephemeral public key here.
#[derive(Copy, Clone, Eq, Hash, PartialEq, RefCast)]
#[repr(transparent)]
pub struct ReportData(pub [u8; 64]);

impl ReportData {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const ZERO: Self = Self([0u8; 64]);
}

qvl_byte_array::impl_byte_array!(ReportData, 64);
qvl_byte_array::impl_fromstr_fromhex!(ReportData, 64);
qvl_byte_array::impl_debug_display_as_hex!(ReportData);
