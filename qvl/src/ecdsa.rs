//! ECDSA signature carrier formats.
//!
//! Quotes store signatures as fixed-width raw `r || s`; X.509 wants ASN.1
//! DER; AMD stores each SEV-SNP component little-endian, zero-padded to 72
//! bytes. The converters here move between those forms.

use num_bigint::BigUint;

use crate::error::{Error, Result};

/// Length of one raw P-256 signature component.
pub const P256_COMPONENT_LEN: usize = 32;
/// Length of one raw P-384 signature component.
pub const P384_COMPONENT_LEN: usize = 48;
/// Length of one little-endian zero-padded SEV-SNP signature component.
pub const SNP_COMPONENT_LEN: usize = 72;

/// Convert a fixed `r || s` ECDSA signature (64 bytes for P-256, 96 bytes
/// for P-384) to ASN.1 DER:
///
/// ```asn.1
/// Ecdsa-Sig-Value ::= SEQUENCE {
///     r INTEGER,
///     s INTEGER
/// }
/// ```
///
/// See [RFC 3279 2.2.3](https://datatracker.ietf.org/doc/html/rfc3279#section-2.2.3).
pub fn ecdsa_sig_to_der(sig: &[u8]) -> Result<Vec<u8>> {
    if sig.len() != 2 * P256_COMPONENT_LEN && sig.len() != 2 * P384_COMPONENT_LEN
    {
        return Err(Error::invalid(
            "ecdsa signature",
            0,
            "raw signature must be 64 (P-256) or 96 (P-384) bytes",
        ));
    }

    let (r_bytes, s_bytes) = sig.split_at(sig.len() / 2);
    let r = BigUint::from_bytes_be(r_bytes);
    let s = BigUint::from_bytes_be(s_bytes);

    Ok(yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            writer.next().write_biguint(&r);
            writer.next().write_biguint(&s);
        })
    }))
}

/// Decode one SEV-SNP signature component (little-endian, right-padded with
/// zeros to 72 bytes) into canonical big-endian form, left-padded to
/// `P384_COMPONENT_LEN`.
pub fn snp_component_to_be(component: &[u8; SNP_COMPONENT_LEN]) -> Result<[u8; P384_COMPONENT_LEN]> {
    let significant = component
        .iter()
        .rposition(|&b| b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    if significant > P384_COMPONENT_LEN {
        return Err(Error::invalid(
            "snp signature component",
            0,
            "component wider than the P-384 scalar field",
        ));
    }

    let mut out = [0u8; P384_COMPONENT_LEN];
    for (i, &b) in component[..significant].iter().enumerate() {
        out[P384_COMPONENT_LEN - 1 - i] = b;
    }
    Ok(out)
}

/// Encode a canonical big-endian P-384 signature component into AMD's
/// little-endian 72-byte layout. Inverse of [`snp_component_to_be`].
pub fn snp_component_to_le(component: &[u8; P384_COMPONENT_LEN]) -> [u8; SNP_COMPONENT_LEN] {
    let mut out = [0u8; SNP_COMPONENT_LEN];
    for (i, &b) in component.iter().rev().enumerate() {
        out[i] = b;
    }
    out
}

/// Assemble an uncompressed SEC1 point (`0x04 || X || Y`) from the raw
/// 64-byte `X || Y` form quotes use for P-256 attestation keys.
pub fn p256_uncompressed_point(xy: &[u8; 64]) -> [u8; 65] {
    let mut point = [0u8; 65];
    point[0] = 0x04;
    point[1..].copy_from_slice(xy);
    point
}

#[cfg(test)]
mod test {
    use proptest::{arbitrary::any, collection::vec, prop_assert_eq, proptest};

    use super::*;

    #[test]
    fn test_sig_to_der_shape() {
        // r and s with high bits set force a leading zero byte in DER
        let sig = [0xffu8; 64];
        let der = ecdsa_sig_to_der(&sig).unwrap();
        // SEQUENCE { INTEGER 00 ff..ff, INTEGER 00 ff..ff }
        assert_eq!(der[0], 0x30);
        assert_eq!(der[2], 0x02);
        assert_eq!(der[3], 33);
        assert_eq!(der[4], 0x00);

        assert!(ecdsa_sig_to_der(&[0u8; 63]).is_err());
        assert!(ecdsa_sig_to_der(&[0u8; 96]).is_ok());
    }

    #[test]
    fn test_sig_to_der_minimal_integers() {
        // DER integers must drop leading zeros: r = 1, s = 2
        let mut sig = [0u8; 64];
        sig[31] = 0x01;
        sig[63] = 0x02;
        let der = ecdsa_sig_to_der(&sig).unwrap();
        assert_eq!(der, [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02]);
    }

    #[test]
    fn test_snp_component_roundtrip() {
        proptest!(|(bytes in vec(any::<u8>(), 0..=P384_COMPONENT_LEN))| {
            // canonical big-endian component, left-padded to 48 bytes
            let mut be = [0u8; P384_COMPONENT_LEN];
            be[P384_COMPONENT_LEN - bytes.len()..].copy_from_slice(&bytes);

            let le = snp_component_to_le(&be);
            let roundtrip = snp_component_to_be(&le).unwrap();
            prop_assert_eq!(be, roundtrip);
        });
    }

    #[test]
    fn test_snp_component_rejects_wide_values() {
        let mut le = [0u8; SNP_COMPONENT_LEN];
        le[SNP_COMPONENT_LEN - 1] = 0x01; // significant byte beyond 48
        assert!(snp_component_to_be(&le).is_err());
    }
}
