//! SGX/TDX quote verification.
//!
//! The checking order is fixed: header sanity (done during parsing), PCK
//! chain validation, QE report signature, QE binding, outer quote
//! signature. Each step has a distinct error kind and the first failure
//! wins.

use std::sync::LazyLock;

use ring::{
    digest,
    signature::{self, UnparsedPublicKey},
};
use tracing::debug;

use crate::{
    cert::{Certificate, Fingerprint},
    chain::{self, ChainOptions},
    crl::CrlSet,
    ecdsa,
    error::{Error, Result},
    pem,
    quote::{Quote, TeeType},
};

/// Configuration for [`crate::verify_sgx`] and [`crate::verify_tdx`].
///
/// The defaults verify against the vendored Intel SGX Root CA at the
/// current wall clock with no revocation data.
#[derive(Debug, Default)]
pub struct VerifyOptions {
    /// DER-encoded CRLs; any chain certificate whose serial appears in one
    /// fails verification.
    pub crls: Vec<Vec<u8>>,
    /// PEM certificates replacing the default pinned root set (the
    /// vendored Intel SGX Root CA).
    pub pinned_roots: Option<Vec<String>>,
    /// Evaluation time in milliseconds since the Unix epoch; defaults to
    /// the wall clock, read once at entry.
    pub date_ms: Option<i64>,
    /// Fallback PEM certificates used when the quote carries no
    /// `cert_data`.
    pub extra_certdata: Option<Vec<String>>,
}

static INTEL_SGX_ROOT_FINGERPRINT: LazyLock<Fingerprint> =
    LazyLock::new(|| {
        Certificate::from_pem(crate::INTEL_SGX_ROOT_CA_PEM)
            .expect("vendored Intel SGX Root CA must parse")
            .fingerprint()
    });

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}

/// Resolve the caller's pinned roots (PEMs) to fingerprints, or fall back
/// to `default_fingerprint`.
pub(crate) fn resolve_pinned_roots(
    pinned_roots: &Option<Vec<String>>,
    default_fingerprint: Fingerprint,
) -> Result<Vec<Fingerprint>> {
    match pinned_roots {
        Some(pems) => pems
            .iter()
            .map(|p| Certificate::from_pem(p).map(|c| c.fingerprint()))
            .collect(),
        None => Ok(vec![default_fingerprint]),
    }
}

/// Verify a quote end-to-end. `expected_tee` guards against handing a TDX
/// quote to the SGX entry point and vice versa.
pub(crate) fn verify_quote(
    bytes: &[u8],
    expected_tee: TeeType,
    opts: &VerifyOptions,
) -> Result<()> {
    // 1. Parse; header sanity (version, key type, cert data type) happens
    //    here.
    let quote = Quote::parse(bytes)?;
    if quote.header.tee_type != expected_tee {
        return Err(Error::invalid(
            "quote header",
            0,
            "quote TEE type does not match this verifier",
        ));
    }

    // 2. Validate the PCK chain out of cert_data (or the caller-supplied
    //    fallback), with revocation and root pinning.
    let time_ms = opts.date_ms.unwrap_or_else(now_ms);
    let certs = certification_certs(&quote, opts)?;
    let crls = CrlSet::from_ders(&opts.crls)?;
    let pinned = resolve_pinned_roots(
        &opts.pinned_roots,
        *INTEL_SGX_ROOT_FINGERPRINT,
    )?;
    let chain_opts = ChainOptions {
        time_ms,
        pinned_roots: &pinned,
        crls: &crls,
        require_ecdsa_root: true,
    };
    let chain = chain::validate_chain(certs, &chain_opts)?;
    debug!(
        chain_len = chain.len(),
        root = %chain.root().subject(),
        "PCK chain validated"
    );

    // 3. The PCK leaf must have signed the embedded QE report.
    let sig = &quote.signature;
    UnparsedPublicKey::new(
        &signature::ECDSA_P256_SHA256_FIXED,
        chain.leaf().public_key_bits(),
    )
    .verify(&sig.qe_report_raw, &sig.qe_report_signature)
    .map_err(|_| Error::BadQeSignature)?;

    // 4. The QE report must bind the attestation key:
    //    report_data[..32] == sha256(attestation_pk || qe_auth_data),
    //    report_data[32..] == 0.
    let mut binding = digest::Context::new(&digest::SHA256);
    binding.update(&sig.attestation_public_key);
    binding.update(&sig.qe_auth_data);
    let expected = binding.finish();
    let qe_report_data = &sig.qe_report.report_data.0;
    if qe_report_data[..32] != *expected.as_ref()
        || qe_report_data[32..].iter().any(|&b| b != 0)
    {
        return Err(Error::BadQeBinding);
    }

    // 5. The attestation key must have signed the version-selected region.
    let signed_region = quote.signed_region(bytes)?;
    let ak_point = ecdsa::p256_uncompressed_point(&sig.attestation_public_key);
    UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_FIXED, ak_point)
        .verify(signed_region, &sig.signature)
        .map_err(|_| Error::BadQuoteSignature)?;

    debug!(version = quote.header.version, "quote verified");
    Ok(())
}

/// The certificates anchoring the quote: from `cert_data` when present,
/// else from `extra_certdata`.
fn certification_certs(
    quote: &Quote,
    opts: &VerifyOptions,
) -> Result<Vec<Certificate>> {
    let embedded = pem::extract_pem_certificates(&quote.signature.cert_data);

    let pems: Vec<String> = if !embedded.is_empty() {
        embedded
    } else {
        match &opts.extra_certdata {
            Some(extra) if !extra.is_empty() => extra.clone(),
            _ => return Err(Error::MissingCertData),
        }
    };

    pems.iter().map(|p| Certificate::from_pem(p)).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{verify_sgx, verify_tdx};

    const SGX_V3: &[u8] = include_bytes!("../test_data/sgx-v3.bin");
    const TDX_V4: &[u8] = include_bytes!("../test_data/tdx-v4.bin");
    const TDX_V5: &[u8] = include_bytes!("../test_data/tdx-v5.bin");
    const ROOT_PEM: &str = include_str!("../test_data/pck-root.pem");
    const PLATFORM_PEM: &str = include_str!("../test_data/pck-platform.pem");
    const LEAF_PEM: &str = include_str!("../test_data/pck-leaf.pem");
    const UNRELATED_PEM: &str = include_str!("../test_data/unrelated-ca.pem");
    const REVOKED_CRL_DER: &[u8] =
        include_bytes!("../test_data/pck-leaf-revoked.crl.der");
    const EMPTY_CRL_DER: &[u8] = include_bytes!("../test_data/empty.crl.der");

    /// 2025-06-15, inside the fixture validity window.
    const DATE_MS: i64 = 1_750_000_000_000;

    // Signature section layout offsets for the SGX fixture (quote body ends
    // at 432, the u32 section length follows, the section starts at 436).
    const SGX_AK_OFFSET: usize = 436 + 64;
    const SGX_QE_REPORT_SIG_OFFSET: usize = 436 + 64 + 64 + 384;
    const SGX_QE_AUTH_OFFSET: usize = SGX_QE_REPORT_SIG_OFFSET + 64 + 2;
    const SGX_CERT_TYPE_OFFSET: usize = SGX_QE_AUTH_OFFSET + 32;

    fn fixture_opts() -> VerifyOptions {
        VerifyOptions {
            crls: vec![],
            pinned_roots: Some(vec![ROOT_PEM.to_owned()]),
            date_ms: Some(DATE_MS),
            extra_certdata: None,
        }
    }

    #[test]
    fn test_verify_sgx_ok() {
        verify_sgx(SGX_V3, &fixture_opts()).unwrap();
    }

    #[test]
    fn test_verify_tdx_v4_ok() {
        verify_tdx(TDX_V4, &fixture_opts()).unwrap();
    }

    #[test]
    fn test_verify_tdx_v5_ok() {
        verify_tdx(TDX_V5, &fixture_opts()).unwrap();
    }

    #[test]
    fn test_wrong_entry_point() {
        assert!(verify_sgx(TDX_V4, &fixture_opts()).is_err());
        assert!(verify_tdx(SGX_V3, &fixture_opts()).is_err());
    }

    #[test]
    fn test_default_pin_rejects_fixture_chain() {
        // The default pinned root is the vendored Intel SGX Root CA, which
        // did not issue the fixture chain.
        let mut opts = fixture_opts();
        opts.pinned_roots = None;
        assert!(matches!(
            verify_sgx(SGX_V3, &opts).unwrap_err(),
            Error::UntrustedRoot { .. },
        ));
    }

    #[test]
    fn test_unrelated_pin_rejected() {
        let mut opts = fixture_opts();
        opts.pinned_roots = Some(vec![UNRELATED_PEM.to_owned()]);
        assert!(matches!(
            verify_tdx(TDX_V4, &opts).unwrap_err(),
            Error::UntrustedRoot { .. },
        ));
    }

    #[test]
    fn test_time_window() {
        let mut opts = fixture_opts();
        opts.date_ms = Some(1_600_000_000_000); // 2020, before notBefore
        assert!(matches!(
            verify_sgx(SGX_V3, &opts).unwrap_err(),
            Error::Expired { .. },
        ));

        opts.date_ms = Some(2_500_000_000_000); // 2049, after notAfter
        assert!(matches!(
            verify_sgx(SGX_V3, &opts).unwrap_err(),
            Error::Expired { .. },
        ));

        // boundary equality at notBefore succeeds
        let leaf = Certificate::from_pem(LEAF_PEM).unwrap();
        opts.date_ms = Some(leaf.validity_ms().0);
        verify_sgx(SGX_V3, &opts).unwrap();
    }

    #[test]
    fn test_revocation() {
        let mut opts = fixture_opts();
        opts.crls = vec![REVOKED_CRL_DER.to_vec()];
        assert!(matches!(
            verify_sgx(SGX_V3, &opts).unwrap_err(),
            Error::Revoked { .. },
        ));

        // an empty CRL restores success
        opts.crls = vec![EMPTY_CRL_DER.to_vec()];
        verify_sgx(SGX_V3, &opts).unwrap();
    }

    #[test]
    fn test_flipped_attestation_key_fails_binding() {
        let mut bytes = SGX_V3.to_vec();
        bytes[SGX_AK_OFFSET] ^= 0x01;
        assert!(matches!(
            verify_sgx(&bytes, &fixture_opts()).unwrap_err(),
            Error::BadQeBinding,
        ));
    }

    #[test]
    fn test_flipped_auth_data_fails_binding() {
        let mut bytes = SGX_V3.to_vec();
        bytes[SGX_QE_AUTH_OFFSET] ^= 0x01;
        assert!(matches!(
            verify_sgx(&bytes, &fixture_opts()).unwrap_err(),
            Error::BadQeBinding,
        ));
    }

    #[test]
    fn test_flipped_qe_report_signature() {
        let mut bytes = SGX_V3.to_vec();
        bytes[SGX_QE_REPORT_SIG_OFFSET] ^= 0x01;
        assert!(matches!(
            verify_sgx(&bytes, &fixture_opts()).unwrap_err(),
            Error::BadQeSignature,
        ));
    }

    #[test]
    fn test_flipped_signed_region_byte() {
        // byte 200 of the TDX signed region falls inside mr_td
        let mut bytes = TDX_V4.to_vec();
        bytes[200] ^= 0x01;
        assert!(matches!(
            verify_tdx(&bytes, &fixture_opts()).unwrap_err(),
            Error::BadQuoteSignature,
        ));

        // ... and inside the SGX report body
        let mut bytes = SGX_V3.to_vec();
        bytes[100] ^= 0x01;
        assert!(matches!(
            verify_sgx(&bytes, &fixture_opts()).unwrap_err(),
            Error::BadQuoteSignature,
        ));
    }

    /// The SGX fixture with its embedded `cert_data` stripped (length
    /// fields patched, buffer truncated).
    fn fixture_without_certdata() -> Vec<u8> {
        let mut bytes = SGX_V3.to_vec();
        let cert_len_offset = SGX_CERT_TYPE_OFFSET + 2;
        bytes[cert_len_offset..cert_len_offset + 4]
            .copy_from_slice(&0u32.to_le_bytes());
        bytes.truncate(cert_len_offset + 4);
        // shrink the signature section length to match
        let section_len = (bytes.len() - 436) as u32;
        bytes[432..436].copy_from_slice(&section_len.to_le_bytes());
        bytes
    }

    #[test]
    fn test_missing_certdata() {
        let bytes = fixture_without_certdata();
        assert!(matches!(
            verify_sgx(&bytes, &fixture_opts()).unwrap_err(),
            Error::MissingCertData,
        ));
    }

    #[test]
    fn test_extra_certdata_fallback() {
        let bytes = fixture_without_certdata();
        let mut opts = fixture_opts();
        opts.extra_certdata = Some(vec![
            LEAF_PEM.to_owned(),
            PLATFORM_PEM.to_owned(),
            ROOT_PEM.to_owned(),
        ]);
        verify_sgx(&bytes, &opts).unwrap();
    }

    #[test]
    fn test_parallel_verifications_agree() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    verify_tdx(TDX_V4, &fixture_opts()).is_ok()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
