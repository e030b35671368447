//! Certificate chain construction and validation.
//!
//! Takes an unordered pile of certificates (as extracted from a quote's
//! `cert_data` or supplied by the caller), identifies the leaf and the
//! self-issued root, reorders the rest into a path, and then checks
//! signatures, validity windows, BasicConstraints, revocation, and root
//! pinning, in that order. The first failure wins.

use std::collections::HashSet;

use crate::{
    cert::{Certificate, Fingerprint, KeyAlgorithm},
    crl::CrlSet,
    error::{Error, Result},
};

/// Chains longer than this are rejected outright.
pub const MAX_CHAIN_LEN: usize = 8;

/// Inputs to [`validate_chain`] other than the certificates themselves.
pub struct ChainOptions<'a> {
    /// Evaluation time, milliseconds since the Unix epoch. Every
    /// certificate's validity window must contain it.
    pub time_ms: i64,
    /// Accepted root fingerprints. The validated root must be one of these.
    pub pinned_roots: &'a [Fingerprint],
    /// Revoked serials. Any chain member found here fails the chain.
    pub crls: &'a CrlSet,
    /// Require the root to hold an EC public key. True on the Intel PCK
    /// path; false on the SEV-SNP path, where the ARK is RSA.
    pub require_ecdsa_root: bool,
}

/// A validated chain, ordered `[leaf, ..intermediates, root]`.
#[derive(Debug)]
pub struct ValidatedChain {
    certs: Vec<Certificate>,
}

impl ValidatedChain {
    pub fn leaf(&self) -> &Certificate {
        // invariant: validate_chain rejects chains shorter than 2
        &self.certs[0]
    }

    pub fn root(&self) -> &Certificate {
        &self.certs[self.certs.len() - 1]
    }

    pub fn certs(&self) -> &[Certificate] {
        &self.certs
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Build and validate a chain from an unordered certificate set.
pub fn validate_chain(
    certs: Vec<Certificate>,
    opts: &ChainOptions<'_>,
) -> Result<ValidatedChain> {
    // Duplicate certificates (byte-identical) are accepted silently.
    let mut seen = HashSet::new();
    let certs: Vec<Certificate> = certs
        .into_iter()
        .filter(|c| seen.insert(c.fingerprint()))
        .collect();

    if certs.len() < 2 {
        return Err(Error::invalid_chain(
            "a chain needs at least a leaf and a root",
        ));
    }
    if certs.len() > MAX_CHAIN_LEN {
        return Err(Error::invalid_chain(format!(
            "chain of {} certificates exceeds the maximum of {MAX_CHAIN_LEN}",
            certs.len(),
        )));
    }

    let chain = order_into_path(certs)?;

    // Signatures: each node is signed by the next; the root by itself.
    for pair in chain.windows(2) {
        if !pair[0].verify_signed_by(&pair[1]) {
            return Err(Error::invalid_chain(format!(
                "certificate '{}' is not signed by its issuer '{}'",
                pair[0].subject(),
                pair[1].subject(),
            )));
        }
    }
    let root = &chain[chain.len() - 1];
    if !root.verify_signed_by(root) {
        return Err(Error::invalid_chain("root certificate is not self-signed"));
    }

    // Validity windows.
    for cert in &chain {
        if !cert.valid_at(opts.time_ms) {
            return Err(Error::Expired {
                subject: cert.subject().to_owned(),
            });
        }
    }

    // BasicConstraints: every issuer is a CA, path lengths are respected,
    // and the leaf itself is not a CA.
    if chain[0].is_ca() {
        return Err(Error::invalid_chain("leaf certificate is a CA"));
    }
    for (idx, issuer) in chain.iter().enumerate().skip(1) {
        if !issuer.is_ca() {
            return Err(Error::invalid_chain(format!(
                "issuer '{}' is not a CA",
                issuer.subject(),
            )));
        }
        // `idx - 1` intermediates sit strictly below this issuer.
        if let Some(path_len) = issuer.basic_constraints().and_then(|bc| bc.path_len)
        {
            if idx - 1 > path_len as usize {
                return Err(Error::invalid_chain(format!(
                    "issuer '{}' allows {path_len} intermediates but has {}",
                    issuer.subject(),
                    idx - 1,
                )));
            }
        }
    }
    if opts.require_ecdsa_root && root.key_algorithm() != KeyAlgorithm::Ec {
        return Err(Error::invalid_chain("root public key is not ECDSA"));
    }

    // Revocation.
    for cert in &chain {
        if opts.crls.contains(cert.issuer(), cert.serial()) {
            return Err(Error::Revoked {
                subject: cert.subject().to_owned(),
                serial: cert.serial().to_owned(),
            });
        }
    }

    // Root pinning.
    let root_fingerprint = root.fingerprint();
    if !opts.pinned_roots.contains(&root_fingerprint) {
        return Err(Error::UntrustedRoot {
            fingerprint: root_fingerprint.to_string(),
        });
    }

    Ok(ValidatedChain { certs: chain })
}

/// Identify the leaf and reorder the set into `[leaf, .., root]`.
fn order_into_path(certs: Vec<Certificate>) -> Result<Vec<Certificate>> {
    // The leaf is the unique certificate that issues no other certificate.
    let mut leaf_idxs = certs.iter().enumerate().filter_map(|(i, cand)| {
        let issues_other = certs
            .iter()
            .enumerate()
            .any(|(j, other)| i != j && other.issuer() == cand.subject());
        (!issues_other).then_some(i)
    });
    let leaf_idx = match (leaf_idxs.next(), leaf_idxs.next()) {
        (Some(idx), None) => idx,
        (None, _) => return Err(Error::invalid_chain(
            "no leaf certificate (issuer/subject cycle)",
        )),
        (Some(_), Some(_)) => return Err(Error::invalid_chain(
            "multiple leaf candidates; certificates do not form a single path",
        )),
    };

    let mut remaining: Vec<Option<Certificate>> =
        certs.into_iter().map(Some).collect();
    let mut chain = vec![remaining[leaf_idx].take().unwrap()];

    while !chain[chain.len() - 1].is_self_issued() {
        let current = &chain[chain.len() - 1];
        let mut matches = remaining.iter_mut().filter(|slot| {
            slot.as_ref()
                .map(|c| c.subject() == current.issuer())
                .unwrap_or(false)
        });
        let next = match (matches.next(), matches.next()) {
            (Some(slot), None) => slot.take().unwrap(),
            (None, _) =>
                return Err(Error::invalid_chain(format!(
                    "no certificate found for issuer '{}'",
                    current.issuer(),
                ))),
            (Some(_), Some(_)) =>
                return Err(Error::invalid_chain(format!(
                    "multiple certificates share the subject '{}'",
                    current.issuer(),
                ))),
        };
        chain.push(next);
    }

    if remaining.iter().any(Option::is_some) {
        return Err(Error::invalid_chain(
            "certificates not on the leaf-to-root path were supplied",
        ));
    }

    Ok(chain)
}

#[cfg(test)]
mod test {
    use super::*;

    const ROOT_PEM: &str = include_str!("../test_data/pck-root.pem");
    const PLATFORM_PEM: &str = include_str!("../test_data/pck-platform.pem");
    const LEAF_PEM: &str = include_str!("../test_data/pck-leaf.pem");
    const UNRELATED_PEM: &str = include_str!("../test_data/unrelated-ca.pem");
    const REVOKED_CRL_DER: &[u8] =
        include_bytes!("../test_data/pck-leaf-revoked.crl.der");

    /// 2025-06-15, inside the fixture validity window (2024..2044).
    const DATE_MS: i64 = 1_750_000_000_000;

    fn fixture_certs() -> Vec<Certificate> {
        // deliberately out of order
        vec![
            Certificate::from_pem(ROOT_PEM).unwrap(),
            Certificate::from_pem(LEAF_PEM).unwrap(),
            Certificate::from_pem(PLATFORM_PEM).unwrap(),
        ]
    }

    fn pinned_fixture_root() -> Vec<Fingerprint> {
        vec![Certificate::from_pem(ROOT_PEM).unwrap().fingerprint()]
    }

    fn opts<'a>(
        pinned: &'a [Fingerprint],
        crls: &'a CrlSet,
    ) -> ChainOptions<'a> {
        ChainOptions {
            time_ms: DATE_MS,
            pinned_roots: pinned,
            crls,
            require_ecdsa_root: true,
        }
    }

    #[test]
    fn test_happy_path_reorders() {
        let pinned = pinned_fixture_root();
        let crls = CrlSet::empty();
        let chain = validate_chain(fixture_certs(), &opts(&pinned, &crls))
            .unwrap();
        assert_eq!(chain.len(), 3);
        assert!(chain.leaf().subject().contains("PCK"));
        assert!(chain.root().is_self_issued());
    }

    #[test]
    fn test_duplicates_accepted() {
        let pinned = pinned_fixture_root();
        let crls = CrlSet::empty();
        let mut certs = fixture_certs();
        certs.push(Certificate::from_pem(LEAF_PEM).unwrap());
        certs.push(Certificate::from_pem(ROOT_PEM).unwrap());
        let chain = validate_chain(certs, &opts(&pinned, &crls)).unwrap();
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_missing_intermediate() {
        let pinned = pinned_fixture_root();
        let crls = CrlSet::empty();
        let certs = vec![
            Certificate::from_pem(LEAF_PEM).unwrap(),
            Certificate::from_pem(ROOT_PEM).unwrap(),
        ];
        let err = validate_chain(certs, &opts(&pinned, &crls)).unwrap_err();
        assert!(matches!(err, Error::InvalidChain { .. }), "{err:?}");
    }

    #[test]
    fn test_disconnected_extra_cert() {
        let pinned = pinned_fixture_root();
        let crls = CrlSet::empty();
        let mut certs = fixture_certs();
        certs.push(Certificate::from_pem(UNRELATED_PEM).unwrap());
        let err = validate_chain(certs, &opts(&pinned, &crls)).unwrap_err();
        assert!(matches!(err, Error::InvalidChain { .. }), "{err:?}");
    }

    #[test]
    fn test_leaf_must_not_be_ca() {
        let pinned = pinned_fixture_root();
        let crls = CrlSet::empty();
        // drop the leaf: now the platform CA is the "leaf"
        let certs = vec![
            Certificate::from_pem(PLATFORM_PEM).unwrap(),
            Certificate::from_pem(ROOT_PEM).unwrap(),
        ];
        let err = validate_chain(certs, &opts(&pinned, &crls)).unwrap_err();
        match err {
            Error::InvalidChain { reason } =>
                assert!(reason.contains("leaf certificate is a CA")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_expired_before_and_after() {
        let pinned = pinned_fixture_root();
        let crls = CrlSet::empty();

        for bad_time in [
            // before 2024-01-01
            1_600_000_000_000i64,
            // after 2044-01-01
            2_500_000_000_000i64,
        ] {
            let mut o = opts(&pinned, &crls);
            o.time_ms = bad_time;
            let err = validate_chain(fixture_certs(), &o).unwrap_err();
            assert!(matches!(err, Error::Expired { .. }), "{err:?}");
        }
    }

    #[test]
    fn test_boundary_times_are_valid() {
        let pinned = pinned_fixture_root();
        let crls = CrlSet::empty();
        let leaf = Certificate::from_pem(LEAF_PEM).unwrap();
        let (not_before_ms, not_after_ms) = leaf.validity_ms();

        for boundary in [not_before_ms, not_after_ms] {
            let mut o = opts(&pinned, &crls);
            o.time_ms = boundary;
            validate_chain(fixture_certs(), &o).unwrap();
        }
    }

    #[test]
    fn test_revoked_leaf() {
        let pinned = pinned_fixture_root();
        let crls = CrlSet::from_ders(&[REVOKED_CRL_DER]).unwrap();
        let err =
            validate_chain(fixture_certs(), &opts(&pinned, &crls)).unwrap_err();
        assert!(matches!(err, Error::Revoked { .. }), "{err:?}");

        // removing the CRL entry restores success
        let crls = CrlSet::empty();
        validate_chain(fixture_certs(), &opts(&pinned, &crls)).unwrap();
    }

    #[test]
    fn test_untrusted_root() {
        let unrelated =
            vec![Certificate::from_pem(UNRELATED_PEM).unwrap().fingerprint()];
        let crls = CrlSet::empty();
        let err = validate_chain(fixture_certs(), &opts(&unrelated, &crls))
            .unwrap_err();
        assert!(matches!(err, Error::UntrustedRoot { .. }), "{err:?}");
    }
}
