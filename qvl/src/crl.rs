//! A revoked-serial set built from DER CRLs.
//!
//! Deliberately a membership check only: CRL signatures, scopes, and
//! extensions are NOT validated here. Callers that need full PKIX
//! revocation semantics must authenticate their CRLs before handing them
//! over; this set answers just "is serial S, issued by I, revoked?".

use std::collections::HashSet;

use x509_parser::prelude::*;

use crate::error::{Error, Result};

/// Revoked `(issuer, serial)` pairs accumulated from one or more CRLs.
#[derive(Debug, Default)]
pub struct CrlSet {
    revoked: HashSet<(String, String)>,
}

impl CrlSet {
    /// An empty set; nothing is revoked.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse DER-encoded CRLs and accumulate their revoked serials.
    pub fn from_ders<B: AsRef<[u8]>>(ders: &[B]) -> Result<Self> {
        let mut revoked = HashSet::new();

        for der in ders {
            let (_, crl) = CertificateRevocationList::from_der(der.as_ref())
                .map_err(|_| Error::invalid("CRL", 0, "not valid DER"))?;
            let issuer = crl.issuer().to_string();
            for entry in crl.iter_revoked_certificates() {
                let serial = format!("{:X}", entry.user_certificate);
                revoked.insert((issuer.clone(), serial));
            }
        }

        Ok(Self { revoked })
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    /// Whether the given issuer revoked the given serial. `serial` is
    /// normalized to uppercase hex before lookup.
    pub fn contains(&self, issuer: &str, serial: &str) -> bool {
        let serial = serial.to_ascii_uppercase();
        self.revoked
            .contains(&(issuer.to_owned(), serial))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cert::Certificate;

    const REVOKED_CRL_DER: &[u8] =
        include_bytes!("../test_data/pck-leaf-revoked.crl.der");
    const EMPTY_CRL_DER: &[u8] = include_bytes!("../test_data/empty.crl.der");
    const LEAF_PEM: &str = include_str!("../test_data/pck-leaf.pem");

    #[test]
    fn test_membership() {
        let leaf = Certificate::from_pem(LEAF_PEM).unwrap();
        let set = CrlSet::from_ders(&[REVOKED_CRL_DER]).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(leaf.issuer(), leaf.serial()));
        // lookup is case-insensitive on the serial
        assert!(set.contains(leaf.issuer(), &leaf.serial().to_ascii_lowercase()));
        // same serial under a different issuer is not revoked
        assert!(!set.contains("CN=Somebody Else", leaf.serial()));
    }

    #[test]
    fn test_empty_crl() {
        let leaf = Certificate::from_pem(LEAF_PEM).unwrap();
        let set = CrlSet::from_ders(&[EMPTY_CRL_DER]).unwrap();
        assert!(set.is_empty());
        assert!(!set.contains(leaf.issuer(), leaf.serial()));
    }

    #[test]
    fn test_garbage_crl() {
        assert!(CrlSet::from_ders(&[&[0xffu8; 8][..]]).is_err());
        assert!(CrlSet::from_ders::<&[u8]>(&[]).unwrap().is_empty());
    }
}
