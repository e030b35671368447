//! A minimal X.509 certificate facade.
//!
//! The rest of the crate manipulates only the semantic attributes exposed
//! here: distinguished subject/issuer strings, an uppercase-hex serial, a
//! validity window, the subject public key, BasicConstraints, plus two
//! operations (`verify_signed_by` and `fingerprint`). The concrete parser
//! (`x509-parser`) and verifier (`ring`) stay behind this boundary.

use ref_cast::RefCast;
use ring::{
    digest,
    signature::{self, UnparsedPublicKey},
};
use x509_parser::{oid_registry, prelude::*};

use crate::{
    error::{Error, Result},
    pem,
};

/// A SHA-256 certificate fingerprint. This is the identity a pinned root
/// is matched by: a validated chain is only accepted if its root's
/// fingerprint appears in the pinned set.
#[derive(Copy, Clone, Eq, Hash, PartialEq, RefCast)]
#[repr(transparent)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Fingerprint a DER-encoded certificate.
    pub fn of_der(der: &[u8]) -> Self {
        let digest = digest::digest(&digest::SHA256, der);
        // infallible: SHA-256 output is exactly 32 bytes
        Self(<[u8; 32]>::try_from(digest.as_ref()).unwrap())
    }
}

qvl_byte_array::impl_byte_array!(Fingerprint, 32);
qvl_byte_array::impl_fromstr_fromhex!(Fingerprint, 32);
qvl_byte_array::impl_debug_display_as_hex!(Fingerprint);

/// The signature algorithm a certificate was signed with.
///
/// This is the full set of algorithms appearing in the chains this crate
/// validates: Intel PCK chains are ECDSA P-256, AMD VCEK chains are RSA-PSS
/// (ARK/ASK) over an ECDSA P-384 leaf. Anything else fails verification.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SignatureAlgorithm {
    EcdsaP256Sha256,
    EcdsaP384Sha384,
    RsaPkcs1Sha256,
    RsaPkcs1Sha384,
    /// RSASSA-PSS, assumed SHA-384 with a digest-length salt (the AMD
    /// certificate profile).
    RsaPssSha384,
}

impl SignatureAlgorithm {
    fn ring_alg(&self) -> &'static dyn signature::VerificationAlgorithm {
        match self {
            Self::EcdsaP256Sha256 => &signature::ECDSA_P256_SHA256_ASN1,
            Self::EcdsaP384Sha384 => &signature::ECDSA_P384_SHA384_ASN1,
            Self::RsaPkcs1Sha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
            Self::RsaPkcs1Sha384 => &signature::RSA_PKCS1_2048_8192_SHA384,
            Self::RsaPssSha384 => &signature::RSA_PSS_2048_8192_SHA384,
        }
    }
}

/// The subject public key family, from the SPKI algorithm identifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyAlgorithm {
    /// id-ecPublicKey. The curve is implied by the key length.
    Ec,
    /// rsaEncryption / RSASSA-PSS keys.
    Rsa,
    /// Anything else. Still parseable, but signatures made with this key
    /// never verify.
    Other,
}

/// `BasicConstraints`, where present.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BasicConstraints {
    pub ca: bool,
    pub path_len: Option<u32>,
}

/// An owned, parsed certificate exposing only what chain validation needs.
pub struct Certificate {
    der: Vec<u8>,
    tbs: Vec<u8>,
    subject: String,
    issuer: String,
    serial: String,
    not_before_ms: i64,
    not_after_ms: i64,
    key_algorithm: KeyAlgorithm,
    public_key_bits: Vec<u8>,
    signature_algorithm: Option<SignatureAlgorithm>,
    signature: Vec<u8>,
    basic_constraints: Option<BasicConstraints>,
}

impl Certificate {
    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let invalid = |what| Error::invalid("certificate", 0, what);

        let (trailing, cert) = X509Certificate::from_der(der)
            .map_err(|_| invalid("not valid DER"))?;
        if !trailing.is_empty() {
            return Err(invalid("trailing bytes after certificate"));
        }

        let spki = cert.public_key();
        let key_algorithm = if spki.algorithm.algorithm
            == oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY
        {
            KeyAlgorithm::Ec
        } else if spki.algorithm.algorithm == oid_registry::OID_PKCS1_RSAENCRYPTION
            || spki.algorithm.algorithm == oid_registry::OID_PKCS1_RSASSAPSS
        {
            KeyAlgorithm::Rsa
        } else {
            KeyAlgorithm::Other
        };

        let sig_oid = &cert.signature_algorithm.algorithm;
        let signature_algorithm = if *sig_oid
            == oid_registry::OID_SIG_ECDSA_WITH_SHA256
        {
            Some(SignatureAlgorithm::EcdsaP256Sha256)
        } else if *sig_oid == oid_registry::OID_SIG_ECDSA_WITH_SHA384 {
            Some(SignatureAlgorithm::EcdsaP384Sha384)
        } else if *sig_oid == oid_registry::OID_PKCS1_SHA256WITHRSA {
            Some(SignatureAlgorithm::RsaPkcs1Sha256)
        } else if *sig_oid == oid_registry::OID_PKCS1_SHA384WITHRSA {
            Some(SignatureAlgorithm::RsaPkcs1Sha384)
        } else if *sig_oid == oid_registry::OID_PKCS1_RSASSAPSS {
            Some(SignatureAlgorithm::RsaPssSha384)
        } else {
            // Kept parseable: an unknown signature algorithm only matters
            // once something tries to verify this certificate.
            None
        };

        let basic_constraints = cert
            .basic_constraints()
            .map_err(|_| invalid("duplicate BasicConstraints extension"))?
            .map(|ext| BasicConstraints {
                ca: ext.value.ca,
                path_len: ext.value.path_len_constraint,
            });

        let validity = cert.validity();

        Ok(Self {
            der: der.to_vec(),
            tbs: cert.tbs_certificate.as_ref().to_vec(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: format!("{:X}", cert.tbs_certificate.serial),
            not_before_ms: validity.not_before.timestamp() * 1000,
            not_after_ms: validity.not_after.timestamp() * 1000,
            key_algorithm,
            public_key_bits: spki.subject_public_key.data.to_vec(),
            signature_algorithm,
            signature: cert.signature_value.data.to_vec(),
            basic_constraints,
        })
    }

    /// Parse the first PEM certificate block in `pem`.
    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::from_der(&pem::pem_to_der(pem)?)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The distinguished subject, e.g. `CN=Intel SGX PCK Certificate, ...`.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The serial number in uppercase hex, without leading zero bytes.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    /// `[notBefore, notAfter]` in milliseconds since the Unix epoch.
    pub fn validity_ms(&self) -> (i64, i64) {
        (self.not_before_ms, self.not_after_ms)
    }

    /// Whether `time_ms` lies within the validity window (inclusive on both
    /// ends).
    pub fn valid_at(&self, time_ms: i64) -> bool {
        self.not_before_ms <= time_ms && time_ms <= self.not_after_ms
    }

    pub fn key_algorithm(&self) -> KeyAlgorithm {
        self.key_algorithm
    }

    /// The raw subject public key bits: an uncompressed SEC1 point for EC
    /// keys, a PKCS#1 `RSAPublicKey` for RSA keys. Exactly the form `ring`'s
    /// verification primitives expect.
    pub fn public_key_bits(&self) -> &[u8] {
        &self.public_key_bits
    }

    pub fn basic_constraints(&self) -> Option<BasicConstraints> {
        self.basic_constraints
    }

    pub fn is_ca(&self) -> bool {
        self.basic_constraints.map(|bc| bc.ca).unwrap_or(false)
    }

    /// SHA-256 fingerprint of the certificate DER.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_der(&self.der)
    }

    /// Whether `issuer`'s public key signed this certificate's TBS region.
    /// Unknown signature algorithms verify as `false`.
    pub fn verify_signed_by(&self, issuer: &Certificate) -> bool {
        let Some(alg) = self.signature_algorithm else {
            return false;
        };
        UnparsedPublicKey::new(alg.ring_alg(), issuer.public_key_bits())
            .verify(&self.tbs, &self.signature)
            .is_ok()
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("serial", &self.serial)
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}
