//! The error taxonomy of the verification core.
//!
//! Every failure surfaces as exactly one [`Error`] variant; the variant set
//! is a stable, user-facing contract. Verifiers raise the first failing
//! check and never aggregate. All inputs here are public data, so error
//! payloads are free to carry offsets, subjects, and serials for diagnosis.

use std::fmt;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A structural parse failure: short read, length prefix exceeding the
    /// buffer, bad magic, non-UTF-8 or schema-mismatched JSON.
    #[error("malformed {field} at byte {offset}: {reason}")]
    Malformed {
        field: &'static str,
        offset: usize,
        reason: MalformedReason,
    },

    /// Quote or report version outside the supported set
    /// (SGX v3, TDX v4/v5, SEV-SNP v2+).
    #[error("unsupported {what} version: {got}")]
    UnsupportedVersion { what: &'static str, got: u32 },

    /// An algorithm or encoding selector this library does not support,
    /// e.g. a non-P-256 attestation key type or a non-PCK cert data type.
    #[error("unsupported crypto: {field} = {got}")]
    UnsupportedCrypto { field: &'static str, got: u32 },

    /// The quote carries no certification data and the caller supplied no
    /// fallback certificates.
    #[error("no certification data in quote and no fallback certificates supplied")]
    MissingCertData,

    /// A structural certificate chain failure: orphaned certificate, cycle,
    /// bad signature, missing CA flag, violated path length.
    #[error("invalid certificate chain: {reason}")]
    InvalidChain { reason: String },

    /// The evaluation time falls outside some certificate's validity window.
    #[error("certificate '{subject}' is not valid at the evaluation time")]
    Expired { subject: String },

    /// A chain certificate's serial appears in the supplied CRL set.
    #[error("certificate '{subject}' (serial {serial}) is revoked")]
    Revoked { subject: String, serial: String },

    /// The chain root's fingerprint is not in the pinned root set.
    #[error("chain root (sha256 fingerprint {fingerprint}) is not a pinned root")]
    UntrustedRoot { fingerprint: String },

    /// The PCK leaf certificate failed to verify the QE report signature.
    #[error("PCK signature over the QE report failed to verify")]
    BadQeSignature,

    /// The QE report does not bind the quote's attestation key:
    /// `sha256(attestation_public_key || qe_auth_data)` does not match the
    /// first 32 bytes of the QE report data.
    #[error("QE report does not bind the quote's attestation key")]
    BadQeBinding,

    /// The attestation key failed to verify the outer quote signature.
    #[error("attestation key signature over the quote failed to verify")]
    BadQuoteSignature,

    /// The VCEK failed to verify the SEV-SNP report body signature.
    #[error("VCEK signature over the SEV-SNP report failed to verify")]
    BadReportSignature,

    /// The HCL variable data hash is not committed in the quote report data.
    #[error("HCL variable data hash does not match the report data")]
    HclBindingMismatch,

    /// The HCL envelope embeds a hardware report type other than TDX.
    #[error("unsupported HCL report type: {got}")]
    UnsupportedReportType { got: u32 },

    /// The QE report does not satisfy the supplied QE identity descriptor.
    #[error("QE identity mismatch: {reason}")]
    QeIdentityMismatch { reason: String },
}

impl Error {
    pub(crate) fn truncated(
        field: &'static str,
        offset: usize,
        expected: usize,
        got: usize,
    ) -> Self {
        Self::Malformed {
            field,
            offset,
            reason: MalformedReason::Truncated { expected, got },
        }
    }

    pub(crate) fn invalid(
        field: &'static str,
        offset: usize,
        what: &'static str,
    ) -> Self {
        Self::Malformed {
            field,
            offset,
            reason: MalformedReason::Invalid(what),
        }
    }

    pub(crate) fn invalid_chain(reason: impl Into<String>) -> Self {
        Self::InvalidChain {
            reason: reason.into(),
        }
    }

    pub(crate) fn qe_identity_mismatch(reason: impl Into<String>) -> Self {
        Self::QeIdentityMismatch {
            reason: reason.into(),
        }
    }
}

/// Why a structure failed to parse.
#[derive(Debug)]
pub enum MalformedReason {
    /// Fewer bytes remained than the structure (or its length prefix)
    /// requires.
    Truncated { expected: usize, got: usize },
    /// The bytes were present but hold an invalid value.
    Invalid(&'static str),
    /// Embedded JSON failed to decode or match the expected schema.
    Json(String),
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { expected, got } =>
                write!(f, "need {expected} bytes, have {got}"),
            Self::Invalid(what) => write!(f, "{what}"),
            Self::Json(err) => write!(f, "bad JSON: {err}"),
        }
    }
}
