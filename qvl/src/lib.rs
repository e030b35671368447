//! Attestation quote verification for Intel SGX/TDX and AMD SEV-SNP.
//!
//! Given an attestation blob produced by an Intel Quoting Enclave (SGX v3,
//! TDX v4/v5) or by AMD SEV-SNP firmware (report version 2+), this crate
//! decides whether the blob was genuinely issued by trusted hardware:
//!
//! - bit-exact parsing of the quote/report layouts ([`quote`], [`snp`]),
//! - reconstruction and validation of the certificate chain anchoring the
//!   blob to its vendor root ([`chain`]), with time, revocation
//!   ([`crl`]), and root-pinning checks,
//! - verification of the Quoting Enclave report signature and its binding
//!   to the attestation key (Intel only), and of the outer signature over
//!   the signed region ([`verify_sgx`], [`verify_tdx`],
//!   [`verify_sev_snp`]),
//! - the Azure vTPM HCL envelope that binds a vTPM attestation key into a
//!   TDX quote via a hash in `report_data` ([`hcl`]).
//!
//! What this crate deliberately does NOT do: decide which measurement
//! values are acceptable (compare [`Quote`] / [`snp::SnpReport`] fields
//! against your own policy), validate CRL signatures (CRLs are a
//! revoked-serial set, see [`crl::CrlSet`]), or fetch certificates over
//! the network. Inputs are borrowed, outputs are owned, and there is no
//! process-wide state; verification is a pure, synchronous computation
//! that is safe to run concurrently.
//!
//! ```no_run
//! let quote_bytes: &[u8] = todo!("attestation quote from the enclave");
//! let opts = qvl::VerifyOptions {
//!     date_ms: Some(1_750_000_000_000),
//!     ..Default::default()
//! };
//! qvl::verify_tdx(quote_bytes, &opts)?;
//!
//! // measurement policy stays with the caller
//! let quote = qvl::parse_tdx_quote(quote_bytes)?;
//! let body = quote.tdx_body().unwrap();
//! assert_eq!(body.mr_td.to_string(), "expected mrtd hex");
//! # Ok::<_, qvl::Error>(())
//! ```

use base64::Engine;

pub mod cert;
pub mod chain;
mod codec;
pub mod crl;
pub mod ecdsa;
mod error;
pub mod hcl;
mod measurement;
pub mod pem;
pub mod qe_identity;
pub mod quote;
pub mod snp;
mod verify;

pub use crate::{
    cert::{Certificate, Fingerprint},
    crl::CrlSet,
    error::{Error, MalformedReason, Result},
    hcl::HclReport,
    measurement::{Measurement, Measurement48, ReportData},
    qe_identity::{QeIdentity, QeIdentityOptions},
    quote::{Quote, TeeType},
    snp::{SnpOptions, SnpReport},
    verify::VerifyOptions,
};

/// The Intel SGX Root CA, the default pinned root for SGX/TDX
/// verification.
pub const INTEL_SGX_ROOT_CA_PEM: &str =
    include_str!("../data/intel-sgx-root-ca.pem");

/// The AMD Milan ARK (root), the default SEV-SNP trust anchor.
pub const AMD_MILAN_ARK_PEM: &str = include_str!("../data/amd-milan-ark.pem");

/// The AMD Milan ASK (SEV signing key), the default VCEK issuer.
pub const AMD_MILAN_ASK_PEM: &str = include_str!("../data/amd-milan-ask.pem");

// --- Parsing entry points --- //

/// Parse an SGX v3 quote without verifying it.
pub fn parse_sgx_quote(bytes: &[u8]) -> Result<Quote> {
    let quote = Quote::parse(bytes)?;
    if quote.header.tee_type != TeeType::Sgx {
        return Err(Error::invalid("quote header", 0, "not an SGX quote"));
    }
    Ok(quote)
}

/// Parse a TDX v4/v5 quote without verifying it.
pub fn parse_tdx_quote(bytes: &[u8]) -> Result<Quote> {
    let quote = Quote::parse(bytes)?;
    if quote.header.tee_type != TeeType::Tdx {
        return Err(Error::invalid("quote header", 0, "not a TDX quote"));
    }
    Ok(quote)
}

/// Parse an SEV-SNP attestation report without verifying it.
pub fn parse_snp_report(bytes: &[u8]) -> Result<SnpReport> {
    SnpReport::parse(bytes)
}

/// Parse an Azure HCL attestation envelope.
pub fn parse_hcl_report(bytes: &[u8]) -> Result<HclReport> {
    HclReport::parse(bytes)
}

/// Parse a base64-encoded Azure HCL attestation envelope.
pub fn parse_hcl_report_base64(encoded: &str) -> Result<HclReport> {
    HclReport::parse(&decode_base64(encoded)?)
}

// --- Verification entry points --- //

/// Verify an SGX v3 quote end-to-end: header sanity, PCK chain (time,
/// revocation, root pinning), QE report signature, QE binding, outer
/// quote signature.
pub fn verify_sgx(bytes: &[u8], opts: &VerifyOptions) -> Result<()> {
    verify::verify_quote(bytes, TeeType::Sgx, opts)
}

/// [`verify_sgx`] on a base64-encoded quote.
pub fn verify_sgx_base64(encoded: &str, opts: &VerifyOptions) -> Result<()> {
    verify_sgx(&decode_base64(encoded)?, opts)
}

/// Verify a TDX v4/v5 quote end-to-end. Same checks as [`verify_sgx`],
/// with the signed region selected by quote version.
pub fn verify_tdx(bytes: &[u8], opts: &VerifyOptions) -> Result<()> {
    verify::verify_quote(bytes, TeeType::Tdx, opts)
}

/// [`verify_tdx`] on a base64-encoded quote.
pub fn verify_tdx_base64(encoded: &str, opts: &VerifyOptions) -> Result<()> {
    verify_tdx(&decode_base64(encoded)?, opts)
}

/// Verify an SEV-SNP report: VCEK→ASK→ARK chain validation (root pinned
/// to the ARK) and the ECDSA P-384 report signature under the VCEK.
pub fn verify_sev_snp(bytes: &[u8], opts: &SnpOptions) -> Result<()> {
    snp::verify_snp_report(bytes, opts)
}

/// [`verify_sev_snp`] on a base64-encoded report.
pub fn verify_sev_snp_base64(encoded: &str, opts: &SnpOptions) -> Result<()> {
    verify_sev_snp(&decode_base64(encoded)?, opts)
}

/// [`verify_sev_snp`] on a hex-encoded report.
pub fn verify_sev_snp_hex(encoded: &str, opts: &SnpOptions) -> Result<()> {
    let bytes = qvl_hex::decode(encoded.trim())
        .map_err(|_| Error::invalid("hex input", 0, "not valid hex"))?;
    verify_sev_snp(&bytes, opts)
}

/// Check a quote's embedded QE report against an Intel QE Identity
/// descriptor (freshness window, MRSIGNER, masked attributes, product id,
/// TCB level status).
pub fn verify_qe_identity(
    quote: &Quote,
    qe_identity_json: &str,
    opts: &QeIdentityOptions,
) -> Result<()> {
    let identity = QeIdentity::from_json(qe_identity_json)?;
    qe_identity::check_qe_identity(quote, &identity, opts)
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| Error::invalid("base64 input", 0, "not valid base64"))
}
