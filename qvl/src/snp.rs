//! AMD SEV-SNP attestation report parsing and verification.
//!
//! The report layout follows the AMD SEV-SNP firmware ABI (report version
//! 2 and later): a 672-byte signed body followed by a 512-byte signature
//! block whose ECDSA P-384 components are stored little-endian,
//! zero-padded to 72 bytes each. There is no quoting enclave on this path;
//! the VCEK signs the body directly, and the VCEK chains to the AMD root
//! (ARK) through the SEV signing key (ASK).

use ring::signature::{self, UnparsedPublicKey};
use tracing::debug;

use crate::{
    cert::Certificate,
    chain::{self, ChainOptions},
    codec::Reader,
    crl::CrlSet,
    ecdsa,
    error::{Error, Result},
    measurement::{Measurement48, ReportData},
    verify::{now_ms, resolve_pinned_roots},
};

/// Total report size: body plus signature block.
pub const SNP_REPORT_SIZE: usize = 1184;
/// The signed region: everything before the signature block.
pub const SNP_REPORT_BODY_SIZE: usize = 672;
/// Reports older than version 2 are rejected.
pub const SNP_MIN_VERSION: u32 = 2;

/// A parsed SEV-SNP attestation report.
#[derive(Clone, Debug)]
pub struct SnpReport {
    pub version: u32,
    pub guest_svn: u32,
    pub policy: u64,
    pub family_id: [u8; 16],
    pub image_id: [u8; 16],
    pub vmpl: u32,
    /// 0 or 1; both mean ECDSA P-384 with SHA-384 (0 was used as a
    /// placeholder by early firmware).
    pub signature_algo: u32,
    pub current_tcb: u64,
    pub platform_info: u64,
    pub author_key_flags: u32,
    pub report_data: ReportData,
    pub measurement: Measurement48,
    pub host_data: [u8; 32],
    pub id_key_digest: Measurement48,
    pub author_key_digest: Measurement48,
    pub report_id: [u8; 32],
    pub report_id_ma: [u8; 32],
    pub reported_tcb: u64,
    pub chip_id: [u8; 64],
    pub committed_tcb: u64,
    pub current_build: u8,
    pub current_minor: u8,
    pub current_major: u8,
    pub committed_build: u8,
    pub committed_minor: u8,
    pub committed_major: u8,
    pub launch_tcb: u64,
    pub signature: SnpSignature,
}

/// The report signature in AMD's storage layout: each component
/// little-endian, right-padded with zeros to 72 bytes.
#[derive(Clone)]
pub struct SnpSignature {
    pub r: [u8; 72],
    pub s: [u8; 72],
}

impl SnpSignature {
    /// Convert to the canonical raw `r || s` form (96 bytes, big-endian
    /// components).
    pub fn to_raw_p384(&self) -> Result<[u8; 96]> {
        let r = ecdsa::snp_component_to_be(&self.r)?;
        let s = ecdsa::snp_component_to_be(&self.s)?;
        let mut out = [0u8; 96];
        out[..48].copy_from_slice(&r);
        out[48..].copy_from_slice(&s);
        Ok(out)
    }
}

impl std::fmt::Debug for SnpSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnpSignature")
            .field("r", &qvl_hex::display(&self.r))
            .field("s", &qvl_hex::display(&self.s))
            .finish()
    }
}

impl SnpReport {
    /// Parse an SEV-SNP attestation report (version 2 or later).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);

        let version = r.u32("snp report version")?;
        if version < SNP_MIN_VERSION {
            return Err(Error::UnsupportedVersion {
                what: "SEV-SNP report",
                got: version,
            });
        }
        let guest_svn = r.u32("guest_svn")?;
        let policy = r.u64("policy")?;
        let family_id = r.array("family_id")?;
        let image_id = r.array("image_id")?;
        let vmpl = r.u32("vmpl")?;

        let signature_algo = r.u32("signature_algo")?;
        if !matches!(signature_algo, 0 | 1) {
            return Err(Error::UnsupportedCrypto {
                field: "snp signature algorithm",
                got: signature_algo,
            });
        }

        let current_tcb = r.u64("current_tcb")?;
        let platform_info = r.u64("platform_info")?;
        let author_key_flags = r.u32("author_key_flags")?;
        r.skip(4, "snp reserved1")?;
        let report_data = ReportData::new(r.array("report_data")?);
        let measurement = Measurement48::new(r.array("measurement")?);
        let host_data = r.array("host_data")?;
        let id_key_digest = Measurement48::new(r.array("id_key_digest")?);
        let author_key_digest = Measurement48::new(r.array("author_key_digest")?);
        let report_id = r.array("report_id")?;
        let report_id_ma = r.array("report_id_ma")?;
        let reported_tcb = r.u64("reported_tcb")?;
        r.skip(24, "snp reserved2")?;
        let chip_id = r.array("chip_id")?;
        let committed_tcb = r.u64("committed_tcb")?;
        let current_build = r.array::<1>("current_build")?[0];
        let current_minor = r.array::<1>("current_minor")?[0];
        let current_major = r.array::<1>("current_major")?[0];
        r.skip(1, "snp reserved3")?;
        let committed_build = r.array::<1>("committed_build")?[0];
        let committed_minor = r.array::<1>("committed_minor")?[0];
        let committed_major = r.array::<1>("committed_major")?[0];
        r.skip(1, "snp reserved4")?;
        let launch_tcb = r.u64("launch_tcb")?;
        r.skip(168, "snp reserved5")?;
        debug_assert_eq!(r.offset(), SNP_REPORT_BODY_SIZE);

        let signature = SnpSignature {
            r: r.array("snp signature r")?,
            s: r.array("snp signature s")?,
        };
        r.skip(368, "snp signature reserved")?;

        Ok(Self {
            version,
            guest_svn,
            policy,
            family_id,
            image_id,
            vmpl,
            signature_algo,
            current_tcb,
            platform_info,
            author_key_flags,
            report_data,
            measurement,
            host_data,
            id_key_digest,
            author_key_digest,
            report_id,
            report_id_ma,
            reported_tcb,
            chip_id,
            committed_tcb,
            current_build,
            current_minor,
            current_major,
            committed_build,
            committed_minor,
            committed_major,
            launch_tcb,
            signature,
        })
    }
}

/// The byte range covered by the report signature: the 672-byte body.
pub fn snp_signed_region(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < SNP_REPORT_BODY_SIZE {
        return Err(Error::truncated(
            "snp report",
            0,
            SNP_REPORT_BODY_SIZE,
            bytes.len(),
        ));
    }
    Ok(&bytes[..SNP_REPORT_BODY_SIZE])
}

/// Configuration for [`crate::verify_sev_snp`].
///
/// `vcek_pem` is required. The signing chain defaults to the vendored AMD
/// Milan ASK/ARK, and the default pinned root is whichever ARK is in use.
#[derive(Debug, Default)]
pub struct SnpOptions {
    /// The per-chip VCEK certificate, PEM.
    pub vcek_pem: Option<String>,
    /// The SEV signing key certificate, PEM; vendored Milan ASK when
    /// absent.
    pub ask_pem: Option<String>,
    /// The AMD root key certificate, PEM; vendored Milan ARK when absent.
    pub ark_pem: Option<String>,
    /// DER-encoded CRLs.
    pub crls: Vec<Vec<u8>>,
    /// PEM certificates replacing the default pinned root (the ARK).
    pub pinned_roots: Option<Vec<String>>,
    /// Evaluation time in milliseconds since the Unix epoch; defaults to
    /// the wall clock.
    pub date_ms: Option<i64>,
}

pub(crate) fn verify_snp_report(bytes: &[u8], opts: &SnpOptions) -> Result<()> {
    let report = SnpReport::parse(bytes)?;

    // 1. Validate [VCEK, ASK, ARK] with the root pinned to the ARK.
    let vcek_pem = opts.vcek_pem.as_ref().ok_or(Error::MissingCertData)?;
    let vcek = Certificate::from_pem(vcek_pem)?;
    let ask = Certificate::from_pem(
        opts.ask_pem.as_deref().unwrap_or(crate::AMD_MILAN_ASK_PEM),
    )?;
    let ark = Certificate::from_pem(
        opts.ark_pem.as_deref().unwrap_or(crate::AMD_MILAN_ARK_PEM),
    )?;

    let pinned = resolve_pinned_roots(&opts.pinned_roots, ark.fingerprint())?;
    let crls = CrlSet::from_ders(&opts.crls)?;
    let chain_opts = ChainOptions {
        time_ms: opts.date_ms.unwrap_or_else(now_ms),
        pinned_roots: &pinned,
        crls: &crls,
        // the ARK and ASK are RSA keys
        require_ecdsa_root: false,
    };
    let chain = chain::validate_chain(vec![vcek, ask, ark], &chain_opts)?;
    debug!(root = %chain.root().subject(), "VCEK chain validated");

    // 2. Convert the stored signature to canonical raw form and verify the
    //    body under the VCEK (ECDSA P-384 / SHA-384).
    let raw_sig = report.signature.to_raw_p384()?;
    UnparsedPublicKey::new(
        &signature::ECDSA_P384_SHA384_FIXED,
        chain.leaf().public_key_bits(),
    )
    .verify(snp_signed_region(bytes)?, &raw_sig)
    .map_err(|_| Error::BadReportSignature)?;

    debug!(version = report.version, "SEV-SNP report verified");
    Ok(())
}
