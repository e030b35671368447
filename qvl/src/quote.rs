//! Bit-exact parsing of Intel DCAP quotes: SGX v3 and TDX v4/v5.
//!
//! Field offsets and little-endian ordering here are contracts defined by
//! Intel, not implementation choices. The signed-region selectors return
//! the exact byte prefix the outer quote signature covers.

use crate::{
    codec::Reader,
    error::{Error, Result},
    measurement::{Measurement, Measurement48, ReportData},
};

/// Quote header size, common to all supported versions.
pub const QUOTE_HEADER_SIZE: usize = 48;
/// SGX report body size (the truncated report: no keyid/mac).
pub const SGX_REPORT_BODY_SIZE: usize = 384;
/// TDX 1.0 report body size (quote version 4).
pub const TDX_BODY_V4_SIZE: usize = 584;
/// TDX 1.5 report body size (quote version 5).
pub const TDX_BODY_V5_SIZE: usize = 648;

/// `attestation_key_type` for ECDSA P-256, the only supported value.
pub const ATT_KEY_TYPE_ECDSA_P256: u16 = 2;
/// `cert_data_type` for a PEM PCK certificate chain, the only supported
/// value.
pub const CERT_DATA_TYPE_PCK_CHAIN: u16 = 5;

const TEE_TYPE_SGX: u32 = 0x0000_0000;
const TEE_TYPE_TDX: u32 = 0x0000_0081;

/// Which TEE produced a quote.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TeeType {
    Sgx,
    Tdx,
}

/// The 48-byte quote header.
#[derive(Clone, Debug)]
pub struct QuoteHeader {
    /// 3 for SGX, 4/5 for TDX.
    pub version: u16,
    pub att_key_type: u16,
    pub tee_type: TeeType,
    pub reserved: [u8; 4],
    pub qe_vendor_id: [u8; 16],
    pub user_data: [u8; 20],
}

/// The 384-byte SGX report body, also used for the embedded QE report.
#[derive(Clone, Debug)]
pub struct SgxReportBody {
    pub cpu_svn: [u8; 16],
    pub misc_select: u32,
    pub attributes: [u8; 16],
    pub mr_enclave: Measurement,
    pub mr_signer: Measurement,
    pub isv_prod_id: u16,
    pub isv_svn: u16,
    pub report_data: ReportData,
}

/// The TDX report body: 584 bytes for TDX 1.0 (quote v4), extended with
/// `tee_tcb_svn_2` and `mr_servicetd` for TDX 1.5 (quote v5).
#[derive(Clone, Debug)]
pub struct TdxReportBody {
    pub tee_tcb_svn: [u8; 16],
    pub mr_seam: Measurement48,
    pub mr_signer_seam: Measurement48,
    pub seam_attributes: [u8; 8],
    pub td_attributes: [u8; 8],
    pub xfam: [u8; 8],
    pub mr_td: Measurement48,
    pub mr_config_id: Measurement48,
    pub mr_owner: Measurement48,
    pub mr_owner_config: Measurement48,
    pub rtmr0: Measurement48,
    pub rtmr1: Measurement48,
    pub rtmr2: Measurement48,
    pub rtmr3: Measurement48,
    pub report_data: ReportData,
    /// TDX 1.5 only.
    pub tee_tcb_svn_2: Option<[u8; 16]>,
    /// TDX 1.5 only.
    pub mr_servicetd: Option<Measurement48>,
}

/// The parsed quote body, by TEE family.
#[derive(Clone, Debug)]
pub enum QuoteBody {
    Sgx(SgxReportBody),
    Tdx(TdxReportBody),
}

impl QuoteBody {
    pub fn report_data(&self) -> &ReportData {
        match self {
            Self::Sgx(body) => &body.report_data,
            Self::Tdx(body) => &body.report_data,
        }
    }
}

/// The ECDSA/PCK quote signature section.
#[derive(Clone)]
pub struct QuoteSignatureData {
    /// Raw `r || s` signature over the signed region, by the attestation
    /// key.
    pub signature: [u8; 64],
    /// Raw `X || Y` P-256 attestation public key.
    pub attestation_public_key: [u8; 64],
    /// The embedded QE report, parsed.
    pub qe_report: SgxReportBody,
    /// The embedded QE report, as signed (the exact 384 bytes).
    pub qe_report_raw: Vec<u8>,
    /// Raw `r || s` PCK signature over `qe_report_raw`.
    pub qe_report_signature: [u8; 64],
    pub qe_auth_data: Vec<u8>,
    pub cert_data_type: u16,
    /// PEM certificate chain concatenation; may be empty.
    pub cert_data: Vec<u8>,
}

impl std::fmt::Debug for QuoteSignatureData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteSignatureData")
            .field("signature", &qvl_hex::display(&self.signature))
            .field(
                "attestation_public_key",
                &qvl_hex::display(&self.attestation_public_key),
            )
            .field("qe_report", &self.qe_report)
            .field("qe_auth_data", &qvl_hex::display(&self.qe_auth_data))
            .field("cert_data_type", &self.cert_data_type)
            .field("cert_data_len", &self.cert_data.len())
            .finish_non_exhaustive()
    }
}

/// A fully parsed SGX or TDX quote.
#[derive(Clone, Debug)]
pub struct Quote {
    pub header: QuoteHeader,
    pub body: QuoteBody,
    pub signature: QuoteSignatureData,
}

impl Quote {
    /// Parse a quote of any supported version (SGX v3, TDX v4/v5).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);

        let header = parse_header(&mut r)?;
        let body = match (header.version, header.tee_type) {
            (3, TeeType::Sgx) =>
                QuoteBody::Sgx(parse_sgx_report_body(&mut r)?),
            (4, TeeType::Tdx) =>
                QuoteBody::Tdx(parse_tdx_report_body(&mut r, false)?),
            (5, TeeType::Tdx) =>
                QuoteBody::Tdx(parse_tdx_report_body(&mut r, true)?),
            _ => return Err(Error::invalid(
                "quote header",
                0,
                "tee_type does not match the quote version",
            )),
        };
        let signature = parse_signature_data(&mut r)?;

        Ok(Self {
            header,
            body,
            signature,
        })
    }

    /// The TDX body, if this is a TDX quote.
    pub fn tdx_body(&self) -> Option<&TdxReportBody> {
        match &self.body {
            QuoteBody::Tdx(body) => Some(body),
            QuoteBody::Sgx(_) => None,
        }
    }

    /// The SGX body, if this is an SGX quote.
    pub fn sgx_body(&self) -> Option<&SgxReportBody> {
        match &self.body {
            QuoteBody::Sgx(body) => Some(body),
            QuoteBody::Tdx(_) => None,
        }
    }

    /// The signed region of `bytes` for this quote's version.
    pub fn signed_region<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8]> {
        match self.header.version {
            3 => sgx_signed_region(bytes),
            4 => tdx10_signed_region(bytes),
            5 => tdx15_signed_region(bytes),
            // invariant: parse rejected other versions
            _ => unreachable!("unsupported version survived parsing"),
        }
    }
}

// --- Signed-region selectors --- //

fn signed_region_prefix(bytes: &[u8], len: usize) -> Result<&[u8]> {
    if bytes.len() < len {
        return Err(Error::truncated("quote", 0, len, bytes.len()));
    }
    Ok(&bytes[..len])
}

/// The byte range covered by an SGX v3 quote signature: header || report
/// body.
pub fn sgx_signed_region(bytes: &[u8]) -> Result<&[u8]> {
    signed_region_prefix(bytes, QUOTE_HEADER_SIZE + SGX_REPORT_BODY_SIZE)
}

/// The byte range covered by a TDX v4 quote signature: header || TDX 1.0
/// body.
pub fn tdx10_signed_region(bytes: &[u8]) -> Result<&[u8]> {
    signed_region_prefix(bytes, QUOTE_HEADER_SIZE + TDX_BODY_V4_SIZE)
}

/// The byte range covered by a TDX v5 quote signature: header || TDX 1.5
/// body.
pub fn tdx15_signed_region(bytes: &[u8]) -> Result<&[u8]> {
    signed_region_prefix(bytes, QUOTE_HEADER_SIZE + TDX_BODY_V5_SIZE)
}

// --- Parsers --- //

fn parse_header(r: &mut Reader<'_>) -> Result<QuoteHeader> {
    let version = r.u16("quote version")?;
    if !matches!(version, 3 | 4 | 5) {
        return Err(Error::UnsupportedVersion {
            what: "quote",
            got: version as u32,
        });
    }

    let att_key_type = r.u16("attestation key type")?;
    if att_key_type != ATT_KEY_TYPE_ECDSA_P256 {
        return Err(Error::UnsupportedCrypto {
            field: "attestation key type",
            got: att_key_type as u32,
        });
    }

    let tee_type_offset = r.offset();
    let tee_type = match r.u32("tee type")? {
        TEE_TYPE_SGX => TeeType::Sgx,
        TEE_TYPE_TDX => TeeType::Tdx,
        _ => return Err(Error::invalid(
            "tee type",
            tee_type_offset,
            "not SGX (0x00) or TDX (0x81)",
        )),
    };

    Ok(QuoteHeader {
        version,
        att_key_type,
        tee_type,
        reserved: r.array("header reserved")?,
        qe_vendor_id: r.array("qe_vendor_id")?,
        user_data: r.array("header user_data")?,
    })
}

pub(crate) fn parse_sgx_report_body(r: &mut Reader<'_>) -> Result<SgxReportBody> {
    let cpu_svn = r.array("cpu_svn")?;
    let misc_select = r.u32("misc_select")?;
    r.skip(28, "report body reserved1")?;
    let attributes = r.array("attributes")?;
    let mr_enclave = Measurement::new(r.array("mr_enclave")?);
    r.skip(32, "report body reserved2")?;
    let mr_signer = Measurement::new(r.array("mr_signer")?);
    r.skip(96, "report body reserved3")?;
    let isv_prod_id = r.u16("isv_prod_id")?;
    let isv_svn = r.u16("isv_svn")?;
    r.skip(60, "report body reserved4")?;
    let report_data = ReportData::new(r.array("report_data")?);

    Ok(SgxReportBody {
        cpu_svn,
        misc_select,
        attributes,
        mr_enclave,
        mr_signer,
        isv_prod_id,
        isv_svn,
        report_data,
    })
}

fn parse_tdx_report_body(r: &mut Reader<'_>, v15: bool) -> Result<TdxReportBody> {
    let tee_tcb_svn = r.array("tee_tcb_svn")?;
    let mr_seam = Measurement48::new(r.array("mr_seam")?);
    let mr_signer_seam = Measurement48::new(r.array("mr_signer_seam")?);
    let seam_attributes = r.array("seam_attributes")?;
    let td_attributes = r.array("td_attributes")?;
    let xfam = r.array("xfam")?;
    let mr_td = Measurement48::new(r.array("mr_td")?);
    let mr_config_id = Measurement48::new(r.array("mr_config_id")?);
    let mr_owner = Measurement48::new(r.array("mr_owner")?);
    let mr_owner_config = Measurement48::new(r.array("mr_owner_config")?);
    let rtmr0 = Measurement48::new(r.array("rtmr0")?);
    let rtmr1 = Measurement48::new(r.array("rtmr1")?);
    let rtmr2 = Measurement48::new(r.array("rtmr2")?);
    let rtmr3 = Measurement48::new(r.array("rtmr3")?);
    let report_data = ReportData::new(r.array("report_data")?);

    let (tee_tcb_svn_2, mr_servicetd) = if v15 {
        (
            Some(r.array("tee_tcb_svn_2")?),
            Some(Measurement48::new(r.array("mr_servicetd")?)),
        )
    } else {
        (None, None)
    };

    Ok(TdxReportBody {
        tee_tcb_svn,
        mr_seam,
        mr_signer_seam,
        seam_attributes,
        td_attributes,
        xfam,
        mr_td,
        mr_config_id,
        mr_owner,
        mr_owner_config,
        rtmr0,
        rtmr1,
        rtmr2,
        rtmr3,
        report_data,
        tee_tcb_svn_2,
        mr_servicetd,
    })
}

fn parse_signature_data(r: &mut Reader<'_>) -> Result<QuoteSignatureData> {
    let section = r.sized_region("quote signature section")?;
    let mut r = Reader::new(section);

    let signature = r.array("quote signature")?;
    let attestation_public_key = r.array("attestation public key")?;
    let qe_report_raw = r.take(SGX_REPORT_BODY_SIZE, "qe_report")?.to_vec();
    let qe_report = parse_sgx_report_body(&mut Reader::new(&qe_report_raw))?;
    let qe_report_signature = r.array("qe_report signature")?;

    let qe_auth_data_len = r.u16("qe_auth_data length")? as usize;
    let qe_auth_data = r.take(qe_auth_data_len, "qe_auth_data")?.to_vec();

    let cert_data_type = r.u16("cert_data type")?;
    if cert_data_type != CERT_DATA_TYPE_PCK_CHAIN {
        return Err(Error::UnsupportedCrypto {
            field: "cert_data type",
            got: cert_data_type as u32,
        });
    }
    let cert_data = r.sized_region("cert_data")?.to_vec();

    Ok(QuoteSignatureData {
        signature,
        attestation_public_key,
        qe_report,
        qe_report_raw,
        qe_report_signature,
        qe_auth_data,
        cert_data_type,
        cert_data,
    })
}
