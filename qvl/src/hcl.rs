//! Azure HCL (Host Compatibility Layer) attestation envelopes.
//!
//! On Azure confidential VMs the vTPM attestation key is bound into the
//! hardware quote indirectly: the HCL writes a JSON "variable data" blob
//! containing the AK public key, and the hardware report commits to
//! `sha256(variable_data)` in the first 32 bytes of its `report_data`.
//! This module parses the envelope, extracts the AK public key and
//! user-data claims, and checks that hash binding.
//!
//! Layout: a 32-byte attestation header, a 1184-byte hardware-report
//! region embedding a 1024-byte TD report, a 20-byte IGVM request header,
//! then the variable data itself.

use base64::Engine;
use ring::digest;
use serde::Deserialize;

use crate::{
    codec::Reader,
    error::{Error, MalformedReason, Result},
    quote::Quote,
};

pub const HCL_ATTESTATION_HEADER_SIZE: usize = 32;
pub const HCL_HW_REPORT_SIZE: usize = 1184;
pub const TD_REPORT_SIZE: usize = 1024;
pub const IGVM_REQUEST_HEADER_SIZE: usize = 20;

/// `report_type` for an SEV-SNP hardware report (not supported here).
pub const HCL_REPORT_TYPE_SNP: u32 = 2;
/// `report_type` for a TDX hardware report.
pub const HCL_REPORT_TYPE_TDX: u32 = 4;
/// The only supported `report_data_hash_type`: SHA-256.
pub const HCL_HASH_TYPE_SHA256: u32 = 1;

const HCL_MAGIC: &[u8; 4] = b"HCLA";
/// The claim identifier of the vTPM attestation key.
const AK_PUB_KEY_ID: &str = "HCLAkPub";

/// The JSON claims carried in `variable_data`.
#[derive(Clone, Debug, Default, Deserialize)]
struct RuntimeData {
    #[serde(default)]
    keys: Vec<RuntimeKey>,
    #[serde(default, rename = "user-data")]
    user_data: Option<String>,
}

/// One key claim: either legacy (`key_id` + base64 `value`) or JWK
/// (`kid` + base64url `n`/`e`).
#[derive(Clone, Debug, Default, Deserialize)]
#[allow(dead_code)]
struct RuntimeKey {
    #[serde(default, alias = "key_id")]
    kid: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    kty: Option<String>,
}

/// A parsed HCL attestation envelope (TDX flavor).
#[derive(Clone, Debug)]
pub struct HclReport {
    pub version: u32,
    pub report_size: u32,
    pub request_type: u32,
    pub status: u32,
    pub report_type: u32,
    pub report_data_hash_type: u32,
    td_report: Vec<u8>,
    variable_data: Vec<u8>,
    runtime: RuntimeData,
}

impl HclReport {
    /// Parse an HCL attestation blob. Only TDX hardware reports
    /// (`report_type == 4`) are supported.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);

        let magic = r.array::<4>("hcl header")?;
        if &magic != HCL_MAGIC {
            return Err(Error::invalid("hcl header", 0, "bad HCLA magic"));
        }
        let version = r.u32("hcl version")?;
        let report_size = r.u32("hcl report size")?;
        let request_type = r.u32("hcl request type")?;
        let status = r.u32("hcl status")?;
        r.skip(12, "hcl header reserved")?;

        let hw_report = r.take(HCL_HW_REPORT_SIZE, "hcl hardware report")?;
        let td_report = hw_report[..TD_REPORT_SIZE].to_vec();

        r.skip(4, "igvm data size")?;
        r.skip(4, "igvm version")?;
        let report_type = r.u32("igvm report type")?;
        if report_type != HCL_REPORT_TYPE_TDX {
            return Err(Error::UnsupportedReportType { got: report_type });
        }
        let report_data_hash_type = r.u32("igvm report data hash type")?;
        if report_data_hash_type != HCL_HASH_TYPE_SHA256 {
            return Err(Error::UnsupportedCrypto {
                field: "hcl report data hash type",
                got: report_data_hash_type,
            });
        }
        let variable_data_offset = r.offset() + 4;
        let variable_data = r.sized_region("hcl variable data")?.to_vec();

        let json = std::str::from_utf8(&variable_data).map_err(|_| {
            Error::invalid(
                "hcl variable data",
                variable_data_offset,
                "not valid UTF-8",
            )
        })?;
        let runtime: RuntimeData =
            serde_json::from_str(json).map_err(|err| Error::Malformed {
                field: "hcl variable data",
                offset: variable_data_offset,
                reason: MalformedReason::Json(err.to_string()),
            })?;

        Ok(Self {
            version,
            report_size,
            request_type,
            status,
            report_type,
            report_data_hash_type,
            td_report,
            variable_data,
            runtime,
        })
    }

    /// The embedded 1024-byte TD report.
    pub fn td_report(&self) -> &[u8] {
        &self.td_report
    }

    /// The raw variable data bytes (UTF-8 JSON).
    pub fn variable_data(&self) -> &[u8] {
        &self.variable_data
    }

    /// The vTPM attestation public key material from the `HCLAkPub` claim:
    /// the base64-decoded `value` (legacy form) or the base64url-decoded
    /// RSA modulus `n` (JWK form).
    pub fn ak_pub(&self) -> Result<Vec<u8>> {
        let invalid = |what| Error::invalid("hcl variable data", 0, what);

        let key = self
            .runtime
            .keys
            .iter()
            .find(|key| key.kid.as_deref() == Some(AK_PUB_KEY_ID))
            .ok_or_else(|| invalid("no HCLAkPub key claim"))?;

        if let Some(value) = &key.value {
            return base64::engine::general_purpose::STANDARD
                .decode(value)
                .map_err(|_| invalid("HCLAkPub value is not valid base64"));
        }
        if let Some(n) = &key.n {
            return base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(n)
                .map_err(|_| invalid("HCLAkPub modulus is not valid base64url"));
        }
        Err(invalid("HCLAkPub claim carries no key material"))
    }

    /// The `user-data` claim as the hex string it is transported as.
    pub fn user_data(&self) -> Result<&str> {
        self.runtime
            .user_data
            .as_deref()
            .ok_or_else(|| Error::invalid(
                "hcl variable data",
                0,
                "no user-data claim",
            ))
    }

    /// The `user-data` claim, hex-decoded.
    pub fn user_data_bytes(&self) -> Result<Vec<u8>> {
        qvl_hex::decode(self.user_data()?).map_err(|_| {
            Error::invalid("hcl variable data", 0, "user-data is not valid hex")
        })
    }

    /// SHA-256 over the raw variable data bytes. This is the value a
    /// genuine hardware report commits to in its `report_data`.
    pub fn variable_data_hash(&self) -> [u8; 32] {
        let digest = digest::digest(&digest::SHA256, &self.variable_data);
        // infallible: SHA-256 output is exactly 32 bytes
        <[u8; 32]>::try_from(digest.as_ref()).unwrap()
    }

    /// Whether `report_data` (from a hardware quote) commits to this
    /// envelope's variable data: its first 32 bytes must equal
    /// [`Self::variable_data_hash`].
    pub fn verify_report_data_binding(&self, report_data: &[u8]) -> bool {
        report_data.len() >= 32
            && report_data[..32] == self.variable_data_hash()
    }

    /// Check the binding against a parsed TDX quote, surfacing the typed
    /// error on mismatch.
    pub fn verify_quote_binding(&self, quote: &Quote) -> Result<()> {
        let report_data = quote.body.report_data();
        if !self.verify_report_data_binding(&report_data.0) {
            return Err(Error::HclBindingMismatch);
        }
        Ok(())
    }
}
