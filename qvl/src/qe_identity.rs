//! Checking a quote's QE report against an Intel QE Identity descriptor.
//!
//! The descriptor is the `enclaveIdentity` JSON published by the Intel
//! Trusted Services API: a freshness window, the expected QE MRSIGNER and
//! masked attributes, an optional product id, and a list of TCB levels
//! keyed by ISVSVN. Signature validation of the descriptor itself is the
//! caller's job; this module only applies it.

use chrono::DateTime;
use serde::Deserialize;

use crate::{
    error::{Error, MalformedReason, Result},
    measurement::Measurement,
    quote::Quote,
    verify::now_ms,
};

/// TCB statuses accepted when the caller does not configure their own set.
pub const DEFAULT_ACCEPTED_TCB_STATUSES: &[&str] =
    &["UpToDate", "SWHardeningNeeded"];

/// An Intel QE Identity descriptor.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QeIdentity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
    /// RFC 3339.
    pub issue_date: String,
    /// RFC 3339.
    pub next_update: String,
    /// 32-byte hex.
    pub mrsigner: String,
    #[serde(default)]
    pub isvprodid: Option<u16>,
    /// 16-byte hex.
    pub attributes: String,
    /// 16-byte hex.
    pub attributes_mask: String,
    pub tcb_levels: Vec<QeTcbLevel>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QeTcbLevel {
    pub isvsvn: u16,
    #[serde(default)]
    pub tcb_date: Option<String>,
    pub tcb_status: String,
}

/// Configuration for [`crate::verify_qe_identity`].
#[derive(Debug, Default)]
pub struct QeIdentityOptions {
    /// Evaluation time in milliseconds since the Unix epoch; defaults to
    /// the wall clock.
    pub date_ms: Option<i64>,
    /// TCB statuses to accept; defaults to
    /// [`DEFAULT_ACCEPTED_TCB_STATUSES`].
    pub accept_statuses: Option<Vec<String>>,
}

impl QeIdentity {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| Error::Malformed {
            field: "qe identity",
            offset: 0,
            reason: MalformedReason::Json(err.to_string()),
        })
    }
}

fn parse_date_ms(s: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| Error::invalid("qe identity", 0, "bad RFC 3339 date"))
}

fn parse_hex<const N: usize>(s: &str, what: &'static str) -> Result<[u8; N]> {
    <[u8; N] as qvl_hex::FromHex>::from_hex(s)
        .map_err(|_| Error::invalid("qe identity", 0, what))
}

/// Check the quote's embedded QE report against `identity`.
pub(crate) fn check_qe_identity(
    quote: &Quote,
    identity: &QeIdentity,
    opts: &QeIdentityOptions,
) -> Result<()> {
    let time_ms = opts.date_ms.unwrap_or_else(now_ms);
    let issue_ms = parse_date_ms(&identity.issue_date)?;
    let next_ms = parse_date_ms(&identity.next_update)?;
    if !(issue_ms <= time_ms && time_ms < next_ms) {
        return Err(Error::qe_identity_mismatch(
            "descriptor is not current at the evaluation time",
        ));
    }

    let qe_report = &quote.signature.qe_report;

    let mrsigner =
        Measurement::new(parse_hex(&identity.mrsigner, "bad mrsigner hex")?);
    if qe_report.mr_signer != mrsigner {
        return Err(Error::qe_identity_mismatch(format!(
            "QE signer {} does not match expected {mrsigner}",
            qe_report.mr_signer,
        )));
    }

    let attributes: [u8; 16] =
        parse_hex(&identity.attributes, "bad attributes hex")?;
    let mask: [u8; 16] =
        parse_hex(&identity.attributes_mask, "bad attributesMask hex")?;
    let masked_match = qe_report
        .attributes
        .iter()
        .zip(&attributes)
        .zip(&mask)
        .all(|((got, want), m)| got & m == want & m);
    if !masked_match {
        return Err(Error::qe_identity_mismatch(
            "QE attributes do not match under the descriptor mask",
        ));
    }

    if let Some(isvprodid) = identity.isvprodid {
        if qe_report.isv_prod_id != isvprodid {
            return Err(Error::qe_identity_mismatch(format!(
                "QE product id {} does not match expected {isvprodid}",
                qe_report.isv_prod_id,
            )));
        }
    }

    // Select the greatest TCB level at or below the QE's ISVSVN.
    let level = identity
        .tcb_levels
        .iter()
        .filter(|level| level.isvsvn <= qe_report.isv_svn)
        .max_by_key(|level| level.isvsvn)
        .ok_or_else(|| {
            Error::qe_identity_mismatch(format!(
                "no TCB level at or below QE ISVSVN {}",
                qe_report.isv_svn,
            ))
        })?;

    let accepted: Vec<&str> = match &opts.accept_statuses {
        Some(statuses) => statuses.iter().map(String::as_str).collect(),
        None => DEFAULT_ACCEPTED_TCB_STATUSES.to_vec(),
    };
    if !accepted.contains(&level.tcb_status.as_str()) {
        return Err(Error::qe_identity_mismatch(format!(
            "TCB level {} has status '{}'",
            level.isvsvn, level.tcb_status,
        )));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::verify_qe_identity;

    const SGX_V3: &[u8] = include_bytes!("../test_data/sgx-v3.bin");
    const QE_IDENTITY_JSON: &str = include_str!("../test_data/qe-identity.json");

    /// 2025-06-15, inside the descriptor freshness window (2024..2034).
    const DATE_MS: i64 = 1_750_000_000_000;

    fn fixture_quote() -> Quote {
        Quote::parse(SGX_V3).unwrap()
    }

    fn opts() -> QeIdentityOptions {
        QeIdentityOptions {
            date_ms: Some(DATE_MS),
            accept_statuses: None,
        }
    }

    #[test]
    fn test_fixture_descriptor_matches() {
        verify_qe_identity(&fixture_quote(), QE_IDENTITY_JSON, &opts())
            .unwrap();
    }

    #[test]
    fn test_stale_descriptor() {
        let mut o = opts();
        // after nextUpdate (2034)
        o.date_ms = Some(2_200_000_000_000);
        assert!(matches!(
            verify_qe_identity(&fixture_quote(), QE_IDENTITY_JSON, &o)
                .unwrap_err(),
            Error::QeIdentityMismatch { .. },
        ));

        // before issueDate
        o.date_ms = Some(1_600_000_000_000);
        assert!(matches!(
            verify_qe_identity(&fixture_quote(), QE_IDENTITY_JSON, &o)
                .unwrap_err(),
            Error::QeIdentityMismatch { .. },
        ));
    }

    #[test]
    fn test_wrong_mrsigner() {
        let mut identity = QeIdentity::from_json(QE_IDENTITY_JSON).unwrap();
        identity.mrsigner = "00".repeat(32);
        assert!(matches!(
            check_qe_identity(&fixture_quote(), &identity, &opts())
                .unwrap_err(),
            Error::QeIdentityMismatch { .. },
        ));
    }

    #[test]
    fn test_wrong_isvprodid() {
        let mut identity = QeIdentity::from_json(QE_IDENTITY_JSON).unwrap();
        identity.isvprodid = Some(99);
        assert!(check_qe_identity(&fixture_quote(), &identity, &opts())
            .is_err());

        // unspecified product id is not compared
        identity.isvprodid = None;
        check_qe_identity(&fixture_quote(), &identity, &opts()).unwrap();
    }

    #[test]
    fn test_tcb_level_selection() {
        // no level at or below the QE ISVSVN
        let mut identity = QeIdentity::from_json(QE_IDENTITY_JSON).unwrap();
        identity.tcb_levels.retain(|level| level.isvsvn > 8);
        assert!(check_qe_identity(&fixture_quote(), &identity, &opts())
            .is_err());

        // the matching level's status is not accepted
        let mut o = opts();
        o.accept_statuses = Some(vec!["SWHardeningNeeded".to_owned()]);
        assert!(matches!(
            verify_qe_identity(&fixture_quote(), QE_IDENTITY_JSON, &o)
                .unwrap_err(),
            Error::QeIdentityMismatch { .. },
        ));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            QeIdentity::from_json("{").unwrap_err(),
            Error::Malformed { .. },
        ));
        assert!(QeIdentity::from_json("{}").is_err());
    }
}
