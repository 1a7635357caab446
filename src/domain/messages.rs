//! Remote authorization payloads exchanged with the EMP side.
//!
//! Only the fields the pipeline validates and the audit trail summarises are
//! modelled here; the wire codec belongs to the transport.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// How the driver was identified towards the EMP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identification {
    #[serde(rename = "RFIDMifareFamilyIdentification")]
    RfidMifareFamily {
        #[serde(rename = "UID")]
        uid: String,
    },
    #[serde(rename = "RemoteIdentification")]
    Remote {
        #[serde(rename = "EvcoID")]
        evco_id: String,
    },
    #[serde(rename = "PlugAndChargeIdentification")]
    PlugAndCharge {
        #[serde(rename = "EvcoID")]
        evco_id: String,
    },
    #[serde(rename = "QRCodeIdentification")]
    QrCode {
        #[serde(rename = "EvcoID")]
        evco_id: String,
        #[serde(rename = "HashedPIN", default, skip_serializing_if = "Option::is_none")]
        hashed_pin: Option<String>,
    },
}

impl Identification {
    /// The token value regardless of identification kind.
    pub fn token(&self) -> &str {
        match self {
            Self::RfidMifareFamily { uid } => uid,
            Self::Remote { evco_id }
            | Self::PlugAndCharge { evco_id }
            | Self::QrCode { evco_id, .. } => evco_id,
        }
    }
}

fn validate_identification(identification: &Identification) -> Result<(), ValidationError> {
    if identification.token().trim().is_empty() {
        let mut err = ValidationError::new("identification");
        err.message = Some("identification token is required".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AuthorizeRemoteStartRequest {
    #[serde(rename = "SessionID")]
    #[validate(length(min = 1, max = 36, message = "session_id is required"))]
    pub session_id: String,
    #[serde(rename = "ProviderID")]
    #[validate(length(min = 1, max = 16, message = "provider_id is required"))]
    pub provider_id: String,
    #[serde(rename = "EVSEID")]
    #[validate(length(min = 1, max = 48, message = "evse_id is required"))]
    pub evse_id: String,
    #[serde(rename = "Identification")]
    #[validate(custom(function = "validate_identification"))]
    pub identification: Identification,
    #[serde(rename = "PartnerProductID", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100))]
    pub partner_product_id: Option<String>,
    #[serde(rename = "CPOPartnerSessionID", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 250))]
    pub cpo_partner_session_id: Option<String>,
    #[serde(rename = "EMPPartnerSessionID", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 250))]
    pub emp_partner_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AuthorizeRemoteStopRequest {
    #[serde(rename = "SessionID")]
    #[validate(length(min = 1, max = 36, message = "session_id is required"))]
    pub session_id: String,
    #[serde(rename = "ProviderID")]
    #[validate(length(min = 1, max = 16, message = "provider_id is required"))]
    pub provider_id: String,
    #[serde(rename = "EVSEID")]
    #[validate(length(min = 1, max = 48, message = "evse_id is required"))]
    pub evse_id: String,
    #[serde(rename = "CPOPartnerSessionID", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 250))]
    pub cpo_partner_session_id: Option<String>,
    #[serde(rename = "EMPPartnerSessionID", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 250))]
    pub emp_partner_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AuthorizeRemoteReservationStartRequest {
    #[serde(rename = "SessionID")]
    #[validate(length(min = 1, max = 36, message = "session_id is required"))]
    pub session_id: String,
    #[serde(rename = "ProviderID")]
    #[validate(length(min = 1, max = 16, message = "provider_id is required"))]
    pub provider_id: String,
    #[serde(rename = "EVSEID")]
    #[validate(length(min = 1, max = 48, message = "evse_id is required"))]
    pub evse_id: String,
    #[serde(rename = "Identification")]
    #[validate(custom(function = "validate_identification"))]
    pub identification: Identification,
    #[serde(rename = "PartnerProductID", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100))]
    pub partner_product_id: Option<String>,
    /// Reservation length in minutes.
    #[serde(rename = "Duration", default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 1440, message = "duration must be 1–1440 minutes"))]
    pub duration: Option<u32>,
    #[serde(rename = "CPOPartnerSessionID", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 250))]
    pub cpo_partner_session_id: Option<String>,
    #[serde(rename = "EMPPartnerSessionID", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 250))]
    pub emp_partner_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AuthorizeRemoteReservationStopRequest {
    #[serde(rename = "SessionID")]
    #[validate(length(min = 1, max = 36, message = "session_id is required"))]
    pub session_id: String,
    #[serde(rename = "ProviderID")]
    #[validate(length(min = 1, max = 16, message = "provider_id is required"))]
    pub provider_id: String,
    #[serde(rename = "EVSEID")]
    #[validate(length(min = 1, max = 48, message = "evse_id is required"))]
    pub evse_id: String,
    #[serde(rename = "CPOPartnerSessionID", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 250))]
    pub cpo_partner_session_id: Option<String>,
    #[serde(rename = "EMPPartnerSessionID", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 250))]
    pub emp_partner_session_id: Option<String>,
}

/// Protocol status code attached to an acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// Three digit code, `"000"` meaning success.
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "AdditionalInfo", default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

impl StatusCode {
    pub const SUCCESS: &'static str = "000";

    pub fn success() -> Self {
        Self {
            code: Self::SUCCESS.to_string(),
            description: None,
            additional_info: None,
        }
    }

    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: Some(description.into()),
            additional_info: None,
        }
    }
}

/// Confirmation returned for every remote command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    #[serde(rename = "Result")]
    pub result: bool,
    #[serde(rename = "StatusCode")]
    pub status_code: StatusCode,
    #[serde(rename = "SessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "CPOPartnerSessionID", default, skip_serializing_if = "Option::is_none")]
    pub cpo_partner_session_id: Option<String>,
    #[serde(rename = "EMPPartnerSessionID", default, skip_serializing_if = "Option::is_none")]
    pub emp_partner_session_id: Option<String>,
}

impl Acknowledgement {
    pub fn accepted(session_id: impl Into<String>) -> Self {
        Self {
            result: true,
            status_code: StatusCode::success(),
            session_id: Some(session_id.into()),
            cpo_partner_session_id: None,
            emp_partner_session_id: None,
        }
    }

    pub fn rejected(session_id: impl Into<String>, status_code: StatusCode) -> Self {
        Self {
            result: false,
            status_code,
            session_id: Some(session_id.into()),
            cpo_partner_session_id: None,
            emp_partner_session_id: None,
        }
    }
}
