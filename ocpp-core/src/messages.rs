//! Typed OCPP 1.6 messages exchanged between a charge point and the central system.
//!
//! Every operation has a request payload and a confirmation payload. The closed
//! [`Request`] and [`Confirmation`] unions wrap them so callers match on variants
//! instead of inspecting types at runtime.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Declares a status-like enum serialized with its variant names.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(
    /// Outcome of an id tag lookup.
    AuthorizationStatus { Accepted, Blocked, Expired, Invalid, ConcurrentTx }
);
wire_enum!(RegistrationStatus { Accepted, Pending, Rejected });
wire_enum!(DataTransferStatus { Accepted, Rejected, UnknownMessageId, UnknownVendorId });
wire_enum!(AvailabilityType { Inoperative, Operative });
wire_enum!(AvailabilityStatus { Accepted, Rejected, Scheduled });
wire_enum!(ConfigurationStatus { Accepted, Rejected, RebootRequired, NotSupported });
wire_enum!(ClearCacheStatus { Accepted, Rejected });
wire_enum!(RemoteStartStopStatus { Accepted, Rejected });
wire_enum!(ResetType { Hard, Soft });
wire_enum!(ResetStatus { Accepted, Rejected });
wire_enum!(UnlockStatus { Unlocked, UnlockFailed, NotSupported });
wire_enum!(TriggerMessageStatus { Accepted, Rejected, NotImplemented });
wire_enum!(
    /// Message a central system may ask a charge point to send.
    TriggerMessageRequestType {
        BootNotification,
        DiagnosticsStatusNotification,
        FirmwareStatusNotification,
        Heartbeat,
        MeterValues,
        StatusNotification,
    }
);
wire_enum!(ChargePointStatus {
    Available,
    Preparing,
    Charging,
    SuspendedEVSE,
    SuspendedEV,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
});
wire_enum!(ChargePointErrorCode {
    ConnectorLockFailure,
    EVCommunicationError,
    GroundFailure,
    HighTemperature,
    InternalError,
    LocalListConflict,
    NoError,
    OtherError,
    OverCurrentFailure,
    OverVoltage,
    PowerMeterFailure,
    PowerSwitchFailure,
    ReaderFailure,
    ResetFailure,
    UnderVoltage,
    WeakSignal,
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTagInfo {
    pub status: AuthorizationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id_tag: Option<String>,
}

impl IdTagInfo {
    pub fn new(status: AuthorizationStatus) -> Self {
        Self {
            status,
            expiry_date: None,
            parent_id_tag: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValue {
    pub timestamp: DateTime<Utc>,
    pub sampled_value: Vec<SampledValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    pub key: String,
    pub readonly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

// --- Charge point initiated ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub id_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeConfirmation {
    pub id_tag_info: IdTagInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    pub charge_point_vendor: String,
    pub charge_point_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_point_serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

impl BootNotificationRequest {
    pub fn new(vendor: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            charge_point_vendor: vendor.into(),
            charge_point_model: model.into(),
            charge_point_serial_number: None,
            firmware_version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationConfirmation {
    pub current_time: DateTime<Utc>,
    /// Heartbeat interval in seconds.
    pub interval: i32,
    pub status: RegistrationStatus,
}

impl BootNotificationConfirmation {
    /// Creates a confirmation with no interval set yet.
    pub fn new(status: RegistrationStatus, current_time: DateTime<Utc>) -> Self {
        Self {
            current_time,
            interval: 0,
            status,
        }
    }

    /// Sets the heartbeat interval. Only strictly positive values are valid.
    pub fn set_interval(&mut self, interval: i32) -> Result<(), CoreError> {
        if interval <= 0 {
            return Err(CoreError::PropertyConstraint {
                field: "interval",
                value: interval.to_string(),
                reason: "must be a positive number of seconds",
            });
        }
        self.interval = interval;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferRequest {
    pub vendor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferConfirmation {
    pub status: DataTransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfirmation {
    pub current_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValuesRequest {
    pub connector_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    pub meter_value: Vec<MeterValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterValuesConfirmation {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionRequest {
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: i32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionConfirmation {
    pub id_tag_info: IdTagInfo,
    pub transaction_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotificationRequest {
    pub connector_id: u32,
    pub error_code: ChargePointErrorCode,
    pub status: ChargePointStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusNotificationConfirmation {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionRequest {
    pub transaction_id: i32,
    pub meter_stop: i32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionConfirmation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_tag_info: Option<IdTagInfo>,
}

// --- Central system initiated ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAvailabilityRequest {
    pub connector_id: u32,
    #[serde(rename = "type")]
    pub kind: AvailabilityType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAvailabilityConfirmation {
    pub status: AvailabilityStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeConfigurationRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeConfigurationConfirmation {
    pub status: ConfigurationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClearCacheRequest {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearCacheConfirmation {
    pub status: ClearCacheStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetConfigurationRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetConfigurationConfirmation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configuration_key: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_key: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransactionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<u32>,
    pub id_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStartTransactionConfirmation {
    pub status: RemoteStartStopStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopTransactionRequest {
    pub transaction_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStopTransactionConfirmation {
    pub status: RemoteStartStopStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetRequest {
    #[serde(rename = "type")]
    pub kind: ResetType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetConfirmation {
    pub status: ResetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConnectorRequest {
    pub connector_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockConnectorConfirmation {
    pub status: UnlockStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMessageRequest {
    pub requested_message: TriggerMessageRequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<u32>,
}

impl TriggerMessageRequest {
    pub fn new(requested_message: TriggerMessageRequestType) -> Self {
        Self {
            requested_message,
            connector_id: None,
        }
    }

    /// Targets a specific connector. Connector ids start at 1.
    pub fn set_connector_id(&mut self, connector_id: i32) -> Result<(), CoreError> {
        match u32::try_from(connector_id) {
            Ok(id) if id > 0 => {
                self.connector_id = Some(id);
                Ok(())
            }
            _ => Err(CoreError::PropertyConstraint {
                field: "connectorId",
                value: connector_id.to_string(),
                reason: "must be a positive connector id",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerMessageConfirmation {
    pub status: TriggerMessageStatus,
}

/// Generates [`Action`], [`Request`] and [`Confirmation`] from one table so the
/// three stay in lockstep.
macro_rules! ocpp_actions {
    ($($action:ident($request:ident, $confirmation:ident)),+ $(,)?) => {
        /// Every operation this crate models.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Action {
            $($action,)+
        }

        impl Action {
            pub const ALL: &'static [Action] = &[$(Action::$action,)+];

            /// Protocol name of the action, as carried in frames.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Action::$action => stringify!($action),)+
                }
            }
        }

        impl FromStr for Action {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($action) => Ok(Action::$action),)+
                    other => Err(CoreError::UnknownAction(other.to_string())),
                }
            }
        }

        #[derive(Debug, Clone, PartialEq)]
        pub enum Request {
            $($action($request),)+
        }

        impl Request {
            pub fn action(&self) -> Action {
                match self {
                    $(Request::$action(_) => Action::$action,)+
                }
            }

            pub fn to_payload(&self) -> serde_json::Result<Value> {
                match self {
                    $(Request::$action(inner) => serde_json::to_value(inner),)+
                }
            }

            pub fn from_payload(action: Action, payload: Value) -> serde_json::Result<Self> {
                match action {
                    $(Action::$action => serde_json::from_value(payload).map(Request::$action),)+
                }
            }
        }

        $(
            impl From<$request> for Request {
                fn from(inner: $request) -> Self {
                    Request::$action(inner)
                }
            }
        )+

        #[derive(Debug, Clone, PartialEq)]
        pub enum Confirmation {
            $($action($confirmation),)+
        }

        impl Confirmation {
            pub fn action(&self) -> Action {
                match self {
                    $(Confirmation::$action(_) => Action::$action,)+
                }
            }

            pub fn to_payload(&self) -> serde_json::Result<Value> {
                match self {
                    $(Confirmation::$action(inner) => serde_json::to_value(inner),)+
                }
            }

            pub fn from_payload(action: Action, payload: Value) -> serde_json::Result<Self> {
                match action {
                    $(Action::$action => serde_json::from_value(payload).map(Confirmation::$action),)+
                }
            }
        }

        $(
            impl From<$confirmation> for Confirmation {
                fn from(inner: $confirmation) -> Self {
                    Confirmation::$action(inner)
                }
            }
        )+
    };
}

ocpp_actions! {
    Authorize(AuthorizeRequest, AuthorizeConfirmation),
    BootNotification(BootNotificationRequest, BootNotificationConfirmation),
    DataTransfer(DataTransferRequest, DataTransferConfirmation),
    Heartbeat(HeartbeatRequest, HeartbeatConfirmation),
    MeterValues(MeterValuesRequest, MeterValuesConfirmation),
    StartTransaction(StartTransactionRequest, StartTransactionConfirmation),
    StatusNotification(StatusNotificationRequest, StatusNotificationConfirmation),
    StopTransaction(StopTransactionRequest, StopTransactionConfirmation),
    ChangeAvailability(ChangeAvailabilityRequest, ChangeAvailabilityConfirmation),
    ChangeConfiguration(ChangeConfigurationRequest, ChangeConfigurationConfirmation),
    ClearCache(ClearCacheRequest, ClearCacheConfirmation),
    GetConfiguration(GetConfigurationRequest, GetConfigurationConfirmation),
    RemoteStartTransaction(RemoteStartTransactionRequest, RemoteStartTransactionConfirmation),
    RemoteStopTransaction(RemoteStopTransactionRequest, RemoteStopTransactionConfirmation),
    Reset(ResetRequest, ResetConfirmation),
    UnlockConnector(UnlockConnectorRequest, UnlockConnectorConfirmation),
    TriggerMessage(TriggerMessageRequest, TriggerMessageConfirmation),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Confirmation {
    /// The status carried by the confirmation, if its shape has one.
    ///
    /// Confirmations built around an [`IdTagInfo`] report the authorization status.
    pub fn status(&self) -> Option<&'static str> {
        match self {
            Confirmation::Authorize(c) => Some(c.id_tag_info.status.as_str()),
            Confirmation::BootNotification(c) => Some(c.status.as_str()),
            Confirmation::DataTransfer(c) => Some(c.status.as_str()),
            Confirmation::StartTransaction(c) => Some(c.id_tag_info.status.as_str()),
            Confirmation::StopTransaction(c) => c.id_tag_info.as_ref().map(|i| i.status.as_str()),
            Confirmation::ChangeAvailability(c) => Some(c.status.as_str()),
            Confirmation::ChangeConfiguration(c) => Some(c.status.as_str()),
            Confirmation::ClearCache(c) => Some(c.status.as_str()),
            Confirmation::RemoteStartTransaction(c) => Some(c.status.as_str()),
            Confirmation::RemoteStopTransaction(c) => Some(c.status.as_str()),
            Confirmation::Reset(c) => Some(c.status.as_str()),
            Confirmation::UnlockConnector(c) => Some(c.status.as_str()),
            Confirmation::TriggerMessage(c) => Some(c.status.as_str()),
            Confirmation::Heartbeat(_)
            | Confirmation::MeterValues(_)
            | Confirmation::StatusNotification(_)
            | Confirmation::GetConfiguration(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_action_names_parse_back() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), *action);
        }
        assert_eq!(
            "FirmwareUpdate".parse::<Action>().unwrap_err(),
            CoreError::UnknownAction("FirmwareUpdate".to_string())
        );
    }

    #[test]
    fn test_boot_notification_payload_uses_protocol_field_names() {
        let request = Request::from(BootNotificationRequest::new("Acme", "X1"));
        let payload = request.to_payload().unwrap();
        assert_eq!(
            payload,
            json!({ "chargePointVendor": "Acme", "chargePointModel": "X1" })
        );
    }

    #[test]
    fn test_change_availability_type_field_is_renamed() {
        let payload = json!({ "connectorId": 2, "type": "Inoperative" });
        let request = Request::from_payload(Action::ChangeAvailability, payload).unwrap();
        match request {
            Request::ChangeAvailability(inner) => {
                assert_eq!(inner.connector_id, 2);
                assert_eq!(inner.kind, AvailabilityType::Inoperative);
            }
            other => panic!("Unexpected variant {:?}", other),
        }
    }

    #[test]
    fn test_payload_for_wrong_action_is_rejected() {
        let payload = json!({ "idTag": "abc" });
        assert!(Confirmation::from_payload(Action::Reset, payload).is_err());
    }

    #[test]
    fn test_set_interval_rejects_non_positive_values() {
        let now = Utc::now();
        let mut confirmation = BootNotificationConfirmation::new(RegistrationStatus::Accepted, now);
        assert!(confirmation.set_interval(0).is_err());
        assert!(confirmation.set_interval(-5).is_err());
        assert_eq!(confirmation.interval, 0, "Failed set must not change the field");
        confirmation.set_interval(300).unwrap();
        assert_eq!(confirmation.interval, 300);
    }

    #[test]
    fn test_trigger_message_connector_id_must_be_positive() {
        let mut request = TriggerMessageRequest::new(TriggerMessageRequestType::MeterValues);
        let err = request.set_connector_id(0).unwrap_err();
        assert!(matches!(
            err,
            CoreError::PropertyConstraint { field: "connectorId", .. }
        ));
        assert_eq!(request.connector_id, None);
        request.set_connector_id(3).unwrap();
        assert_eq!(request.connector_id, Some(3));
    }

    #[test]
    fn test_status_reports_embedded_status_strings() {
        let authorize = Confirmation::from(AuthorizeConfirmation {
            id_tag_info: IdTagInfo::new(AuthorizationStatus::Blocked),
        });
        assert_eq!(authorize.status(), Some("Blocked"));

        let unlock = Confirmation::from(UnlockConnectorConfirmation {
            status: UnlockStatus::UnlockFailed,
        });
        assert_eq!(unlock.status(), Some("UnlockFailed"));

        let stop = Confirmation::from(StopTransactionConfirmation::default());
        assert_eq!(stop.status(), None);

        let heartbeat = Confirmation::from(HeartbeatConfirmation {
            current_time: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        });
        assert_eq!(heartbeat.status(), None);
    }

    #[test]
    fn test_empty_payloads_serialize_as_objects() {
        let heartbeat = Request::from(HeartbeatRequest::default());
        assert_eq!(heartbeat.to_payload().unwrap(), json!({}));
        let parsed = Request::from_payload(Action::Heartbeat, json!({})).unwrap();
        assert_eq!(parsed, heartbeat);
    }
}
