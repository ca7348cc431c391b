//! Canned answers to every charge point initiated Core operation.

use crate::capture::Capture;
use crate::config::CentralSystemConfig;
use crate::fault::FaultInjector;
use chrono::{DateTime, TimeZone, Utc};
use ocpp_core::messages::*;
use ocpp_core::{
    ServerCoreEventHandler, ServerRemoteTriggerHandler, ServerSmartChargingHandler, SessionId,
};

/// Expiry handed out with every accepted authorization.
pub fn authorization_expiry() -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2018, 2, 1, 1, 1, 1).single()
}

/// Records each inbound request, then answers it with an accepting
/// confirmation unless the fault injector swallows it.
#[derive(Debug, Clone)]
pub struct CentralCoreHandler {
    capture: Capture,
    fault: FaultInjector,
    heartbeat_interval: i32,
    transaction_id: i32,
}

impl CentralCoreHandler {
    pub fn new(capture: Capture, fault: FaultInjector, config: &CentralSystemConfig) -> Self {
        Self {
            capture,
            fault,
            heartbeat_interval: config.heartbeat_interval,
            transaction_id: config.transaction_id,
        }
    }

    fn accepted_tag() -> IdTagInfo {
        IdTagInfo::new(AuthorizationStatus::Accepted)
    }
}

impl ServerCoreEventHandler for CentralCoreHandler {
    fn handle_authorize_request(
        &self,
        session: SessionId,
        request: AuthorizeRequest,
    ) -> Option<AuthorizeConfirmation> {
        tracing::debug!(%session, id_tag = %request.id_tag, "Handling Authorize");
        self.capture.record_request(request.into());

        let mut id_tag_info = Self::accepted_tag();
        id_tag_info.expiry_date = authorization_expiry();
        self.fault.consume_if_armed(AuthorizeConfirmation { id_tag_info })
    }

    fn handle_boot_notification_request(
        &self,
        session: SessionId,
        request: BootNotificationRequest,
    ) -> Option<BootNotificationConfirmation> {
        tracing::debug!(
            %session,
            vendor = %request.charge_point_vendor,
            model = %request.charge_point_model,
            "Handling BootNotification"
        );
        self.capture.record_request(request.into());

        let mut confirmation =
            BootNotificationConfirmation::new(RegistrationStatus::Accepted, Utc::now());
        // A bad interval still gets a confirmation out, just without the interval.
        if let Err(e) = confirmation.set_interval(self.heartbeat_interval) {
            tracing::warn!(%session, error = %e, "Could not set heartbeat interval");
        }
        self.fault.consume_if_armed(confirmation)
    }

    fn handle_data_transfer_request(
        &self,
        session: SessionId,
        request: DataTransferRequest,
    ) -> Option<DataTransferConfirmation> {
        tracing::debug!(%session, vendor_id = %request.vendor_id, "Handling DataTransfer");
        self.capture.record_request(request.into());
        self.fault.consume_if_armed(DataTransferConfirmation {
            status: DataTransferStatus::Accepted,
            data: None,
        })
    }

    fn handle_heartbeat_request(
        &self,
        session: SessionId,
        request: HeartbeatRequest,
    ) -> Option<HeartbeatConfirmation> {
        tracing::trace!(%session, "Handling Heartbeat");
        self.capture.record_request(request.into());
        self.fault.consume_if_armed(HeartbeatConfirmation {
            current_time: Utc::now(),
        })
    }

    fn handle_meter_values_request(
        &self,
        session: SessionId,
        request: MeterValuesRequest,
    ) -> Option<MeterValuesConfirmation> {
        tracing::debug!(%session, connector_id = request.connector_id, "Handling MeterValues");
        self.capture.record_request(request.into());
        self.fault.consume_if_armed(MeterValuesConfirmation {})
    }

    fn handle_start_transaction_request(
        &self,
        session: SessionId,
        request: StartTransactionRequest,
    ) -> Option<StartTransactionConfirmation> {
        tracing::debug!(%session, connector_id = request.connector_id, "Handling StartTransaction");
        self.capture.record_request(request.into());
        self.fault.consume_if_armed(StartTransactionConfirmation {
            id_tag_info: Self::accepted_tag(),
            transaction_id: self.transaction_id,
        })
    }

    fn handle_status_notification_request(
        &self,
        session: SessionId,
        request: StatusNotificationRequest,
    ) -> Option<StatusNotificationConfirmation> {
        tracing::debug!(%session, status = %request.status, "Handling StatusNotification");
        self.capture.record_request(request.into());
        self.fault.consume_if_armed(StatusNotificationConfirmation {})
    }

    fn handle_stop_transaction_request(
        &self,
        session: SessionId,
        request: StopTransactionRequest,
    ) -> Option<StopTransactionConfirmation> {
        tracing::debug!(
            %session,
            transaction_id = request.transaction_id,
            "Handling StopTransaction"
        );
        self.capture.record_request(request.into());
        self.fault.consume_if_armed(StopTransactionConfirmation::default())
    }
}

/// Smart charging profile registered with default behavior only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSmartCharging;

impl ServerSmartChargingHandler for PassthroughSmartCharging {}

/// Remote trigger profile registered with default behavior only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughRemoteTrigger;

impl ServerRemoteTriggerHandler for PassthroughRemoteTrigger {}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_core::{Action, Request};
    use uuid::Uuid;

    fn handler_with(config: &CentralSystemConfig) -> (CentralCoreHandler, Capture, FaultInjector) {
        let capture = Capture::new();
        let fault = FaultInjector::new();
        let handler = CentralCoreHandler::new(capture.clone(), fault.clone(), config);
        (handler, capture, fault)
    }

    #[test]
    fn test_boot_notification_is_accepted_with_interval() {
        let (handler, capture, _) = handler_with(&CentralSystemConfig::default());
        let confirmation = handler
            .handle_boot_notification_request(
                Uuid::new_v4(),
                BootNotificationRequest::new("Acme", "X1"),
            )
            .expect("Boot notification should be confirmed");

        assert_eq!(confirmation.status, RegistrationStatus::Accepted);
        assert_eq!(confirmation.interval, 1);
        assert_eq!(
            capture.last_request(),
            Some(Request::BootNotification(BootNotificationRequest::new("Acme", "X1")))
        );
    }

    #[test]
    fn test_invalid_interval_still_confirms() {
        let config = CentralSystemConfig {
            heartbeat_interval: 0,
            ..Default::default()
        };
        let (handler, _, _) = handler_with(&config);
        let confirmation = handler
            .handle_boot_notification_request(
                Uuid::new_v4(),
                BootNotificationRequest::new("Acme", "X1"),
            )
            .expect("Construction failure must not suppress the confirmation");
        assert_eq!(confirmation.status, RegistrationStatus::Accepted);
        assert_eq!(confirmation.interval, 0);
    }

    #[test]
    fn test_authorize_carries_fixed_expiry() {
        let (handler, _, _) = handler_with(&CentralSystemConfig::default());
        let confirmation = handler
            .handle_authorize_request(Uuid::new_v4(), AuthorizeRequest { id_tag: "abc".into() })
            .unwrap();
        assert_eq!(confirmation.id_tag_info.status, AuthorizationStatus::Accepted);
        assert_eq!(
            confirmation.id_tag_info.expiry_date.map(|d| d.to_rfc3339()),
            Some("2018-02-01T01:01:01+00:00".to_string())
        );
    }

    #[test]
    fn test_start_transaction_uses_configured_id() {
        let config = CentralSystemConfig {
            transaction_id: 42,
            ..Default::default()
        };
        let (handler, _, _) = handler_with(&config);
        let confirmation = handler
            .handle_start_transaction_request(
                Uuid::new_v4(),
                StartTransactionRequest {
                    connector_id: 1,
                    id_tag: "abc".into(),
                    meter_start: 0,
                    timestamp: Utc::now(),
                    reservation_id: None,
                },
            )
            .unwrap();
        assert_eq!(confirmation.transaction_id, 42);
        assert_eq!(confirmation.id_tag_info.status, AuthorizationStatus::Accepted);
    }

    #[test]
    fn test_armed_fault_suppresses_but_still_records() {
        let (handler, capture, fault) = handler_with(&CentralSystemConfig::default());
        fault.arm();

        let result = handler.handle_authorize_request(
            Uuid::new_v4(),
            AuthorizeRequest {
                id_tag: "abc".into(),
            },
        );
        assert!(result.is_none());
        assert!(!fault.is_armed());
        assert_eq!(capture.last_request().map(|r| r.action()), Some(Action::Authorize));

        // Next request is answered again
        let next = handler.handle_heartbeat_request(Uuid::new_v4(), HeartbeatRequest::default());
        assert!(next.is_some());
        assert_eq!(capture.last_request().map(|r| r.action()), Some(Action::Heartbeat));
    }

    #[test]
    fn test_handling_never_touches_confirmation_slot() {
        let (handler, capture, _) = handler_with(&CentralSystemConfig::default());
        handler.handle_data_transfer_request(
            Uuid::new_v4(),
            DataTransferRequest {
                vendor_id: "acme".into(),
                message_id: None,
                data: None,
            },
        );
        handler.handle_meter_values_request(
            Uuid::new_v4(),
            MeterValuesRequest {
                connector_id: 1,
                transaction_id: None,
                meter_value: vec![],
            },
        );
        assert!(capture.last_confirmation().is_none());
        assert_eq!(capture.last_request().map(|r| r.action()), Some(Action::MeterValues));
    }
}
