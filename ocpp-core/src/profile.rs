//! Feature profiles: bundles of operations a server registers before it opens.

use crate::error::CoreError;
use crate::messages::*;
use crate::SessionId;
use std::fmt;
use std::sync::Arc;

/// Handles the charge point initiated operations of the Core profile.
///
/// Returning `None` tells the transport to send nothing back for that request.
pub trait ServerCoreEventHandler: Send + Sync {
    fn handle_authorize_request(
        &self,
        session: SessionId,
        request: AuthorizeRequest,
    ) -> Option<AuthorizeConfirmation>;

    fn handle_boot_notification_request(
        &self,
        session: SessionId,
        request: BootNotificationRequest,
    ) -> Option<BootNotificationConfirmation>;

    fn handle_data_transfer_request(
        &self,
        session: SessionId,
        request: DataTransferRequest,
    ) -> Option<DataTransferConfirmation>;

    fn handle_heartbeat_request(
        &self,
        session: SessionId,
        request: HeartbeatRequest,
    ) -> Option<HeartbeatConfirmation>;

    fn handle_meter_values_request(
        &self,
        session: SessionId,
        request: MeterValuesRequest,
    ) -> Option<MeterValuesConfirmation>;

    fn handle_start_transaction_request(
        &self,
        session: SessionId,
        request: StartTransactionRequest,
    ) -> Option<StartTransactionConfirmation>;

    fn handle_status_notification_request(
        &self,
        session: SessionId,
        request: StatusNotificationRequest,
    ) -> Option<StatusNotificationConfirmation>;

    fn handle_stop_transaction_request(
        &self,
        session: SessionId,
        request: StopTransactionRequest,
    ) -> Option<StopTransactionConfirmation>;
}

/// Smart charging operations are all central system initiated, so the server
/// side handler has nothing to implement.
pub trait ServerSmartChargingHandler: Send + Sync {}

/// Remote trigger operations are all central system initiated.
pub trait ServerRemoteTriggerHandler: Send + Sync {}

const CORE_INBOUND: &[Action] = &[
    Action::Authorize,
    Action::BootNotification,
    Action::DataTransfer,
    Action::Heartbeat,
    Action::MeterValues,
    Action::StartTransaction,
    Action::StatusNotification,
    Action::StopTransaction,
];

const CORE_OUTBOUND: &[Action] = &[
    Action::ChangeAvailability,
    Action::ChangeConfiguration,
    Action::ClearCache,
    Action::DataTransfer,
    Action::GetConfiguration,
    Action::RemoteStartTransaction,
    Action::RemoteStopTransaction,
    Action::Reset,
    Action::UnlockConnector,
];

const REMOTE_TRIGGER_OUTBOUND: &[Action] = &[Action::TriggerMessage];

/// A profile registered with a server.
#[derive(Clone)]
pub enum FeatureProfile {
    Core(Arc<dyn ServerCoreEventHandler>),
    SmartCharging(Arc<dyn ServerSmartChargingHandler>),
    RemoteTrigger(Arc<dyn ServerRemoteTriggerHandler>),
}

impl fmt::Debug for FeatureProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FeatureProfile").field(&self.name()).finish()
    }
}

impl FeatureProfile {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureProfile::Core(_) => "Core",
            FeatureProfile::SmartCharging(_) => "SmartCharging",
            FeatureProfile::RemoteTrigger(_) => "RemoteTrigger",
        }
    }

    /// Actions a peer may call on the server through this profile.
    pub fn inbound_actions(&self) -> &'static [Action] {
        match self {
            FeatureProfile::Core(_) => CORE_INBOUND,
            FeatureProfile::SmartCharging(_) | FeatureProfile::RemoteTrigger(_) => &[],
        }
    }

    /// Actions the server may send to a peer through this profile.
    pub fn outbound_actions(&self) -> &'static [Action] {
        match self {
            FeatureProfile::Core(_) => CORE_OUTBOUND,
            FeatureProfile::SmartCharging(_) => &[],
            FeatureProfile::RemoteTrigger(_) => REMOTE_TRIGGER_OUTBOUND,
        }
    }

    /// Routes a decoded request to the matching handler method.
    pub fn handle_request(
        &self,
        session: SessionId,
        request: Request,
    ) -> Result<Option<Confirmation>, CoreError> {
        let FeatureProfile::Core(handler) = self else {
            return Err(self.not_supported(request.action()));
        };

        let confirmation = match request {
            Request::Authorize(r) => handler
                .handle_authorize_request(session, r)
                .map(Confirmation::from),
            Request::BootNotification(r) => handler
                .handle_boot_notification_request(session, r)
                .map(Confirmation::from),
            Request::DataTransfer(r) => handler
                .handle_data_transfer_request(session, r)
                .map(Confirmation::from),
            Request::Heartbeat(r) => handler
                .handle_heartbeat_request(session, r)
                .map(Confirmation::from),
            Request::MeterValues(r) => handler
                .handle_meter_values_request(session, r)
                .map(Confirmation::from),
            Request::StartTransaction(r) => handler
                .handle_start_transaction_request(session, r)
                .map(Confirmation::from),
            Request::StatusNotification(r) => handler
                .handle_status_notification_request(session, r)
                .map(Confirmation::from),
            Request::StopTransaction(r) => handler
                .handle_stop_transaction_request(session, r)
                .map(Confirmation::from),
            other => return Err(self.not_supported(other.action())),
        };

        tracing::trace!(
            %session,
            profile = self.name(),
            answered = confirmation.is_some(),
            "Dispatched inbound request"
        );
        Ok(confirmation)
    }

    fn not_supported(&self, action: Action) -> CoreError {
        CoreError::NotSupported {
            profile: self.name(),
            action,
        }
    }
}
