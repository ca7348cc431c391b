use crate::capture::Capture;
use crate::config::CentralSystemConfig;
use crate::dispatcher::{OutboundDispatcher, PendingConfirmation};
use crate::error::CentralError;
use crate::fault::FaultInjector;
use crate::handler::{CentralCoreHandler, PassthroughRemoteTrigger, PassthroughSmartCharging};
use crate::session::SessionTracker;
use ocpp_core::messages::*;
use ocpp_core::{
    Action, Confirmation, FeatureProfile, Request, Server, ServerFactory, TransportKind,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// A scripted OCPP central system for driving a real charge point in tests.
///
/// Construct one per test, [`start`](Self::start) it on the encoding under
/// test, connect the charge point, then assert with the `has_handled_*` and
/// `has_received_*` predicates. Outbound `send_*` calls return a
/// [`PendingConfirmation`] to await before asserting on what came back.
pub struct FakeCentralSystem {
    config: CentralSystemConfig,
    factory: Arc<dyn ServerFactory>,
    capture: Capture,
    fault: FaultInjector,
    sessions: SessionTracker,
    dispatcher: OutboundDispatcher,
    handler: Arc<CentralCoreHandler>,
    server: Mutex<Option<Arc<dyn Server>>>,
    // Serializes start and stop.
    lifecycle: tokio::sync::Mutex<()>,
}

impl FakeCentralSystem {
    pub fn new(config: CentralSystemConfig, factory: Arc<dyn ServerFactory>) -> Self {
        let capture = Capture::new();
        let fault = FaultInjector::new();
        let sessions = SessionTracker::new(capture.clone());
        let dispatcher = OutboundDispatcher::new(sessions.clone(), capture.clone());
        let handler = Arc::new(CentralCoreHandler::new(capture.clone(), fault.clone(), &config));
        Self {
            config,
            factory,
            capture,
            fault,
            sessions,
            dispatcher,
            handler,
            server: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &CentralSystemConfig {
        &self.config
    }

    fn lock_server(&self) -> MutexGuard<'_, Option<Arc<dyn Server>>> {
        self.server.lock().expect("Server slot lock poisoned")
    }

    fn current_server(&self) -> Option<Arc<dyn Server>> {
        self.lock_server().clone()
    }

    /// Encoding of the running server, if started.
    pub fn running_kind(&self) -> Option<TransportKind> {
        self.lock_server().as_ref().map(|server| server.kind())
    }

    /// Opens a server for `kind`. Already running on `kind` is a no-op; running
    /// on the other encoding closes that server first.
    pub async fn start(&self, kind: TransportKind) -> Result<(), CentralError> {
        let _lifecycle = self.lifecycle.lock().await;

        let previous = {
            let mut slot = self.lock_server();
            if slot.as_ref().is_some_and(|server| server.kind() == kind) {
                tracing::debug!(?kind, "Already running");
                return Ok(());
            }
            slot.take()
        };
        if let Some(previous) = previous {
            tracing::info!(from = ?previous.kind(), to = ?kind, "Switching transport");
            previous.close().await;
        }

        let server = self.factory.build(kind, FeatureProfile::Core(self.handler.clone()));
        server.add_feature_profile(FeatureProfile::SmartCharging(Arc::new(
            PassthroughSmartCharging,
        )));
        server.add_feature_profile(FeatureProfile::RemoteTrigger(Arc::new(
            PassthroughRemoteTrigger,
        )));

        let port = self.config.port_for(kind);
        server
            .open(&self.config.host, port, Arc::new(self.sessions.clone()))
            .await?;
        *self.lock_server() = Some(server);
        tracing::info!(?kind, host = %self.config.host, port, "Fake central system started");
        Ok(())
    }

    /// Closes the running server, if any.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let server = self.lock_server().take();
        if let Some(server) = server {
            server.close().await;
            tracing::info!(kind = ?server.kind(), "Fake central system stopped");
        }
    }

    pub fn connected(&self) -> bool {
        self.sessions.is_connected()
    }

    pub fn connected_identifier(&self) -> Option<String> {
        self.sessions.identifier()
    }

    /// Drops the connected charge point from the server side.
    pub async fn client_lost(&self) {
        if let Some(server) = self.current_server() {
            self.sessions.force_disconnect(server.as_ref()).await;
        }
    }

    /// The next inbound request is recorded but gets no confirmation.
    pub fn arm_failure_on_next_request(&self) {
        self.fault.arm();
    }

    pub fn is_failure_armed(&self) -> bool {
        self.fault.is_armed()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.capture.last_request()
    }

    pub fn last_confirmation(&self) -> Option<Confirmation> {
        self.capture.last_confirmation()
    }

    fn handled(&self, matches: impl FnOnce(&Request) -> bool) -> bool {
        self.capture.with_request(|request| request.is_some_and(matches))
    }

    fn received(&self, action: Action) -> bool {
        self.capture
            .with_confirmation(|confirmation| confirmation.is_some_and(|c| c.action() == action))
    }

    fn received_with_status(&self, action: Action, status: &str) -> bool {
        self.capture.with_confirmation(|confirmation| {
            confirmation.is_some_and(|c| c.action() == action && c.status() == Some(status))
        })
    }

    pub fn has_handled_authorize_request(&self) -> bool {
        self.handled(|r| matches!(r, Request::Authorize(_)))
    }

    pub fn has_handled_boot_notification(&self, vendor: &str, model: &str) -> bool {
        self.handled(|r| {
            matches!(r, Request::BootNotification(boot)
                if boot.charge_point_vendor == vendor && boot.charge_point_model == model)
        })
    }

    pub fn has_handled_data_transfer_request(&self) -> bool {
        self.handled(|r| matches!(r, Request::DataTransfer(_)))
    }

    pub fn has_handled_heartbeat(&self) -> bool {
        self.handled(|r| matches!(r, Request::Heartbeat(_)))
    }

    pub fn has_handled_meter_values_request(&self) -> bool {
        self.handled(|r| matches!(r, Request::MeterValues(_)))
    }

    pub fn has_handled_start_transaction_request(&self) -> bool {
        self.handled(|r| matches!(r, Request::StartTransaction(_)))
    }

    pub fn has_handled_status_notification_request(&self) -> bool {
        self.handled(|r| matches!(r, Request::StatusNotification(_)))
    }

    pub fn has_handled_stop_transaction_request(&self) -> bool {
        self.handled(|r| matches!(r, Request::StopTransaction(_)))
    }

    pub fn has_received_change_availability_confirmation(&self, status: &str) -> bool {
        self.received_with_status(Action::ChangeAvailability, status)
    }

    pub fn has_received_change_configuration_confirmation(&self) -> bool {
        self.received(Action::ChangeConfiguration)
    }

    pub fn has_received_clear_cache_confirmation(&self) -> bool {
        self.received(Action::ClearCache)
    }

    pub fn has_received_data_transfer_confirmation(&self) -> bool {
        self.received(Action::DataTransfer)
    }

    pub fn has_received_get_configuration_confirmation(&self) -> bool {
        self.received(Action::GetConfiguration)
    }

    pub fn has_received_remote_start_transaction_confirmation(&self, status: &str) -> bool {
        self.received_with_status(Action::RemoteStartTransaction, status)
    }

    pub fn has_received_remote_stop_transaction_confirmation(&self, status: &str) -> bool {
        self.received_with_status(Action::RemoteStopTransaction, status)
    }

    pub fn has_received_reset_confirmation(&self, status: &str) -> bool {
        self.received_with_status(Action::Reset, status)
    }

    pub fn has_received_unlock_connector_confirmation(&self, status: &str) -> bool {
        self.received_with_status(Action::UnlockConnector, status)
    }

    pub fn has_received_trigger_message_confirmation(&self, status: &str) -> bool {
        self.received_with_status(Action::TriggerMessage, status)
    }

    fn dispatch(&self, request: impl Into<Request>) -> Result<PendingConfirmation, CentralError> {
        let request = request.into();
        let Some(server) = self.current_server() else {
            tracing::warn!(action = %request.action(), "Cannot send before the server is started");
            return Err(CentralError::NoActiveSession);
        };
        self.dispatcher.send(&server, request)
    }

    pub fn send_change_availability_request(
        &self,
        connector_id: u32,
        kind: AvailabilityType,
    ) -> Result<PendingConfirmation, CentralError> {
        self.dispatch(ChangeAvailabilityRequest { connector_id, kind })
    }

    pub fn send_change_configuration_request(
        &self,
        key: &str,
        value: &str,
    ) -> Result<PendingConfirmation, CentralError> {
        self.dispatch(ChangeConfigurationRequest {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn send_clear_cache_request(&self) -> Result<PendingConfirmation, CentralError> {
        self.dispatch(ClearCacheRequest::default())
    }

    pub fn send_data_transfer_request(
        &self,
        vendor_id: &str,
        message_id: &str,
        data: &str,
    ) -> Result<PendingConfirmation, CentralError> {
        self.dispatch(DataTransferRequest {
            vendor_id: vendor_id.to_string(),
            message_id: Some(message_id.to_string()),
            data: Some(data.to_string()),
        })
    }

    pub fn send_get_configuration_request<I, K>(
        &self,
        keys: I,
    ) -> Result<PendingConfirmation, CentralError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.dispatch(GetConfigurationRequest {
            key: keys.into_iter().map(Into::into).collect(),
        })
    }

    pub fn send_remote_start_transaction_request(
        &self,
        connector_id: u32,
        id_tag: &str,
    ) -> Result<PendingConfirmation, CentralError> {
        self.dispatch(RemoteStartTransactionRequest {
            connector_id: Some(connector_id),
            id_tag: id_tag.to_string(),
        })
    }

    pub fn send_remote_stop_transaction_request(
        &self,
        transaction_id: i32,
    ) -> Result<PendingConfirmation, CentralError> {
        self.dispatch(RemoteStopTransactionRequest { transaction_id })
    }

    pub fn send_reset_request(&self, kind: ResetType) -> Result<PendingConfirmation, CentralError> {
        self.dispatch(ResetRequest { kind })
    }

    pub fn send_unlock_connector_request(
        &self,
        connector_id: u32,
    ) -> Result<PendingConfirmation, CentralError> {
        self.dispatch(UnlockConnectorRequest { connector_id })
    }

    /// Asks the charge point to send `requested`. An invalid connector id is
    /// logged and the request goes out without one.
    pub fn send_trigger_message(
        &self,
        requested: TriggerMessageRequestType,
        connector_id: Option<i32>,
    ) -> Result<PendingConfirmation, CentralError> {
        let mut request = TriggerMessageRequest::new(requested);
        if let Some(connector_id) = connector_id {
            if let Err(e) = request.set_connector_id(connector_id) {
                tracing::warn!(error = %e, "Sending trigger message without a connector id");
            }
        }
        self.dispatch(request)
    }
}
