//! A fake OCPP central system for conformance testing charge points.
//!
//! [`FakeCentralSystem`] answers inbound requests with canned confirmations,
//! lets tests send requests to the connected charge point, and remembers the
//! last request and confirmation so tests can assert on them. Arming the fault
//! injector makes the next inbound request go unanswered.

pub mod capture;
pub mod central;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fault;
pub mod handler;
pub mod session;

pub use capture::Capture;
pub use central::FakeCentralSystem;
pub use config::CentralSystemConfig;
pub use dispatcher::{OutboundDispatcher, PendingConfirmation};
pub use error::CentralError;
pub use fault::FaultInjector;
pub use handler::{CentralCoreHandler, PassthroughRemoteTrigger, PassthroughSmartCharging};
pub use session::{SessionState, SessionTracker};
