pub mod accounts;
pub mod activities;
pub mod domain;
pub mod dues;
pub mod error;
pub mod gate;
pub mod memory;
pub mod ports;
pub mod requests;
pub mod routes;
pub mod session;
pub mod stats;
pub mod uploads;

#[cfg(test)]
mod test_support;

pub use domain::{
    Activity, ActivityInput, Capability, DashboardStats, Identity, Invoice, InvoiceFilter,
    InvoiceStatus, InvoiceWithResident, Notification, Profile, ProfilePatch, Role, ServiceCategory,
    ServiceRequest, ServiceRequestFilter, ServiceRequestWithResident, ServiceStatus, Session,
};
pub use error::{PortalError, PortalResult};
pub use gate::{AuthorizationGate, Caller, GateDecision, GateDenied, GateTier};
pub use ports::{
    AuthEvent, DatabaseService, IdentityProvider, ObjectStorage, PortError, PortResult,
};
pub use session::{SessionContext, SessionSnapshot};
