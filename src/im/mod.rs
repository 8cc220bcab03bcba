//! Interaction Model: message codec, path resolution, ACL, subscriptions.
//!
//! The exchange layer decodes IM frames into the message structs here and
//! hands them to an [`InteractionHandler`]; [`Router`] is the production
//! handler, resolving paths against the device model behind the ACL gate.

mod acl;
mod messages;
mod path;
mod router;
mod status;
mod subscriptions;

pub use acl::{
    check_access, required_privilege, AccessContext, AclEntry, AclTarget, Operation, Privilege,
};
pub use messages::{
    AttributeData, AttributeReport, AttributeStatus, AttributeWrite, CommandData, CommandStatus,
    InvokeRequestMsg, InvokeResponseEntry, InvokeResponseMsg, ReadRequestMsg, ReportDataMsg,
    StatusResponseMsg, SubscribeRequestMsg, SubscribeResponseMsg, TimedRequestMsg,
    WriteRequestMsg, WriteResponseMsg,
};
pub use path::{AttributePath, CommandPath, ConcretePath};
pub use router::{expand_path, snapshot_values, Router};
pub use status::StatusCode;
pub use subscriptions::{Subscription, SubscriptionManager};

/// Subscribe handling produces two messages: the primed report sent first
/// and the SubscribeResponse released once the client acknowledges it.
#[derive(Debug)]
pub struct SubscribeOutcome {
    /// Primed ReportData carrying current values.
    pub primed_report: ReportDataMsg,
    /// SubscribeResponse with the granted id and interval.
    pub response: SubscribeResponseMsg,
}

/// What the exchange layer dispatches decoded IM requests into.
pub trait InteractionHandler {
    /// Handle a ReadRequest.
    fn on_read(&mut self, request: ReadRequestMsg) -> ReportDataMsg;
    /// Handle a WriteRequest.
    fn on_write(&mut self, request: WriteRequestMsg) -> WriteResponseMsg;
    /// Handle an InvokeRequest.
    fn on_invoke(&mut self, request: InvokeRequestMsg) -> InvokeResponseMsg;
    /// Handle a SubscribeRequest.
    fn on_subscribe(&mut self, request: SubscribeRequestMsg) -> SubscribeOutcome;
}
