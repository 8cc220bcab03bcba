//! Resolves Interaction Model requests against the device model.
//!
//! The router expands wildcard paths over the device catalog, gates every
//! resolved path through the ACL, and maps device status codes into
//! attribute and command reports. It holds borrows for exactly one
//! interaction; the orchestrator rebuilds it per dispatched frame.

use std::collections::BTreeMap;

use crate::device::{CatalogItem, DeviceModel};
use crate::tlv::TlvValue;

use super::acl::{check_access, required_privilege, AccessContext, AclEntry, Operation};
use super::messages::{
    AttributeData, AttributeReport, AttributeStatus, CommandStatus, InvokeRequestMsg,
    InvokeResponseEntry, InvokeResponseMsg, ReadRequestMsg, ReportDataMsg, SubscribeRequestMsg,
    SubscribeResponseMsg, WriteRequestMsg, WriteResponseMsg,
};
use super::path::{AttributePath, ConcretePath};
use super::status::StatusCode;
use super::subscriptions::SubscriptionManager;
use super::{CommandData, InteractionHandler, SubscribeOutcome};

/// Expand a path over the device catalog.
///
/// Concrete paths resolve to themselves whether or not they exist (the
/// device reports the precise miss); wildcard paths resolve to every
/// catalog attribute they cover, silently omitting non-matches.
pub fn expand_path(device: &dyn DeviceModel, path: &AttributePath) -> Vec<ConcretePath> {
    if let (Some(endpoint), Some(cluster), Some(attribute)) =
        (path.endpoint, path.cluster, path.attribute)
    {
        return vec![ConcretePath { endpoint, cluster, attribute }];
    }
    device
        .catalog()
        .into_iter()
        .filter_map(|entry| match entry.item {
            CatalogItem::Attribute(attribute) => Some(ConcretePath {
                endpoint: entry.endpoint,
                cluster: entry.cluster,
                attribute,
            }),
            CatalogItem::Command(_) => None,
        })
        .filter(|concrete| path.covers(concrete))
        .collect()
}

/// Read current values for a set of paths, keyed by concrete location.
///
/// Used by the subscription tick to diff against a subscription's cache;
/// unreadable paths are skipped.
pub fn snapshot_values(
    device: &dyn DeviceModel,
    paths: &[AttributePath],
) -> BTreeMap<ConcretePath, TlvValue> {
    let mut values = BTreeMap::new();
    for path in paths {
        for concrete in expand_path(device, path) {
            if let Ok(value) =
                device.read_attribute(concrete.endpoint, concrete.cluster, concrete.attribute)
            {
                values.insert(concrete, value);
            }
        }
    }
    values
}

/// Per-interaction request router.
pub struct Router<'a> {
    device: &'a mut dyn DeviceModel,
    acl: &'a [AclEntry],
    subscriptions: &'a mut SubscriptionManager,
    ctx: AccessContext,
    now_ms: u64,
}

impl<'a> Router<'a> {
    /// Router for one interaction on one session.
    pub fn new(
        device: &'a mut dyn DeviceModel,
        acl: &'a [AclEntry],
        subscriptions: &'a mut SubscriptionManager,
        ctx: AccessContext,
        now_ms: u64,
    ) -> Self {
        Self { device, acl, subscriptions, ctx, now_ms }
    }

    fn allowed(&self, operation: Operation, endpoint: u16, cluster: u32) -> bool {
        let required = required_privilege(operation, cluster);
        check_access(self.acl, &self.ctx, endpoint, cluster, required)
    }

    fn read_one(&self, concrete: ConcretePath) -> AttributeReport {
        if !self.allowed(Operation::Read, concrete.endpoint, concrete.cluster) {
            return AttributeReport::Status(AttributeStatus {
                path: concrete.into(),
                status: StatusCode::UnsupportedAccess,
            });
        }
        match self.device.read_attribute(concrete.endpoint, concrete.cluster, concrete.attribute)
        {
            Ok(value) => AttributeReport::Data(AttributeData {
                data_version: self.device.data_version(concrete.endpoint, concrete.cluster),
                path: concrete,
                value,
            }),
            Err(status) => AttributeReport::Status(AttributeStatus {
                path: concrete.into(),
                status,
            }),
        }
    }

    fn read_paths(&self, paths: &[AttributePath]) -> Vec<AttributeReport> {
        let mut reports = Vec::new();
        for path in paths {
            for concrete in expand_path(self.device, path) {
                reports.push(self.read_one(concrete));
            }
        }
        reports
    }
}

impl InteractionHandler for Router<'_> {
    fn on_read(&mut self, request: ReadRequestMsg) -> ReportDataMsg {
        ReportDataMsg {
            subscription_id: None,
            reports: self.read_paths(&request.attribute_requests),
            suppress_response: false,
            more_chunks: false,
        }
    }

    fn on_write(&mut self, request: WriteRequestMsg) -> WriteResponseMsg {
        let mut statuses = Vec::with_capacity(request.writes.len());
        for write in &request.writes {
            let (Some(endpoint), Some(cluster), Some(attribute)) =
                (write.path.endpoint, write.path.cluster, write.path.attribute)
            else {
                statuses.push(AttributeStatus {
                    path: write.path,
                    status: StatusCode::InvalidAction,
                });
                continue;
            };
            let status = if !self.allowed(Operation::Write, endpoint, cluster) {
                StatusCode::UnsupportedAccess
            } else {
                match self.device.write_attribute(endpoint, cluster, attribute, &write.value) {
                    Ok(()) => StatusCode::Success,
                    Err(status) => status,
                }
            };
            statuses.push(AttributeStatus { path: write.path, status });
        }
        WriteResponseMsg { statuses }
    }

    fn on_invoke(&mut self, request: InvokeRequestMsg) -> InvokeResponseMsg {
        let mut responses = Vec::with_capacity(request.invokes.len());
        for invoke in &request.invokes {
            let path = invoke.path;
            if !self.allowed(Operation::Invoke, path.endpoint, path.cluster) {
                responses.push(InvokeResponseEntry::Status(CommandStatus {
                    path,
                    status: StatusCode::UnsupportedAccess,
                }));
                continue;
            }
            let entry = match self.device.invoke_command(
                path.endpoint,
                path.cluster,
                path.command,
                invoke.fields.as_ref(),
            ) {
                Ok(Some(fields)) => InvokeResponseEntry::Command(CommandData {
                    path,
                    fields: Some(fields),
                }),
                Ok(None) => InvokeResponseEntry::Status(CommandStatus {
                    path,
                    status: StatusCode::Success,
                }),
                Err(status) => InvokeResponseEntry::Status(CommandStatus { path, status }),
            };
            responses.push(entry);
        }
        InvokeResponseMsg { suppress_response: request.suppress_response, responses }
    }

    fn on_subscribe(&mut self, request: SubscribeRequestMsg) -> SubscribeOutcome {
        if !request.keep_subscriptions {
            self.subscriptions.clear();
        }
        let reports = self.read_paths(&request.attribute_requests);
        let subscription_id = self.subscriptions.subscribe(
            request.attribute_requests,
            request.min_interval,
            request.max_interval,
            self.now_ms,
        );
        SubscribeOutcome {
            primed_report: ReportDataMsg {
                subscription_id: Some(subscription_id),
                reports,
                suppress_response: false,
                more_chunks: false,
            },
            response: SubscribeResponseMsg {
                subscription_id,
                max_interval: request.max_interval,
            },
        }
    }
}
