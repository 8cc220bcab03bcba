//! The device-model interface the protocol core dispatches against.
//!
//! The core never defines clusters itself; it resolves attribute and
//! command paths through [`DeviceModel`] and maps the returned status codes
//! into Interaction Model reports. [`StaticDevice`] is a table-driven
//! implementation for hosts that declare their endpoints as plain data.

mod table;

pub use table::{ClusterDef, CommandHandler, StaticDevice};

use crate::im::StatusCode;
use crate::tlv::TlvValue;

/// Well-known cluster ids used by the stack and its tests.
pub mod clusters {
    /// On/Off.
    pub const ON_OFF: u32 = 0x0006;
    /// Access Control.
    pub const ACCESS_CONTROL: u32 = 0x001F;
    /// Descriptor.
    pub const DESCRIPTOR: u32 = 0x001D;
    /// Basic Information.
    pub const BASIC_INFORMATION: u32 = 0x0028;
}

/// What one catalog row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogItem {
    /// An attribute id.
    Attribute(u32),
    /// A command id.
    Command(u32),
}

/// One row of the device catalog: an attribute or command on a cluster
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Endpoint the cluster lives on.
    pub endpoint: u16,
    /// Cluster id.
    pub cluster: u32,
    /// Attribute or command.
    pub item: CatalogItem,
}

/// Read/write/invoke surface of the declarative device model.
///
/// Implementations report misses precisely, since the router forwards the
/// codes verbatim: `UnsupportedEndpoint` when the endpoint does not exist,
/// `UnsupportedCluster` when the endpoint exists but the cluster does not,
/// `UnsupportedAttribute` / `UnsupportedCommand` below that.
///
/// Calls are serialized by the orchestrator; implementations must be
/// re-entrant per call but need not be thread-safe.
pub trait DeviceModel {
    /// Read one attribute.
    fn read_attribute(
        &self,
        endpoint: u16,
        cluster: u32,
        attribute: u32,
    ) -> Result<TlvValue, StatusCode>;

    /// Write one attribute.
    fn write_attribute(
        &mut self,
        endpoint: u16,
        cluster: u32,
        attribute: u32,
        value: &TlvValue,
    ) -> Result<(), StatusCode>;

    /// Invoke one command, returning optional response data.
    fn invoke_command(
        &mut self,
        endpoint: u16,
        cluster: u32,
        command: u32,
        fields: Option<&TlvValue>,
    ) -> Result<Option<TlvValue>, StatusCode>;

    /// Every attribute and command the device exposes, used for wildcard
    /// expansion.
    fn catalog(&self) -> Vec<CatalogEntry>;

    /// Monotonic per-cluster data epoch.
    fn data_version(&self, endpoint: u16, cluster: u32) -> u32;
}
