//! Table-driven device model: clusters as data plus function pointers.

use std::collections::BTreeMap;

use crate::im::StatusCode;
use crate::tlv::TlvValue;

use super::{CatalogEntry, CatalogItem, DeviceModel};

/// Command body: mutates the cluster's attribute table, optionally returns
/// response fields.
pub type CommandHandler =
    fn(&mut BTreeMap<u32, TlvValue>, Option<&TlvValue>) -> Result<Option<TlvValue>, StatusCode>;

/// Constraint check applied before a write is accepted.
type ConstraintFn = fn(&TlvValue) -> bool;

struct AttributeMeta {
    writable: bool,
    constraint: Option<ConstraintFn>,
}

/// Declarative cluster definition, consumed by [`StaticDevice::add_cluster`].
pub struct ClusterDef {
    id: u32,
    attributes: Vec<(u32, TlvValue, AttributeMeta)>,
    commands: Vec<(u32, CommandHandler)>,
}

impl ClusterDef {
    /// Cluster with the given id and no members yet.
    pub fn new(id: u32) -> Self {
        Self { id, attributes: Vec::new(), commands: Vec::new() }
    }

    /// Read-only attribute.
    pub fn attribute(mut self, id: u32, initial: TlvValue) -> Self {
        self.attributes
            .push((id, initial, AttributeMeta { writable: false, constraint: None }));
        self
    }

    /// Writable attribute.
    pub fn writable(mut self, id: u32, initial: TlvValue) -> Self {
        self.attributes
            .push((id, initial, AttributeMeta { writable: true, constraint: None }));
        self
    }

    /// Writable attribute with a value constraint.
    pub fn writable_constrained(mut self, id: u32, initial: TlvValue, check: ConstraintFn) -> Self {
        self.attributes
            .push((id, initial, AttributeMeta { writable: true, constraint: Some(check) }));
        self
    }

    /// Command with its handler.
    pub fn command(mut self, id: u32, handler: CommandHandler) -> Self {
        self.commands.push((id, handler));
        self
    }
}

struct ClusterInstance {
    values: BTreeMap<u32, TlvValue>,
    meta: BTreeMap<u32, AttributeMeta>,
    commands: BTreeMap<u32, CommandHandler>,
    data_version: u32,
}

/// A device model backed by per-endpoint cluster tables.
#[derive(Default)]
pub struct StaticDevice {
    endpoints: BTreeMap<u16, BTreeMap<u32, ClusterInstance>>,
}

impl StaticDevice {
    /// Empty device; add clusters before serving.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a cluster on an endpoint, creating the endpoint as needed.
    pub fn add_cluster(&mut self, endpoint: u16, def: ClusterDef) -> &mut Self {
        let mut values = BTreeMap::new();
        let mut meta = BTreeMap::new();
        for (id, initial, attr_meta) in def.attributes {
            values.insert(id, initial);
            meta.insert(id, attr_meta);
        }
        let commands = def.commands.into_iter().collect();
        self.endpoints.entry(endpoint).or_default().insert(
            def.id,
            ClusterInstance { values, meta, commands, data_version: 1 },
        );
        self
    }

    fn cluster(&self, endpoint: u16, cluster: u32) -> Result<&ClusterInstance, StatusCode> {
        let clusters = self.endpoints.get(&endpoint).ok_or(StatusCode::UnsupportedEndpoint)?;
        clusters.get(&cluster).ok_or(StatusCode::UnsupportedCluster)
    }

    fn cluster_mut(
        &mut self,
        endpoint: u16,
        cluster: u32,
    ) -> Result<&mut ClusterInstance, StatusCode> {
        let clusters =
            self.endpoints.get_mut(&endpoint).ok_or(StatusCode::UnsupportedEndpoint)?;
        clusters.get_mut(&cluster).ok_or(StatusCode::UnsupportedCluster)
    }
}

impl DeviceModel for StaticDevice {
    fn read_attribute(
        &self,
        endpoint: u16,
        cluster: u32,
        attribute: u32,
    ) -> Result<TlvValue, StatusCode> {
        let instance = self.cluster(endpoint, cluster)?;
        instance.values.get(&attribute).cloned().ok_or(StatusCode::UnsupportedAttribute)
    }

    fn write_attribute(
        &mut self,
        endpoint: u16,
        cluster: u32,
        attribute: u32,
        value: &TlvValue,
    ) -> Result<(), StatusCode> {
        let instance = self.cluster_mut(endpoint, cluster)?;
        let meta = instance.meta.get(&attribute).ok_or(StatusCode::UnsupportedAttribute)?;
        if !meta.writable {
            return Err(StatusCode::UnsupportedWrite);
        }
        if let Some(check) = meta.constraint {
            if !check(value) {
                return Err(StatusCode::ConstraintError);
            }
        }
        instance.values.insert(attribute, value.clone());
        instance.data_version = instance.data_version.wrapping_add(1);
        Ok(())
    }

    fn invoke_command(
        &mut self,
        endpoint: u16,
        cluster: u32,
        command: u32,
        fields: Option<&TlvValue>,
    ) -> Result<Option<TlvValue>, StatusCode> {
        let instance = self.cluster_mut(endpoint, cluster)?;
        let handler =
            *instance.commands.get(&command).ok_or(StatusCode::UnsupportedCommand)?;
        let result = handler(&mut instance.values, fields)?;
        instance.data_version = instance.data_version.wrapping_add(1);
        Ok(result)
    }

    fn catalog(&self) -> Vec<CatalogEntry> {
        let mut entries = Vec::new();
        for (&endpoint, clusters) in &self.endpoints {
            for (&cluster, instance) in clusters {
                for &attribute in instance.values.keys() {
                    entries.push(CatalogEntry {
                        endpoint,
                        cluster,
                        item: CatalogItem::Attribute(attribute),
                    });
                }
                for &command in instance.commands.keys() {
                    entries.push(CatalogEntry {
                        endpoint,
                        cluster,
                        item: CatalogItem::Command(command),
                    });
                }
            }
        }
        entries
    }

    fn data_version(&self, endpoint: u16, cluster: u32) -> u32 {
        self.cluster(endpoint, cluster).map(|c| c.data_version).unwrap_or(0)
    }
}
