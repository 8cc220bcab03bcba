//! # hearth-matter
//!
//! A Matter (CHIP) end-device protocol core: it turns raw UDP datagrams
//! from a smart-home commissioner into authenticated, authorized reads,
//! writes, commands, and subscriptions against a declarative device model,
//! and turns the device's responses back into wire frames.
//!
//! The crate is transport-free and clock-free. A host loop feeds it
//! datagrams, fired timers, and periodic ticks; the core answers with
//! [`node::Output`] actions (`Send`, `ScheduleMrp`, `SessionEstablished`,
//! `Error`) that the host executes. Everything runs on one thread.
//!
//! ## Modules
//!
//! - [`core`]: constants, error taxonomy, counters
//! - [`tlv`]: Matter-TLV codec
//! - [`message`]: message/protocol headers and AEAD framing
//! - [`crypto`]: fixed crypto suite and SPAKE2+
//! - [`session`]: session keys, counters, replay defense
//! - [`secure_channel`]: PASE and CASE establishment, NOC parsing
//! - [`exchange`]: exchange correlation, acks, MRP, report chunking
//! - [`im`]: Interaction Model codec, router, ACL, subscriptions
//! - [`device`]: device-model trait and a table-driven implementation
//! - [`node`]: the orchestrator tying it all together
//!
//! ## Example
//!
//! ```rust
//! use hearth_matter::prelude::*;
//!
//! // Declare the device: one endpoint with an OnOff cluster.
//! let mut device = StaticDevice::new();
//! device.add_cluster(
//!     1,
//!     ClusterDef::new(clusters::ON_OFF)
//!         .attribute(0x0000, TlvValue::Bool(false))
//!         .command(0x01, |values, _| {
//!             values.insert(0x0000, TlvValue::Bool(true));
//!             Ok(None)
//!         }),
//! );
//!
//! // Bring up the core with a PASE verifier for passcode 20202021.
//! let salt = [0x73u8; 32];
//! let verifier = hearth_matter::crypto::spake2p::compute_verifier(20202021, &salt, 1000);
//! let mut node = Node::new(device).with_pase(PaseConfig {
//!     verifier,
//!     salt: salt.to_vec(),
//!     iterations: 1000,
//! });
//!
//! // A commissioner opens the handshake; the node answers with a frame.
//! let mut commissioner = PaseCommissioner::new(20202021);
//! let request = commissioner.start(0x4001).unwrap().reply.unwrap();
//! let header = MessageHeader::plaintext(1);
//! let proto = ProtocolHeader {
//!     initiator: true,
//!     opcode: request.opcode,
//!     exchange_id: 1,
//!     ..Default::default()
//! };
//! let frame = hearth_matter::message::encode_plaintext(&header, &proto, &request.payload);
//!
//! let outputs = node.handle_frame(&frame, 0);
//! assert!(matches!(outputs[0], Output::Send(_)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod crypto;
pub mod device;
pub mod exchange;
pub mod im;
pub mod message;
pub mod node;
pub mod secure_channel;
pub mod session;
pub mod tlv;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{CryptoError, FrameError, HandshakeError, ImError, SessionError, StackError};
    pub use crate::device::{clusters, CatalogEntry, CatalogItem, ClusterDef, DeviceModel, StaticDevice};
    pub use crate::im::{
        AclEntry, AclTarget, AttributePath, AttributeReport, CommandPath, Privilege, StatusCode,
    };
    pub use crate::message::{MessageHeader, ProtocolHeader};
    pub use crate::node::{Node, Output};
    pub use crate::secure_channel::{
        CaseInitiator, CaseResponder, FabricConfig, PaseCommissioner, PaseConfig, PaseDevice,
    };
    pub use crate::session::{AuthMode, Session, SessionRole};
    pub use crate::tlv::{TlvValue, TlvWriter};
}

// Re-export commonly used items at crate root.
pub use crate::core::StackError;
pub use crate::device::{DeviceModel, StaticDevice};
pub use crate::node::{Node, Output};
