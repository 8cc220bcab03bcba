//! The orchestrator: raw frames in, protocol actions out.
//!
//! [`Node`] owns the handshake responders, the session table, and the
//! device model, and exposes the three entry points a host loop drives:
//! [`Node::handle_frame`] for every received datagram,
//! [`Node::handle_mrp_timeout`] for fired retransmission timers, and
//! [`Node::check_subscriptions`] for the periodic subscription tick. All
//! wall-clock time comes in from the host; the core never blocks and never
//! reads a clock.
//!
//! Per the propagation policy, framing and crypto failures are logged and
//! dropped (surfaced as [`Output::Error`], never answered on the wire), and
//! handshake failures terminate the attempt silently.

use std::collections::HashMap;

use crate::core::{
    MessageCounter, SessionError, StackError, OPCODE_CASE_SIGMA1, OPCODE_CASE_SIGMA3,
    OPCODE_IM_REPORT_DATA, OPCODE_MRP_STANDALONE_ACK, OPCODE_PBKDF_PARAM_REQUEST,
    OPCODE_PASE_PAKE3, PROTOCOL_ID_SECURE_CHANNEL,
};
use crate::device::DeviceModel;
use crate::exchange::{jittered_backoff_ms, ExchangeAction, ExchangeManager, TimeoutAction};
use crate::im::{
    snapshot_values, AccessContext, AclEntry, AttributeData, AttributePath, AttributeReport,
    ReportDataMsg, Router, SubscriptionManager,
};
use crate::message::{self, MessageHeader, ProtocolHeader};
use crate::secure_channel::{CaseResponder, Established, FabricConfig, PaseConfig, PaseDevice};
use crate::session::Session;

/// Actions the host loop executes on the core's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Transmit this frame to the peer.
    Send(Vec<u8>),
    /// Arm a retransmission timer, then call
    /// [`Node::handle_mrp_timeout`] with these coordinates.
    ScheduleMrp {
        /// Session the pending message belongs to.
        session_id: u16,
        /// Exchange the pending message belongs to.
        exchange_id: u16,
        /// Attempt the timer is armed with.
        attempt: u32,
        /// Delay until it fires, milliseconds.
        delay_ms: u64,
    },
    /// A handshake completed; the session is live under this local id.
    SessionEstablished(u16),
    /// Something was dropped; hosts may count or surface it.
    Error(StackError),
}

struct SessionEntry {
    session: Session,
    exchanges: ExchangeManager,
    subscriptions: SubscriptionManager,
}

/// The protocol core of one Matter end device.
pub struct Node<D: DeviceModel> {
    pase: Option<PaseDevice>,
    case: Option<CaseResponder>,
    plaintext_counter: MessageCounter,
    sessions: HashMap<u16, SessionEntry>,
    acl: Vec<AclEntry>,
    device: D,
}

impl<D: DeviceModel> Node<D> {
    /// Node serving `device`; attach handshakes with the `with_*` builders.
    pub fn new(device: D) -> Self {
        Self {
            pase: None,
            case: None,
            plaintext_counter: MessageCounter::random(),
            sessions: HashMap::new(),
            acl: Vec::new(),
            device,
        }
    }

    /// Enable PASE commissioning with the stored verifier.
    pub fn with_pase(mut self, config: PaseConfig) -> Self {
        self.pase = Some(PaseDevice::new(config));
        self
    }

    /// Enable CASE on an operational fabric.
    pub fn with_fabric(mut self, config: FabricConfig) -> Self {
        self.case = Some(CaseResponder::new(config));
        self
    }

    /// Seed the access-control list.
    pub fn with_acl(mut self, entries: Vec<AclEntry>) -> Self {
        self.acl = entries;
        self
    }

    /// Access-control entries, mutable (the ACL cluster handler edits these).
    pub fn acl_mut(&mut self) -> &mut Vec<AclEntry> {
        &mut self.acl
    }

    /// The device model.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The device model, mutable.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether a session is live under this local id.
    pub fn has_session(&self, session_id: u16) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Tear down a session and everything scoped to it.
    pub fn close_session(&mut self, session_id: u16) -> bool {
        self.sessions.remove(&session_id).is_some()
    }

    /// Process one received datagram.
    pub fn handle_frame(&mut self, bytes: &[u8], now_ms: u64) -> Vec<Output> {
        let header = match MessageHeader::decode(bytes) {
            Ok((header, _)) => header,
            Err(err) => {
                tracing::debug!(%err, "dropping unparseable frame");
                return vec![Output::Error(err.into())];
            }
        };
        if header.session_id == 0 {
            self.handle_plaintext(bytes, now_ms)
        } else {
            self.handle_encrypted(header.session_id, bytes, now_ms)
        }
    }

    fn handle_plaintext(&mut self, bytes: &[u8], _now_ms: u64) -> Vec<Output> {
        let (header, proto, payload) = match message::decode_plaintext(bytes) {
            Ok(parts) => parts,
            Err(err) => {
                tracing::debug!(%err, "dropping malformed plaintext frame");
                return vec![Output::Error(err.into())];
            }
        };

        let result = match proto.opcode {
            OPCODE_MRP_STANDALONE_ACK => return Vec::new(),
            OPCODE_CASE_SIGMA1 | OPCODE_CASE_SIGMA3 => match self.case.as_mut() {
                Some(case) => case.step(proto.opcode, &payload),
                None => {
                    tracing::debug!("no fabric configured, dropping CASE frame");
                    return Vec::new();
                }
            },
            OPCODE_PBKDF_PARAM_REQUEST..=OPCODE_PASE_PAKE3 => match self.pase.as_mut() {
                Some(pase) => pase.step(proto.opcode, &payload),
                None => {
                    tracing::debug!("no PASE verifier configured, dropping frame");
                    return Vec::new();
                }
            },
            other => {
                tracing::debug!(opcode = other, "unexpected plaintext opcode");
                return Vec::new();
            }
        };

        // Handshake errors terminate the attempt without a wire reply.
        let step = match result {
            Ok(step) => step,
            Err(err) => {
                tracing::debug!(%err, "handshake failed");
                return vec![Output::Error(err.into())];
            }
        };

        let mut outputs = Vec::new();
        if let Some(reply) = step.reply {
            let reply_header = MessageHeader::plaintext(self.plaintext_counter.next());
            let reply_proto = ProtocolHeader {
                opcode: reply.opcode,
                exchange_id: proto.exchange_id,
                protocol_id: PROTOCOL_ID_SECURE_CHANNEL,
                ack_counter: proto.reliable.then_some(header.counter),
                ..Default::default()
            };
            outputs.push(Output::Send(message::encode_plaintext(
                &reply_header,
                &reply_proto,
                &reply.payload,
            )));
        }
        if let Some(established) = step.established {
            outputs.push(self.install_session(established));
        }
        outputs
    }

    fn install_session(&mut self, established: Established) -> Output {
        let local_id = established.local_session_id;
        let session = Session::new(
            established.role,
            established.auth_mode,
            established.local_session_id,
            established.peer_session_id,
            &established.keys,
        )
        .with_peers(
            established.local_node_id,
            established.peer_node_id,
            established.fabric_index,
        );
        tracing::info!(
            session_id = local_id,
            auth_mode = ?established.auth_mode,
            peer_node_id = established.peer_node_id,
            "session established"
        );
        self.sessions.insert(
            local_id,
            SessionEntry {
                session,
                exchanges: ExchangeManager::new(),
                subscriptions: SubscriptionManager::new(),
            },
        );
        Output::SessionEstablished(local_id)
    }

    fn handle_encrypted(&mut self, session_id: u16, bytes: &[u8], now_ms: u64) -> Vec<Output> {
        let Self { sessions, acl, device, .. } = self;
        let Some(entry) = sessions.get_mut(&session_id) else {
            tracing::debug!(session_id, "frame for unknown session");
            return vec![Output::Error(SessionError::UnknownSession(session_id).into())];
        };

        let (header, plaintext) = match entry.session.open(bytes) {
            Ok(opened) => opened,
            Err(err) => {
                tracing::debug!(session_id, %err, "dropping undecryptable frame");
                return vec![Output::Error(err)];
            }
        };
        let (proto, payload) = match ProtocolHeader::decode(&plaintext) {
            Ok(parts) => parts,
            Err(err) => {
                tracing::debug!(session_id, %err, "dropping frame with bad protocol header");
                return vec![Output::Error(err.into())];
            }
        };

        let ctx = AccessContext {
            auth_mode: entry.session.auth_mode(),
            peer_node_id: entry.session.peer_node_id(),
            fabric_index: entry.session.fabric_index(),
        };
        let mut router = Router::new(device, acl, &mut entry.subscriptions, ctx, now_ms);
        let actions =
            match entry.exchanges.on_message(&proto, payload, header.counter, now_ms, &mut router)
            {
                Ok(actions) => actions,
                Err(err) => {
                    tracing::debug!(session_id, %err, "undispatchable message");
                    return vec![Output::Error(err)];
                }
            };

        Self::perform(session_id, &mut entry.session, actions)
    }

    fn perform(
        session_id: u16,
        session: &mut Session,
        actions: Vec<ExchangeAction>,
    ) -> Vec<Output> {
        let mut outputs = Vec::new();
        for action in actions {
            match action {
                ExchangeAction::Send(proto_bytes) => match session.seal(&proto_bytes) {
                    Ok(frame) => outputs.push(Output::Send(frame)),
                    Err(err) => outputs.push(Output::Error(err.into())),
                },
                ExchangeAction::ScheduleMrp { exchange_id, attempt, delay_ms } => {
                    outputs.push(Output::ScheduleMrp {
                        session_id,
                        exchange_id,
                        attempt,
                        delay_ms,
                    });
                }
            }
        }
        outputs
    }

    /// Route a fired retransmission timer to its session.
    pub fn handle_mrp_timeout(
        &mut self,
        session_id: u16,
        exchange_id: u16,
        attempt: u32,
    ) -> Vec<Output> {
        let Some(entry) = self.sessions.get_mut(&session_id) else {
            return Vec::new();
        };
        match entry.exchanges.on_timeout(exchange_id, attempt) {
            TimeoutAction::Retransmit(proto_bytes) => {
                // Re-seal under the current counter; the stored protocol
                // header bytes are reused as-is.
                match entry.session.seal(&proto_bytes) {
                    Ok(frame) => vec![
                        Output::Send(frame),
                        Output::ScheduleMrp {
                            session_id,
                            exchange_id,
                            attempt: attempt + 1,
                            delay_ms: jittered_backoff_ms(true, attempt + 1),
                        },
                    ],
                    Err(err) => vec![Output::Error(err.into())],
                }
            }
            TimeoutAction::GiveUp => {
                vec![Output::Error(StackError::MrpGiveUp { exchange_id })]
            }
            TimeoutAction::AlreadyAcked => Vec::new(),
        }
    }

    /// Periodic subscription tick: emit reports whose values changed, and
    /// refresh the report clock of due subscriptions that did not.
    pub fn check_subscriptions(&mut self, now_ms: u64) -> Vec<Output> {
        let Self { sessions, device, .. } = self;
        let mut outputs = Vec::new();
        for (&session_id, entry) in sessions.iter_mut() {
            let due = entry.subscriptions.due_reports(now_ms);
            let subs: Vec<(u32, Vec<AttributePath>)> = entry
                .subscriptions
                .iter()
                .map(|sub| (sub.id, sub.paths.clone()))
                .collect();
            for (id, paths) in subs {
                let current = snapshot_values(&*device, &paths);
                let changed = entry
                    .subscriptions
                    .get(id)
                    .is_some_and(|sub| sub.values_changed(&current));
                if changed && !entry.subscriptions.throttled(id, now_ms) {
                    let reports = current
                        .iter()
                        .map(|(&path, value)| {
                            AttributeReport::Data(AttributeData {
                                data_version: device.data_version(path.endpoint, path.cluster),
                                path,
                                value: value.clone(),
                            })
                        })
                        .collect();
                    let report = ReportDataMsg {
                        subscription_id: Some(id),
                        reports,
                        suppress_response: true,
                        more_chunks: false,
                    };
                    let (_, actions) =
                        entry.exchanges.initiate(OPCODE_IM_REPORT_DATA, &report.encode(), true);
                    outputs.extend(Self::perform(session_id, &mut entry.session, actions));
                    entry.subscriptions.record_sent(id, now_ms, current);
                } else if due.contains(&id) {
                    entry.subscriptions.record_report(id, now_ms);
                }
            }
        }
        outputs
    }

    /// Remove a subscription on any session (explicit unsubscribe).
    pub fn unsubscribe(&mut self, session_id: u16, subscription_id: u32) -> bool {
        self.sessions
            .get_mut(&session_id)
            .map(|entry| entry.subscriptions.unsubscribe(subscription_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        CryptoError, OPCODE_IM_READ_REQUEST, OPCODE_IM_STATUS_RESPONSE,
        OPCODE_IM_SUBSCRIBE_REQUEST, OPCODE_IM_SUBSCRIBE_RESPONSE, OPCODE_IM_INVOKE_REQUEST,
        OPCODE_IM_INVOKE_RESPONSE, PROTOCOL_ID_INTERACTION_MODEL,
    };
    use crate::crypto::p256_keypair;
    use crate::crypto::spake2p::compute_verifier;
    use crate::device::{clusters, ClusterDef, StaticDevice};
    use crate::im::{
        AttributeReport, CommandData, CommandPath, InvokeRequestMsg, InvokeResponseEntry,
        InvokeResponseMsg, Privilege, ReadRequestMsg, StatusCode, StatusResponseMsg,
        SubscribeRequestMsg, SubscribeResponseMsg,
    };
    use crate::message::{decode_plaintext, encode_plaintext};
    use crate::secure_channel::{encode_test_noc, CaseInitiator, PaseCommissioner};
    use crate::session::SessionRole;
    use crate::tlv::TlvValue;

    const PASSCODE: u32 = 20202021;
    const ITERATIONS: u32 = 1000;
    const FABRIC_ID: u64 = 0xFAB1;
    const DEVICE_NODE: u64 = 0xB0;
    const ADMIN_NODE: u64 = 0xA0;
    const IPK: [u8; 16] = [0x4A; 16];

    /// Endpoint 0: Descriptor + Basic. Endpoint 1: Descriptor + OnOff.
    fn fixture_device() -> StaticDevice {
        let mut device = StaticDevice::new();
        device.add_cluster(
            0,
            ClusterDef::new(clusters::DESCRIPTOR).attribute(0x0000, TlvValue::Unsigned(22)),
        );
        device.add_cluster(
            0,
            ClusterDef::new(clusters::BASIC_INFORMATION)
                .attribute(0x0001, TlvValue::Utf8("hearth".into())),
        );
        device.add_cluster(
            1,
            ClusterDef::new(clusters::DESCRIPTOR).attribute(0x0000, TlvValue::Unsigned(0x0100)),
        );
        device.add_cluster(
            1,
            ClusterDef::new(clusters::ON_OFF)
                .attribute(0x0000, TlvValue::Bool(false))
                .command(0x00, |values, _| {
                    values.insert(0x0000, TlvValue::Bool(false));
                    Ok(None)
                })
                .command(0x01, |values, _| {
                    values.insert(0x0000, TlvValue::Bool(true));
                    Ok(None)
                }),
        );
        device
    }

    fn pase_node() -> Node<StaticDevice> {
        let salt = [0x5C; 32];
        Node::new(fixture_device()).with_pase(PaseConfig {
            verifier: compute_verifier(PASSCODE, &salt, ITERATIONS),
            salt: salt.to_vec(),
            iterations: ITERATIONS,
        })
    }

    fn device_fabric() -> FabricConfig {
        let (public_key, private_key) = p256_keypair();
        FabricConfig {
            ipk: IPK,
            node_id: DEVICE_NODE,
            fabric_id: FABRIC_ID,
            fabric_index: 1,
            noc: encode_test_noc(DEVICE_NODE, FABRIC_ID, &public_key),
            icac: None,
            op_private_key: private_key,
        }
    }

    fn admin_fabric() -> FabricConfig {
        let (public_key, private_key) = p256_keypair();
        FabricConfig {
            ipk: IPK,
            node_id: ADMIN_NODE,
            fabric_id: FABRIC_ID,
            fabric_index: 1,
            noc: encode_test_noc(ADMIN_NODE, FABRIC_ID, &public_key),
            icac: None,
            op_private_key: private_key,
        }
    }

    fn admin_acl_entry() -> AclEntry {
        AclEntry {
            privilege: Privilege::Administer,
            auth_mode: crate::session::AuthMode::Case,
            subjects: Some(vec![ADMIN_NODE]),
            targets: None,
            fabric_index: 1,
        }
    }

    fn wrap_plaintext(opcode: u8, payload: &[u8], counter: u32) -> Vec<u8> {
        let header = MessageHeader::plaintext(counter);
        let proto = ProtocolHeader {
            initiator: true,
            reliable: true,
            opcode,
            exchange_id: 1,
            protocol_id: PROTOCOL_ID_SECURE_CHANNEL,
            ..Default::default()
        };
        encode_plaintext(&header, &proto, payload)
    }

    fn first_send(outputs: &[Output]) -> Option<Vec<u8>> {
        outputs.iter().find_map(|o| match o {
            Output::Send(bytes) => Some(bytes.clone()),
            _ => None,
        })
    }

    fn established_id(outputs: &[Output]) -> Option<u16> {
        outputs.iter().find_map(|o| match o {
            Output::SessionEstablished(id) => Some(*id),
            _ => None,
        })
    }

    /// Drive a full PASE handshake against the node; returns the
    /// commissioner's session and the device-side session id.
    fn commission(node: &mut Node<StaticDevice>) -> (Session, u16) {
        let mut commissioner = PaseCommissioner::new(PASSCODE);
        let mut counter = 1u32;
        let mut reply = commissioner.start(0x4001).unwrap().reply.unwrap();
        for _ in 0..8 {
            let frame = wrap_plaintext(reply.opcode, &reply.payload, counter);
            counter += 1;
            let outputs = node.handle_frame(&frame, 0);
            let device_session = established_id(&outputs);
            let response = first_send(&outputs).expect("handshake reply");
            let (_, proto, payload) = decode_plaintext(&response).unwrap();
            let step = commissioner.step(proto.opcode, &payload).unwrap();
            if let Some(est) = step.established {
                let session = Session::new(
                    est.role,
                    est.auth_mode,
                    est.local_session_id,
                    est.peer_session_id,
                    &est.keys,
                );
                return (session, device_session.expect("device session id"));
            }
            reply = step.reply.unwrap();
        }
        panic!("handshake did not complete");
    }

    /// Drive a full CASE handshake; returns the admin session and device
    /// session id.
    fn connect_case(node: &mut Node<StaticDevice>) -> (Session, u16) {
        let mut initiator = CaseInitiator::new(admin_fabric());
        let mut counter = 100u32;
        let mut reply = initiator.start(0x4800, DEVICE_NODE).unwrap().reply.unwrap();
        for _ in 0..4 {
            let frame = wrap_plaintext(reply.opcode, &reply.payload, counter);
            counter += 1;
            let outputs = node.handle_frame(&frame, 0);
            let device_session = established_id(&outputs);
            let response = first_send(&outputs).expect("handshake reply");
            let (_, proto, payload) = decode_plaintext(&response).unwrap();
            let step = initiator.step(proto.opcode, &payload).unwrap();
            if let Some(est) = step.established {
                let session = Session::new(
                    est.role,
                    est.auth_mode,
                    est.local_session_id,
                    est.peer_session_id,
                    &est.keys,
                )
                .with_peers(est.local_node_id, est.peer_node_id, est.fabric_index);
                return (session, device_session.expect("device session id"));
            }
            reply = step.reply.unwrap();
        }
        panic!("handshake did not complete");
    }

    fn im_frame(session: &mut Session, opcode: u8, payload: &[u8], exchange_id: u16) -> Vec<u8> {
        let proto = ProtocolHeader {
            initiator: true,
            reliable: true,
            opcode,
            exchange_id,
            protocol_id: PROTOCOL_ID_INTERACTION_MODEL,
            ..Default::default()
        };
        session.seal(&proto.encode(payload)).unwrap()
    }

    fn open_im(session: &mut Session, frame: &[u8]) -> (ProtocolHeader, Vec<u8>) {
        let (_, plaintext) = session.open(frame).unwrap();
        let (proto, payload) = ProtocolHeader::decode(&plaintext).unwrap();
        (proto, payload.to_vec())
    }

    #[test]
    fn pase_handshake_then_encrypted_read() {
        let mut node = pase_node();
        let (mut session, device_sid) = commission(&mut node);
        assert!(node.has_session(device_sid));

        let read = ReadRequestMsg {
            attribute_requests: vec![AttributePath::concrete(1, clusters::ON_OFF, 0)],
            fabric_filtered: false,
        };
        let frame = im_frame(&mut session, OPCODE_IM_READ_REQUEST, &read.encode(), 0x10);
        let outputs = node.handle_frame(&frame, 1_000);

        let reply = first_send(&outputs).expect("report frame");
        let (proto, payload) = open_im(&mut session, &reply);
        assert_eq!(proto.opcode, crate::core::OPCODE_IM_REPORT_DATA);
        let report = ReportDataMsg::decode(&payload).unwrap();
        assert_eq!(report.reports.len(), 1);
        match &report.reports[0] {
            AttributeReport::Data(data) => {
                assert_eq!(data.path.endpoint, 1);
                assert_eq!(data.value, TlvValue::Bool(false));
            }
            other => panic!("expected data report, got {other:?}"),
        }
        assert!(outputs.iter().any(|o| matches!(
            o,
            Output::ScheduleMrp { exchange_id: 0x10, attempt: 0, .. }
        )));
    }

    #[test]
    fn wildcard_read_over_the_wire_finds_one_match() {
        let mut node = pase_node();
        let (mut session, _) = commission(&mut node);

        let read = ReadRequestMsg {
            attribute_requests: vec![AttributePath {
                endpoint: None,
                cluster: Some(clusters::ON_OFF),
                attribute: Some(0),
            }],
            fabric_filtered: false,
        };
        let frame = im_frame(&mut session, OPCODE_IM_READ_REQUEST, &read.encode(), 0x11);
        let outputs = node.handle_frame(&frame, 1_000);
        let (_, payload) = open_im(&mut session, &first_send(&outputs).unwrap());
        let report = ReportDataMsg::decode(&payload).unwrap();
        assert_eq!(report.reports.len(), 1);
    }

    #[test]
    fn replayed_frame_is_rejected() {
        let mut node = pase_node();
        let (mut session, _) = commission(&mut node);

        let read = ReadRequestMsg::default();
        let frame = im_frame(&mut session, OPCODE_IM_READ_REQUEST, &read.encode(), 0x12);
        let outputs = node.handle_frame(&frame, 0);
        assert!(first_send(&outputs).is_some());

        let outputs = node.handle_frame(&frame, 0);
        assert_eq!(
            outputs,
            vec![Output::Error(StackError::Session(SessionError::Duplicate))]
        );
    }

    #[test]
    fn tampered_frame_is_dropped() {
        let mut node = pase_node();
        let (mut session, _) = commission(&mut node);

        let mut frame =
            im_frame(&mut session, OPCODE_IM_READ_REQUEST, &ReadRequestMsg::default().encode(), 1);
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        let outputs = node.handle_frame(&frame, 0);
        assert_eq!(
            outputs,
            vec![Output::Error(StackError::Crypto(CryptoError::AuthenticationFailed))]
        );
    }

    #[test]
    fn unknown_session_is_reported() {
        let mut node = pase_node();
        let outputs = node.handle_frame(
            &[0x00, 0x33, 0x33, 0x00, 0x01, 0x00, 0x00, 0x00, 0xAA, 0xBB],
            0,
        );
        assert_eq!(
            outputs,
            vec![Output::Error(StackError::Session(SessionError::UnknownSession(0x3333)))]
        );
    }

    #[test]
    fn mrp_retransmits_then_gives_up() {
        let mut node = pase_node();
        let (mut session, device_sid) = commission(&mut node);

        let frame =
            im_frame(&mut session, OPCODE_IM_READ_REQUEST, &ReadRequestMsg::default().encode(), 7);
        node.handle_frame(&frame, 0);

        for attempt in 0..4 {
            let outputs = node.handle_mrp_timeout(device_sid, 7, attempt);
            let retransmit = first_send(&outputs).expect("retransmitted frame");
            // Retransmit opens under the commissioner session (fresh counter).
            let (proto, _) = open_im(&mut session, &retransmit);
            assert_eq!(proto.opcode, crate::core::OPCODE_IM_REPORT_DATA);
            assert!(outputs.iter().any(|o| matches!(
                o,
                Output::ScheduleMrp { attempt: a, .. } if *a == attempt + 1
            )));
        }
        let outputs = node.handle_mrp_timeout(device_sid, 7, 4);
        assert_eq!(
            outputs,
            vec![Output::Error(StackError::MrpGiveUp { exchange_id: 7 })]
        );
        // Stale timer after give-up.
        assert!(node.handle_mrp_timeout(device_sid, 7, 5).is_empty());
    }

    #[test]
    fn case_with_admin_acl_invokes_and_reads() {
        let mut node = pase_node().with_fabric(device_fabric());
        node.acl_mut().push(admin_acl_entry());
        let (mut session, _) = connect_case(&mut node);

        // Invoke OnOff::on.
        let invoke = InvokeRequestMsg {
            suppress_response: false,
            timed: false,
            invokes: vec![CommandData {
                path: CommandPath { endpoint: 1, cluster: clusters::ON_OFF, command: 0x01 },
                fields: None,
            }],
        };
        let frame = im_frame(&mut session, OPCODE_IM_INVOKE_REQUEST, &invoke.encode(), 0x20);
        let outputs = node.handle_frame(&frame, 0);
        let (proto, payload) = open_im(&mut session, &first_send(&outputs).unwrap());
        assert_eq!(proto.opcode, OPCODE_IM_INVOKE_RESPONSE);
        let response = InvokeResponseMsg::decode(&payload).unwrap();
        match &response.responses[0] {
            InvokeResponseEntry::Status(status) => {
                assert_eq!(status.status, StatusCode::Success)
            }
            other => panic!("expected status, got {other:?}"),
        }

        // Read back on_off: now true.
        let read = ReadRequestMsg {
            attribute_requests: vec![AttributePath::concrete(1, clusters::ON_OFF, 0)],
            fabric_filtered: false,
        };
        let frame = im_frame(&mut session, OPCODE_IM_READ_REQUEST, &read.encode(), 0x21);
        let outputs = node.handle_frame(&frame, 0);
        let (_, payload) = open_im(&mut session, &first_send(&outputs).unwrap());
        let report = ReportDataMsg::decode(&payload).unwrap();
        match &report.reports[0] {
            AttributeReport::Data(data) => assert_eq!(data.value, TlvValue::Bool(true)),
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn case_without_acl_is_denied() {
        let mut node = pase_node().with_fabric(device_fabric());
        let (mut session, _) = connect_case(&mut node);

        let read = ReadRequestMsg {
            attribute_requests: vec![AttributePath::concrete(1, clusters::ON_OFF, 0)],
            fabric_filtered: false,
        };
        let frame = im_frame(&mut session, OPCODE_IM_READ_REQUEST, &read.encode(), 0x30);
        let outputs = node.handle_frame(&frame, 0);
        let (_, payload) = open_im(&mut session, &first_send(&outputs).unwrap());
        let report = ReportDataMsg::decode(&payload).unwrap();
        match &report.reports[0] {
            AttributeReport::Status(status) => {
                assert_eq!(status.status, StatusCode::UnsupportedAccess)
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn subscription_lifecycle_over_the_wire() {
        let mut node = pase_node();
        let (mut session, device_sid) = commission(&mut node);

        // Subscribe to on_off.
        let subscribe = SubscribeRequestMsg {
            keep_subscriptions: false,
            min_interval: 0,
            max_interval: 60,
            attribute_requests: vec![AttributePath::concrete(1, clusters::ON_OFF, 0)],
        };
        let frame = im_frame(&mut session, OPCODE_IM_SUBSCRIBE_REQUEST, &subscribe.encode(), 0x40);
        let outputs = node.handle_frame(&frame, 0);
        let (proto, payload) = open_im(&mut session, &first_send(&outputs).unwrap());
        assert_eq!(proto.opcode, crate::core::OPCODE_IM_REPORT_DATA);
        let primed = ReportDataMsg::decode(&payload).unwrap();
        let subscription_id = primed.subscription_id.expect("primed report carries id");

        // Ack the primed report; the SubscribeResponse follows on the same
        // exchange.
        let status = StatusResponseMsg { status: StatusCode::Success }.encode();
        let ack_proto = ProtocolHeader {
            initiator: true,
            reliable: true,
            opcode: OPCODE_IM_STATUS_RESPONSE,
            exchange_id: 0x40,
            protocol_id: PROTOCOL_ID_INTERACTION_MODEL,
            ack_counter: Some(0),
            ..Default::default()
        };
        let frame = session.seal(&ack_proto.encode(&status)).unwrap();
        let outputs = node.handle_frame(&frame, 0);
        let (proto, payload) = open_im(&mut session, &first_send(&outputs).unwrap());
        assert_eq!(proto.opcode, OPCODE_IM_SUBSCRIBE_RESPONSE);
        let response = SubscribeResponseMsg::decode(&payload).unwrap();
        assert_eq!(response.subscription_id, subscription_id);

        // First tick: value cache is empty, so current values are reported.
        let outputs = node.check_subscriptions(1_000);
        let (_, payload) = open_im(&mut session, &first_send(&outputs).unwrap());
        let report = ReportDataMsg::decode(&payload).unwrap();
        assert_eq!(report.subscription_id, Some(subscription_id));
        assert!(report.suppress_response);

        // No change: quiet tick.
        let outputs = node.check_subscriptions(2_000);
        assert!(first_send(&outputs).is_none());

        // Flip the switch; next tick reports the new value.
        node.device_mut().invoke_command(1, clusters::ON_OFF, 0x01, None).unwrap();
        let outputs = node.check_subscriptions(3_000);
        let (_, payload) = open_im(&mut session, &first_send(&outputs).unwrap());
        let report = ReportDataMsg::decode(&payload).unwrap();
        match &report.reports[0] {
            AttributeReport::Data(data) => assert_eq!(data.value, TlvValue::Bool(true)),
            other => panic!("expected data, got {other:?}"),
        }

        // Unsubscribe stops reporting even after changes.
        assert!(node.unsubscribe(device_sid, subscription_id));
        node.device_mut().invoke_command(1, clusters::ON_OFF, 0x00, None).unwrap();
        let outputs = node.check_subscriptions(4_000);
        assert!(first_send(&outputs).is_none());
    }

    #[test]
    fn session_teardown_drops_subscriptions() {
        let mut node = pase_node();
        let (mut session, device_sid) = commission(&mut node);

        let subscribe = SubscribeRequestMsg {
            min_interval: 0,
            max_interval: 60,
            attribute_requests: vec![AttributePath::concrete(1, clusters::ON_OFF, 0)],
            ..Default::default()
        };
        let frame = im_frame(&mut session, OPCODE_IM_SUBSCRIBE_REQUEST, &subscribe.encode(), 0x50);
        node.handle_frame(&frame, 0);

        assert!(node.close_session(device_sid));
        assert!(!node.has_session(device_sid));
        assert!(node.check_subscriptions(10_000).is_empty());
    }

    #[test]
    fn commissioner_role_session_matches_device() {
        // The commissioner session must decrypt what the device encrypts
        // and vice versa; commission() plus one read already proves both
        // directions, here we just pin the role wiring.
        let mut node = pase_node();
        let (session, _) = commission(&mut node);
        assert_eq!(session.role(), SessionRole::Initiator);
    }
}
