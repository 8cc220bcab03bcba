//! Exchange layer: correlation, acks, dispatch, chunking.
//!
//! An exchange scopes one request/response round within a session (two
//! rounds for subscribe). The manager classifies inbound protocol headers,
//! accounts piggyback and standalone acks against MRP, dispatches decoded
//! Interaction Model requests to a handler, and seals replies with
//! piggyback acks and reliable-delivery registration. Oversized reports are
//! split into chunks that the client drains with StatusResponses.

mod mrp;

pub use mrp::{backoff_ms, jittered_backoff_ms, MrpTable, TimeoutAction};

use std::collections::{HashMap, VecDeque};

use crate::core::{
    ExchangeIdAllocator, ImError, StackError, OPCODE_IM_INVOKE_REQUEST, OPCODE_IM_INVOKE_RESPONSE,
    OPCODE_IM_READ_REQUEST, OPCODE_IM_REPORT_DATA, OPCODE_IM_STATUS_RESPONSE,
    OPCODE_IM_SUBSCRIBE_REQUEST, OPCODE_IM_SUBSCRIBE_RESPONSE, OPCODE_IM_TIMED_REQUEST,
    OPCODE_IM_WRITE_REQUEST, OPCODE_IM_WRITE_RESPONSE, OPCODE_MRP_STANDALONE_ACK,
    PROTOCOL_ID_INTERACTION_MODEL, PROTOCOL_ID_SECURE_CHANNEL, REPORTS_PER_CHUNK,
    REPORT_CHUNK_THRESHOLD,
};
use crate::im::{
    InteractionHandler, InvokeRequestMsg, ReadRequestMsg, ReportDataMsg, StatusCode,
    StatusResponseMsg, SubscribeRequestMsg, TimedRequestMsg, WriteRequestMsg,
};
use crate::message::ProtocolHeader;

/// Which side opened an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeRole {
    /// We opened it.
    Initiator,
    /// The peer opened it.
    Responder,
}

#[derive(Debug)]
struct Exchange {
    role: ExchangeRole,
    protocol_id: u16,
    /// Deadline armed by a TimedRequest; enforcement is the caller's.
    timed_deadline_ms: Option<u64>,
}

/// Remaining pieces of a chunked report. The trailing marker absorbs the
/// client's final StatusResponse before the exchange closes.
#[derive(Debug)]
enum Chunk {
    Payload(Vec<u8>),
    Done,
}

/// What the exchange manager wants done with the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeAction {
    /// Seal these protocol-header bytes and transmit.
    Send(Vec<u8>),
    /// Arm a retransmission timer.
    ScheduleMrp {
        /// Exchange the timer belongs to.
        exchange_id: u16,
        /// Attempt the timer was armed with.
        attempt: u32,
        /// Delay until it fires, milliseconds.
        delay_ms: u64,
    },
}

/// Per-session exchange state.
pub struct ExchangeManager {
    exchanges: HashMap<u16, Exchange>,
    mrp: MrpTable,
    chunk_queues: HashMap<u16, VecDeque<Chunk>>,
    pending_subscribe: HashMap<u16, Vec<u8>>,
    allocator: ExchangeIdAllocator,
}

impl Default for ExchangeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeManager {
    /// Fresh manager for a new session.
    pub fn new() -> Self {
        Self {
            exchanges: HashMap::new(),
            mrp: MrpTable::new(),
            chunk_queues: HashMap::new(),
            pending_subscribe: HashMap::new(),
            allocator: ExchangeIdAllocator::random(),
        }
    }

    /// Whether an exchange is currently open.
    pub fn has_exchange(&self, exchange_id: u16) -> bool {
        self.exchanges.contains_key(&exchange_id)
    }

    /// Reliable messages currently in flight.
    pub fn pending_sends(&self) -> usize {
        self.mrp.len()
    }

    /// Process one decrypted inbound message.
    ///
    /// `counter` is the frame's message counter, used for piggyback acks.
    pub fn on_message(
        &mut self,
        proto: &ProtocolHeader,
        payload: &[u8],
        counter: u32,
        now_ms: u64,
        handler: &mut dyn InteractionHandler,
    ) -> Result<Vec<ExchangeAction>, StackError> {
        match proto.protocol_id {
            PROTOCOL_ID_SECURE_CHANNEL if proto.opcode == OPCODE_MRP_STANDALONE_ACK => {
                Ok(self.on_standalone_ack(proto.exchange_id))
            }
            PROTOCOL_ID_INTERACTION_MODEL => self.on_im_message(proto, payload, counter, now_ms, handler),
            other => Err(ImError::UnsupportedProtocol(other).into()),
        }
    }

    fn on_standalone_ack(&mut self, exchange_id: u16) -> Vec<ExchangeAction> {
        let was_pending = self.mrp.on_ack(exchange_id);
        // A standalone ack of the primed report releases the stored
        // SubscribeResponse (second phase).
        if let Some(response) = self.pending_subscribe.remove(&exchange_id) {
            return self.reliable_reply(
                exchange_id,
                OPCODE_IM_SUBSCRIBE_RESPONSE,
                &response,
                None,
            );
        }
        // An exchange whose last reliable message just got acked, with
        // nothing queued behind it, is complete.
        if was_pending && !self.chunk_queues.contains_key(&exchange_id) {
            self.exchanges.remove(&exchange_id);
        }
        Vec::new()
    }

    fn on_im_message(
        &mut self,
        proto: &ProtocolHeader,
        payload: &[u8],
        counter: u32,
        now_ms: u64,
        handler: &mut dyn InteractionHandler,
    ) -> Result<Vec<ExchangeAction>, StackError> {
        let exchange_id = proto.exchange_id;
        if proto.ack_counter.is_some() {
            self.mrp.on_ack(exchange_id);
        }
        let ack = proto.reliable.then_some(counter);

        match proto.opcode {
            OPCODE_IM_STATUS_RESPONSE => Ok(self.on_status_response(exchange_id, ack)),
            OPCODE_IM_TIMED_REQUEST => {
                let request = match TimedRequestMsg::decode(payload) {
                    Ok(request) => request,
                    Err(err) => return Ok(self.decode_failure_reply(exchange_id, ack, err)),
                };
                self.exchanges.insert(
                    exchange_id,
                    Exchange {
                        role: ExchangeRole::Responder,
                        protocol_id: PROTOCOL_ID_INTERACTION_MODEL,
                        timed_deadline_ms: Some(now_ms + request.timeout_ms as u64),
                    },
                );
                let status = StatusResponseMsg { status: StatusCode::Success }.encode();
                Ok(self.reliable_reply(exchange_id, OPCODE_IM_STATUS_RESPONSE, &status, ack))
            }
            OPCODE_IM_READ_REQUEST => {
                let request = match ReadRequestMsg::decode(payload) {
                    Ok(request) => request,
                    Err(err) => return Ok(self.decode_failure_reply(exchange_id, ack, err)),
                };
                self.open_responder_exchange(exchange_id);
                let report = handler.on_read(request);
                Ok(self.respond_report(exchange_id, report, ack))
            }
            OPCODE_IM_WRITE_REQUEST => {
                let request = match WriteRequestMsg::decode(payload) {
                    Ok(request) => request,
                    Err(err) => return Ok(self.decode_failure_reply(exchange_id, ack, err)),
                };
                self.open_responder_exchange(exchange_id);
                let response = handler.on_write(request).encode();
                Ok(self.reliable_reply(exchange_id, OPCODE_IM_WRITE_RESPONSE, &response, ack))
            }
            OPCODE_IM_INVOKE_REQUEST => {
                let request = match InvokeRequestMsg::decode(payload) {
                    Ok(request) => request,
                    Err(err) => return Ok(self.decode_failure_reply(exchange_id, ack, err)),
                };
                if request.suppress_response {
                    // Side effects only; at most a standalone ack goes back.
                    let _ = handler.on_invoke(request);
                    return Ok(self.maybe_standalone_ack(exchange_id, proto, counter));
                }
                self.open_responder_exchange(exchange_id);
                let response = handler.on_invoke(request).encode();
                Ok(self.reliable_reply(exchange_id, OPCODE_IM_INVOKE_RESPONSE, &response, ack))
            }
            OPCODE_IM_SUBSCRIBE_REQUEST => {
                let request = match SubscribeRequestMsg::decode(payload) {
                    Ok(request) => request,
                    Err(err) => return Ok(self.decode_failure_reply(exchange_id, ack, err)),
                };
                self.open_responder_exchange(exchange_id);
                let outcome = handler.on_subscribe(request);
                self.pending_subscribe.insert(exchange_id, outcome.response.encode());
                Ok(self.respond_report(exchange_id, outcome.primed_report, ack))
            }
            other => Err(ImError::UnknownOpcode(other).into()),
        }
    }

    /// Client answered a report: next chunk, subscribe second phase, or
    /// exchange completion.
    fn on_status_response(&mut self, exchange_id: u16, ack: Option<u32>) -> Vec<ExchangeAction> {
        if let Some(queue) = self.chunk_queues.get_mut(&exchange_id) {
            match queue.pop_front() {
                Some(Chunk::Payload(report)) => {
                    return self.reliable_reply(exchange_id, OPCODE_IM_REPORT_DATA, &report, ack);
                }
                Some(Chunk::Done) | None => {
                    self.chunk_queues.remove(&exchange_id);
                    if let Some(response) = self.pending_subscribe.remove(&exchange_id) {
                        return self.reliable_reply(
                            exchange_id,
                            OPCODE_IM_SUBSCRIBE_RESPONSE,
                            &response,
                            ack,
                        );
                    }
                    self.exchanges.remove(&exchange_id);
                    return self.ack_only(exchange_id, ack);
                }
            }
        }
        if let Some(response) = self.pending_subscribe.remove(&exchange_id) {
            return self.reliable_reply(exchange_id, OPCODE_IM_SUBSCRIBE_RESPONSE, &response, ack);
        }
        self.exchanges.remove(&exchange_id);
        self.ack_only(exchange_id, ack)
    }

    /// Open a locally initiated exchange and optionally register the first
    /// send for reliable delivery.
    pub fn initiate(
        &mut self,
        opcode: u8,
        payload: &[u8],
        reliable: bool,
    ) -> (u16, Vec<ExchangeAction>) {
        let mut exchange_id = self.allocator.next();
        while self.exchanges.contains_key(&exchange_id) {
            exchange_id = self.allocator.next();
        }
        self.exchanges.insert(
            exchange_id,
            Exchange {
                role: ExchangeRole::Initiator,
                protocol_id: PROTOCOL_ID_INTERACTION_MODEL,
                timed_deadline_ms: None,
            },
        );
        let proto = ProtocolHeader {
            initiator: true,
            reliable,
            opcode,
            exchange_id,
            protocol_id: PROTOCOL_ID_INTERACTION_MODEL,
            ..Default::default()
        };
        let bytes = proto.encode(payload);
        let mut actions = vec![ExchangeAction::Send(bytes.clone())];
        if reliable {
            self.mrp.record_send(exchange_id, bytes);
            actions.push(ExchangeAction::ScheduleMrp {
                exchange_id,
                attempt: 0,
                delay_ms: jittered_backoff_ms(true, 0),
            });
        }
        (exchange_id, actions)
    }

    /// Route a fired retransmission timer; cleans up on give-up.
    pub fn on_timeout(&mut self, exchange_id: u16, attempt: u32) -> TimeoutAction {
        let action = self.mrp.on_timeout(exchange_id, attempt);
        if action == TimeoutAction::GiveUp {
            tracing::warn!(exchange_id, "reliable delivery exhausted, closing exchange");
            self.exchanges.remove(&exchange_id);
            self.chunk_queues.remove(&exchange_id);
            self.pending_subscribe.remove(&exchange_id);
        }
        action
    }

    fn open_responder_exchange(&mut self, exchange_id: u16) {
        self.exchanges.entry(exchange_id).or_insert(Exchange {
            role: ExchangeRole::Responder,
            protocol_id: PROTOCOL_ID_INTERACTION_MODEL,
            timed_deadline_ms: None,
        });
    }

    /// Encode a report, chunking it when it exceeds the report threshold.
    fn respond_report(
        &mut self,
        exchange_id: u16,
        report: ReportDataMsg,
        ack: Option<u32>,
    ) -> Vec<ExchangeAction> {
        let encoded = report.encode();
        if encoded.len() <= REPORT_CHUNK_THRESHOLD || report.reports.len() <= 1 {
            return self.reliable_reply(exchange_id, OPCODE_IM_REPORT_DATA, &encoded, ack);
        }

        let mut chunks: Vec<ReportDataMsg> = Vec::new();
        let mut reports = report.reports;
        while !reports.is_empty() {
            let rest = reports.split_off(reports.len().min(REPORTS_PER_CHUNK));
            chunks.push(ReportDataMsg {
                subscription_id: report.subscription_id,
                reports,
                suppress_response: false,
                more_chunks: true,
            });
            reports = rest;
        }
        if let Some(last) = chunks.last_mut() {
            last.more_chunks = false;
        }

        let mut queue: VecDeque<Chunk> =
            chunks.iter().skip(1).map(|c| Chunk::Payload(c.encode())).collect();
        queue.push_back(Chunk::Done);
        self.chunk_queues.insert(exchange_id, queue);

        let first = chunks[0].encode();
        self.reliable_reply(exchange_id, OPCODE_IM_REPORT_DATA, &first, ack)
    }

    /// Per the propagation policy, malformed IM payloads are acked (when
    /// requested) and answered with a StatusResponse.
    fn decode_failure_reply(
        &mut self,
        exchange_id: u16,
        ack: Option<u32>,
        err: ImError,
    ) -> Vec<ExchangeAction> {
        tracing::debug!(exchange_id, %err, "malformed interaction payload");
        let status = StatusResponseMsg { status: StatusCode::InvalidAction }.encode();
        self.reliable_reply(exchange_id, OPCODE_IM_STATUS_RESPONSE, &status, ack)
    }

    fn reliable_reply(
        &mut self,
        exchange_id: u16,
        opcode: u8,
        payload: &[u8],
        ack_counter: Option<u32>,
    ) -> Vec<ExchangeAction> {
        let role = self
            .exchanges
            .get(&exchange_id)
            .map(|e| e.role)
            .unwrap_or(ExchangeRole::Responder);
        let proto = ProtocolHeader {
            initiator: role == ExchangeRole::Initiator,
            reliable: true,
            opcode,
            exchange_id,
            protocol_id: PROTOCOL_ID_INTERACTION_MODEL,
            vendor_id: None,
            ack_counter,
            secured_extensions: false,
        };
        let bytes = proto.encode(payload);
        self.mrp.record_send(exchange_id, bytes.clone());
        vec![
            ExchangeAction::Send(bytes),
            ExchangeAction::ScheduleMrp {
                exchange_id,
                attempt: 0,
                delay_ms: jittered_backoff_ms(true, 0),
            },
        ]
    }

    fn ack_only(&mut self, exchange_id: u16, ack: Option<u32>) -> Vec<ExchangeAction> {
        match ack {
            Some(counter) => vec![ExchangeAction::Send(standalone_ack(exchange_id, counter))],
            None => Vec::new(),
        }
    }

    fn maybe_standalone_ack(
        &mut self,
        exchange_id: u16,
        proto: &ProtocolHeader,
        counter: u32,
    ) -> Vec<ExchangeAction> {
        if proto.reliable {
            vec![ExchangeAction::Send(standalone_ack(exchange_id, counter))]
        } else {
            Vec::new()
        }
    }

    /// Deadline armed on an exchange by a TimedRequest, if any.
    pub fn timed_deadline(&self, exchange_id: u16) -> Option<u64> {
        self.exchanges.get(&exchange_id).and_then(|e| e.timed_deadline_ms)
    }

    /// Role and protocol of an open exchange.
    pub fn exchange_info(&self, exchange_id: u16) -> Option<(ExchangeRole, u16)> {
        self.exchanges.get(&exchange_id).map(|e| (e.role, e.protocol_id))
    }
}

/// Encode a standalone acknowledgement for `counter` on `exchange_id`.
pub fn standalone_ack(exchange_id: u16, counter: u32) -> Vec<u8> {
    ProtocolHeader {
        opcode: OPCODE_MRP_STANDALONE_ACK,
        exchange_id,
        protocol_id: PROTOCOL_ID_SECURE_CHANNEL,
        ack_counter: Some(counter),
        ..Default::default()
    }
    .encode(&[])
}
