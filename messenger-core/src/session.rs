//! Sans-IO messaging session.
//!
//! Host-driven: no I/O. The host pushes inbound bytes with
//! [`Session::connection_push`] and drains outbound bytes with
//! [`Session::transport_head`] / [`Session::connection_pop`]. Links,
//! deliveries and the connection live in arenas keyed by opaque ids.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::address::{Route, ServiceAddress};
use crate::config::{window_len, SessionConfig};
use crate::delivery::{DeliveryQueue, Direction, Status, Tracker};
use crate::link::{EndpointState, Link, LinkId, LinkTable};
use crate::log::{Logger, TraceLevel};
use crate::message::Message;
use crate::protocol::{
    DeliveryState, ExpiryPolicy, Frame, ReceiverSettleMode, Role, SaslCode, SenderSettleMode,
};
use crate::transport::Transport;

/// Validate every route substitution at start.
pub const FLAG_CHECK_ROUTES: u32 = 0x1;
/// Permit SASL PLAIN over a non-TLS connection.
pub const FLAG_ALLOW_INSECURE_MECHS: u32 = 0x2;

const KNOWN_FLAGS: u32 = FLAG_CHECK_ROUTES | FLAG_ALLOW_INSECURE_MECHS;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Bad argument or configuration value.
    #[error("{0}")]
    Argument(String),
    /// Call not valid in the current lifecycle state.
    #[error("{0}")]
    State(String),
    /// Protocol or transport failure; text goes through the error classifier.
    #[error("{0}")]
    Transport(String),
}

/// Opaque handle for the resolved connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslPeerAuth {
    #[default]
    AnonymousPeer,
    VerifyPeer,
    VerifyPeerName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Started,
    Stopping,
    Stopped,
}

#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    host: String,
    transport: Transport,
    /// Waiting for the SASL outcome.
    sasl_pending: bool,
    remote_open: bool,
    local_closed: bool,
    remote_closed: bool,
    remote_container: Option<String>,
    remote_idle_timeout: u32,
}

pub struct Session {
    name: String,
    config: SessionConfig,
    logger: Arc<dyn Logger>,
    flags: u32,
    external_socket: bool,
    blocking: bool,
    trusted_certificates: Option<PathBuf>,
    ssl_peer_auth: SslPeerAuth,
    snd_settle_mode: SenderSettleMode,
    rcv_settle_mode: ReceiverSettleMode,
    routes: Vec<Route>,
    lifecycle: Lifecycle,
    next_connection: u64,
    connection: Option<Connection>,
    links: LinkTable,
    outgoing: DeliveryQueue,
    incoming: DeliveryQueue,
    next_delivery_id: u32,
    last_incoming: Option<Tracker>,
    error: Option<String>,
}

impl Session {
    /// An empty name is replaced by a generated container id.
    pub fn new(name: &str, config: SessionConfig, logger: Arc<dyn Logger>) -> Self {
        let name = if name.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            name.to_string()
        };
        let outgoing = DeliveryQueue::new(Direction::Outgoing, window_len(config.outgoing_window));
        let incoming = DeliveryQueue::new(Direction::Incoming, window_len(config.incoming_window));
        Self {
            name,
            config,
            logger,
            flags: 0,
            external_socket: false,
            blocking: true,
            trusted_certificates: None,
            ssl_peer_auth: SslPeerAuth::default(),
            snd_settle_mode: SenderSettleMode::default(),
            rcv_settle_mode: ReceiverSettleMode::default(),
            routes: Vec::new(),
            lifecycle: Lifecycle::Idle,
            next_connection: 0,
            connection: None,
            links: LinkTable::default(),
            outgoing,
            incoming,
            next_delivery_id: 0,
            last_incoming: None,
            error: None,
        }
    }

    /// Container id.
    pub fn name(&self) -> &str {
        &self.name
    }

    // --- configuration ---

    pub fn route(&mut self, pattern: &str, substitution: &str) -> Result<(), SessionError> {
        if pattern.is_empty() {
            return Err(SessionError::Argument("route pattern is empty".into()));
        }
        self.routes.push(Route::new(pattern, substitution));
        Ok(())
    }

    pub fn set_flags(&mut self, flags: u32) -> Result<(), SessionError> {
        if flags & !KNOWN_FLAGS != 0 {
            return Err(SessionError::Argument(format!("unknown flags {:#x}", flags)));
        }
        self.flags = flags;
        Ok(())
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_external_socket(&mut self, external: bool) -> Result<(), SessionError> {
        if self.lifecycle != Lifecycle::Idle {
            return Err(SessionError::State(
                "external socket mode must be set before start".into(),
            ));
        }
        self.external_socket = external;
        Ok(())
    }

    pub fn external_socket(&self) -> bool {
        self.external_socket
    }

    pub fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn set_incoming_window(&mut self, window: i32) {
        self.config.incoming_window = window;
        self.incoming.set_window(window_len(window));
    }

    pub fn set_outgoing_window(&mut self, window: i32) {
        self.config.outgoing_window = window;
        self.outgoing.set_window(window_len(window));
    }

    pub fn set_trusted_certificates(&mut self, path: &Path) -> Result<(), SessionError> {
        if path.as_os_str().is_empty() {
            return Err(SessionError::Argument("trusted certificate path is empty".into()));
        }
        self.trusted_certificates = Some(path.to_path_buf());
        Ok(())
    }

    pub fn trusted_certificates(&self) -> Option<&Path> {
        self.trusted_certificates.as_deref()
    }

    pub fn set_ssl_peer_authentication(&mut self, mode: SslPeerAuth) {
        self.ssl_peer_auth = mode;
    }

    pub fn ssl_peer_authentication(&self) -> SslPeerAuth {
        self.ssl_peer_auth
    }

    /// Settle mode applied to links created from now on.
    pub fn set_snd_settle_mode(&mut self, mode: SenderSettleMode) {
        self.snd_settle_mode = mode;
    }

    pub fn set_rcv_settle_mode(&mut self, mode: ReceiverSettleMode) {
        self.rcv_settle_mode = mode;
    }

    // --- lifecycle ---

    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.lifecycle == Lifecycle::Started {
            return Err(SessionError::State("session already started".into()));
        }
        for route in &self.routes {
            let probe = route.substitution.replace("$1", "");
            let parsed = ServiceAddress::parse(probe.trim_end_matches('/'));
            let target = match parsed {
                Ok(a) => a,
                Err(_) if self.flags & FLAG_CHECK_ROUTES != 0 => {
                    return Err(SessionError::Transport(format!(
                        "unable to resolve route {}",
                        route.trace_substitution()
                    )));
                }
                Err(_) => continue,
            };
            if target.has_credentials()
                && !target.is_tls()
                && self.flags & FLAG_ALLOW_INSECURE_MECHS == 0
            {
                return Err(SessionError::Transport(
                    "sasl PLAIN mechanism not permitted over an insecure connection".into(),
                ));
            }
        }
        self.lifecycle = Lifecycle::Started;
        tracing::debug!(container = %self.name, routes = self.routes.len(), "session started");
        Ok(())
    }

    /// Whether the remote has opened the connection (and SASL, if any, succeeded).
    pub fn started(&self) -> bool {
        self.lifecycle == Lifecycle::Started
            && self
                .connection
                .as_ref()
                .map_or(false, |c| c.remote_open && !c.sasl_pending)
    }

    /// Begin an orderly shutdown: close open links, then the connection.
    pub fn stop(&mut self) {
        if self.lifecycle != Lifecycle::Started {
            return;
        }
        self.lifecycle = Lifecycle::Stopping;
        let open: Vec<LinkId> = self
            .links
            .iter()
            .filter(|l| l.local_active())
            .map(|l| l.id)
            .collect();
        for id in open {
            self.close_link(id);
        }
        let close_needed = self
            .connection
            .as_ref()
            .map_or(false, |c| !c.local_closed && !c.transport.output_closed());
        if close_needed {
            self.emit(Frame::Close { error: None });
            if let Some(c) = self.connection.as_mut() {
                c.local_closed = true;
                c.transport.close_output();
            }
        }
        if self.connection.is_none() {
            self.lifecycle = Lifecycle::Stopped;
        }
    }

    pub fn stopped(&self) -> bool {
        match self.lifecycle {
            Lifecycle::Idle | Lifecycle::Stopped => true,
            // Remote close or transport failure without a local stop.
            Lifecycle::Started => self
                .connection
                .as_ref()
                .map_or(false, |c| c.transport.closed()),
            Lifecycle::Stopping => self.connection.as_ref().map_or(true, |c| {
                (c.local_closed && c.remote_closed) || c.transport.input_closed()
            }),
        }
    }

    /// Map `address` through the routes and return the connection serving it,
    /// opening the connection on first use.
    pub fn resolve(&mut self, address: &str) -> Option<ConnectionId> {
        self.resolve_path(address).map(|(id, _)| id)
    }

    fn apply_routes(&self, address: &str) -> String {
        self.routes
            .iter()
            .find_map(|r| r.apply(address))
            .unwrap_or_else(|| address.to_string())
    }

    /// Connection and link name for `address`.
    fn resolve_path(&mut self, address: &str) -> Option<(ConnectionId, String)> {
        if self.lifecycle != Lifecycle::Started {
            return None;
        }
        let resolved = self.apply_routes(address);
        let target = ServiceAddress::parse(&resolved).ok()?;
        let path = target.path().to_string();
        if let Some(c) = &self.connection {
            return (c.host == target.host_and_port()).then(|| (c.id, path));
        }
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        self.connection = Some(Connection {
            id,
            host: target.host_and_port(),
            transport: Transport::new(self.config.input_capacity, self.config.max_frame_size),
            sasl_pending: target.has_credentials(),
            remote_open: false,
            local_closed: false,
            remote_closed: false,
            remote_container: None,
            remote_idle_timeout: 0,
        });
        tracing::debug!(container = %self.name, host = %target.host_and_port(), "connection resolved");
        if target.has_credentials() {
            let mut response = vec![0u8];
            response.extend_from_slice(target.username().as_bytes());
            response.push(0);
            response.extend_from_slice(target.password().unwrap_or_default().as_bytes());
            self.emit(Frame::SaslInit {
                mechanism: "PLAIN".into(),
                initial_response: response,
                hostname: target.host().to_string(),
            });
        }
        self.emit(Frame::Open {
            container_id: self.name.clone(),
            hostname: target.host().to_string(),
            idle_timeout: self.config.idle_timeout_ms(),
            max_frame_size: self.config.max_frame_size,
        });
        Some((id, path))
    }

    // --- links ---

    /// Open a receiver link for `address` (or return the open one).
    pub fn subscribe_ttl(&mut self, address: &str, ttl: u32) -> Result<LinkId, SessionError> {
        let (_, name) = self.resolve_path(address).ok_or_else(|| {
            SessionError::Transport(format!("unable to resolve {}", address))
        })?;
        if let Some(id) = self.links.find_active(&name, Role::Receiver) {
            return Ok(id);
        }
        let id = self.create_link(&name, Role::Receiver, |link| {
            link.source.timeout = ttl;
            link.target.timeout = ttl;
        });
        Ok(id)
    }

    fn create_link(&mut self, name: &str, role: Role, configure: impl FnOnce(&mut Link)) -> LinkId {
        self.links.purge_ended(name, role);
        let link = self.links.create(name, role);
        link.snd_settle_mode = self.snd_settle_mode;
        link.rcv_settle_mode = self.rcv_settle_mode;
        link.local = EndpointState::Active;
        configure(link);
        let id = link.id;
        let frame = link.attach_frame();
        self.emit(frame);
        id
    }

    /// Locally open link for `address`. With `create`, opens one when absent.
    pub fn link(&mut self, address: &str, sender: bool, create: bool) -> Option<LinkId> {
        let (_, name) = self.resolve_path(address)?;
        let role = if sender { Role::Sender } else { Role::Receiver };
        match self.links.find_active(&name, role) {
            Some(id) => Some(id),
            None if create => Some(self.create_link(&name, role, |_| {})),
            None => None,
        }
    }

    /// Link for `address` in any state, including closed ones not yet reclaimed.
    pub fn stated_link(&mut self, address: &str, sender: bool) -> Option<LinkId> {
        let (_, name) = self.resolve_path(address)?;
        let role = if sender { Role::Sender } else { Role::Receiver };
        self.links.find_any(&name, role)
    }

    pub fn link_info(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn set_link_expiry(&mut self, id: LinkId, policy: ExpiryPolicy, timeout: u32) {
        if let Some(link) = self.links.get_mut(id) {
            link.set_expiry(policy, timeout);
        }
    }

    pub fn close_link(&mut self, id: LinkId) {
        self.end_link(id, true);
    }

    pub fn detach_link(&mut self, id: LinkId) {
        self.end_link(id, false);
    }

    fn end_link(&mut self, id: LinkId, closed: bool) {
        let Some(link) = self.links.get_mut(id) else {
            return;
        };
        if link.locally_closed() {
            return;
        }
        if closed {
            link.local = EndpointState::Closed;
        } else {
            link.local_detached = true;
        }
        let frame = Frame::Detach {
            name: link.name.clone(),
            role: link.role,
            closed,
            error: None,
        };
        self.emit(frame);
    }

    /// Links still held, in any state.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Release a link. Returns false if it was already released.
    pub fn reclaim_link(&mut self, id: LinkId) -> bool {
        self.links.remove(id)
    }

    /// Grant `credit` more messages on a receiver link.
    pub fn flow(&mut self, id: LinkId, credit: u32) {
        let Some(link) = self.links.get_mut(id) else {
            return;
        };
        if link.is_sender() || !link.local_active() {
            return;
        }
        link.credit = link.credit.saturating_add(credit);
        let frame = link.flow_frame();
        self.emit(frame);
    }

    // --- deliveries ---

    /// Queue a message on the sender link for its address.
    pub fn put(&mut self, message: Message) -> Result<Tracker, SessionError> {
        if message.address().is_empty() {
            return Err(SessionError::Argument("message address is required".into()));
        }
        let address = message.address().to_string();
        let link = self.link(&address, true, true).ok_or_else(|| {
            SessionError::Transport(format!("unable to resolve {}", address))
        })?;
        Ok(self.outgoing.push(link, message))
    }

    /// Release every queued message for transfer.
    pub fn send(&mut self) -> Result<(), SessionError> {
        if self.lifecycle != Lifecycle::Started {
            return Err(SessionError::State("session not started".into()));
        }
        for d in self.outgoing.iter_mut() {
            d.eligible = true;
        }
        self.pump();
        Ok(())
    }

    /// Transfer eligible deliveries on links that have credit.
    fn pump(&mut self) {
        let mut frames = Vec::new();
        for d in self.outgoing.iter_mut() {
            if !d.eligible || d.sent {
                continue;
            }
            let Some(link) = self.links.get_mut(d.link) else {
                continue;
            };
            if !link.local_active() || !link.remote_active() || link.credit == 0 {
                continue;
            }
            let Some(message) = d.message.take() else {
                continue;
            };
            let delivery_id = self.next_delivery_id;
            self.next_delivery_id = self.next_delivery_id.wrapping_add(1);
            let settled = d.local_settled || link.snd_settle_mode == SenderSettleMode::Settled;
            link.credit -= 1;
            link.delivery_count = link.delivery_count.wrapping_add(1);
            d.sent = true;
            d.delivery_id = Some(delivery_id);
            d.local_settled = settled;
            frames.push(Frame::Transfer {
                name: link.name.clone(),
                delivery_id,
                settled,
                message,
            });
        }
        for frame in frames {
            self.emit(frame);
        }
        self.outgoing.settled();
    }

    /// Receive pass: tops up credit on receiver links the remote opened.
    pub fn recv(&mut self, _n: i32) -> Result<(), SessionError> {
        if self.lifecycle != Lifecycle::Started {
            return Err(SessionError::State("session not started".into()));
        }
        let target = self.config.receive_credit;
        let mut frames = Vec::new();
        for link in self.links.iter_mut() {
            if link.remotely_initiated
                && !link.is_sender()
                && link.local_active()
                && link.credit < target
            {
                link.credit = target;
                frames.push(link.flow_frame());
            }
        }
        for frame in frames {
            self.emit(frame);
        }
        Ok(())
    }

    /// Messages received and not yet taken with [`Session::get`].
    pub fn incoming(&self) -> usize {
        self.incoming.iter().filter(|d| d.message.is_some()).count()
    }

    /// Next received message in arrival order, with its tracker set.
    pub fn get(&mut self) -> Option<Message> {
        let d = self.incoming.iter_mut().find(|d| d.message.is_some())?;
        let mut message = d.message.take()?;
        message.set_tracker(d.tracker);
        self.last_incoming = Some(d.tracker);
        Some(message)
    }

    /// Tracker of the message last returned by [`Session::get`].
    pub fn incoming_tracker(&self) -> Option<Tracker> {
        self.last_incoming
    }

    pub fn tracker_link(&self, tracker: Tracker) -> Option<LinkId> {
        let link = self.queue(tracker.direction).get(tracker)?.link;
        self.links.get(link).map(|l| l.id)
    }

    fn queue(&self, direction: Direction) -> &DeliveryQueue {
        match direction {
            Direction::Incoming => &self.incoming,
            Direction::Outgoing => &self.outgoing,
        }
    }

    fn queue_mut(&mut self, direction: Direction) -> &mut DeliveryQueue {
        match direction {
            Direction::Incoming => &mut self.incoming,
            Direction::Outgoing => &mut self.outgoing,
        }
    }

    pub fn status(&self, tracker: Tracker) -> Status {
        self.queue(tracker.direction)
            .get(tracker)
            .map_or(Status::Unknown, |d| d.status())
    }

    /// Description of the error carried by the remote outcome, if any.
    pub fn status_error(&self, tracker: Tracker) -> Option<String> {
        self.queue(tracker.direction)
            .get(tracker)?
            .remote_error()
            .map(|e| e.description.clone())
    }

    /// Accept an incoming delivery.
    pub fn accept(&mut self, tracker: Tracker) -> Result<(), SessionError> {
        let d = self
            .incoming
            .get_mut(tracker)
            .ok_or_else(|| SessionError::Argument("unknown tracker".into()))?;
        d.local_state = Some(DeliveryState::Accepted);
        if d.remote_settled || d.local_settled {
            return Ok(());
        }
        let Some(id) = d.delivery_id else {
            return Ok(());
        };
        self.emit(Frame::Disposition {
            role: Role::Receiver,
            first: id,
            last: id,
            settled: false,
            state: Some(DeliveryState::Accepted),
        });
        Ok(())
    }

    /// Settle a delivery locally and tell the remote if it still cares.
    pub fn settle(&mut self, tracker: Tracker) -> Result<(), SessionError> {
        let direction = tracker.direction;
        let d = self
            .queue_mut(direction)
            .get_mut(tracker)
            .ok_or_else(|| SessionError::Argument("unknown tracker".into()))?;
        if d.local_settled {
            return Ok(());
        }
        d.local_settled = true;
        let frame = match (direction, d.delivery_id, d.remote_settled) {
            (_, None, _) | (_, _, true) => None,
            (Direction::Incoming, Some(id), false) => Some(Frame::Disposition {
                role: Role::Receiver,
                first: id,
                last: id,
                settled: true,
                state: d.local_state.clone(),
            }),
            (Direction::Outgoing, Some(id), false) if d.sent => Some(Frame::Disposition {
                role: Role::Sender,
                first: id,
                last: id,
                settled: true,
                state: None,
            }),
            _ => None,
        };
        if let Some(frame) = frame {
            self.emit(frame);
        }
        self.queue_mut(direction).settled();
        Ok(())
    }

    /// `Some(true)` for a delivery this side received, `None` if unknown.
    pub fn delivery_is_receiver(&self, tracker: Tracker) -> Option<bool> {
        self.queue(tracker.direction)
            .get(tracker)
            .map(|d| d.tracker.direction == Direction::Incoming)
    }

    /// All queued output bytes for the delivery's connection have been handed off.
    pub fn transport_quiesced(&self, _tracker: Tracker) -> bool {
        self.connection
            .as_ref()
            .map_or(true, |c| c.transport.quiesced())
    }

    /// Unsent messages for `address` plus unsent transport bytes; -1 if unroutable.
    pub fn pending_outbound(&mut self, address: &str) -> isize {
        let Some((conn, name)) = self.resolve_path(address) else {
            return -1;
        };
        let unsent = self
            .outgoing
            .iter()
            .filter(|d| !d.sent)
            .filter(|d| self.links.get(d.link).map_or(false, |l| l.name == name))
            .count();
        unsent as isize + self.transport_pending(conn).max(0)
    }

    /// Idle timeout (ms) the remote advertised; -1 if unroutable.
    pub fn remote_idle_timeout(&mut self, address: &str) -> i32 {
        if self.resolve_path(address).is_none() {
            return -1;
        }
        self.connection
            .as_ref()
            .map_or(-1, |c| c.remote_idle_timeout.min(i32::MAX as u32) as i32)
    }

    pub fn remote_container(&self) -> Option<&str> {
        self.connection.as_ref()?.remote_container.as_deref()
    }

    // --- transport ---

    /// Feed inbound bytes. Returns how many were taken.
    pub fn connection_push(
        &mut self,
        id: ConnectionId,
        bytes: &[u8],
    ) -> Result<usize, SessionError> {
        let conn = self.conn_mut(id)?;
        let n = conn.transport.push(bytes);
        let before = self.error.clone();
        self.process_input();
        match &self.error {
            Some(e) if before.as_ref() != Some(e) => Err(SessionError::Transport(e.clone())),
            _ => Ok(n),
        }
    }

    /// Bytes waiting to be written; -1 once the transport has finished.
    pub fn transport_pending(&self, id: ConnectionId) -> isize {
        match self.connection.as_ref().filter(|c| c.id == id) {
            Some(c) if c.transport.output_closed() && c.transport.pending() == 0 => -1,
            Some(c) => c.transport.pending() as isize,
            None => -1,
        }
    }

    pub fn transport_head(&self, id: ConnectionId) -> Option<&[u8]> {
        self.connection
            .as_ref()
            .filter(|c| c.id == id)
            .map(|c| c.transport.head())
    }

    /// Commit `n` written bytes; `n == 0` is a tick that may queue a heartbeat.
    /// Returns true once the connection is closed.
    pub fn connection_pop(&mut self, id: ConnectionId, n: usize) -> bool {
        let Ok(conn) = self.conn_mut(id) else {
            return true;
        };
        conn.transport.pop(n);
        if n == 0 {
            let idle = conn.transport.idle_since_last_check();
            if idle && conn.remote_idle_timeout > 0 && !conn.transport.output_closed() {
                self.emit(Frame::Empty);
            }
        }
        self.connection_closed(id)
    }

    pub fn connection_closed(&self, id: ConnectionId) -> bool {
        self.connection
            .as_ref()
            .filter(|c| c.id == id)
            .map_or(true, |c| c.transport.closed())
    }

    /// Host saw the socket close. An unclean close records "connection aborted".
    pub fn connection_was_closed(&mut self, id: ConnectionId) -> Result<(), SessionError> {
        let conn = self.conn_mut(id)?;
        let clean = conn.local_closed && conn.remote_closed;
        conn.transport.abort();
        if clean {
            return Ok(());
        }
        let text = "connection aborted".to_string();
        self.error = Some(text.clone());
        Err(SessionError::Transport(text))
    }

    /// Transport tick count, for observing forced pops.
    pub fn ticks(&self, id: ConnectionId) -> u64 {
        self.connection
            .as_ref()
            .filter(|c| c.id == id)
            .map_or(0, |c| c.transport.ticks())
    }

    /// Take the last recorded error.
    pub fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn conn_mut(&mut self, id: ConnectionId) -> Result<&mut Connection, SessionError> {
        self.connection
            .as_mut()
            .filter(|c| c.id == id)
            .ok_or_else(|| SessionError::State("unknown connection".into()))
    }

    fn emit(&mut self, frame: Frame) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        trace_frame(&*self.logger, &self.name, "[->]", &frame);
        if let Err(e) = conn.transport.write_frame(&frame) {
            tracing::warn!(container = %self.name, error = %e, "frame dropped");
            self.error = Some(e);
        }
    }

    fn fail(&mut self, text: String) {
        tracing::debug!(container = %self.name, error = %text, "transport failed");
        if let Some(conn) = self.connection.as_mut() {
            conn.transport.close_input();
            conn.transport.close_output();
        }
        self.error = Some(text);
    }

    fn process_input(&mut self) {
        loop {
            let next = match self.connection.as_mut() {
                Some(c) => c.transport.next_frame(),
                None => return,
            };
            match next {
                Ok(Some(frame)) => {
                    trace_frame(&*self.logger, &self.name, "[<-]", &frame);
                    self.handle_frame(frame);
                }
                Ok(None) => return,
                Err(e) => {
                    self.fail(format!("framing error: {}", e));
                    return;
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::SaslInit { .. } => self.emit(Frame::SaslOutcome { code: SaslCode::Ok }),
            Frame::SaslOutcome { code } => {
                if code == SaslCode::Ok {
                    if let Some(c) = self.connection.as_mut() {
                        c.sasl_pending = false;
                    }
                } else {
                    self.fail("sasl authentication failed".into());
                }
            }
            Frame::Open {
                container_id,
                idle_timeout,
                ..
            } => {
                if let Some(c) = self.connection.as_mut() {
                    c.remote_open = true;
                    c.remote_container = Some(container_id);
                    c.remote_idle_timeout = idle_timeout;
                }
            }
            Frame::Attach {
                name,
                role,
                snd_settle_mode,
                rcv_settle_mode,
                source,
                target,
            } => {
                let ours = role.opposite();
                let existing = self
                    .links
                    .find_for_remote(&name, ours)
                    .filter(|id| self.links.get(*id).map_or(false, |l| l.remote == EndpointState::Uninit));
                match existing {
                    Some(id) => {
                        if let Some(link) = self.links.get_mut(id) {
                            link.remote = EndpointState::Active;
                            link.remote_source = Some(source);
                        }
                    }
                    None => {
                        let credit = self.config.receive_credit;
                        self.links.purge_ended(&name, ours);
                        let link = self.links.create(&name, ours);
                        link.snd_settle_mode = snd_settle_mode;
                        link.rcv_settle_mode = rcv_settle_mode;
                        link.source = source.clone();
                        link.target = target;
                        link.remote_source = Some(source);
                        link.local = EndpointState::Active;
                        link.remote = EndpointState::Active;
                        link.remotely_initiated = true;
                        let attach = link.attach_frame();
                        let flow = if link.is_sender() {
                            None
                        } else {
                            link.credit = credit;
                            Some(link.flow_frame())
                        };
                        self.emit(attach);
                        if let Some(flow) = flow {
                            self.emit(flow);
                        }
                    }
                }
                self.pump();
            }
            Frame::Flow {
                name,
                delivery_count,
                link_credit,
            } => {
                if let Some(id) = self.links.find_for_remote(&name, Role::Sender) {
                    if let Some(link) = self.links.get_mut(id) {
                        link.credit = delivery_count
                            .wrapping_add(link_credit)
                            .wrapping_sub(link.delivery_count);
                    }
                }
                self.pump();
            }
            Frame::Transfer {
                name,
                delivery_id,
                settled,
                message,
            } => {
                let Some(id) = self.links.find_for_remote(&name, Role::Receiver) else {
                    tracing::debug!(container = %self.name, link = %name, "transfer for unknown link");
                    return;
                };
                if let Some(link) = self.links.get_mut(id) {
                    link.credit = link.credit.saturating_sub(1);
                    link.delivery_count = link.delivery_count.wrapping_add(1);
                }
                let tracker = self.incoming.push(id, message);
                if let Some(d) = self.incoming.get_mut(tracker) {
                    d.delivery_id = Some(delivery_id);
                    d.remote_settled = settled;
                }
            }
            Frame::Disposition {
                role,
                first,
                last,
                settled,
                state,
            } => {
                let queue = match role {
                    Role::Receiver => &mut self.outgoing,
                    Role::Sender => &mut self.incoming,
                };
                for d in queue.iter_mut() {
                    let Some(id) = d.delivery_id else { continue };
                    if id < first || id > last {
                        continue;
                    }
                    if state.is_some() {
                        d.remote_state = state.clone();
                    }
                    if settled {
                        d.remote_settled = true;
                    }
                }
            }
            Frame::Detach {
                name,
                role,
                closed,
                error,
            } => {
                if let Some(error) = &error {
                    self.error = Some(error.text());
                }
                let Some(id) = self.links.find_for_remote(&name, role.opposite()) else {
                    return;
                };
                let mut answer = false;
                let mut remote_owned = false;
                if let Some(link) = self.links.get_mut(id) {
                    if closed {
                        link.remote = EndpointState::Closed;
                    } else {
                        link.remote_detached = true;
                    }
                    remote_owned = link.remotely_initiated;
                    answer = remote_owned && !link.locally_closed();
                }
                if answer {
                    self.end_link(id, closed);
                }
                // Opened by the remote, so nobody waits on it locally.
                if remote_owned {
                    self.links.remove(id);
                }
            }
            Frame::Close { error } => {
                if let Some(error) = &error {
                    self.error = Some(error.text());
                }
                let answer = self.connection.as_ref().map_or(false, |c| !c.local_closed);
                if answer {
                    self.emit(Frame::Close { error: None });
                }
                if let Some(c) = self.connection.as_mut() {
                    c.remote_closed = true;
                    c.local_closed = true;
                    c.transport.close_output();
                    c.transport.close_input();
                }
            }
            Frame::Empty => {}
        }
    }
}

fn trace_frame(logger: &dyn Logger, id: &str, direction: &str, frame: &Frame) {
    let data = match frame {
        Frame::SaslInit {
            mechanism,
            hostname,
            ..
        } => format!("sasl-init mechanism={} hostname={}", mechanism, hostname),
        other => format!("{:?}", other),
    };
    logger.log(TraceLevel::Detail, id, direction, &data);
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("lifecycle", &self.lifecycle)
            .field("connection", &self.connection.as_ref().map(|c| c.id))
            .finish()
    }
}
