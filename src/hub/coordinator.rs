//! The hub's single coordination loop.
//!
//! [`Hub::run`] multiplexes the register, unregister, dispatch, and control
//! channels and handles one event at a time. Registry mutation and routing
//! decisions all happen here, which is what lets the registry go without a
//! lock. Delivery to a connection is always a non-blocking `try_send`: a
//! recipient with a full buffer is evicted instead of stalling the loop.
//!
//! Broadcasts and presence frames stay inside the sender's room. A
//! targeted message reaches its recipient wherever it is.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::handle::{Control, HubHandle, Inbound, RegisterRequest, UnregisterRequest, WeakHubHandle};
use super::registry::Registry;
use crate::config::HubConfig;
use crate::domain::{ConnectionId, DisconnectReason, Envelope, PresenceEvent, RoomId};
use crate::error::RelayError;
use crate::ws::connection::ConnectionHandle;
use crate::ws::messages::ServerFrame;

/// Error code sent back to clients whose frame could not be routed.
const REJECTED_FRAME_CODE: u32 = 1001;

/// Owner of the registry and of all routing decisions.
#[derive(Debug)]
pub struct Hub {
    config: HubConfig,
    registry: Registry,
    handle: WeakHubHandle,
    register_rx: mpsc::Receiver<RegisterRequest>,
    unregister_rx: mpsc::Receiver<UnregisterRequest>,
    dispatch_rx: mpsc::Receiver<Inbound>,
    control_rx: mpsc::Receiver<Control>,
}

impl Hub {
    /// Creates a hub and the handle used to talk to it. The hub does
    /// nothing until [`Hub::run`] is polled.
    #[must_use]
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let capacity = config.channel_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(capacity);
        let (control_tx, control_rx) = mpsc::channel(capacity);

        let handle = HubHandle {
            register_tx,
            unregister_tx,
            dispatch_tx,
            control_tx,
        };
        let hub = Self {
            config,
            registry: Registry::new(),
            handle: handle.downgrade(),
            register_rx,
            unregister_rx,
            dispatch_rx,
            control_rx,
        };
        (hub, handle)
    }

    /// Creates a hub and runs it on a new task.
    #[must_use]
    pub fn spawn(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(config);
        (handle, tokio::spawn(hub.run()))
    }

    /// Runs the coordination loop until shutdown is requested or every
    /// handle has been dropped. Either way all connections are closed
    /// before this returns.
    pub async fn run(mut self) {
        tracing::info!(
            outbound_capacity = self.config.outbound_capacity,
            echo_to_sender = self.config.echo_to_sender,
            "hub started"
        );

        let shutdown_ack = loop {
            tokio::select! {
                Some(request) = self.register_rx.recv() => self.on_register(request),
                Some(request) = self.unregister_rx.recv() => self.on_unregister(request),
                Some(inbound) = self.dispatch_rx.recv() => self.on_inbound(inbound),
                control = self.control_rx.recv() => match control {
                    Some(request) => {
                        if let Some(ack) = self.on_control(request) {
                            break Some(ack);
                        }
                    }
                    None => break None,
                },
            }
        };

        if shutdown_ack.is_none() {
            tracing::warn!("all hub handles dropped; shutting down");
        }
        self.close_all().await;
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
        tracing::info!("hub stopped");
    }

    fn on_register(&mut self, request: RegisterRequest) {
        let RegisterRequest { connection, ack } = request;
        let id = connection.id();

        if self.registry.contains(&id) {
            tracing::error!(connection_id = %id, "registry conflict: connection id already registered");
            let _ = ack.send(Err(RelayError::RegistryConflict(id)));
            return;
        }
        let Some(hub) = self.handle.upgrade() else {
            let _ = ack.send(Err(RelayError::HubUnavailable));
            return;
        };

        let room = connection.room().clone();
        if !self.registry.has_room(&room) {
            tracing::debug!(connection_id = %id, %room, "register into unknown room refused");
            let _ = ack.send(Err(RelayError::RoomNotFound(room.to_string())));
            return;
        }

        let username = connection.username().to_string();
        let handle = connection.start(hub, self.config.outbound_capacity);
        let welcome = ServerFrame::Welcome {
            connection_id: id,
            user_id: id.user_id(),
            username: username.clone(),
            room: room.clone(),
        };
        let mut failed = VecDeque::new();
        if let Err(reason) = deliver(&handle, welcome) {
            failed.push_back((id, reason));
        }
        if let Err(rejected) = self.registry.insert(handle) {
            tracing::error!(connection_id = %id, "registry insert failed after contains check; closing connection");
            drop(rejected.close());
            let _ = ack.send(Err(RelayError::RegistryConflict(id)));
            return;
        }
        tracing::info!(
            connection_id = %id,
            user_id = id.user_id(),
            %username,
            %room,
            connections = self.registry.len(),
            "connection registered"
        );

        if self.config.announce_presence {
            let joined = ServerFrame::Presence(Arc::new(PresenceEvent::Joined {
                connection_id: id,
                user_id: id.user_id(),
                username,
                room: room.clone(),
                timestamp: Utc::now(),
            }));
            failed.extend(self.deliver_to_room(&joined, &room, Some(id)));
        }
        let _ = ack.send(Ok(id));
        self.evict(failed);
    }

    /// Answers an administrative request. Returns the acknowledgement
    /// channel when the request is a shutdown.
    fn on_control(&mut self, request: Control) -> Option<oneshot::Sender<()>> {
        match request {
            Control::Clients(reply) => {
                let _ = reply.send(self.registry.snapshot());
            }
            Control::RoomClients(room, reply) => {
                let clients = self
                    .registry
                    .room_snapshot(&room)
                    .ok_or_else(|| RelayError::RoomNotFound(room.to_string()));
                let _ = reply.send(clients);
            }
            Control::CreateRoom(room, reply) => {
                let created = self.registry.create_room(room).map_err(|taken| {
                    RelayError::RoomExists(taken.id.to_string())
                });
                if let Ok(info) = &created {
                    tracing::info!(room = %info.id, name = %info.name, "room created");
                }
                let _ = reply.send(created);
            }
            Control::Room(room, reply) => {
                let info = self
                    .registry
                    .room(&room)
                    .ok_or_else(|| RelayError::RoomNotFound(room.to_string()));
                let _ = reply.send(info);
            }
            Control::Rooms(reply) => {
                let _ = reply.send(self.registry.rooms());
            }
            Control::Shutdown(ack) => return Some(ack),
        }
        None
    }

    fn on_unregister(&mut self, request: UnregisterRequest) {
        let removed = self.remove(request.id, request.reason);
        if let Some(ack) = request.ack {
            let _ = ack.send(removed);
        }
    }

    fn on_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Envelope(envelope) => self.route(envelope),
            Inbound::Rejected { from, reason } => {
                tracing::debug!(connection_id = %from, %reason, "rejected client frame");
                let Some(handle) = self.registry.get(&from) else {
                    return;
                };
                let frame = ServerFrame::Error {
                    code: REJECTED_FRAME_CODE,
                    message: reason,
                };
                if let Err(reason) = deliver(handle, frame) {
                    self.evict(VecDeque::from([(from, reason)]));
                }
            }
        }
    }

    /// Routes an envelope: to its target if set, otherwise to everyone in
    /// the sender's room.
    fn route(&mut self, envelope: Envelope) {
        let sender = envelope.sender;
        let target = envelope.target;
        let room = envelope.room.clone();
        let frame = ServerFrame::Message(Arc::new(envelope));

        let failed = match target {
            Some(target) => {
                let Some(handle) = self.registry.get(&target) else {
                    tracing::debug!(%sender, %target, "target not registered; message dropped");
                    return;
                };
                match deliver(handle, frame) {
                    Ok(()) => VecDeque::new(),
                    Err(reason) => VecDeque::from([(target, reason)]),
                }
            }
            None => {
                let exclude = (!self.config.echo_to_sender).then_some(sender);
                self.deliver_to_room(&frame, &room, exclude)
            }
        };
        self.evict(failed);
    }

    /// Delivers a frame to every connection in `room` except `exclude`,
    /// returning the recipients that could not take it.
    fn deliver_to_room(
        &self,
        frame: &ServerFrame,
        room: &RoomId,
        exclude: Option<ConnectionId>,
    ) -> VecDeque<(ConnectionId, DisconnectReason)> {
        self.registry
            .in_room(room)
            .filter(|handle| Some(handle.id()) != exclude)
            .filter_map(|handle| {
                deliver(handle, frame.clone())
                    .err()
                    .map(|reason| (handle.id(), reason))
            })
            .collect()
    }

    /// Unregisters failed recipients. Announcing a departure can itself
    /// overflow someone else's buffer, so this works through a queue.
    fn evict(&mut self, mut failed: VecDeque<(ConnectionId, DisconnectReason)>) {
        while let Some((id, reason)) = failed.pop_front() {
            let Some(handle) = self.registry.remove(&id) else {
                continue;
            };
            failed.extend(self.release(handle, reason));
        }
    }

    /// Removes one connection. Returns `false` if it was not registered.
    fn remove(&mut self, id: ConnectionId, reason: DisconnectReason) -> bool {
        let Some(handle) = self.registry.remove(&id) else {
            tracing::debug!(connection_id = %id, %reason, "unregister for unknown connection ignored");
            return false;
        };
        let failed = self.release(handle, reason);
        self.evict(failed);
        true
    }

    /// Closes a connection already taken out of the registry and announces
    /// its departure.
    fn release(
        &self,
        handle: ConnectionHandle,
        reason: DisconnectReason,
    ) -> VecDeque<(ConnectionId, DisconnectReason)> {
        let id = handle.id();
        let username = handle.username().to_string();
        let room = handle.room().clone();
        // The loops finish on their own once the flag is raised.
        drop(handle.close());

        match reason {
            DisconnectReason::SlowConsumer | DisconnectReason::TransportError => {
                tracing::warn!(connection_id = %id, %reason, connections = self.registry.len(), "connection unregistered");
            }
            _ => {
                tracing::info!(connection_id = %id, %reason, connections = self.registry.len(), "connection unregistered");
            }
        }

        if !self.config.announce_presence {
            return VecDeque::new();
        }
        let left = ServerFrame::Presence(Arc::new(PresenceEvent::Left {
            connection_id: id,
            user_id: id.user_id(),
            username,
            room: room.clone(),
            reason,
            timestamp: Utc::now(),
        }));
        self.deliver_to_room(&left, &room, None)
    }

    /// Unregisters and closes every connection, then waits for their loops
    /// to finish within the grace period.
    async fn close_all(&mut self) {
        let handles = self.registry.drain();
        let count = handles.len();
        tracing::info!(connections = count, "closing all connections");

        let tasks: Vec<_> = handles.into_iter().map(ConnectionHandle::close).collect();
        let joined = async {
            for task in tasks {
                task.join().await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_grace, joined)
            .await
            .is_err()
        {
            tracing::warn!(
                grace_ms = u64::try_from(self.config.shutdown_grace.as_millis()).unwrap_or(u64::MAX),
                "connection loops still running after shutdown grace period"
            );
        }
    }
}

/// Attempts a non-blocking delivery, mapping failures to the reason the
/// recipient must be unregistered.
fn deliver(handle: &ConnectionHandle, frame: ServerFrame) -> Result<(), DisconnectReason> {
    match handle.send(frame) {
        Ok(()) => Ok(()),
        Err(RelayError::SlowConsumer(id)) => {
            tracing::warn!(connection_id = %id, "outbound buffer full; dropping message");
            Err(DisconnectReason::SlowConsumer)
        }
        Err(e) => {
            tracing::debug!(connection_id = %handle.id(), error = %e, "delivery failed");
            Err(DisconnectReason::TransportError)
        }
    }
}
