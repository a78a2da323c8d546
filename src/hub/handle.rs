//! Cloneable front door to the hub task.
//!
//! [`HubHandle`] holds the sending ends of the hub's four bounded channels
//! (register, unregister, dispatch, control). Every method only enqueues a
//! request; the hub task does the work. Methods that need an answer carry
//! a `oneshot` reply channel.

use tokio::sync::{mpsc, oneshot};

use super::registry::{ClientInfo, RoomInfo};
use crate::domain::{ConnectionId, DisconnectReason, Envelope, Room, RoomId};
use crate::error::RelayError;
use crate::ws::connection::Connection;

/// Request to add a connection to the registry.
#[derive(Debug)]
pub(crate) struct RegisterRequest {
    pub(crate) connection: Connection,
    pub(crate) ack: oneshot::Sender<Result<ConnectionId, RelayError>>,
}

/// Request to remove a connection from the registry.
#[derive(Debug)]
pub(crate) struct UnregisterRequest {
    pub(crate) id: ConnectionId,
    pub(crate) reason: DisconnectReason,
    pub(crate) ack: Option<oneshot::Sender<bool>>,
}

/// Something a connection hands to the hub for routing.
#[derive(Debug)]
pub enum Inbound {
    /// A message to route.
    Envelope(Envelope),
    /// A frame that could not be turned into an envelope.
    Rejected {
        /// Connection that sent the frame.
        from: ConnectionId,
        /// What was wrong with it.
        reason: String,
    },
}

/// Administrative requests.
#[derive(Debug)]
pub(crate) enum Control {
    Clients(oneshot::Sender<Vec<ClientInfo>>),
    RoomClients(RoomId, oneshot::Sender<Result<Vec<ClientInfo>, RelayError>>),
    CreateRoom(Room, oneshot::Sender<Result<RoomInfo, RelayError>>),
    Room(RoomId, oneshot::Sender<Result<RoomInfo, RelayError>>),
    Rooms(oneshot::Sender<Vec<RoomInfo>>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle for talking to a running hub. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HubHandle {
    pub(crate) register_tx: mpsc::Sender<RegisterRequest>,
    pub(crate) unregister_tx: mpsc::Sender<UnregisterRequest>,
    pub(crate) dispatch_tx: mpsc::Sender<Inbound>,
    pub(crate) control_tx: mpsc::Sender<Control>,
}

impl HubHandle {
    /// Registers a connection and starts its loops.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RegistryConflict`] if the id is already
    /// registered and [`RelayError::RoomNotFound`] if the connection's room
    /// does not exist. Either way the connection is dropped, closing its
    /// transport. Returns [`RelayError::HubUnavailable`] if the hub has
    /// stopped.
    pub async fn register(&self, connection: Connection) -> Result<ConnectionId, RelayError> {
        let (ack, reply) = oneshot::channel();
        self.register_tx
            .send(RegisterRequest { connection, ack })
            .await
            .map_err(|_| RelayError::HubUnavailable)?;
        reply.await.map_err(|_| RelayError::HubUnavailable)?
    }

    /// Unregisters a connection and waits until the hub has processed it.
    /// `reason` is reported in the `left` presence frame.
    ///
    /// Returns `true` if the connection was registered, `false` if it was
    /// already gone. Calling it twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HubUnavailable`] if the hub has stopped.
    pub async fn unregister(
        &self,
        id: ConnectionId,
        reason: DisconnectReason,
    ) -> Result<bool, RelayError> {
        let (ack, reply) = oneshot::channel();
        self.unregister_tx
            .send(UnregisterRequest {
                id,
                reason,
                ack: Some(ack),
            })
            .await
            .map_err(|_| RelayError::HubUnavailable)?;
        reply.await.map_err(|_| RelayError::HubUnavailable)
    }

    /// Queues an envelope for routing.
    ///
    /// Returns once the hub has accepted the envelope, not once it has been
    /// delivered.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HubUnavailable`] if the hub has stopped.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<(), RelayError> {
        self.forward(Inbound::Envelope(envelope)).await
    }

    /// Returns a snapshot of every registered connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HubUnavailable`] if the hub has stopped.
    pub async fn clients(&self) -> Result<Vec<ClientInfo>, RelayError> {
        let (ack, reply) = oneshot::channel();
        self.control(Control::Clients(ack)).await?;
        reply.await.map_err(|_| RelayError::HubUnavailable)
    }

    /// Returns a snapshot of the connections in one room.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RoomNotFound`] for an unknown room and
    /// [`RelayError::HubUnavailable`] if the hub has stopped.
    pub async fn room_clients(&self, room: RoomId) -> Result<Vec<ClientInfo>, RelayError> {
        let (ack, reply) = oneshot::channel();
        self.control(Control::RoomClients(room, ack)).await?;
        reply.await.map_err(|_| RelayError::HubUnavailable)?
    }

    /// Creates a room.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RoomExists`] if the id is taken and
    /// [`RelayError::HubUnavailable`] if the hub has stopped.
    pub async fn create_room(&self, room: Room) -> Result<RoomInfo, RelayError> {
        let (ack, reply) = oneshot::channel();
        self.control(Control::CreateRoom(room, ack)).await?;
        reply.await.map_err(|_| RelayError::HubUnavailable)?
    }

    /// Describes one room.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RoomNotFound`] for an unknown room and
    /// [`RelayError::HubUnavailable`] if the hub has stopped.
    pub async fn room(&self, room: RoomId) -> Result<RoomInfo, RelayError> {
        let (ack, reply) = oneshot::channel();
        self.control(Control::Room(room, ack)).await?;
        reply.await.map_err(|_| RelayError::HubUnavailable)?
    }

    /// Lists every room, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HubUnavailable`] if the hub has stopped.
    pub async fn rooms(&self) -> Result<Vec<RoomInfo>, RelayError> {
        let (ack, reply) = oneshot::channel();
        self.control(Control::Rooms(ack)).await?;
        reply.await.map_err(|_| RelayError::HubUnavailable)
    }

    /// Stops the hub: every connection is unregistered and closed, and the
    /// call returns after their loops have finished (bounded by the
    /// configured grace period).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HubUnavailable`] if the hub had already
    /// stopped.
    pub async fn shutdown(&self) -> Result<(), RelayError> {
        let (ack, reply) = oneshot::channel();
        self.control(Control::Shutdown(ack)).await?;
        reply.await.map_err(|_| RelayError::HubUnavailable)
    }

    /// Returns `true` while the hub task is accepting requests.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.control_tx.is_closed()
    }

    async fn control(&self, request: Control) -> Result<(), RelayError> {
        self.control_tx
            .send(request)
            .await
            .map_err(|_| RelayError::HubUnavailable)
    }

    pub(crate) async fn forward(&self, inbound: Inbound) -> Result<(), RelayError> {
        self.dispatch_tx
            .send(inbound)
            .await
            .map_err(|_| RelayError::HubUnavailable)
    }

    /// Tells the hub a connection's transport is gone. Does not wait for
    /// the hub to process it.
    pub(crate) async fn connection_lost(&self, id: ConnectionId, reason: DisconnectReason) {
        let request = UnregisterRequest {
            id,
            reason,
            ack: None,
        };
        if self.unregister_tx.send(request).await.is_err() {
            tracing::debug!(connection_id = %id, "hub already stopped");
        }
    }

    pub(crate) fn downgrade(&self) -> WeakHubHandle {
        WeakHubHandle {
            register_tx: self.register_tx.downgrade(),
            unregister_tx: self.unregister_tx.downgrade(),
            dispatch_tx: self.dispatch_tx.downgrade(),
            control_tx: self.control_tx.downgrade(),
        }
    }
}

/// Handle that does not keep the hub's channels open.
#[derive(Debug, Clone)]
pub(crate) struct WeakHubHandle {
    register_tx: mpsc::WeakSender<RegisterRequest>,
    unregister_tx: mpsc::WeakSender<UnregisterRequest>,
    dispatch_tx: mpsc::WeakSender<Inbound>,
    control_tx: mpsc::WeakSender<Control>,
}

impl WeakHubHandle {
    pub(crate) fn upgrade(&self) -> Option<HubHandle> {
        Some(HubHandle {
            register_tx: self.register_tx.upgrade()?,
            unregister_tx: self.unregister_tx.upgrade()?,
            dispatch_tx: self.dispatch_tx.upgrade()?,
            control_tx: self.control_tx.upgrade()?,
        })
    }
}
