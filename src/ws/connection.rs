//! One live client connection and its read/write loops.
//!
//! A [`Connection`] owns the split transport of a single client. Once the
//! hub registers it, [`Connection::start`] spawns two tasks:
//!
//! - the read loop turns inbound frames into envelopes and forwards them
//!   to the hub;
//! - the write loop drains the bounded outbound channel into the socket.
//!
//! All transport I/O happens inside these two tasks. Either loop that
//! observes a transport failure signals the hub to unregister the
//! connection and raises the shared closed flag, which stops the other
//! loop. The hub raises the same flag when it evicts the connection.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::messages::{DecodedFrame, ServerFrame, decode_binary, decode_text};
use crate::domain::{ConnectionId, DisconnectReason, Envelope, RoomId};
use crate::error::RelayError;
use crate::hub::{HubHandle, Inbound};

/// Inbound half of a transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, axum::Error>> + Send>>;

/// Outbound half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Upper bound for sending the close frame to a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// A client connection that has not been registered yet.
pub struct Connection {
    id: ConnectionId,
    username: String,
    room: RoomId,
    stream: FrameStream,
    sink: FrameSink,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("room", &self.room)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wraps an already split transport. The connection joins the lobby
    /// unless [`in_room`](Self::in_room) says otherwise.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        username: impl Into<String>,
        stream: FrameStream,
        sink: FrameSink,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            room: RoomId::lobby(),
            stream,
            sink,
        }
    }

    /// Places the connection in `room`.
    #[must_use]
    pub fn in_room(mut self, room: RoomId) -> Self {
        self.room = room;
        self
    }

    /// Wraps an upgraded axum WebSocket.
    #[must_use]
    pub fn from_socket(id: ConnectionId, username: impl Into<String>, socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self::new(id, username, Box::pin(stream), Box::pin(sink))
    }

    /// Returns the connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the display name of the owning user.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the room the connection will join.
    #[must_use]
    pub const fn room(&self) -> &RoomId {
        &self.room
    }

    /// Spawns the read and write loops. Called by the hub after the
    /// connection has been accepted into the registry.
    pub(crate) fn start(self, hub: HubHandle, outbound_capacity: usize) -> ConnectionHandle {
        let (outbound, outbound_rx) = mpsc::channel(outbound_capacity.max(1));
        let closed = ClosedFlag::new();

        let writer = tokio::spawn(write_loop(
            self.id,
            self.sink,
            outbound_rx,
            closed.clone(),
            hub.clone(),
        ));
        let reader = tokio::spawn(read_loop(
            self.id,
            self.username.clone(),
            self.room.clone(),
            self.stream,
            closed.clone(),
            hub,
        ));

        ConnectionHandle {
            id: self.id,
            username: self.username,
            room: self.room,
            connected_at: Utc::now(),
            outbound,
            closed,
            tasks: ConnectionTasks {
                reader: Some(reader),
                writer: Some(writer),
            },
        }
    }
}

/// Shared "this connection is done" flag watched by both loops.
#[derive(Debug, Clone)]
pub(crate) struct ClosedFlag(Arc<watch::Sender<bool>>);

impl ClosedFlag {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self(Arc::new(tx))
    }

    pub(crate) fn raise(&self) {
        self.0.send_replace(true);
    }

    pub(crate) fn is_raised(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the flag is raised.
    pub(crate) async fn raised(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Join handles of a connection's loops.
#[derive(Debug, Default)]
pub(crate) struct ConnectionTasks {
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl ConnectionTasks {
    /// Waits for both loops to finish.
    pub(crate) async fn join(self) {
        for task in [self.reader, self.writer].into_iter().flatten() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "connection task ended abnormally");
            }
        }
    }
}

/// Registry entry for a running connection. Owned by the hub.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    username: String,
    room: RoomId,
    connected_at: DateTime<Utc>,
    outbound: mpsc::Sender<ServerFrame>,
    closed: ClosedFlag,
    tasks: ConnectionTasks,
}

impl ConnectionHandle {
    /// Returns the connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the display name of the owning user.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the room the connection belongs to.
    #[must_use]
    pub const fn room(&self) -> &RoomId {
        &self.room
    }

    /// Returns when the connection was registered.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Returns `true` once either loop or the hub has closed the connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_raised()
    }

    /// Enqueues a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::SlowConsumer`] if the outbound buffer is full
    /// and [`RelayError::Transport`] if the write loop has already exited.
    pub fn send(&self, frame: ServerFrame) -> Result<(), RelayError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RelayError::SlowConsumer(self.id),
            mpsc::error::TrySendError::Closed(_) => RelayError::Transport {
                connection_id: self.id,
                message: "write loop has exited".to_string(),
            },
        })
    }

    /// Raises the closed flag and drops the outbound sender, which stops
    /// both loops and closes the transport. Returns the loop handles.
    pub(crate) fn close(self) -> ConnectionTasks {
        self.closed.raise();
        self.tasks
    }

    /// Builds a handle with no running loops, returning the receiving end
    /// of its outbound channel.
    #[cfg(test)]
    pub(crate) fn detached(
        id: ConnectionId,
        username: &str,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerFrame>) {
        let (outbound, rx) = mpsc::channel(capacity);
        let handle = Self {
            id,
            username: username.to_string(),
            room: RoomId::lobby(),
            connected_at: Utc::now(),
            outbound,
            closed: ClosedFlag::new(),
            tasks: ConnectionTasks::default(),
        };
        (handle, rx)
    }

    #[cfg(test)]
    pub(crate) fn moved_to(mut self, room: RoomId) -> Self {
        self.room = room;
        self
    }
}

async fn read_loop(
    id: ConnectionId,
    username: String,
    room: RoomId,
    mut stream: FrameStream,
    closed: ClosedFlag,
    hub: HubHandle,
) {
    let reason = loop {
        let next = tokio::select! {
            next = stream.next() => next,
            () = closed.raised() => return,
        };

        let decoded = match next {
            Some(Ok(Message::Text(text))) => decode_text(text.as_str()),
            Some(Ok(Message::Binary(bytes))) => decode_binary(&bytes),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => break DisconnectReason::ClientClosed,
            Some(Err(e)) => {
                tracing::debug!(connection_id = %id, error = %e, "read failed");
                break DisconnectReason::TransportError;
            }
        };
        let inbound = match decoded {
            DecodedFrame::Chat {
                target: Some(target),
                payload,
            } => Inbound::Envelope(
                Envelope::direct(id, username.as_str(), target, payload).in_room(room.clone()),
            ),
            DecodedFrame::Chat {
                target: None,
                payload,
            } => Inbound::Envelope(
                Envelope::broadcast(id, username.as_str(), payload).in_room(room.clone()),
            ),
            DecodedFrame::Invalid(reason) => Inbound::Rejected { from: id, reason },
        };

        tokio::select! {
            sent = hub.forward(inbound) => {
                if sent.is_err() {
                    break DisconnectReason::Shutdown;
                }
            }
            () = closed.raised() => return,
        }
    };

    tracing::debug!(connection_id = %id, %reason, "read loop finished");
    tokio::select! {
        () = hub.connection_lost(id, reason) => {}
        () = closed.raised() => {}
    }
    closed.raise();
}

async fn write_loop(
    id: ConnectionId,
    mut sink: FrameSink,
    mut outbound: mpsc::Receiver<ServerFrame>,
    closed: ClosedFlag,
    hub: HubHandle,
) {
    let failure = loop {
        let frame = tokio::select! {
            frame = outbound.recv() => frame,
            () = closed.raised() => None,
        };
        let Some(frame) = frame else {
            break None;
        };

        let written = tokio::select! {
            written = sink.send(frame.encode()) => written,
            () = closed.raised() => break None,
        };
        if let Err(e) = written {
            tracing::debug!(connection_id = %id, error = %e, "write failed");
            break Some(DisconnectReason::TransportError);
        }
    };

    // From here on the hub sees a closed channel.
    outbound.close();

    match failure {
        Some(reason) => {
            tokio::select! {
                () = hub.connection_lost(id, reason) => {}
                () = closed.raised() => {}
            }
            closed.raise();
        }
        None => {
            closed.raise();
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await;
        }
    }
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
    tracing::debug!(connection_id = %id, "write loop finished");
}

/// In-memory transports for exercising connections without sockets.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// The client side of an in-memory connection.
    #[derive(Debug)]
    pub(crate) struct TestPeer {
        /// Frames the "client" sends to the server.
        pub(crate) incoming: mpsc::UnboundedSender<Result<Message, axum::Error>>,
        /// Frames the server wrote to the "client".
        pub(crate) outgoing: mpsc::UnboundedReceiver<Message>,
    }

    fn stream_from(rx: mpsc::UnboundedReceiver<Result<Message, axum::Error>>) -> FrameStream {
        Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }

    /// Builds a connection whose transport is a pair of channels.
    pub(crate) fn connection_pair(id: ConnectionId, username: &str) -> (Connection, TestPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Message>();
        let sink = futures_util::sink::unfold(out_tx, |tx, msg: Message| async move {
            tx.send(msg).map_err(|_| axum::Error::new("peer dropped"))?;
            Ok::<_, axum::Error>(tx)
        });
        let conn = Connection::new(id, username, stream_from(in_rx), Box::pin(sink));
        (
            conn,
            TestPeer {
                incoming: in_tx,
                outgoing: out_rx,
            },
        )
    }

    /// Builds a connection whose sink never completes a write, standing in
    /// for a peer that stopped reading.
    pub(crate) fn stalled_connection(
        id: ConnectionId,
        username: &str,
    ) -> (Connection, mpsc::UnboundedSender<Result<Message, axum::Error>>) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let sink = futures_util::sink::unfold((), |(), _msg: Message| {
            futures_util::future::pending::<Result<(), axum::Error>>()
        });
        let conn = Connection::new(id, username, stream_from(in_rx), Box::pin(sink));
        (conn, in_tx)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn closed_flag_is_shared() {
        let flag = ClosedFlag::new();
        let other = flag.clone();
        assert!(!other.is_raised());
        flag.raise();
        assert!(other.is_raised());
    }

    #[tokio::test]
    async fn raised_resolves_after_raise() {
        let flag = ClosedFlag::new();
        let waiter = flag.clone();
        let task = tokio::spawn(async move { waiter.raised().await });
        flag.raise();
        let joined = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn send_reports_slow_consumer_when_full() {
        let id = ConnectionId::new(1);
        let (handle, _rx) = ConnectionHandle::detached(id, "alice", 1);
        let frame = || ServerFrame::Error {
            code: 0,
            message: String::new(),
        };
        assert!(handle.send(frame()).is_ok());
        let Err(RelayError::SlowConsumer(slow)) = handle.send(frame()) else {
            panic!("second send must hit a full buffer");
        };
        assert_eq!(slow, id);
    }

    #[tokio::test]
    async fn send_reports_transport_error_when_writer_gone() {
        let (handle, rx) = ConnectionHandle::detached(ConnectionId::new(2), "bob", 4);
        drop(rx);
        let result = handle.send(ServerFrame::Error {
            code: 0,
            message: String::new(),
        });
        assert!(matches!(result, Err(RelayError::Transport { .. })));
    }

    #[test]
    fn connections_default_to_the_lobby() {
        let (conn, _peer) = testing::connection_pair(ConnectionId::new(4), "dave");
        assert!(conn.room().is_lobby());
        let Ok(room) = "games".parse::<RoomId>() else {
            panic!("slug must parse");
        };
        let conn = conn.in_room(room.clone());
        assert_eq!(conn.room(), &room);
    }

    #[test]
    fn close_raises_flag() {
        let (handle, _rx) = ConnectionHandle::detached(ConnectionId::new(3), "carol", 4);
        let flag = handle.closed.clone();
        let _tasks = handle.close();
        assert!(flag.is_raised());
    }
}
