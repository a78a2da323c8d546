//! Real-time connection hub.
//!
//! The hub is a single task that owns the [`Registry`] of live connections
//! and makes every routing decision. Other components talk to it only
//! through a [`HubHandle`], which enqueues requests on bounded channels:
//!
//! ```text
//! upgrade handler ──register──►┐
//! connection loops ─unregister─►│  Hub task ──try_send──► connection outbound
//! connection loops ──dispatch──►│  (Registry)
//! REST / main ──────control────►┘
//! ```

pub mod coordinator;
pub mod handle;
pub mod registry;

pub use coordinator::Hub;
pub use handle::{HubHandle, Inbound};
pub use registry::{ClientInfo, Registry, RoomInfo};
