//! Data Transfer Objects for REST request/response serialization.

pub mod room_dto;
pub mod user_dto;

pub use room_dto::*;
pub use user_dto::*;
