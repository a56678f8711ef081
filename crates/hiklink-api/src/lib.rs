//! Client interface for the Hik-Connect cloud intercom API.
//!
//! The vendor protocol itself lives outside this workspace. This crate pins
//! down what the rest of hiklink needs from a client:
//!
//! - **[`HikConnectApi`]** — async operations for session handling, device
//!   and camera listing, latch unlock, and call control.
//! - **[`ApiFactory`]** — builds a client bound to a base URL. Both the
//!   config flow and entry setup construct clients through it.
//! - **Wire models** ([`models`]) — `Device`, `Camera`, `CallStatus` as the
//!   vendor JSON shapes them.
//! - **[`Error`]** — failure modes, classified into auth vs. transient.
//!
//! With the `mock` feature enabled, [`mock::MockHikConnect`] provides a
//! scriptable in-memory client.

pub mod client;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod models;

pub use client::{ApiFactory, DEFAULT_BASE_URL, HikConnectApi};
pub use error::Error;
pub use models::{CallOperation, CallState, CallStatus, Camera, Device};
