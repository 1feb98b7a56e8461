//! In-process message ports for the swaprpc buffer exchange.
//!
//! This crate provides two [`MessagePort`] implementations:
//! - [`loopback`]: a same-thread pair over plain queues, for deterministic
//!   single-threaded tests and demos where one scheduler pumps both sides.
//! - [`channel`]: a cross-thread pair over bounded slot queues with
//!   per-slot validity flags, so a "main" and a "worker" thread can run
//!   their exchanges in parallel.

pub mod channel;
pub mod loopback;

pub use channel::ChannelPort;
pub use loopback::LoopbackPort;
