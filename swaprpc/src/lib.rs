//! swaprpc - zero-copy inter-worker RPC over exchanged buffer regions.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────── side A ─────────────┐      ┌───────────── side B ─────────────┐
//! │ EndpointCodec("main")            │      │ EndpointCodec("worker")          │
//! │   BatchWriter ──► region         │      │   region ──► read_batch ──► dispatch
//! │                                  │      │                                  │
//! │ BufferExchange                   │      │ BufferExchange                   │
//! │   [Avail][Avail][N/A][N/A]       │      │   [Avail][Avail][N/A][N/A]       │
//! └───────────┬──────────────────────┘      └──────────────────────┬───────────┘
//!             │            MessagePort (moves Region)              │
//!             └──────────────────────────────────────────────────────┘
//! ```
//!
//! - **Buffer**: one pool slot with a five-state ownership lifecycle.
//! - **BufferExchange**: `2·N` slots, slot accounting, flow-control gate,
//!   opportunistic flush, envelope validation.
//! - **ProcedureTable / EndpointCodec**: a shared declarative table
//!   compiled per endpoint into encode plans (by name) and decode plans
//!   (by id).
//! - **BatchWriter / read_batch**: append calls to a reserved region;
//!   drain a received region, dispatching every call in order.
//!
//! A round trip: ask the exchange for a write buffer, encode calls into
//! its region, release it (the exchange transfers the region when the
//! remote has a free slot); the peer polls its exchange, decodes the
//! batch with its codec, releases the buffer back into its own pool.

pub mod buffer;
pub mod cells;
pub mod codec;
pub mod error;
pub mod exchange;
pub mod table;
pub mod transport;

pub use buffer::{Buffer, BufferState, Region};
pub use codec::{
    batch_len, BatchWriter, Call, CallTarget, CodecBuilder, EndpointCodec, DEFAULT_CHANNEL_SIZE,
};
pub use error::{Error, Result};
pub use exchange::{BufferExchange, ExchangeConfig};
pub use table::{ArgKind, ProcedureDef, ProcedureTable, Value};
pub use transport::{Envelope, MessagePort, PROTOCOL_MAGIC};
