//! The buffer exchange: a double-ended transfer channel owning a pool of
//! exchangeable buffers.
//!
//! An exchange with buffer count `N` holds `2·N` slots: `N` start backed
//! (`Available`, fresh regions) and `N` start empty (`NotAvailable`), so
//! that even with every local region transferred to the remote there is
//! still room to receive the remote's regions. The two sides together own
//! `2·N` regions circulating through `2·2·N` slots, and at most `N` live
//! regions travel in each direction.
//!
//! Flow control is a single counter: `num_slots_available` is the number
//! of empty local slots (starts at `N`, `+1` per send, `-1` per receive).
//! Regions being conserved, `total − num_slots_available` — the local
//! backed-slot count — equals the number of slots the remote side has
//! free, so an `Outgoing` buffer may be transferred exactly when that
//! count is at least one. A deferred buffer is flushed opportunistically
//! by the receive path, before the newly arrived batch is delivered,
//! because every receive opens a remote slot.

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::buffer::{Buffer, BufferState, Region};
use crate::codec::DEFAULT_CHANNEL_SIZE;
use crate::error::{Error, Result};
use crate::transport::{Envelope, MessagePort, PROTOCOL_MAGIC};

/// Process-global source of exchange instance ids. Ids start at 1; 0 means
/// "not yet bound".
static NEXT_INSTANCE_ID: AtomicU32 = AtomicU32::new(1);

/// Exchange construction parameters.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Size in bytes of each buffer region. Must be a non-zero multiple
    /// of 4.
    pub buffer_size: usize,
    /// Number of backed buffers (`N`); the pool holds `2·N` slots.
    pub buffer_count: usize,
    /// Explicit instance id for this exchange pair. When `None`, the id is
    /// assigned lazily on first send and adopted from the first valid
    /// incoming envelope, whichever happens first.
    pub instance_id: Option<u32>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_CHANNEL_SIZE * 4,
            buffer_count: 2,
            instance_id: None,
        }
    }
}

struct Shared<P> {
    port: P,
    buffers: Vec<Rc<Buffer>>,
    instance_id: Cell<u32>,
    num_slots_available: Cell<usize>,
    closed: Cell<bool>,
}

impl<P: MessagePort> Shared<P> {
    /// Flow-control gate for a buffer that just went `Outgoing`.
    fn on_buffer_outgoing(&self, buffer: &Buffer) -> Result<()> {
        if self.buffers.len() - self.num_slots_available.get() >= 1 {
            self.send(buffer)
        } else {
            log::trace!("deferring send: remote side has no free slot");
            Ok(())
        }
    }

    /// Detach the region from an `Outgoing` buffer and post it.
    fn send(&self, buffer: &Buffer) -> Result<()> {
        let region = buffer.set_sent()?;
        let instance = self.bind_instance_id();
        let envelope = Envelope::new(instance, buffer.take_source_id(), region);
        self.port.post(envelope).map_err(Error::Io)?;
        self.num_slots_available
            .set(self.num_slots_available.get() + 1);
        log::trace!(
            "sent buffer, {} of {} slots empty",
            self.num_slots_available.get(),
            self.buffers.len()
        );
        Ok(())
    }

    fn bind_instance_id(&self) -> u32 {
        let id = self.instance_id.get();
        if id != 0 {
            return id;
        }
        let id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
        self.instance_id.set(id);
        id
    }
}

/// A double-ended buffer transfer channel over a message port.
pub struct BufferExchange<P: MessagePort> {
    shared: Rc<Shared<P>>,
}

impl<P: MessagePort + 'static> BufferExchange<P> {
    /// Build an exchange over `port` with the given pool configuration.
    pub fn new(port: P, config: &ExchangeConfig) -> Result<Self> {
        if config.buffer_size == 0 || config.buffer_size % 4 != 0 {
            return Err(Error::InvalidRegion {
                len: config.buffer_size,
            });
        }
        if config.buffer_count == 0 {
            return Err(Error::Setup("buffer count must be at least 1".to_string()));
        }

        let n = config.buffer_count;
        let mut buffers = Vec::with_capacity(2 * n);
        for _ in 0..n {
            buffers.push(Rc::new(Buffer::new(config.buffer_size)));
        }
        for _ in 0..n {
            buffers.push(Rc::new(Buffer::new_unbacked()));
        }

        let shared = Rc::new(Shared {
            port,
            buffers,
            instance_id: Cell::new(config.instance_id.unwrap_or(0)),
            num_slots_available: Cell::new(n),
            closed: Cell::new(false),
        });

        for buffer in &shared.buffers {
            let weak: Weak<Shared<P>> = Rc::downgrade(&shared);
            buffer.on_outgoing(move |b| match weak.upgrade() {
                Some(shared) => shared.on_buffer_outgoing(b),
                None => Ok(()),
            });
        }

        Ok(Self { shared })
    }

    /// Reserve the first `Available` buffer for writing.
    ///
    /// Returns `None` when every backed buffer is already handed out or in
    /// flight — back-pressure, not an error.
    pub fn get_write_buffer(&self) -> Option<Rc<Buffer>> {
        for buffer in &self.shared.buffers {
            if buffer.set_reserved().is_ok() {
                return Some(Rc::clone(buffer));
            }
        }
        None
    }

    /// Drain the port, delivering every received batch to `on_data`.
    ///
    /// Envelopes with a foreign identifier or instance are dropped
    /// silently. Returns the number of batches delivered. Fails with
    /// [`Error::Overflow`] if a valid envelope arrives while no slot can
    /// receive it, which means the remote violated slot accounting.
    pub fn poll<F>(&self, mut on_data: F) -> Result<usize>
    where
        F: FnMut(Rc<Buffer>, Option<u32>),
    {
        if self.shared.closed.get() {
            return Ok(0);
        }
        let mut delivered = 0;
        while let Some(envelope) = self.shared.port.try_recv() {
            if self.on_message_received(envelope, &mut on_data)? {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    fn on_message_received<F>(&self, envelope: Envelope, on_data: &mut F) -> Result<bool>
    where
        F: FnMut(Rc<Buffer>, Option<u32>),
    {
        if envelope.identifier != PROTOCOL_MAGIC {
            log::trace!(
                "dropping envelope with foreign identifier {:#x}",
                envelope.identifier
            );
            return Ok(false);
        }
        let local = self.shared.instance_id.get();
        if local == 0 {
            // First valid message binds the pair to the sender's id.
            self.shared.instance_id.set(envelope.instance);
            log::debug!("adopted exchange instance id {}", envelope.instance);
        } else if envelope.instance != local {
            log::trace!(
                "dropping envelope from foreign instance {} (local {})",
                envelope.instance,
                local
            );
            return Ok(false);
        }
        self.on_data_received(envelope.region, envelope.source_id, on_data)?;
        Ok(true)
    }

    fn on_data_received<F>(&self, region: Region, source_id: Option<u32>, on_data: &mut F) -> Result<()>
    where
        F: FnMut(Rc<Buffer>, Option<u32>),
    {
        let shared = &self.shared;

        // One pass: flush every deferred Outgoing slot (this receive has
        // opened a remote slot) and find a home for the incoming region.
        let mut candidate = None;
        for (index, buffer) in shared.buffers.iter().enumerate() {
            match buffer.state() {
                BufferState::Outgoing => shared.send(buffer)?,
                BufferState::NotAvailable if candidate.is_none() => candidate = Some(index),
                _ => {}
            }
        }

        let index = candidate.ok_or(Error::Overflow)?;
        let buffer = &shared.buffers[index];
        buffer.set_received(region)?;
        shared
            .num_slots_available
            .set(shared.num_slots_available.get() - 1);
        log::trace!(
            "received buffer into slot {}, {} of {} slots empty",
            index,
            shared.num_slots_available.get(),
            shared.buffers.len()
        );
        on_data(Rc::clone(buffer), source_id);
        Ok(())
    }

    /// Stop delivering messages. Subsequent `poll` calls are no-ops.
    pub fn close(&self) {
        self.shared.closed.set(true);
    }

    /// Current instance id; 0 until the pair is bound.
    pub fn instance_id(&self) -> u32 {
        self.shared.instance_id.get()
    }

    /// Number of empty local slots (capacity to receive).
    pub fn num_slots_available(&self) -> usize {
        self.shared.num_slots_available.get()
    }

    /// Configured buffer count `N`.
    pub fn buffer_count(&self) -> usize {
        self.shared.buffers.len() / 2
    }

    /// Total number of slots (`2·N`).
    pub fn total_slots(&self) -> usize {
        self.shared.buffers.len()
    }

    /// The pool, in slot order.
    pub fn buffers(&self) -> &[Rc<Buffer>] {
        &self.shared.buffers
    }
}
