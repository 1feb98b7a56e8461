//! Transfer buffers with an explicit ownership state machine.
//!
//! A `Buffer` is a pool slot that may hold a byte region. The region moves
//! between the two sides of an exchange; the slot tracks where in the
//! send/receive lifecycle its region currently is:
//!
//! ```text
//! NotAvailable → Received → Available → Reserved → Outgoing → NotAvailable
//! ```
//!
//! Every operation is legal in exactly one state; anything else is an
//! `IllegalState` error. The region is only handed out for mutation while
//! `Reserved` (application writes) or `Received` (the decoder's drain).
//!
//! Buffers are single-threaded: all operations take `&self` through
//! interior mutability and assume a cooperative owner.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;

use crate::error::{Error, Result};

/// An owned byte region. Moving a `Region` through a message port is the
/// ownership transfer; the sender cannot touch it afterwards.
pub type Region = Box<[u8]>;

/// Lifecycle state of a buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// This side does not hold the region.
    NotAvailable,
    /// Incoming region, not yet handed to the application.
    Received,
    /// Writable region held by the exchange, not yet handed out.
    Available,
    /// Handed to the application for writing.
    Reserved,
    /// Released by the application, pending send to the remote.
    Outgoing,
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferState::NotAvailable => "not-available",
            BufferState::Received => "received",
            BufferState::Available => "available",
            BufferState::Reserved => "reserved",
            BufferState::Outgoing => "outgoing",
        };
        f.write_str(name)
    }
}

type Hook = Box<dyn Fn(&Buffer) -> Result<()>>;

/// A single transfer buffer slot.
pub struct Buffer {
    state: Cell<BufferState>,
    data: RefCell<Option<Region>>,
    source_id: Cell<Option<u32>>,
    on_available: RefCell<Option<Hook>>,
    on_outgoing: RefCell<Option<Hook>>,
}

impl Buffer {
    /// Create a backed buffer: `Available` with a zeroed region of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            state: Cell::new(BufferState::Available),
            data: RefCell::new(Some(vec![0u8; size].into_boxed_slice())),
            source_id: Cell::new(None),
            on_available: RefCell::new(None),
            on_outgoing: RefCell::new(None),
        }
    }

    /// Create an unbacked buffer: `NotAvailable` with no region, ready to
    /// receive one from the remote side.
    pub fn new_unbacked() -> Self {
        Self {
            state: Cell::new(BufferState::NotAvailable),
            data: RefCell::new(None),
            source_id: Cell::new(None),
            on_available: RefCell::new(None),
            on_outgoing: RefCell::new(None),
        }
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> BufferState {
        self.state.get()
    }

    /// Whether this slot currently holds a region.
    #[inline]
    pub fn is_backed(&self) -> bool {
        self.data.borrow().is_some()
    }

    /// Hand the buffer to the application for writing.
    ///
    /// Requires `Available`; transitions to `Reserved`.
    pub fn set_reserved(&self) -> Result<()> {
        match self.state.get() {
            BufferState::Available => {
                self.state.set(BufferState::Reserved);
                Ok(())
            }
            state => Err(Error::IllegalState {
                op: "set_reserved",
                state,
            }),
        }
    }

    /// Return the buffer to the exchange.
    ///
    /// `Received` → `Available` (emits the `available` hook);
    /// `Reserved` → `Outgoing` (emits the `outgoing` hook).
    pub fn release(&self) -> Result<()> {
        match self.state.get() {
            BufferState::Received => {
                self.state.set(BufferState::Available);
                log::trace!("buffer released: received -> available");
                self.emit(&self.on_available)
            }
            BufferState::Reserved => {
                self.state.set(BufferState::Outgoing);
                log::trace!("buffer released: reserved -> outgoing");
                self.emit(&self.on_outgoing)
            }
            state => Err(Error::IllegalState {
                op: "release",
                state,
            }),
        }
    }

    /// Detach the region for transfer to the remote side.
    ///
    /// Requires `Outgoing`; transitions to `NotAvailable` and yields the
    /// region so the caller can hand it to the transport.
    pub fn set_sent(&self) -> Result<Region> {
        let state = self.state.get();
        if state != BufferState::Outgoing {
            return Err(Error::IllegalState {
                op: "set_sent",
                state,
            });
        }
        match self.data.borrow_mut().take() {
            Some(region) => {
                self.state.set(BufferState::NotAvailable);
                Ok(region)
            }
            None => Err(Error::IllegalState {
                op: "set_sent",
                state,
            }),
        }
    }

    /// Attach a region that arrived from the remote side.
    ///
    /// Requires `NotAvailable`; transitions to `Received`.
    pub fn set_received(&self, region: Region) -> Result<()> {
        match self.state.get() {
            BufferState::NotAvailable => {
                *self.data.borrow_mut() = Some(region);
                self.state.set(BufferState::Received);
                Ok(())
            }
            state => Err(Error::IllegalState {
                op: "set_received",
                state,
            }),
        }
    }

    /// Borrow the region for reading. Fails in `NotAvailable`.
    pub fn region(&self) -> Result<Ref<'_, [u8]>> {
        Ref::filter_map(self.data.borrow(), |d| d.as_deref()).map_err(|_| Error::IllegalState {
            op: "region",
            state: self.state.get(),
        })
    }

    /// Borrow the region for writing.
    ///
    /// Permitted while `Reserved` (application writes a batch) and while
    /// `Received` (the decoder's drain resets the count cell).
    pub fn region_mut(&self) -> Result<RefMut<'_, [u8]>> {
        match self.state.get() {
            BufferState::Reserved | BufferState::Received => {}
            state => {
                return Err(Error::IllegalState {
                    op: "region_mut",
                    state,
                })
            }
        }
        RefMut::filter_map(self.data.borrow_mut(), |d| d.as_deref_mut()).map_err(|_| {
            Error::IllegalState {
                op: "region_mut",
                state: self.state.get(),
            }
        })
    }

    /// Attach a routing tag to be carried in the next envelope.
    ///
    /// Only meaningful while `Reserved`.
    pub fn set_source_id(&self, tag: u32) -> Result<()> {
        match self.state.get() {
            BufferState::Reserved => {
                self.source_id.set(Some(tag));
                Ok(())
            }
            state => Err(Error::IllegalState {
                op: "set_source_id",
                state,
            }),
        }
    }

    pub(crate) fn take_source_id(&self) -> Option<u32> {
        self.source_id.take()
    }

    /// Install the hook invoked when the buffer transitions to `Available`.
    pub fn on_available(&self, hook: impl Fn(&Buffer) -> Result<()> + 'static) {
        *self.on_available.borrow_mut() = Some(Box::new(hook));
    }

    /// Install the hook invoked when the buffer transitions to `Outgoing`.
    pub fn on_outgoing(&self, hook: impl Fn(&Buffer) -> Result<()> + 'static) {
        *self.on_outgoing.borrow_mut() = Some(Box::new(hook));
    }

    fn emit(&self, slot: &RefCell<Option<Hook>>) -> Result<()> {
        if let Some(hook) = slot.borrow().as_ref() {
            hook(self)
        } else {
            Ok(())
        }
    }
}

// Hooks are not Debug, so the derive is spelled out.
impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("state", &self.state.get())
            .field("backed", &self.is_backed())
            .finish()
    }
}
