//! Same-thread port pair over shared queues.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use swaprpc::{Envelope, MessagePort};

type Inbox = Rc<RefCell<VecDeque<Envelope>>>;

/// One end of a same-thread port pair.
///
/// Posting enqueues onto the peer's inbox; delivery order is the posting
/// order. Both ends must live on the same thread.
pub struct LoopbackPort {
    outbox: Inbox,
    inbox: Inbox,
}

/// Create a connected pair of loopback ports.
pub fn pair() -> (LoopbackPort, LoopbackPort) {
    let a_to_b: Inbox = Rc::new(RefCell::new(VecDeque::new()));
    let b_to_a: Inbox = Rc::new(RefCell::new(VecDeque::new()));
    (
        LoopbackPort {
            outbox: a_to_b.clone(),
            inbox: b_to_a.clone(),
        },
        LoopbackPort {
            outbox: b_to_a,
            inbox: a_to_b,
        },
    )
}

impl LoopbackPort {
    /// Number of envelopes waiting to be received on this end.
    pub fn pending(&self) -> usize {
        self.inbox.borrow().len()
    }
}

impl MessagePort for LoopbackPort {
    fn post(&self, envelope: Envelope) -> io::Result<()> {
        self.outbox.borrow_mut().push_back(envelope);
        Ok(())
    }

    fn try_recv(&self) -> Option<Envelope> {
        self.inbox.borrow_mut().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_crossed() {
        let (a, b) = pair();
        a.post(Envelope::new(1, None, vec![0u8; 4].into_boxed_slice()))
            .unwrap();
        assert_eq!(a.pending(), 0);
        assert_eq!(b.pending(), 1);

        let envelope = b.try_recv().unwrap();
        assert_eq!(envelope.instance, 1);
        assert!(b.try_recv().is_none());
    }

    #[test]
    fn test_order_preserved() {
        let (a, b) = pair();
        for i in 0..5 {
            a.post(Envelope::new(i, None, vec![0u8; 4].into_boxed_slice()))
                .unwrap();
        }
        for i in 0..5 {
            assert_eq!(b.try_recv().unwrap().instance, i);
        }
    }
}
