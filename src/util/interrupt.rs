//! Interrupt latch for condvar waits.
//!
//! Lives inside the state guarded by the waiters' mutex. An interrupt
//! raised while threads are waiting wakes all of them; one raised with no
//! waiter stays pending and fails the next wait instead of being lost.

#[derive(Debug, Default)]
pub(crate) struct Interrupts {
    epoch: u64,
    waiters: usize,
    pending: bool,
}

/// Registration of one waiter, taken by [`Interrupts::enter`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ticket {
    epoch: u64,
}

impl Interrupts {
    /// Register a waiter. Returns `None` if a pending interrupt was consumed
    /// instead.
    pub fn enter(&mut self) -> Option<Ticket> {
        if self.pending {
            self.pending = false;
            return None;
        }
        self.waiters += 1;
        Some(Ticket { epoch: self.epoch })
    }

    pub fn leave(&mut self, _ticket: Ticket) {
        self.waiters = self.waiters.saturating_sub(1);
    }

    pub fn fired(&self, ticket: Ticket) -> bool {
        self.epoch != ticket.epoch
    }

    /// Raise an interrupt. Returns true if registered waiters must be woken.
    pub fn raise(&mut self) -> bool {
        if self.waiters == 0 {
            self.pending = true;
            return false;
        }
        self.epoch = self.epoch.wrapping_add(1);
        true
    }
}
