//! Transport Signal Channel
//!
//! Control path from the rest of the system to one worker. Any task or
//! thread may [`post`](SignalChannel::post) a [`TransportSignal`]; the single
//! consuming worker awaits [`recv`](SignalChannel::recv) inside its wait
//! select.
//!
//! `Close` is latched in a sticky flag next to the bounded queue, so it is
//! never lost when the queue is full. Signals queued before `Close` are still
//! drained first, which keeps per-sender ordering intact.

use super::TransportError;
use crate::constants::SIGNAL_QUEUE_DEPTH;
use core::cell::Cell;
use embassy_futures::select::{Either, select};
use embassy_sync::{
    blocking_mutex::{Mutex, raw::CriticalSectionRawMutex},
    channel::Channel,
    signal::Signal,
};

/// Control signal delivered to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportSignal {
    /// Local endpoint opened, start streaming
    Open,
    /// Continue after a pause
    Resume,
    /// Stop producing until resumed
    Pause,
    /// Shut the worker down
    Close,
}

/// Non-blocking multi-producer, single-consumer signal path
pub struct SignalChannel {
    queue: Channel<CriticalSectionRawMutex, TransportSignal, SIGNAL_QUEUE_DEPTH>,
    closed: Mutex<CriticalSectionRawMutex, Cell<bool>>,
    close: Signal<CriticalSectionRawMutex, ()>,
}

impl SignalChannel {
    /// Create an empty channel
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
            closed: Mutex::new(Cell::new(false)),
            close: Signal::new(),
        }
    }

    /// Post a signal without blocking
    ///
    /// `Close` always succeeds. Signals posted after `Close` are discarded.
    ///
    /// # Errors
    /// Returns `TransportError::SignalQueueFull` if a non-`Close` signal does
    /// not fit into the queue
    pub fn post(&self, signal: TransportSignal) -> Result<(), TransportError> {
        if signal == TransportSignal::Close {
            self.closed.lock(|closed| closed.set(true));
            self.close.signal(());
            return Ok(());
        }

        if self.is_closed() {
            debug!("[SIGNAL] discarding {:?} after close", signal);
            return Ok(());
        }

        self.queue.try_send(signal).map_err(|_| {
            warn!("[SIGNAL] queue full, dropping {:?}", signal);
            TransportError::SignalQueueFull
        })
    }

    /// Wait for the next signal
    ///
    /// Queued signals are returned in order; once they are drained a latched
    /// `Close` is returned on every call.
    pub async fn recv(&self) -> TransportSignal {
        if let Ok(signal) = self.queue.try_receive() {
            return signal;
        }
        if !self.is_closed() {
            if let Either::First(signal) = select(self.queue.receive(), self.close.wait()).await {
                return signal;
            }
        }
        // a signal posted before Close may land after the queue was last polled
        self.queue.try_receive().unwrap_or(TransportSignal::Close)
    }

    /// Whether `Close` has been posted
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.lock(Cell::get)
    }

    /// Number of queued, not yet received signals
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Default for SignalChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_signals_arrive_in_post_order() {
        let channel = SignalChannel::new();
        channel.post(TransportSignal::Open).unwrap();
        channel.post(TransportSignal::Pause).unwrap();
        channel.post(TransportSignal::Resume).unwrap();

        block_on(async {
            assert_eq!(channel.recv().await, TransportSignal::Open);
            assert_eq!(channel.recv().await, TransportSignal::Pause);
            assert_eq!(channel.recv().await, TransportSignal::Resume);
        });
    }

    #[test]
    fn test_close_survives_full_queue() {
        let channel = SignalChannel::new();
        for _ in 0..SIGNAL_QUEUE_DEPTH {
            channel.post(TransportSignal::Pause).unwrap();
        }
        assert_eq!(
            channel.post(TransportSignal::Resume),
            Err(TransportError::SignalQueueFull)
        );
        assert_eq!(channel.post(TransportSignal::Close), Ok(()));

        block_on(async {
            for _ in 0..SIGNAL_QUEUE_DEPTH {
                assert_eq!(channel.recv().await, TransportSignal::Pause);
            }
            assert_eq!(channel.recv().await, TransportSignal::Close);
            // latched
            assert_eq!(channel.recv().await, TransportSignal::Close);
        });
    }

    #[test]
    fn test_close_after_pause_is_delivered() {
        let channel = SignalChannel::new();
        channel.post(TransportSignal::Pause).unwrap();

        block_on(async {
            assert_eq!(channel.recv().await, TransportSignal::Pause);
        });

        channel.post(TransportSignal::Close).unwrap();
        channel.post(TransportSignal::Resume).unwrap();
        assert_eq!(channel.pending(), 0);

        block_on(async {
            assert_eq!(channel.recv().await, TransportSignal::Close);
        });
    }

    #[test]
    fn test_recv_wakes_on_post_from_other_thread() {
        for _ in 0..200 {
            let channel = SignalChannel::new();

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    std::thread::yield_now();
                    channel.post(TransportSignal::Pause).unwrap();
                    channel.post(TransportSignal::Close).unwrap();
                });

                block_on(async {
                    assert_eq!(channel.recv().await, TransportSignal::Pause);
                    assert_eq!(channel.recv().await, TransportSignal::Close);
                });
            });
        }
    }
}
