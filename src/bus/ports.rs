use crate::error::{RecvError, SendError, TryRecvError};
use crate::utils::CancelToken;
use crossbeam::channel as cbchan;
use std::time::{Duration, Instant};

// Bus ports carry a publication burst every 100 ms and the occasional
// config chunk. There is no hot path to spin for, so the blocking
// variants park in the channel and surface every so often to look at
// the cancel token.

/// How often a parked port wait re-checks its cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// TX half of a bus port. Implemented by transport adapters and by the
/// in-process channel pair below.
pub trait EgressTx: Send + 'static {
    type Item: Send + 'static;

    /// Non-blocking send. Returns `Err` if the port is full or closed.
    fn try_send(&mut self, item: Self::Item) -> Result<(), SendError<Self::Item>>;

    /// Parked send with optional timeout and cancellation.
    fn send(
        &mut self,
        item: Self::Item,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<(), SendError<Self::Item>>;
}

/// RX half of a bus port.
pub trait IngressRx: Send + 'static {
    type Item: Send + 'static;

    /// Non-blocking receive.
    fn try_recv(&mut self) -> Result<Self::Item, TryRecvError>;

    /// Parked receive with optional timeout and cancellation.
    fn recv(
        &mut self,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<Self::Item, RecvError>;

    /// Drain up to `max` items from the port.
    fn drain(&mut self, max: usize) -> Vec<Self::Item> {
        let mut out = Vec::new();
        for _ in 0..max {
            match self.try_recv() {
                Ok(item) => out.push(item),
                Err(_) => break,
            }
        }
        out
    }
}

/// In-process MPMC port over a crossbeam channel. Transports hold one
/// half, the runtime the other.
pub struct PortChannel;

impl PortChannel {
    #[inline]
    pub fn bounded<T: Send + 'static>(capacity: usize) -> (PortSender<T>, PortReceiver<T>) {
        let (tx, rx) = cbchan::bounded::<T>(capacity);
        (PortSender { tx }, PortReceiver { rx })
    }

    #[inline]
    pub fn unbounded<T: Send + 'static>() -> (PortSender<T>, PortReceiver<T>) {
        let (tx, rx) = cbchan::unbounded::<T>();
        (PortSender { tx }, PortReceiver { rx })
    }
}

#[derive(Clone)]
pub struct PortSender<T> {
    tx: cbchan::Sender<T>,
}

impl<T: Send + 'static> EgressTx for PortSender<T> {
    type Item = T;

    #[inline]
    fn try_send(&mut self, item: T) -> Result<(), SendError<T>> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(cbchan::TrySendError::Full(v)) => Err(SendError::full(Some(v))),
            Err(cbchan::TrySendError::Disconnected(v)) => Err(SendError::closed(Some(v))),
        }
    }

    fn send(
        &mut self,
        mut item: T,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<(), SendError<T>> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if cancel.is_cancelled() {
                return Err(SendError::cancelled(Some(item)));
            }

            let mut wait_until = Instant::now() + CANCEL_POLL;
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(SendError::timeout(Some(item)));
                }
                wait_until = wait_until.min(deadline);
            }

            match self.tx.send_deadline(item, wait_until) {
                Ok(()) => return Ok(()),
                Err(cbchan::SendTimeoutError::Timeout(v)) => item = v,
                Err(cbchan::SendTimeoutError::Disconnected(v)) => {
                    return Err(SendError::closed(Some(v)));
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct PortReceiver<T> {
    rx: cbchan::Receiver<T>,
}

impl<T: Send + 'static> IngressRx for PortReceiver<T> {
    type Item = T;

    #[inline]
    fn try_recv(&mut self) -> Result<T, TryRecvError> {
        match self.rx.try_recv() {
            Ok(v) => Ok(v),
            Err(cbchan::TryRecvError::Empty) => Err(TryRecvError::Empty),
            Err(cbchan::TryRecvError::Disconnected) => Err(TryRecvError::Disconnected),
        }
    }

    fn recv(&mut self, cancel: &CancelToken, timeout: Option<Duration>) -> Result<T, RecvError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if cancel.is_cancelled() {
                return Err(RecvError::Cancelled);
            }

            let mut wait_until = Instant::now() + CANCEL_POLL;
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(RecvError::Timeout);
                }
                wait_until = wait_until.min(deadline);
            }

            match self.rx.recv_deadline(wait_until) {
                Ok(v) => return Ok(v),
                Err(cbchan::RecvTimeoutError::Timeout) => {}
                Err(cbchan::RecvTimeoutError::Disconnected) => {
                    return Err(RecvError::Disconnected);
                }
            }
        }
    }
}

/// No-op egress for embeddings without a transport.
#[derive(Clone, Debug, Default)]
pub struct NullEgress;

impl EgressTx for NullEgress {
    type Item = crate::bus::Publication;

    fn try_send(&mut self, _item: Self::Item) -> Result<(), SendError<Self::Item>> {
        Ok(())
    }

    fn send(
        &mut self,
        _item: Self::Item,
        _cancel: &CancelToken,
        _timeout: Option<Duration>,
    ) -> Result<(), SendError<Self::Item>> {
        Ok(())
    }
}
