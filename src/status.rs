//! One-way status stream for an attached front-end (GUI, tray, logger).
//!
//! The core never depends on a consumer: events are pushed best-effort into a
//! bounded channel and the oldest entry is dropped when nobody drains it.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::codec::PanelOutputImage;

/// Where the bridge currently is; `Bridging` means both endpoints are live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    DeviceDown,
    SimDown,
    Bridging,
    ShuttingDown,
}

#[derive(Debug, Clone)]
pub enum StatusEvent {
    Connection(ConnectionState),
    Image(PanelOutputImage),
    Log(String),
}

/// The only inputs a front-end may feed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCmd {
    Reconnect,
    Shutdown,
}

/// Bounded send that drops the oldest element instead of blocking. Works
/// because crossbeam channels are mpmc: the producer keeps its own receiver
/// clone to pop from.
pub fn send_lossy<T>(tx: &Sender<T>, rx: &Receiver<T>, value: T) {
    if let Err(TrySendError::Full(value)) = tx.try_send(value) {
        let _ = rx.try_recv();
        let _ = tx.try_send(value);
    }
}

/// Producer half of the status stream.
#[derive(Clone)]
pub struct StatusSender {
    tx: Sender<StatusEvent>,
    rx: Receiver<StatusEvent>,
}

impl StatusSender {
    pub fn channel(capacity: usize) -> (StatusSender, Receiver<StatusEvent>) {
        let (tx, rx) = bounded(capacity);
        (
            StatusSender {
                tx,
                rx: rx.clone(),
            },
            rx,
        )
    }

    pub fn send(&self, event: StatusEvent) {
        send_lossy(&self.tx, &self.rx, event);
    }

    pub fn connection(&self, state: ConnectionState) {
        self.send(StatusEvent::Connection(state));
    }

    pub fn image(&self, image: &PanelOutputImage) {
        self.send(StatusEvent::Image(image.clone()));
    }

    pub fn log(&self, line: impl Into<String>) {
        self.send(StatusEvent::Log(line.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_stream_drops_oldest_keeps_newest() {
        let (status, rx) = StatusSender::channel(2);
        status.log("a");
        status.log("b");
        status.log("c");
        let drained: Vec<String> = rx
            .try_iter()
            .map(|e| match e {
                StatusEvent::Log(s) => s,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(drained, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn unconsumed_stream_never_blocks_the_producer() {
        let (status, _rx) = StatusSender::channel(4);
        for i in 0..100 {
            status.log(format!("line {i}"));
        }
    }
}
