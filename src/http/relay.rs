//! WebSocket relay pair.
//!
//! # State Transitions (per half)
//! ```text
//! Connecting → Open: handshake finished, queued messages flushed in order
//! Connecting → Closed: peer or own side gave up
//! Open → Closed: close or error; the other half is closed exactly once
//! ```
//!
//! Messages destined for a half that is still Connecting are buffered;
//! messages for a Closed half are dropped silently. Queueing is defined
//! only in the Connecting state.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as TungMessage;
use url::Url;

/// Connection state of one relay half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfState {
    Connecting,
    Open,
    Closed,
}

/// One half of a relay pair: a connection state plus the pending queue
/// of messages that arrived before this side finished connecting.
pub struct RelayHalf<M> {
    state: HalfState,
    queue: Vec<M>,
}

impl<M> RelayHalf<M> {
    pub fn new() -> Self {
        Self {
            state: HalfState::Connecting,
            queue: Vec::new(),
        }
    }

    pub fn state(&self) -> HalfState {
        self.state
    }

    /// Accept a message destined for this half. Returns the message if
    /// it can be delivered now; buffers it while Connecting; drops it
    /// silently once Closed.
    pub fn accept(&mut self, msg: M) -> Option<M> {
        match self.state {
            HalfState::Open => Some(msg),
            HalfState::Connecting => {
                self.queue.push(msg);
                None
            }
            HalfState::Closed => None,
        }
    }

    /// Mark the half open, draining the queue in arrival order.
    /// Opening a Closed half stays Closed and yields nothing.
    pub fn open(&mut self) -> Vec<M> {
        match self.state {
            HalfState::Connecting => {
                self.state = HalfState::Open;
                std::mem::take(&mut self.queue)
            }
            _ => Vec::new(),
        }
    }

    /// Close the half. Returns true only on the first close, so the
    /// caller can propagate the close to the peer exactly once.
    pub fn close(&mut self) -> bool {
        if self.state == HalfState::Closed {
            return false;
        }
        self.state = HalfState::Closed;
        self.queue.clear();
        true
    }
}

impl<M> Default for RelayHalf<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a relay between an accepted downstream socket and a freshly
/// dialed upstream connection.
///
/// The downstream handshake has already finished when this runs, but the
/// upstream dial has not: frames from the browser are buffered in the
/// upstream half until the dial completes, then flushed in order. Either
/// side closing or erroring closes the other; frames arriving after a
/// close are dropped.
pub async fn run(downstream: WebSocket, target: Url) {
    let (mut down_tx, mut down_rx) = downstream.split();

    let mut upstream_half: RelayHalf<TungMessage> = RelayHalf::new();
    let mut downstream_half: RelayHalf<WsMessage> = RelayHalf::new();
    downstream_half.open();

    // Dial upstream while already reading the browser side.
    let mut dial = Box::pin(connect_async(target.as_str()));
    let upstream = loop {
        tokio::select! {
            dialed = &mut dial => match dialed {
                Ok((stream, _response)) => break stream,
                Err(e) => {
                    tracing::error!(url = %target, error = %e, "Upstream WebSocket connect failed");
                    upstream_half.close();
                    if downstream_half.close() {
                        let _ = down_tx.send(WsMessage::Close(None)).await;
                    }
                    return;
                }
            },
            frame = down_rx.next() => match frame {
                Some(Ok(msg)) => {
                    if let Some(converted) = client_to_upstream(msg) {
                        // Still Connecting: buffered for the flush on open.
                        let _ = upstream_half.accept(converted);
                    } else {
                        // Browser closed before the upstream ever connected.
                        downstream_half.close();
                        upstream_half.close();
                        return;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Relay socket error");
                    downstream_half.close();
                    upstream_half.close();
                    return;
                }
                None => {
                    downstream_half.close();
                    upstream_half.close();
                    return;
                }
            },
        }
    };

    let (mut up_tx, mut up_rx) = upstream.split();

    // Flush frames queued while the upstream was connecting.
    for msg in upstream_half.open() {
        if let Err(e) = up_tx.send(msg).await {
            tracing::error!(error = %e, "Relay socket error");
            if downstream_half.close() {
                let _ = down_tx.send(WsMessage::Close(None)).await;
            }
            return;
        }
    }

    // Both halves open: forward frames until either side goes away.
    loop {
        tokio::select! {
            frame = down_rx.next() => {
                let forward = match frame {
                    Some(Ok(msg)) => client_to_upstream(msg),
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Relay socket error");
                        None
                    }
                    None => None,
                };
                match forward.and_then(|m| upstream_half.accept(m)) {
                    Some(msg) => {
                        if up_tx.send(msg).await.is_err() {
                            upstream_half.close();
                        }
                    }
                    None => {
                        downstream_half.close();
                        if upstream_half.close() {
                            let _ = up_tx.send(TungMessage::Close(None)).await;
                        }
                        return;
                    }
                }
            },
            frame = up_rx.next() => {
                let forward = match frame {
                    Some(Ok(msg)) => upstream_to_client(msg),
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Relay socket error");
                        None
                    }
                    None => None,
                };
                match forward.and_then(|m| downstream_half.accept(m)) {
                    Some(msg) => {
                        if down_tx.send(msg).await.is_err() {
                            downstream_half.close();
                        }
                    }
                    None => {
                        upstream_half.close();
                        if downstream_half.close() {
                            let _ = down_tx.send(WsMessage::Close(None)).await;
                        }
                        return;
                    }
                }
            },
        }
    }
}

/// Map a browser frame onto the upstream connection. Close frames are
/// handled by the relay loop itself, not forwarded as data.
fn client_to_upstream(msg: WsMessage) -> Option<TungMessage> {
    match msg {
        WsMessage::Text(text) => Some(TungMessage::Text(text.as_str().into())),
        WsMessage::Binary(data) => Some(TungMessage::Binary(data)),
        WsMessage::Ping(data) => Some(TungMessage::Ping(data)),
        WsMessage::Pong(data) => Some(TungMessage::Pong(data)),
        WsMessage::Close(_) => None,
    }
}

fn upstream_to_client(msg: TungMessage) -> Option<WsMessage> {
    match msg {
        TungMessage::Text(text) => Some(WsMessage::Text(text.as_str().into())),
        TungMessage::Binary(data) => Some(WsMessage::Binary(data)),
        TungMessage::Ping(data) => Some(WsMessage::Ping(data)),
        TungMessage::Pong(data) => Some(WsMessage::Pong(data)),
        TungMessage::Close(_) => None,
        // Raw frames never surface from a read without the frame API.
        TungMessage::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connecting_half_buffers_in_order() {
        let mut half: RelayHalf<u32> = RelayHalf::new();
        assert_eq!(half.state(), HalfState::Connecting);
        assert_eq!(half.accept(1), None);
        assert_eq!(half.accept(2), None);
        assert_eq!(half.accept(3), None);
        assert_eq!(half.open(), vec![1, 2, 3]);
        assert_eq!(half.state(), HalfState::Open);
    }

    #[test]
    fn test_open_half_delivers_directly() {
        let mut half: RelayHalf<u32> = RelayHalf::new();
        half.open();
        assert_eq!(half.accept(7), Some(7));
    }

    #[test]
    fn test_closed_half_drops_silently() {
        let mut half: RelayHalf<u32> = RelayHalf::new();
        half.open();
        assert!(half.close());
        assert_eq!(half.accept(7), None);
    }

    #[test]
    fn test_close_reports_first_close_only() {
        let mut half: RelayHalf<u32> = RelayHalf::new();
        assert!(half.close());
        assert!(!half.close());
        assert!(!half.close());
    }

    #[test]
    fn test_close_while_connecting_discards_queue() {
        let mut half: RelayHalf<u32> = RelayHalf::new();
        half.accept(1);
        half.accept(2);
        assert!(half.close());
        assert!(half.open().is_empty());
        assert_eq!(half.state(), HalfState::Closed);
    }
}
