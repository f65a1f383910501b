//! Connection abstraction for sync sessions.
//!
//! A session only needs to send a message, receive the next one, and close.
//! The socket behind it is the host's business; [`ChannelConn`] is the
//! in-process implementation used for tests and same-process peers.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Result, SyncError};
use crate::wire::SyncMessage;

/// Bidirectional message channel to one peer.
#[async_trait]
pub trait Conn: Send {
    async fn send(&mut self, msg: &SyncMessage) -> Result<()>;

    /// Next message from the peer. Returns `SyncError::ConnectionClosed`
    /// once the peer has gone away.
    async fn receive(&mut self) -> Result<SyncMessage>;

    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<C: Conn + ?Sized> Conn for Box<C> {
    async fn send(&mut self, msg: &SyncMessage) -> Result<()> {
        (**self).send(msg).await
    }

    async fn receive(&mut self) -> Result<SyncMessage> {
        (**self).receive().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// One end of an in-process connection carrying JSON text frames.
#[derive(Debug)]
pub struct ChannelConn {
    tx: Option<mpsc::Sender<String>>,
    rx: mpsc::Receiver<String>,
}

/// Two connected ends.
pub fn pair(capacity: usize) -> (ChannelConn, ChannelConn) {
    let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
    let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
    (
        ChannelConn {
            tx: Some(a_tx),
            rx: a_rx,
        },
        ChannelConn {
            tx: Some(b_tx),
            rx: b_rx,
        },
    )
}

impl ChannelConn {
    /// Push a raw text frame, bypassing encoding.
    pub async fn send_frame(&mut self, frame: impl Into<String>) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(SyncError::ConnectionClosed)?;
        tx.send(frame.into())
            .await
            .map_err(|_| SyncError::ConnectionClosed)
    }

    /// Next raw text frame.
    pub async fn receive_frame(&mut self) -> Result<String> {
        self.rx.recv().await.ok_or(SyncError::ConnectionClosed)
    }
}

#[async_trait]
impl Conn for ChannelConn {
    async fn send(&mut self, msg: &SyncMessage) -> Result<()> {
        let frame = msg.to_json()?;
        self.send_frame(frame).await
    }

    async fn receive(&mut self) -> Result<SyncMessage> {
        let frame = self.receive_frame().await?;
        SyncMessage::from_json(&frame)
    }

    async fn close(&mut self) -> Result<()> {
        // Frames already queued stay readable on the other end.
        self.tx.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn messages_cross() {
        let (mut a, mut b) = pair(4);
        let hello = SyncMessage::Hello {
            root_hash: "00".repeat(32),
        };

        a.send(&hello).await.unwrap();
        assert_eq!(b.receive().await.unwrap(), hello);
    }

    #[tokio::test]
    async fn close_drains_then_reports_closed() {
        let (mut a, mut b) = pair(4);
        let done = SyncMessage::Done {
            sent: 1,
            received: 0,
            partial: false,
        };

        a.send(&done).await.unwrap();
        a.close().await.unwrap();

        assert_eq!(b.receive().await.unwrap(), done);
        assert!(matches!(b.receive().await, Err(SyncError::ConnectionClosed)));
        assert!(matches!(a.send(&done).await, Err(SyncError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn dropped_peer() {
        let (mut a, b) = pair(1);
        drop(b);
        let result = a
            .send(&SyncMessage::Need {
                need: vec![],
                have: Default::default(),
            })
            .await;
        assert!(matches!(result, Err(SyncError::ConnectionClosed)));
        assert!(matches!(a.receive().await, Err(SyncError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn garbage_frame_is_malformed() {
        let (mut a, mut b) = pair(1);
        a.send_frame("{\"type\":42}").await.unwrap();
        assert!(matches!(b.receive().await, Err(SyncError::Malformed(_))));
    }

    #[tokio::test]
    async fn boxed_dyn_conn() {
        let (a, b) = pair(1);
        let mut a: Box<dyn Conn> = Box::new(a);
        let mut b: Box<dyn Conn> = Box::new(b);
        let msg = SyncMessage::Attestations {
            attestations: vec![],
        };
        a.send(&msg).await.unwrap();
        assert_eq!(b.receive().await.unwrap(), msg);
    }
}
