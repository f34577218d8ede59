//! In-process RPC transport between Local Managers and the Global Manager.
//!
//! A real deployment would put this behind a network RPC framework; within
//! one process a bounded `mpsc` channel with a single consumer task gives
//! the same FIFO serialization the spec asks for (§4.6: "concurrent requests
//! are queued FIFO") without any locking of its own — the channel is the
//! lock. Sends are best-effort (§7: "the local manager treats RPC send as
//! best-effort"), so there is no reply channel to wait on.

use tokio::sync::mpsc;

#[derive(Debug)]
pub enum GlobalManagerRequest {
    Underload { host_id: i32 },
    Overload { host_id: i32, vm_uuids: Vec<String> },
}

impl GlobalManagerRequest {
    pub fn host_id(&self) -> i32 {
        match self {
            Self::Underload { host_id } => *host_id,
            Self::Overload { host_id, .. } => *host_id,
        }
    }
}

#[derive(Clone)]
pub struct GlobalManagerHandle {
    sender: mpsc::Sender<GlobalManagerRequest>,
}

impl GlobalManagerHandle {
    pub fn new(sender: mpsc::Sender<GlobalManagerRequest>) -> Self {
        Self { sender }
    }

    pub async fn underload(&self, host_id: i32) {
        self.send(GlobalManagerRequest::Underload { host_id }).await
    }

    pub async fn overload(&self, host_id: i32, vm_uuids: Vec<String>) {
        self.send(GlobalManagerRequest::Overload { host_id, vm_uuids }).await
    }

    async fn send(&self, request: GlobalManagerRequest) {
        if let Err(e) = self.sender.send(request).await {
            log::warn!(target: "terracotta::rpc", "global manager channel closed, dropping request for host {}", e.0.host_id());
        }
    }
}

/// Creates the channel pair: the Global Manager owns the receiver, every
/// Local Manager clones the handle.
pub fn channel(capacity: usize) -> (GlobalManagerHandle, mpsc::Receiver<GlobalManagerRequest>) {
    let (tx, rx) = mpsc::channel(capacity);
    (GlobalManagerHandle::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requests_are_delivered_in_order() {
        let (handle, mut rx) = channel(8);
        handle.overload(1, vec!["vm-a".to_string()]).await;
        handle.underload(2).await;

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, GlobalManagerRequest::Overload { host_id: 1, .. }));

        let second = rx.recv().await.unwrap();
        assert!(matches!(second, GlobalManagerRequest::Underload { host_id: 2 }));
    }
}
