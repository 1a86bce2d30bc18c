use tokio::sync::watch;

/// One-shot, monotonic gate.
///
/// Starts closed, opens once, and stays open. Waiters that arrive after it
/// opened return immediately.
pub struct QuorumLatch {
    opened: watch::Sender<bool>,
}

impl QuorumLatch {
    pub fn new() -> Self {
        let (opened, _) = watch::channel(false);
        Self { opened }
    }

    /// Opens the gate. Opening twice is a no-op.
    pub fn open(&self) {
        self.opened.send_if_modified(|opened| {
            if *opened {
                false
            } else {
                *opened = true;
                true
            }
        });
    }

    pub fn is_open(&self) -> bool {
        *self.opened.borrow()
    }

    /// Parks until the gate is open.
    pub async fn wait(&self) {
        let mut rx = self.opened.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|opened| *opened).await;
    }
}

impl Default for QuorumLatch {
    fn default() -> Self {
        Self::new()
    }
}
