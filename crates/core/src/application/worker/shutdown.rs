// Graceful shutdown signaling via a watch channel.

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownSender(watch::Sender<bool>);

impl ShutdownSender {
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

#[derive(Clone)]
pub struct ShutdownToken(watch::Receiver<bool>);

impl ShutdownToken {
    pub fn is_shutting_down(&self) -> bool {
        *self.0.borrow()
    }

    pub async fn changed(&mut self) {
        let _ = self.0.changed().await;
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender(tx), ShutdownToken(rx))
}
