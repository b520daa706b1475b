//! Session teardown signal.
//!
//! A [`ShutdownTrigger`] fires once; every [`Shutdown`] cloned from the same
//! channel observes it. The fetch pipeline races its in-flight attempt and
//! its backoff waits against [`Shutdown::triggered`], so tearing the session
//! down aborts the remaining retries instead of waiting them out.

use tokio::sync::watch;
use tracing::{info, warn};

pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// A signal that never fires.
    pub fn never() -> Self {
        channel().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the trigger fires. If the trigger is dropped without
    /// firing, this never resolves.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Fire `trigger` on Ctrl-C. Runs until the signal arrives.
pub async fn trigger_on_ctrl_c(trigger: ShutdownTrigger) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("shutdown signal received");
            trigger.trigger();
        }
        Err(e) => warn!(error = %e, "failed to install Ctrl-C handler"),
    }
}
