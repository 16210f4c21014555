//! Ctrl-C handling.
//!
//! While an attempt is running, Ctrl-C cancels it cooperatively. Otherwise
//! it exits the process the way an unhandled interrupt would.

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Exit status used for an interrupt outside a running attempt.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Clone, Default)]
pub(crate) struct Interrupt {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupt {
    /// Install the Ctrl-C listener.
    pub(crate) fn install() -> Self {
        let interrupt = Self::default();
        let active = Arc::clone(&interrupt.active);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                let token = active
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                match token {
                    Some(token) => {
                        info!("interrupt received, cancelling");
                        eprintln!("\n  Cancelling… (waiting for in-flight uploads)");
                        token.cancel();
                    }
                    None => std::process::exit(INTERRUPTED_EXIT_CODE),
                }
            }
        });
        interrupt
    }

    /// Route Ctrl-C to `token` until the returned guard is dropped.
    pub(crate) fn arm(&self, token: CancellationToken) -> ArmedGuard<'_> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        ArmedGuard { interrupt: self }
    }
}

pub(crate) struct ArmedGuard<'a> {
    interrupt: &'a Interrupt,
}

impl Drop for ArmedGuard<'_> {
    fn drop(&mut self) {
        self.interrupt
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
