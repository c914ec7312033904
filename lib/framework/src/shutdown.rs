use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// The trigger half of a [`ShutdownSignal`]. Dropping it does not begin the
/// shutdown, only [`ShutdownTrigger::cancel`] does.
#[derive(Clone, Debug)]
pub struct ShutdownTrigger {
    token: CancellationToken,
}

impl ShutdownTrigger {
    pub fn cancel(&self) {
        info!(message = "shutdown triggered");

        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Passed to every server to coordinate the global shutdown process. It
/// resolves once the corresponding [`ShutdownTrigger`] is cancelled, and every
/// clone resolves independently.
pub struct ShutdownSignal {
    token: CancellationToken,
    wait: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl Clone for ShutdownSignal {
    fn clone(&self) -> Self {
        Self::from_token(self.token.clone())
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.wait.as_mut().poll(cx)
    }
}

impl ShutdownSignal {
    pub fn new() -> (ShutdownTrigger, ShutdownSignal) {
        let token = CancellationToken::new();

        (
            ShutdownTrigger {
                token: token.clone(),
            },
            ShutdownSignal::from_token(token),
        )
    }

    fn from_token(token: CancellationToken) -> Self {
        let wait = Box::pin(token.clone().cancelled_owned());

        Self { token, wait }
    }
}
