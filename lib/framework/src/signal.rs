use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Control messages used to drive reload and shutdown events.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalTo {
    /// Signal to reload config and certificates from the filesystem
    Reload,
    /// Signal to shutdown process gracefully
    Shutdown,
    /// Shutdown process immediately
    Quit,
}

pin_project! {
    pub struct Signals {
        #[pin]
        sigint: Signal,
        #[pin]
        sigterm: Signal,
        #[pin]
        sigquit: Signal,
        #[pin]
        sighup: Signal
    }
}

impl Stream for Signals {
    type Item = SignalTo;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if this.sigint.poll_recv(cx).is_ready() {
            info!(message = "Signal received", signal = "SIGINT");
            return Poll::Ready(Some(SignalTo::Shutdown));
        }

        if this.sigterm.poll_recv(cx).is_ready() {
            info!(message = "Signal received", signal = "SIGTERM");
            return Poll::Ready(Some(SignalTo::Shutdown));
        }

        if this.sigquit.poll_recv(cx).is_ready() {
            info!(message = "Signal received", signal = "SIGQUIT");
            return Poll::Ready(Some(SignalTo::Quit));
        }

        if this.sighup.poll_recv(cx).is_ready() {
            info!(message = "Signal received", signal = "SIGHUP");
            return Poll::Ready(Some(SignalTo::Reload));
        }

        Poll::Pending
    }
}

/// Signals from OS/user
pub fn os_signals() -> io::Result<Signals> {
    Ok(Signals {
        sigint: signal(SignalKind::interrupt())?,
        sigterm: signal(SignalKind::terminate())?,
        sigquit: signal(SignalKind::quit())?,
        sighup: signal(SignalKind::hangup())?,
    })
}
