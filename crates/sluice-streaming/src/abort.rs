//! Abort timer for renders that take too long.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::{Instant, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Armed,
    Disarmed,
    Fired,
}

/// One-shot deadline raced against renderer events.
///
/// Resolves once when the delay elapses while armed. A disarmed or already
/// fired timer stays pending forever, so it is safe to keep in a `select!`.
#[derive(Debug)]
pub struct AbortTimer {
    sleep: Pin<Box<Sleep>>,
    delay: Duration,
    state: TimerState,
}

impl AbortTimer {
    /// Arm a timer that fires after `delay`.
    pub fn arm(delay: Duration) -> Self {
        Self {
            sleep: Box::pin(tokio::time::sleep(delay)),
            delay,
            state: TimerState::Armed,
        }
    }

    /// Stop the timer from firing.
    pub fn disarm(&mut self) {
        if self.state == TimerState::Armed {
            self.state = TimerState::Disarmed;
        }
    }

    /// Whether the timer can still fire.
    pub fn is_armed(&self) -> bool {
        self.state == TimerState::Armed
    }

    /// Whether the timer already fired.
    pub fn has_fired(&self) -> bool {
        self.state == TimerState::Fired
    }

    /// Configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Time left before expiry, zero once elapsed.
    pub fn remaining(&self) -> Duration {
        self.sleep
            .deadline()
            .saturating_duration_since(Instant::now())
    }
}

impl Future for AbortTimer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.state != TimerState::Armed {
            return Poll::Pending;
        }
        match self.sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.state = TimerState::Fired;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
