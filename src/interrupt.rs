// src/interrupt.rs

//! Ctrl-C handling.
//!
//! The first Ctrl-C cancels the running task, which still cleans up. A
//! second one gives up on cleanup and exits straight away.

use tracing::{error, warn};

use crate::engine::CancellationSource;

/// Exit code used when a second Ctrl-C abandons cleanup.
pub const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    Cancel,
    ExitImmediately,
}

impl InterruptAction {
    /// What to do on the `count`th Ctrl-C, counting from 1.
    pub fn for_signal_count(count: usize) -> Self {
        if count <= 1 {
            InterruptAction::Cancel
        } else {
            InterruptAction::ExitImmediately
        }
    }
}

/// Listen for Ctrl-C in the background for the rest of the process.
pub fn listen_for_interrupts(source: CancellationSource) {
    tokio::spawn(async move {
        let mut count = 0;
        loop {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for Ctrl+C");
                return;
            }
            count += 1;

            match InterruptAction::for_signal_count(count) {
                InterruptAction::Cancel => {
                    warn!("interrupted, stopping the task and cleaning up (press Ctrl+C again to exit now)");
                    source.cancel();
                }
                InterruptAction::ExitImmediately => {
                    error!("interrupted again, exiting without finishing cleanup");
                    std::process::exit(FORCED_EXIT_CODE);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_interrupt_cancels_and_later_ones_exit() {
        assert_eq!(InterruptAction::for_signal_count(1), InterruptAction::Cancel);
        assert_eq!(
            InterruptAction::for_signal_count(2),
            InterruptAction::ExitImmediately
        );
        assert_eq!(
            InterruptAction::for_signal_count(5),
            InterruptAction::ExitImmediately
        );
    }
}
