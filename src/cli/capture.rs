use anyhow::Result;
use ansi_term::Colour::{Green, Red};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    time::Instant,
};

use crate::{
    client::ApiClient,
    utils::clock::{Clock, DefaultClock},
};

/// State of the capture view. The first click arms it, the second click
/// completes a measurement and disarms it immediately, so a third rapid click
/// starts a new cycle instead of resubmitting the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Armed { first_click: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// First click registered, waiting for the second.
    Armed,
    /// Second click registered, elapsed milliseconds ready for submission.
    Completed { elapsed_ms: u128 },
}

#[derive(Debug)]
pub struct CaptureMachine {
    state: CaptureState,
}

impl CaptureMachine {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn click(&mut self, clock: &dyn Clock) -> ClickOutcome {
        match self.state {
            CaptureState::Idle => {
                self.state = CaptureState::Armed {
                    first_click: clock.instant(),
                };
                ClickOutcome::Armed
            }
            CaptureState::Armed { first_click } => {
                let elapsed = clock.instant() - first_click;
                self.state = CaptureState::Idle;
                ClickOutcome::Completed {
                    elapsed_ms: elapsed.as_millis(),
                }
            }
        }
    }

    /// Returns to [CaptureState::Idle], dropping any pending first click.
    pub fn reset(&mut self) {
        self.state = CaptureState::Idle;
    }
}

impl Default for CaptureMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Command to process `capture`. Every Enter press counts as a click, `r`
/// resets the pending state, `q` quits. Completed measurements are submitted
/// to the server right away, failures are shown without retrying.
pub async fn process_capture_command(client: ApiClient) -> Result<()> {
    println!("Press Enter twice as fast as you can. Type `r` to reset, `q` to quit.");

    let clock = DefaultClock;
    let mut machine = CaptureMachine::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "q" => break,
            "r" => {
                machine.reset();
                println!("Cleared. Press Enter to start a new measurement.");
                continue;
            }
            _ => {}
        }

        match machine.click(&clock) {
            ClickOutcome::Armed => {
                println!("Press Enter again as fast as you can!");
            }
            ClickOutcome::Completed { elapsed_ms } => {
                println!("Measured {elapsed_ms} ms. Saving...");
                match client.register(elapsed_ms as f64).await {
                    Ok(saved) => println!(
                        "{}",
                        Green.paint(format!(
                            "Saved measurement #{} with {} ms",
                            saved.id, saved.elapsed_ms
                        ))
                    ),
                    Err(e) => println!("{}", Red.paint(format!("Failed to save measurement: {e}"))),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use crate::utils::clock::MockClock;

    use super::{CaptureMachine, CaptureState, ClickOutcome};

    fn scripted_clock(instants: Vec<Instant>) -> MockClock {
        let mut clock = MockClock::new();
        let mut instants = instants.into_iter();
        clock
            .expect_instant()
            .returning(move || instants.next().unwrap());
        clock
    }

    #[tokio::test]
    async fn test_two_clicks_complete_a_measurement() {
        let start = Instant::now();
        let clock = scripted_clock(vec![start, start + Duration::from_millis(250)]);

        let mut machine = CaptureMachine::new();
        assert_eq!(machine.state(), CaptureState::Idle);

        assert_eq!(machine.click(&clock), ClickOutcome::Armed);
        assert_eq!(
            machine.state(),
            CaptureState::Armed { first_click: start }
        );

        assert_eq!(
            machine.click(&clock),
            ClickOutcome::Completed { elapsed_ms: 250 }
        );
        assert_eq!(machine.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_third_click_starts_a_new_cycle() {
        let start = Instant::now();
        let third = start + Duration::from_millis(400);
        let clock = scripted_clock(vec![
            start,
            start + Duration::from_millis(120),
            third,
            third + Duration::from_millis(90),
        ]);

        let mut machine = CaptureMachine::new();
        machine.click(&clock);
        assert_eq!(
            machine.click(&clock),
            ClickOutcome::Completed { elapsed_ms: 120 }
        );

        // The pending click was cleared on completion, so this arms again.
        assert_eq!(machine.click(&clock), ClickOutcome::Armed);
        assert_eq!(
            machine.click(&clock),
            ClickOutcome::Completed { elapsed_ms: 90 }
        );
    }

    #[tokio::test]
    async fn test_reset_drops_the_pending_click() {
        let start = Instant::now();
        let clock = scripted_clock(vec![start, start + Duration::from_millis(10)]);

        let mut machine = CaptureMachine::new();
        machine.click(&clock);
        machine.reset();
        assert_eq!(machine.state(), CaptureState::Idle);

        // The next click arms instead of completing.
        assert_eq!(machine.click(&clock), ClickOutcome::Armed);
    }

    #[tokio::test]
    async fn test_reset_on_idle_is_a_noop() {
        let mut machine = CaptureMachine::default();
        machine.reset();
        assert_eq!(machine.state(), CaptureState::Idle);
    }
}
