//! Production self test.
//!
//! All channels are switched on, then off, one after the other, until an operator watching the
//! LEDs gives a verdict. Every transition is confirmed by reading the output port back.

use std::sync::mpsc::{self, Receiver, TryRecvError};

use fugit::MillisDurationU32;

use crate::{
    board::Mosfet8,
    bus::RegisterBus,
    error::Result,
    register::{Channel, OutputState},
    verify::write_verify,
};

/// Delay between two transitions, long enough to follow by eye.
pub const DEFAULT_STEP_DELAY: MillisDurationU32 = MillisDurationU32::millis(150);

pub const PROMPT: &str =
    "Are all mosfets and LEDs turning on and off in sequence?\nPress y for Yes or any key for No....";

/// Where the pass/fail decision comes from.
pub trait VerdictSource {
    /// `None` while undecided, `Some(true)` for a pass.
    fn poll(&mut self) -> Option<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestVerdict {
    Pass,
    Fail,
}

impl From<bool> for TestVerdict {
    fn from(value: bool) -> Self {
        match value {
            true => TestVerdict::Pass,
            false => TestVerdict::Fail,
        }
    }
}

impl core::fmt::Display for TestVerdict {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TestVerdict::Pass => write!(f, "Mosfet Test ............................ PASS"),
            TestVerdict::Fail => write!(f, "Mosfet Test ............................ FAIL!"),
        }
    }
}

/// Cycle the channels until `verdict` decides.
///
/// All channels are switched off before returning, whatever the outcome.
pub fn run<B: RegisterBus, V: VerdictSource + ?Sized>(
    board: &mut Mosfet8<B>,
    verdict: &mut V,
    step_delay: MillisDurationU32,
) -> Result<TestVerdict, B::Error> {
    let outcome = cycle(board, verdict, step_delay);
    match (board.set_outputs(0), outcome) {
        (Ok(()), outcome) => outcome,
        (Err(err), Ok(_)) => Err(err),
        (Err(err), Err(first)) => {
            tracing::error!("Fail to switch mosfets off after test: {}", err);
            Err(first)
        }
    }
}

fn cycle<B: RegisterBus, V: VerdictSource + ?Sized>(
    board: &mut Mosfet8<B>,
    verdict: &mut V,
    step_delay: MillisDurationU32,
) -> Result<TestVerdict, B::Error> {
    let delay = std::time::Duration::from_millis(step_delay.to_millis() as u64);
    loop {
        for state in [OutputState::On, OutputState::Off] {
            for channel in Channel::all() {
                if let Some(pass) = verdict.poll() {
                    return Ok(pass.into());
                }
                transition(board, channel, state)?;
                std::thread::sleep(delay);
            }
        }
    }
}

/// Switch one channel, confirmed through the whole output port.
fn transition<B: RegisterBus>(
    board: &mut Mosfet8<B>,
    channel: Channel,
    state: OutputState,
) -> Result<(), B::Error> {
    let mask = channel.logical_mask();
    let attempts = board.retry_attempts();
    write_verify(
        board,
        attempts,
        |board| board.set_channel(channel, state),
        |board| board.get_outputs(),
        |outputs| OutputState::from(outputs & mask != 0) == state,
    )
    .into_result()
    .map(|_| ())
}

/// Verdict typed by an operator on stdin: `y` passes, anything else fails.
///
/// Stdin is only read from the first poll on.
#[derive(Default)]
pub struct StdinVerdict {
    answer: Option<Receiver<bool>>,
}

impl StdinVerdict {
    fn listen() -> Receiver<bool> {
        let (tx, answer) = mpsc::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let pass = match std::io::stdin().read_line(&mut line) {
                Ok(_) => line.trim_start().starts_with(['y', 'Y']),
                Err(_) => false,
            };
            let _ = tx.send(pass);
        });
        answer
    }
}

impl VerdictSource for StdinVerdict {
    fn poll(&mut self) -> Option<bool> {
        match self.answer.get_or_insert_with(Self::listen).try_recv() {
            Ok(pass) => Some(pass),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(false),
        }
    }
}
