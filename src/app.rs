//! Runs one [`Command`] against the bus and prints its result.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use fugit::MillisDurationU32;
use thiserror::Error;

use crate::{
    board::{self, Mosfet8},
    bus::RegisterBus,
    cli::Command,
    codec::{PwmDuty, PwmFrequency, SerialLinkConfig, SlaveAddressPolicy},
    config::{Config, ConfigError},
    error::{ArgumentError, Error},
    locator::{self, STACK_LEVEL_MAX},
    mutex::{BusGuard, BusMutex, LockError},
    register::{Channel, OutputState},
    selftest::{self, VerdictSource},
    verify::RETRY_TIMES,
};

/// Exit code of any failed command.
pub const FAIL: i32 = -1;
/// Exit code of a command given the wrong number of arguments.
pub const ARG_CNT_ERR: i32 = -2;

pub const WARRANTY: &str = "\
       Copyright (c) 2016-2023 Sequent Microsystems

       This program is free software; you can redistribute it and/or modify
       it under the terms of the GNU Lesser General Public License as published
       by the Free Software Foundation, either version 3 of the License, or
       (at your option) any later version.

       This program is distributed in the hope that it will be useful,
       but WITHOUT ANY WARRANTY; without even the implied warranty of
       MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
       GNU Lesser General Public License for more details.

       You should have received a copy of the GNU Lesser General Public License
       along with this program. If not, see <http://www.gnu.org/licenses/>.";

#[derive(Error, Debug)]
pub enum AppError<I: embedded_io::Error> {
    #[error(transparent)]
    Device(#[from] Error<I>),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Fail to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("This command needs the board stack level [0..7]")]
    MissingStack,
    #[error("Invalid mosfet state {0:?}, use on or off")]
    InvalidState(String),
}

impl<I: embedded_io::Error> From<ArgumentError> for AppError<I> {
    fn from(err: ArgumentError) -> Self {
        AppError::Device(Error::Argument(err))
    }
}

impl<I: embedded_io::Error> AppError<I> {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::MissingStack => ARG_CNT_ERR,
            _ => FAIL,
        }
    }
}

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub retry_attempts: usize,
    pub slave_address_policy: SlaveAddressPolicy,
    pub self_test_step: MillisDurationU32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retry_attempts: RETRY_TIMES,
            slave_address_policy: SlaveAddressPolicy::default(),
            self_test_step: selftest::DEFAULT_STEP_DELAY,
        }
    }
}

impl Settings {
    /// Settings from the configuration, `--strict-address` taking precedence.
    pub fn new(config: &Config, strict_address: bool) -> Self {
        let slave_address_policy = if strict_address {
            SlaveAddressPolicy::Strict
        } else {
            config.slave_address_policy()
        };
        Self {
            retry_attempts: config.retry_attempts,
            slave_address_policy,
            self_test_step: config.self_test_step(),
        }
    }
}

/// A command with its arguments checked, ready to run.
#[derive(Debug, Clone)]
enum Action {
    Warranty,
    Discovery,
    Board(BoardAction),
}

/// An action on the board at one stack level.
#[derive(Debug, Clone)]
enum BoardAction {
    WriteChannel(Channel, OutputState),
    WriteAll(u8),
    ReadChannel(Channel),
    ReadAll,
    PwmWrite(Channel, PwmDuty),
    PwmRead(Channel),
    FreqWrite(PwmFrequency),
    FreqRead,
    SerialConfigWrite(SerialLinkConfig),
    SerialConfigRead,
    SelfTest(Option<PathBuf>),
}

impl Action {
    fn parse<I: embedded_io::Error>(
        command: &Command,
        policy: SlaveAddressPolicy,
    ) -> Result<Self, AppError<I>> {
        let action = match command {
            Command::Warranty => return Ok(Action::Warranty),
            Command::Discovery => return Ok(Action::Discovery),
            Command::Write {
                target,
                state: Some(state),
            } => {
                let channel = board::channel::<I>(*target)?;
                let state = state
                    .parse::<OutputState>()
                    .map_err(|_| AppError::InvalidState(state.clone()))?;
                BoardAction::WriteChannel(channel, state)
            }
            Command::Write {
                target,
                state: None,
            } => {
                let value =
                    u8::try_from(*target).map_err(|_| ArgumentError::OutputValue(*target))?;
                BoardAction::WriteAll(value)
            }
            Command::Read {
                channel: Some(channel),
            } => BoardAction::ReadChannel(board::channel::<I>(*channel)?),
            Command::Read { channel: None } => BoardAction::ReadAll,
            Command::PwmWrite { channel, value } => BoardAction::PwmWrite(
                board::channel::<I>(*channel)?,
                PwmDuty::new(*value)?,
            ),
            Command::PwmRead { channel } => {
                BoardAction::PwmRead(board::channel::<I>(*channel)?)
            }
            Command::FreqWrite { frequency } => {
                BoardAction::FreqWrite(PwmFrequency::new(*frequency)?)
            }
            Command::FreqRead => BoardAction::FreqRead,
            Command::SerialConfigWrite {
                mode,
                baud,
                stop_bits,
                parity,
                address,
            } => {
                let config = SerialLinkConfig {
                    mode: *mode,
                    baud: *baud,
                    stop_bits: *stop_bits,
                    parity: *parity,
                    address: *address,
                };
                config.validate(policy)?;
                BoardAction::SerialConfigWrite(config)
            }
            Command::SerialConfigRead => BoardAction::SerialConfigRead,
            Command::SelfTest { output } => BoardAction::SelfTest(output.clone()),
        };
        Ok(Action::Board(action))
    }
}

/// Run `command` on the board at `stack`, printing its result to `out`.
///
/// Arguments are checked before anything else. The bus is opened through `open_bus` only once
/// `mutex` is held, and the mutex is released on every path out of here. `warranty` takes neither.
pub fn execute<B, M, F>(
    command: &Command,
    stack: Option<u8>,
    mutex: &M,
    open_bus: F,
    settings: &Settings,
    out: &mut dyn Write,
    verdict: &mut dyn VerdictSource,
) -> Result<(), AppError<B::Error>>
where
    B: RegisterBus,
    M: BusMutex + ?Sized,
    F: FnOnce() -> Result<B, AppError<B::Error>>,
{
    match Action::parse::<B::Error>(command, settings.slave_address_policy)? {
        Action::Warranty => {
            writeln!(out, "{}", WARRANTY)?;
            Ok(())
        }
        Action::Discovery => {
            let _guard = BusGuard::acquire(mutex)?;
            let mut bus = open_bus()?;
            discovery(&mut bus, out)
        }
        Action::Board(action) => {
            let stack = stack.ok_or(AppError::MissingStack)?;
            if stack > STACK_LEVEL_MAX {
                return Err(ArgumentError::StackLevel(stack).into());
            }

            let _guard = BusGuard::acquire(mutex)?;
            let bus = open_bus()?;
            let mut board =
                Mosfet8::open(bus, stack)?.with_retry_attempts(settings.retry_attempts);
            run_action(&mut board, action, settings, out, verdict)
        }
    }
}

/// Exit code for a command line clap refused.
///
/// Help and version requests succeed. Missing, extra or unknown arguments are argument count
/// errors. A value of the wrong shape, e.g. a number too large for its type, is an ordinary
/// failure like any other out of range value.
pub fn usage_exit_code(err: &clap::Error) -> i32 {
    use clap::error::ErrorKind;

    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        ErrorKind::MissingRequiredArgument
        | ErrorKind::TooManyValues
        | ErrorKind::TooFewValues
        | ErrorKind::WrongNumberOfValues
        | ErrorKind::UnknownArgument
        | ErrorKind::MissingSubcommand
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => ARG_CNT_ERR,
        _ => FAIL,
    }
}

fn discovery<B: RegisterBus>(bus: &mut B, out: &mut dyn Write) -> Result<(), AppError<B::Error>> {
    let levels = locator::discover(bus)?;
    writeln!(out, "{} board(s) detected", levels.len())?;
    if !levels.is_empty() {
        write!(out, "Id:")?;
        for level in levels.iter().rev() {
            write!(out, " {}", level)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn run_action<B: RegisterBus>(
    board: &mut Mosfet8<B>,
    action: BoardAction,
    settings: &Settings,
    out: &mut dyn Write,
    verdict: &mut dyn VerdictSource,
) -> Result<(), AppError<B::Error>> {
    match action {
        BoardAction::WriteChannel(channel, state) => {
            let attempts = board.write_channel(channel, state)?;
            tracing::debug!("Mosfet {} confirmed after {} attempt(s)", channel.number(), attempts);
        }
        BoardAction::WriteAll(value) => {
            let attempts = board.write_outputs(value)?;
            tracing::debug!("Mosfets confirmed after {} attempt(s)", attempts);
        }
        BoardAction::ReadChannel(channel) => {
            let state: bool = board.get_channel(channel)?.into();
            writeln!(out, "{}", state as u8)?;
        }
        BoardAction::ReadAll => {
            writeln!(out, "{}", board.get_outputs()?)?;
        }
        BoardAction::PwmWrite(channel, duty) => {
            let attempts = board.write_pwm(channel, duty)?;
            tracing::debug!("PWM {} confirmed after {} attempt(s)", channel.number(), attempts);
        }
        BoardAction::PwmRead(channel) => {
            writeln!(out, "{:.1}", board.get_pwm(channel)?.percent())?;
        }
        BoardAction::FreqWrite(frequency) => board.set_frequency(frequency)?,
        BoardAction::FreqRead => {
            writeln!(out, "{}", board.get_frequency()?)?;
        }
        BoardAction::SerialConfigWrite(config) => {
            board.set_serial_config(config, settings.slave_address_policy)?;
            writeln!(out, "done")?;
        }
        BoardAction::SerialConfigRead => {
            writeln!(out, "{}", board.get_serial_config()?)?;
        }
        BoardAction::SelfTest(output) => self_test(board, output, settings, out, verdict)?,
    }
    Ok(())
}

fn self_test<B: RegisterBus>(
    board: &mut Mosfet8<B>,
    output: Option<PathBuf>,
    settings: &Settings,
    out: &mut dyn Write,
    verdict: &mut dyn VerdictSource,
) -> Result<(), AppError<B::Error>> {
    let mut report = output.and_then(|path| match File::create(&path) {
        Ok(file) => Some(file),
        Err(err) => {
            tracing::warn!("Fail to open result file {}: {}", path.display(), err);
            None
        }
    });

    write!(out, "{}", selftest::PROMPT)?;
    out.flush()?;
    let result = selftest::run(board, verdict, settings.self_test_step)?;

    match report.as_mut() {
        Some(file) => writeln!(file, "{}", result)?,
        None => writeln!(out, "\n{}", result)?,
    }
    Ok(())
}
