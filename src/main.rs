use std::io::Write;

use clap::Parser;
use mosfet8::app::{self, AppError, FAIL};
use mosfet8::cli::Cli;
use mosfet8::config::{self, Config};

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = app::usage_exit_code(&err);
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let config = config::resolve_config(cli.config.as_deref());

    // Initialize logging
    let level = match cli.verbose {
        0 => config
            .as_ref()
            .map(Config::log_level)
            .unwrap_or(tracing::Level::WARN),
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load config: {err}");
            std::process::exit(FAIL);
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = run(&cli, &config, &mut out);
    let _ = out.flush();

    match result {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            tracing::debug!("{:?}", err);
            eprintln!("{err}");
            std::process::exit(err.exit_code());
        }
    }
}

#[cfg(target_os = "linux")]
fn run(
    cli: &Cli,
    config: &Config,
    out: &mut dyn Write,
) -> Result<(), AppError<mosfet8::linux::IoError>> {
    use mosfet8::error::Error;
    use mosfet8::linux::LinuxI2c;
    use mosfet8::mutex::NamedSemaphore;
    use mosfet8::selftest::StdinVerdict;

    let settings = app::Settings::new(config, cli.strict_address);
    let bus_path = cli.bus.as_ref().unwrap_or(&config.bus_path);
    tracing::debug!("Using I2C adapter {}", bus_path.display());

    let mutex = NamedSemaphore::open(
        &config.semaphore_name,
        config.semaphore_initial_count,
        config.lock_poll_timeout(),
    )?;
    app::execute(
        &cli.command,
        cli.stack,
        &mutex,
        || LinuxI2c::open(bus_path).map_err(|err| AppError::Device(Error::Bus(err))),
        &settings,
        out,
        &mut StdinVerdict::default(),
    )
}

#[cfg(not(target_os = "linux"))]
fn run(
    _cli: &Cli,
    _config: &Config,
    _out: &mut dyn Write,
) -> Result<(), AppError<core::convert::Infallible>> {
    tracing::error!("The I2C bus is only reachable on Linux");
    Err(AppError::Output(std::io::Error::from(
        std::io::ErrorKind::Unsupported,
    )))
}
