use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use log::{error, info};

use qbitlink::relay::{measure_bit, send_bit};
use qbitlink::{
    discover_devices, discovery, Config, Credentials, Dispatcher, IbmConfig, IbmProvider, Mode,
    QbitLinkError,
};

#[derive(Parser, Debug)]
#[command(name = "qbitlink", version, about = "Relay quantum random bits to a microcontroller over serial")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    opts: Options,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer JSON commands from the microcontroller (default).
    Serve,
    /// Measure one bit, send it as a raw byte, and print the reply.
    SendBit {
        /// Seconds to wait for the microcontroller's reply.
        #[arg(long, default_value_t = 1)]
        reply_timeout: u64,
    },
    /// List candidate serial devices.
    List,
}

#[derive(Args, Debug)]
struct Options {
    /// Serial port; auto-discovered when omitted.
    #[arg(long, global = true, env = "QBITLINK_PORT")]
    port: Option<String>,

    #[arg(long, global = true, env = "QBITLINK_BAUD", default_value_t = 9600)]
    baud: u32,

    /// `simulate` or `hardware`.
    #[arg(long, global = true, env = "QBITLINK_MODE", default_value = "simulate")]
    mode: Mode,

    /// Seconds to keep scanning for a device before giving up.
    #[arg(long, global = true, env = "QBITLINK_DISCOVERY_TIMEOUT", default_value_t = 60)]
    discovery_timeout: u64,

    /// Seconds to wait after opening the port.
    #[arg(long, global = true, env = "QBITLINK_SETTLE", default_value_t = 2)]
    settle: u64,

    #[arg(long, global = true, env = "QBITLINK_MAX_QUBITS", default_value_t = 32)]
    max_qubits: u32,

    /// Seed the local sampler for reproducible output.
    #[arg(long, global = true, env = "QBITLINK_SEED")]
    seed: Option<u64>,

    /// Seconds between status polls while a hardware job is pending.
    #[arg(long, global = true, env = "QBITLINK_JOB_POLL", default_value_t = 1)]
    job_poll: u64,

    /// Give up on a pending hardware job after this many seconds.
    #[arg(long, global = true, env = "QBITLINK_JOB_TIMEOUT")]
    job_timeout: Option<u64>,

    #[arg(long, global = true, env = "IBM_QUANTUM_TOKEN", hide_env_values = true)]
    ibm_token: Option<String>,

    #[arg(long, global = true, env = "IBM_QUANTUM_INSTANCE")]
    ibm_instance: Option<String>,

    #[arg(
        long,
        global = true,
        env = "IBM_QUANTUM_ENDPOINT",
        default_value = qbitlink::ibm::DEFAULT_ENDPOINT
    )]
    ibm_endpoint: String,
}

impl From<Options> for Config {
    fn from(opts: Options) -> Self {
        Config {
            port: opts.port,
            baud_rate: opts.baud,
            settle_delay: Duration::from_secs(opts.settle),
            discovery_timeout: Duration::from_secs(opts.discovery_timeout),
            job_poll_interval: Duration::from_secs(opts.job_poll),
            job_timeout: opts.job_timeout.map(Duration::from_secs),
            mode: opts.mode,
            max_qubits: opts.max_qubits,
            seed: opts.seed,
            ibm: IbmConfig {
                endpoint: opts.ibm_endpoint,
                credentials: opts.ibm_token.map(Credentials::new),
                instance: opts.ibm_instance,
                ..IbmConfig::default()
            },
            ..Config::default()
        }
    }
}

fn run(command: Command, config: Config) -> Result<(), QbitLinkError> {
    config.validate()?;

    match command {
        Command::List => {
            let devices = discover_devices();
            if devices.is_empty() {
                println!("No candidate devices found.");
            }
            for dev in devices {
                println!(
                    "{}\t{}\t{}\t{}",
                    dev.port,
                    dev.manufacturer.as_deref().unwrap_or("-"),
                    dev.product.as_deref().unwrap_or("-"),
                    dev.serial_number.as_deref().unwrap_or("-"),
                );
            }
            Ok(())
        }
        Command::Serve => {
            let mut transport = discovery::connect(&config)?;
            let provider = IbmProvider::from_config(&config.ibm);
            let mut dispatcher = Dispatcher::new(&config, provider);
            dispatcher.serve(&mut transport)
        }
        Command::SendBit { reply_timeout } => {
            let mut provider = IbmProvider::from_config(&config.ibm);
            let bit = measure_bit(&config, &mut provider)?;
            info!("Measured bit: {bit}");
            let mut transport = discovery::connect(&config)?;
            send_bit(
                &mut transport,
                bit,
                Duration::from_secs(reply_timeout),
                config.idle_interval,
            )?;
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);

    match run(command, cli.opts.into()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
