use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use simnic::{Delivery, Directory, Nic, Port, PortConfig};
use tracing_subscriber::EnvFilter;
use visicheck::{HarnessConfig, RunSummary};

#[derive(Parser, Debug)]
#[command(name = "write-incomplete")]
#[command(about = "Check that a completed RDMA write is visible in target memory")]
struct Cli {
    /// Stop after this many writes (default: run until killed)
    #[arg(short = 'n', long)]
    iterations: Option<u64>,

    /// Port of the checker (server) role
    #[arg(long, default_value = "1")]
    server_port: u8,

    /// Port of the writer (client) role
    #[arg(long, default_value = "0")]
    client_port: u8,

    /// Registered buffer size in bytes
    #[arg(long, default_value = "8")]
    buf_size: usize,

    /// Write delivery of the simulated NIC
    #[arg(long, value_enum, default_value = "ordered")]
    delivery: DeliveryMode,

    /// DMA lag after the completion, in microseconds (early-completion only)
    #[arg(long, default_value = "0")]
    lag_us: u64,

    /// Pin the checker thread to this core
    #[arg(long)]
    pin_server_core: Option<usize>,

    /// Pin the writer thread to this core
    #[arg(long)]
    pin_client_core: Option<usize>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum DeliveryMode {
    /// The write lands before its completion is reported
    Ordered,
    /// The completion is reported before the write lands
    EarlyCompletion,
}

impl Cli {
    fn delivery(&self) -> Delivery {
        match self.delivery {
            DeliveryMode::Ordered => Delivery::Ordered,
            DeliveryMode::EarlyCompletion => Delivery::EarlyCompletion {
                lag: Duration::from_micros(self.lag_us),
            },
        }
    }

    /// Checker side: role id 0, always ordered delivery.
    fn server_port(&self) -> PortConfig {
        PortConfig {
            id: 0,
            port: self.server_port,
            buf_size: self.buf_size,
            delivery: Delivery::Ordered,
        }
    }

    /// Writer side: role id 1, with the selected delivery.
    fn client_port(&self) -> PortConfig {
        PortConfig {
            id: 1,
            port: self.client_port,
            buf_size: self.buf_size,
            delivery: self.delivery(),
        }
    }

    fn harness(&self) -> HarnessConfig {
        HarnessConfig {
            iterations: self.iterations,
            server_core: self.pin_server_core,
            client_core: self.pin_client_core,
            ..Default::default()
        }
    }
}

fn run(cli: &Cli) -> visicheck::Result<RunSummary> {
    let nic = Nic::new();
    let server = Port::open(&nic, cli.server_port())?;
    let client = Port::open(&nic, cli.client_port())?;
    let directory = Directory::new();

    visicheck::harness::run(server, client, &directory, &cli.harness())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    tracing::debug!("{:?}", cli);

    match run(&cli) {
        Ok(summary) => {
            println!(
                "writes={} polls={} violations={} counter={} cell={}",
                summary.writer.writes,
                summary.checker.polls,
                summary.checker.violations,
                summary.final_counter,
                summary.final_cell
            );
            if let Some(v) = summary.checker.first_violation {
                println!("first violation: {}", v);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("fatal: {}", e);
            std::process::abort();
        }
    }
}
