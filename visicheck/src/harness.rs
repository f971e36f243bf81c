//! Process wiring: bootstrap both roles and run them side by side.
//!
//! The handshake order is fixed:
//!
//! 1. both roles publish their connection parameters
//! 2. each polls for the other's parameters and connects
//! 3. the server publishes its ready marker
//! 4. the client waits for that marker before its first write
//!
//! so the writer never writes before the checker is connected and polling.

use std::thread;
use std::time::Duration;

use crate::affinity::pin_thread_if_configured;
use crate::barrier::FullFence;
use crate::cell::CellView;
use crate::checker::{Checker, CheckerReport};
use crate::counter::ProgressCounter;
use crate::error::Result;
use crate::run::RunContext;
use crate::transport::{self, ConnectionParams, RemoteRegion, Rendezvous, Transport};
use crate::writer::{Writer, WriterReport};

/// Rendezvous label of the checker (server) role.
pub const SERVER_LABEL: &str = "server";
/// Rendezvous label of the writer (client) role.
pub const CLIENT_LABEL: &str = "client";

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Number of writes before the run ends. `None` runs until killed.
    pub iterations: Option<u64>,
    /// How often the server polls for the client's parameters.
    pub server_poll_interval: Duration,
    /// How often the client polls for the server's parameters and readiness.
    pub client_poll_interval: Duration,
    pub server_core: Option<usize>,
    pub client_core: Option<usize>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            iterations: None,
            server_poll_interval: Duration::from_millis(200),
            client_poll_interval: Duration::from_millis(2),
            server_core: None,
            client_core: None,
        }
    }
}

/// What a bounded run observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub writer: WriterReport,
    pub checker: CheckerReport,
    /// Progress counter after both roles stopped.
    pub final_counter: u64,
    /// Exposed cell after both roles stopped.
    pub final_cell: u64,
}

/// Server side of the handshake: publish, find the client, connect, ready.
pub fn bootstrap_server<T, R>(
    transport: &mut T,
    rendezvous: &R,
    interval: Duration,
    ctx: &RunContext,
) -> Result<()>
where
    T: Transport,
    R: Rendezvous<T::Endpoint> + ?Sized,
{
    rendezvous.publish(SERVER_LABEL, transport.endpoint())?;
    tracing::info!("Server published. Waiting for client.");

    let client: T::Endpoint =
        transport::discover_blocking(rendezvous, CLIENT_LABEL, interval, ctx)?;
    tracing::info!("Server found client! Connecting..");

    transport.connect(&client)?;
    rendezvous.publish_ready(SERVER_LABEL)?;
    tracing::info!("Server ready");
    Ok(())
}

/// Client side of the handshake. Returns the server's exposed region once the
/// server is ready.
pub fn bootstrap_client<T, R>(
    transport: &mut T,
    rendezvous: &R,
    interval: Duration,
    ctx: &RunContext,
) -> Result<RemoteRegion>
where
    T: Transport,
    R: Rendezvous<T::Endpoint> + ?Sized,
{
    rendezvous.publish(CLIENT_LABEL, transport.endpoint())?;
    tracing::info!("Client published. Waiting for server.");

    let server: T::Endpoint =
        transport::discover_blocking(rendezvous, SERVER_LABEL, interval, ctx)?;
    tracing::info!("Client found server. Connecting..");

    transport.connect(&server)?;
    tracing::info!("Client connected!");

    transport::wait_ready(rendezvous, SERVER_LABEL, interval, ctx)?;
    Ok(server.exposed_region())
}

/// Bootstrap the server role and check until `ctx` stops it.
///
/// Returns the checker's report and the exposed cell's final value.
pub fn run_server<T, R>(
    mut transport: T,
    rendezvous: &R,
    progress: &ProgressCounter,
    ctx: &RunContext,
    config: &HarnessConfig,
) -> Result<(CheckerReport, u64)>
where
    T: Transport,
    R: Rendezvous<T::Endpoint> + ?Sized,
{
    pin_thread_if_configured("server", config.server_core);
    bootstrap_server(&mut transport, rendezvous, config.server_poll_interval, ctx)?;

    let cell = transport.exposed_cell();
    let mut checker = Checker::new(cell, progress, FullFence);
    let report = checker.run(ctx);
    Ok((report, cell.load()))
}

/// Bootstrap the client role and write until `ctx` stops it.
pub fn run_client<T, R>(
    mut transport: T,
    rendezvous: &R,
    progress: &ProgressCounter,
    ctx: &RunContext,
    config: &HarnessConfig,
) -> Result<WriterReport>
where
    T: Transport,
    R: Rendezvous<T::Endpoint> + ?Sized,
{
    pin_thread_if_configured("client", config.client_core);
    let peer = bootstrap_client(&mut transport, rendezvous, config.client_poll_interval, ctx)?;

    let mut writer = Writer::new(transport, peer, progress, FullFence)?;
    writer.run(ctx)
}

/// Run both roles on their own threads, sharing one progress counter.
///
/// Unbounded runs only return on a fatal error. When the writer finishes a
/// bounded run the checker is cancelled; when either role fails the other is
/// cancelled, and the first real error is returned.
pub fn run<T, R>(
    server: T,
    client: T,
    rendezvous: &R,
    config: &HarnessConfig,
) -> Result<RunSummary>
where
    T: Transport + Send,
    R: Rendezvous<T::Endpoint> + Sync + ?Sized,
{
    let progress = ProgressCounter::new();
    let writer_ctx = match config.iterations {
        Some(n) => RunContext::bounded(n),
        None => RunContext::unbounded(),
    };
    let checker_ctx = RunContext::unbounded();

    let (server_result, client_result) = thread::scope(|s| {
        let server = s.spawn(|| {
            let stop_writer = CancelOnDrop::new(&writer_ctx);
            let result = run_server(server, rendezvous, &progress, &checker_ctx, config);
            if result.is_ok() {
                stop_writer.disarm();
            }
            result
        });
        let client = s.spawn(|| {
            // Also fires if the client panics, so the checker never spins alone.
            let _stop_checker = CancelOnDrop::new(&checker_ctx);
            run_client(client, rendezvous, &progress, &writer_ctx, config)
        });
        (join(server), join(client))
    });

    match (server_result, client_result) {
        (Ok((checker, final_cell)), Ok(writer)) => {
            let summary = RunSummary {
                writer,
                checker,
                final_counter: progress.load(),
                final_cell,
            };
            tracing::info!(
                "run finished: {} writes, {} polls, {} violations",
                summary.writer.writes,
                summary.checker.polls,
                summary.checker.violations
            );
            Ok(summary)
        }
        (Err(e), _) if !e.is_cancelled() => Err(e),
        (_, Err(e)) => Err(e),
        (Err(e), Ok(_)) => Err(e),
    }
}

/// Cancels a role's context when dropped, unwinding included.
struct CancelOnDrop<'a> {
    ctx: &'a RunContext,
    armed: bool,
}

impl<'a> CancelOnDrop<'a> {
    fn new(ctx: &'a RunContext) -> Self {
        Self { ctx, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ctx.cancel();
        }
    }
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}
