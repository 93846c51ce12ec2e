mod cli;

use std::{
    process::ExitCode,
    sync::{Arc, Mutex},
    thread,
};

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use cli::Cli;
use tracing::{info, Level};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use pcie_cosim::{
    config::HarnessConfig,
    device::{rtl::IdleRtlModel, scratchpad::ScratchpadBridge},
    host::{
        link::{HostLink, TransportDescriptor},
        pacer::{IdlePacer, SharedTop, DEFAULT_IDLE_TICK},
    },
    sim::time::SimDuration,
    topology::Top,
};

fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(match args.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    // The vfio-user crate logs via `log`.
    LogTracer::init().context("Failed to forward log records")?;

    let config = HarnessConfig::new(SimDuration::from_ns(args.sync_quantum_ns))
        .context("Invalid harness configuration")?;
    let bridge = Arc::new(ScratchpadBridge::new(config.bridge_latency()));
    let mut top = Top::new(&config, bridge, Arc::new(IdleRtlModel::new()))
        .context("Failed to assemble the topology")?;

    let Some(descriptor) = args.socket_descriptor.as_deref() else {
        // Prove that the topology elaborates and time can advance.
        top.run_for(SimDuration::from_ps(1));
        Cli::command()
            .print_help()
            .context("Failed to print usage")?;

        return Ok(ExitCode::FAILURE);
    };

    let descriptor: TransportDescriptor = descriptor
        .parse()
        .context("Cannot reach the host simulator")?;
    let mut link = HostLink::listen(&descriptor, top.regions())
        .context("Cannot reach the host simulator")?;

    top.run_reset();
    info!("Reset released at {}, serving the host", top.now());

    let top = Mutex::new(top);
    let pacer = IdlePacer::new(DEFAULT_IDLE_TICK);

    let served = thread::scope(|s| {
        s.spawn(|| pacer.run(&top));

        let served = link.serve(&mut SharedTop::new(&top));
        pacer.stop();
        served
    });

    let mut top = top
        .into_inner()
        .map_err(|_| anyhow!("The simulation panicked"))?;
    top.flush();
    info!("Host disconnected at {}", top.now());

    served.context("Host connection failed")?;

    Ok(ExitCode::SUCCESS)
}
