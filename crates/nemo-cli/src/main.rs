//! Command-line front-end for running `nemo-core` simulations.
//!
//! Builds a demo network (currently a ring), steps it for a configured
//! number of cycles, and reports firing activity. Owns the process's
//! logging initialization and maps every simulation error onto a distinct
//! process exit code.

use clap::Parser;
use log::{debug, info};
use nemo_core::{
    CyclePipeline, GlobalId, LocalId, NemoError, NetworkBuilder, NetworkConfig, NeuronParams,
    NeuronState, Result, STDPEngine, STDPFunction,
};

/// Run a spiking network simulation built from nemo-core.
#[derive(Parser, Debug)]
#[command(name = "nemo", version)]
struct Cli {
    /// Number of neurons in the demo ring.
    #[arg(long, default_value_t = 8)]
    neurons: u32,

    /// Synaptic delay, in cycles, between consecutive ring neurons.
    #[arg(long, default_value_t = 1)]
    delay: u32,

    /// Synaptic weight applied to each ring connection.
    #[arg(long, default_value_t = 1000.0)]
    weight: f32,

    /// Number of one-millisecond cycles to simulate.
    #[arg(long, default_value_t = 100)]
    cycles: u64,

    /// Enable STDP on every ring synapse and apply accumulated deltas once
    /// at the end of the run, with this reward factor.
    #[arg(long)]
    stdp_reward: Option<f32>,
}

fn run(cli: &Cli) -> Result<()> {
    let config = NetworkConfig::new(cli.delay.max(1), 64)?;
    let mut builder = NetworkBuilder::new(config)?;
    let params = NeuronParams::new(0.02, 0.2, -65.0, 8.0, 0.0)?;
    let ids: Vec<GlobalId> = (0..cli.neurons as u64).map(GlobalId::new).collect();
    for (i, &g) in ids.iter().enumerate() {
        builder.add_neuron(g, params, NeuronState::new(-14.0, -65.0, i as u64 + 1))?;
    }
    let plastic = cli.stdp_reward.is_some();
    for i in 0..cli.neurons as usize {
        builder.add_synapse(
            ids[i],
            ids[(i + 1) % cli.neurons as usize],
            cli.delay,
            cli.weight,
            plastic,
        )?;
    }
    let network = builder.finalize()?;
    info!("finalized network with {} neurons", network.neuron_count());

    let stdp = match cli.stdp_reward {
        Some(_) => STDPEngine::new(STDPFunction::exponential(
            20, 0.1, 20.0, 0.12, 20.0, -cli.weight.abs(), cli.weight.abs(),
        )),
        None => STDPEngine::disabled(),
    };
    let mut pipeline = CyclePipeline::new(network, stdp)?;

    let mut total_fired = 0usize;
    for cycle in 0..cli.cycles {
        let external = if cycle == 0 { vec![LocalId::new(0)] } else { Vec::new() };
        let fired = pipeline.step(&external)?;
        total_fired += fired.len();
        debug!("cycle {cycle}: {} neurons fired", fired.len());
    }

    if let Some(reward) = cli.stdp_reward {
        pipeline.apply_stdp(reward)?;
        info!("applied STDP with reward {reward}");
    }

    info!(
        "ran {} cycles ({} ms simulated, {:?} wall clock), {total_fired} total firing events",
        cli.cycles,
        pipeline.elapsed_simulation_ms(),
        pipeline.elapsed_wallclock(),
    );
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        log_and_exit(&err);
    }
}

fn log_and_exit(err: &NemoError) -> ! {
    log::error!("{err}");
    std::process::exit(err.exit_code());
}
