use beacon_chain::events::EventBus;
use beacon_chain::execution::DisabledExecutionLayer;
use beacon_chain::store::MemoryStore;
use beacon_chain::{BeaconChain, ChainConfig};
use beacon_node::wiring::{DisconnectedNetwork, PassthroughStateTransition, ProductionTypes};
use beacon_node::{cli_app, get_config};
use client::{
    ClientBuilder, ClientConfig, MemorySlashingProtection, NodeStatus, NullSigner, ValidatorStore,
};
use futures::channel::mpsc;
use futures::StreamExt;
use slog::{crit, info, o, warn, Drain, Logger};
use slot_clock::{SlotClock, SystemTimeSlotClock};
use std::process::exit;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use task_executor::{ShutdownReason, TaskExecutor};
use types::{Epoch, EthSpec, Hash256, MainnetEthSpec, MinimalEthSpec, Slot};

/// Mainnet genesis, 2020-12-01 12:00:23 UTC.
const MAINNET_GENESIS_TIME: u64 = 1_606_824_023;
const MAINNET_GENESIS_VALIDATORS_ROOT: &str =
    "4b363db94e286120d76eb905340fdd4e54bfe9f06bf33ff6cf5ad27f511bfe95";

fn main() {
    let matches = cli_app().get_matches();
    let log = build_logger();

    let config = match get_config(&matches, &log) {
        Ok(config) => config,
        Err(e) => {
            crit!(log, "Invalid configuration"; "error" => %e);
            exit(1);
        }
    };

    let result = match config.network_name.as_str() {
        "minimal" => run::<MinimalEthSpec>(config, log.clone()),
        _ => run::<MainnetEthSpec>(config, log.clone()),
    };

    match result {
        Ok(()) => {
            info!(log, "Node stopped cleanly");
            exit(0);
        }
        Err(e) => {
            crit!(log, "Node terminated"; "error" => %e);
            exit(1);
        }
    }
}

fn build_logger() -> Logger {
    use sloggers::terminal::{Destination, TerminalLoggerBuilder};
    use sloggers::types::Severity;
    use sloggers::Build;

    TerminalLoggerBuilder::new()
        .level(Severity::Info)
        .destination(Destination::Stderr)
        .build()
        .map(|log| Logger::root(log.fuse(), o!()))
        .unwrap_or_else(|_| Logger::root(slog::Discard, o!()))
}

fn run<E: EthSpec>(config: ClientConfig, log: Logger) -> Result<(), String> {
    let worker_threads = if config.num_threads == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    } else {
        config.num_threads
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .map_err(|e| format!("unable to start runtime: {e}"))?;

    let result = runtime.block_on(run_node::<E>(config, log));
    runtime.shutdown_timeout(Duration::from_secs(5));
    result
}

async fn run_node<E: EthSpec>(config: ClientConfig, log: Logger) -> Result<(), String> {
    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| format!("unable to create data dir {:?}: {e}", config.data_dir))?;
    write_node_files(&config)?;

    let spec = E::default_spec();
    let genesis_validators_root = genesis_validators_root::<E>();
    let genesis_duration = if E::spec_name() == "mainnet" {
        Duration::from_secs(MAINNET_GENESIS_TIME)
    } else {
        // Development chains start "now".
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| format!("system clock before the epoch: {e}"))?
    };
    let slot_clock = SystemTimeSlotClock::new(
        spec.genesis_slot,
        genesis_duration,
        spec.slot_duration(),
    );

    let (signal, exit) = exit_future::signal();
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<ShutdownReason>(1);
    let executor = TaskExecutor::new(
        tokio::runtime::Handle::current(),
        exit,
        log.clone(),
        shutdown_tx,
    );

    let chain_config = ChainConfig {
        history_mode: config.history_mode,
        fork_choice_version: config.fork_choice_version,
        stop_at_epoch: config.stop_at_epoch.map(Epoch::new),
        ..ChainConfig::default()
    };
    let anchor_root = genesis_block_root(genesis_validators_root);
    let event_bus = Arc::new(EventBus::new(
        beacon_chain::events::DEFAULT_CHANNEL_CAPACITY,
        log.clone(),
    ));
    let chain = Arc::new(BeaconChain::<ProductionTypes<E>>::new(
        spec,
        chain_config,
        slot_clock,
        Arc::new(MemoryStore::new()),
        genesis_validators_root,
        anchor_root,
        Slot::new(0),
        Arc::new(PassthroughStateTransition),
        Arc::new(DisabledExecutionLayer),
        event_bus,
        log.new(o!("service" => "beacon")),
    ));

    if config.engine_api_url.is_none() {
        warn!(log, "No --engine-api-url; execution layer disabled");
    }

    let validator_store = Arc::new(ValidatorStore::new(
        Arc::new(MemorySlashingProtection::default()),
        Arc::new(NullSigner),
    ));

    let mut node = ClientBuilder::new(executor, config, log.new(o!("service" => "client")))
        .beacon_chain(chain)
        .network(Arc::new(DisconnectedNetwork))?
        .validators(validator_store)?
        .build()?;

    // Drain network commands; the libp2p substrate replaces this consumer.
    if let Some(mut commands) = node.take_network_commands() {
        tokio::spawn(async move {
            while commands.recv().await.is_some() {}
        });
    }

    let status = node.status();
    status.set(NodeStatus::Running);
    info!(log, "Beacon node running"; "status" => ?status.get());

    let reason = tokio::select! {
        _ = wait_for_signal(&log) => {
            ShutdownReason::Success("shutdown signal received")
        }
        reason = shutdown_rx.next() => {
            reason.unwrap_or(ShutdownReason::Success("shutdown channel closed"))
        }
    };

    if status.transition(NodeStatus::Running, NodeStatus::Stopping) {
        info!(log, "Shutting down"; "reason" => reason.message());
    }
    let _ = signal.fire();
    drop(node);

    match reason {
        ShutdownReason::Success(_) => Ok(()),
        ShutdownReason::Failure(message) => Err(message.to_string()),
    }
}

async fn wait_for_signal(log: &Logger) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(log, "Unable to install SIGTERM handler"; "error" => %e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        let _ = log;
    }
}

fn genesis_validators_root<E: EthSpec>() -> Hash256 {
    if E::spec_name() == "mainnet" {
        let bytes = hex::decode(MAINNET_GENESIS_VALIDATORS_ROOT)
            .expect("mainnet genesis root constant is valid hex");
        Hash256::from_slice(&bytes)
    } else {
        Hash256::zero()
    }
}

/// A placeholder anchor identity until a genesis state or checkpoint is
/// loaded through the database collaborator.
fn genesis_block_root(genesis_validators_root: Hash256) -> Hash256 {
    types::hash_concat(genesis_validators_root, Hash256::zero())
}

fn write_node_files(config: &ClientConfig) -> Result<(), String> {
    let pid_path = config.data_dir.join("beacon_node.pid");
    std::fs::write(&pid_path, std::process::id().to_string())
        .map_err(|e| format!("unable to write {pid_path:?}: {e}"))?;

    // Rewritten with the real record once the discv5 substrate starts.
    let enr_path = config.data_dir.join("beacon_node.enr");
    std::fs::write(&enr_path, "enr:-")
        .map_err(|e| format!("unable to write {enr_path:?}: {e}"))?;
    Ok(())
}
