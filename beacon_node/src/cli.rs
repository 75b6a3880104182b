use clap::{App, Arg};

pub fn cli_app<'a, 'b>() -> App<'a, 'b> {
    App::new("beacon_node")
        .about("The primary component which connects to the Ethereum consensus P2P network and \
                downloads, verifies and stores blocks.")
        .arg(
            Arg::with_name("datadir")
                .long("datadir")
                .value_name("DIR")
                .help("Used to specify a custom root data directory for node databases and keys.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("network")
                .long("network")
                .value_name("NETWORK")
                .help("Name of the network metadata bundle to connect to.")
                .possible_values(&["mainnet", "minimal"])
                .default_value("mainnet")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("database-dir")
                .long("database-dir")
                .value_name("DIR")
                .help("Directory for the chain database, overriding the datadir layout.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("era-dir")
                .long("era-dir")
                .value_name("DIR")
                .help("Directory for cold-archive era files.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("validators-dir")
                .long("validators-dir")
                .value_name("DIR")
                .help("Directory for validator keystores and the slashing-protection database.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("secrets-dir")
                .long("secrets-dir")
                .value_name("DIR")
                .help("Directory for keystore passwords.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("rest")
                .long("rest")
                .help("Enable the REST API server."),
        )
        .arg(
            Arg::with_name("rest-address")
                .long("rest-address")
                .value_name("ADDRESS")
                .takes_value(true)
                .help("Listen address for the REST API server."),
        )
        .arg(
            Arg::with_name("rest-port")
                .long("rest-port")
                .value_name("PORT")
                .takes_value(true)
                .help("Listen port for the REST API server."),
        )
        .arg(
            Arg::with_name("rest-allowed-origin")
                .long("rest-allowed-origin")
                .value_name("ORIGIN")
                .takes_value(true)
                .help("CORS allowed origin for the REST API server."),
        )
        .arg(
            Arg::with_name("metrics")
                .long("metrics")
                .help("Enable the Prometheus metrics server."),
        )
        .arg(
            Arg::with_name("metrics-address")
                .long("metrics-address")
                .value_name("ADDRESS")
                .takes_value(true)
                .help("Listen address for the metrics server."),
        )
        .arg(
            Arg::with_name("metrics-port")
                .long("metrics-port")
                .value_name("PORT")
                .takes_value(true)
                .help("Listen port for the metrics server."),
        )
        .arg(
            Arg::with_name("engine-api-url")
                .long("engine-api-url")
                .value_name("URL")
                .takes_value(true)
                .help("URL of the execution-layer engine API."),
        )
        .arg(
            Arg::with_name("jwt-secret")
                .long("jwt-secret")
                .value_name("FILE")
                .takes_value(true)
                .help("Path to the hex-encoded JWT secret shared with the execution client."),
        )
        .arg(
            Arg::with_name("suggested-fee-recipient")
                .long("suggested-fee-recipient")
                .value_name("ADDRESS")
                .takes_value(true)
                .help("Execution-layer address receiving transaction fees for proposed blocks."),
        )
        .arg(
            Arg::with_name("payload-builder")
                .long("payload-builder")
                .help("Fetch execution payloads from an external builder."),
        )
        .arg(
            Arg::with_name("payload-builder-url")
                .long("payload-builder-url")
                .value_name("URL")
                .takes_value(true)
                .help("URL of the external payload builder."),
        )
        .arg(
            Arg::with_name("web3-signer-url")
                .long("web3-signer-url")
                .value_name("URL")
                .takes_value(true)
                .multiple(true)
                .help("URL of a remote signing service; may be given multiple times."),
        )
        .arg(
            Arg::with_name("subscribe-all-subnets")
                .long("subscribe-all-subnets")
                .help("Subscribe to all attestation and sync-committee subnets."),
        )
        .arg(
            Arg::with_name("doppelganger-detection")
                .long("doppelganger-detection")
                .value_name("BOOL")
                .takes_value(true)
                .default_value("true")
                .help("Listen for other instances of our validator keys before signing."),
        )
        .arg(
            Arg::with_name("history-mode")
                .long("history-mode")
                .value_name("MODE")
                .possible_values(&["Archive", "Prune"])
                .default_value("Prune")
                .takes_value(true)
                .help("Retention of historical blocks and states."),
        )
        .arg(
            Arg::with_name("light-client-data-serve")
                .long("light-client-data-serve")
                .value_name("BOOL")
                .takes_value(true)
                .default_value("true")
                .help("Serve light-client data to peers."),
        )
        .arg(
            Arg::with_name("weak-subjectivity-checkpoint")
                .long("weak-subjectivity-checkpoint")
                .value_name("ROOT:EPOCH")
                .takes_value(true)
                .help("Checkpoint the chain must pass through, as block_root:epoch."),
        )
        .arg(
            Arg::with_name("trusted-block-root")
                .long("trusted-block-root")
                .value_name("ROOT")
                .takes_value(true)
                .help("Block root to seed trusted-node sync from."),
        )
        .arg(
            Arg::with_name("trusted-state-root")
                .long("trusted-state-root")
                .value_name("ROOT")
                .takes_value(true)
                .help("State root to seed trusted-node sync from."),
        )
        .arg(
            Arg::with_name("external-beacon-api-url")
                .long("external-beacon-api-url")
                .value_name("URL")
                .takes_value(true)
                .help("Beacon API endpoint used for trusted-node sync."),
        )
        .arg(
            Arg::with_name("genesis-state")
                .long("genesis-state")
                .value_name("FILE")
                .takes_value(true)
                .help("SSZ-encoded genesis state file."),
        )
        .arg(
            Arg::with_name("genesis-state-url")
                .long("genesis-state-url")
                .value_name("URL")
                .takes_value(true)
                .help("URL to download the genesis state from."),
        )
        .arg(
            Arg::with_name("num-threads")
                .long("num-threads")
                .value_name("COUNT")
                .takes_value(true)
                .help("Worker threads for the runtime; 0 sizes from the CPU count."),
        )
        .arg(
            Arg::with_name("stop-at-epoch")
                .long("stop-at-epoch")
                .value_name("EPOCH")
                .takes_value(true)
                .help("Stop the node when the wall clock reaches this epoch."),
        )
        .arg(
            Arg::with_name("stop-at-synced-epoch")
                .long("stop-at-synced-epoch")
                .value_name("EPOCH")
                .takes_value(true)
                .help("Stop the node once synced and the wall clock reaches this epoch."),
        )
        .arg(
            Arg::with_name("fork-choice-version")
                .long("fork-choice-version")
                .value_name("VERSION")
                .possible_values(&["Stable", "Pr3431"])
                .default_value("Stable")
                .takes_value(true)
                .help("Fork-choice attestation-timing behaviour."),
        )
        .arg(
            // Retained so old service files keep starting; the eth1 chain
            // is followed through the engine API now.
            Arg::with_name("eth1-endpoints")
                .long("eth1-endpoints")
                .value_name("URLS")
                .takes_value(true)
                .hidden(true)
                .help("Deprecated; ignored."),
        )
}
