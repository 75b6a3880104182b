use beacon_chain::{ForkChoiceVersion, HistoryMode};
use clap::ArgMatches;
use client::ClientConfig;
use slog::{warn, Logger};
use std::path::PathBuf;
use std::str::FromStr;
use types::{Checkpoint, Epoch, Hash256};

/// Build a [`ClientConfig`] from parsed CLI flags.
pub fn get_config(matches: &ArgMatches, log: &Logger) -> Result<ClientConfig, String> {
    let mut config = ClientConfig::default();

    if let Some(dir) = matches.value_of("datadir") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(network) = matches.value_of("network") {
        config.network_name = network.to_string();
    }
    config.database_dir = matches.value_of("database-dir").map(PathBuf::from);
    config.era_dir = matches.value_of("era-dir").map(PathBuf::from);
    config.validators_dir = matches.value_of("validators-dir").map(PathBuf::from);
    config.secrets_dir = matches.value_of("secrets-dir").map(PathBuf::from);

    config.rest.enabled = matches.is_present("rest");
    if let Some(address) = matches.value_of("rest-address") {
        config.rest.listen_addr = address
            .parse()
            .map_err(|_| format!("invalid --rest-address: {address}"))?;
    }
    if let Some(port) = matches.value_of("rest-port") {
        config.rest.port = port
            .parse()
            .map_err(|_| format!("invalid --rest-port: {port}"))?;
    }
    config.rest.allowed_origin = matches.value_of("rest-allowed-origin").map(str::to_string);

    config.metrics.enabled = matches.is_present("metrics");
    if let Some(address) = matches.value_of("metrics-address") {
        config.metrics.listen_addr = address
            .parse()
            .map_err(|_| format!("invalid --metrics-address: {address}"))?;
    }
    if let Some(port) = matches.value_of("metrics-port") {
        config.metrics.port = port
            .parse()
            .map_err(|_| format!("invalid --metrics-port: {port}"))?;
    }

    config.engine_api_url = matches.value_of("engine-api-url").map(str::to_string);
    config.jwt_secret = matches.value_of("jwt-secret").map(PathBuf::from);
    if let Some(recipient) = matches.value_of("suggested-fee-recipient") {
        config.suggested_fee_recipient = Some(parse_address(recipient)?);
    }
    config.payload_builder = matches.is_present("payload-builder");
    config.payload_builder_url = matches.value_of("payload-builder-url").map(str::to_string);
    if let Some(urls) = matches.values_of("web3-signer-url") {
        config.web3_signer_urls = urls.map(str::to_string).collect();
    }

    config.subscribe_all_subnets = matches.is_present("subscribe-all-subnets");
    config.doppelganger_detection = parse_bool(matches, "doppelganger-detection")?;
    config.light_client_data_serve = parse_bool(matches, "light-client-data-serve")?;

    if let Some(mode) = matches.value_of("history-mode") {
        config.history_mode =
            HistoryMode::from_str(mode).map_err(|_| format!("invalid --history-mode: {mode}"))?;
    }
    if let Some(version) = matches.value_of("fork-choice-version") {
        config.fork_choice_version = ForkChoiceVersion::from_str(version)
            .map_err(|_| format!("invalid --fork-choice-version: {version}"))?;
    }

    if let Some(checkpoint) = matches.value_of("weak-subjectivity-checkpoint") {
        config.weak_subjectivity_checkpoint = Some(parse_checkpoint(checkpoint)?);
    }
    if let Some(root) = matches.value_of("trusted-block-root") {
        config.trusted_block_root = Some(parse_root(root)?);
    }
    if let Some(root) = matches.value_of("trusted-state-root") {
        config.trusted_state_root = Some(parse_root(root)?);
    }
    config.external_beacon_api_url = matches
        .value_of("external-beacon-api-url")
        .map(str::to_string);
    config.genesis_state_path = matches.value_of("genesis-state").map(PathBuf::from);
    config.genesis_state_url = matches.value_of("genesis-state-url").map(str::to_string);

    if let Some(count) = matches.value_of("num-threads") {
        config.num_threads = count
            .parse()
            .map_err(|_| format!("invalid --num-threads: {count}"))?;
    }
    if let Some(epoch) = matches.value_of("stop-at-epoch") {
        config.stop_at_epoch = Some(
            epoch
                .parse()
                .map_err(|_| format!("invalid --stop-at-epoch: {epoch}"))?,
        );
    }
    if let Some(epoch) = matches.value_of("stop-at-synced-epoch") {
        config.stop_at_synced_epoch = Some(
            epoch
                .parse()
                .map_err(|_| format!("invalid --stop-at-synced-epoch: {epoch}"))?,
        );
    }

    if matches.is_present("eth1-endpoints") {
        warn!(
            log,
            "--eth1-endpoints is deprecated and ignored; deposits are followed via the engine API"
        );
    }

    Ok(config)
}

fn parse_bool(matches: &ArgMatches, flag: &str) -> Result<bool, String> {
    match matches.value_of(flag) {
        None => Ok(true),
        Some(value) => value
            .parse()
            .map_err(|_| format!("invalid --{flag}: {value}")),
    }
}

fn parse_root(input: &str) -> Result<Hash256, String> {
    let bytes = hex::decode(input.trim_start_matches("0x"))
        .map_err(|_| format!("invalid root: {input}"))?;
    if bytes.len() != 32 {
        return Err(format!("root must be 32 bytes: {input}"));
    }
    Ok(Hash256::from_slice(&bytes))
}

fn parse_address(input: &str) -> Result<types::Address, String> {
    let bytes = hex::decode(input.trim_start_matches("0x"))
        .map_err(|_| format!("invalid address: {input}"))?;
    if bytes.len() != 20 {
        return Err(format!("address must be 20 bytes: {input}"));
    }
    Ok(types::Address::from_slice(&bytes))
}

/// Parse `block_root:epoch`.
fn parse_checkpoint(input: &str) -> Result<Checkpoint, String> {
    let (root, epoch) = input
        .split_once(':')
        .ok_or_else(|| format!("expected block_root:epoch, got {input}"))?;
    Ok(Checkpoint {
        root: parse_root(root)?,
        epoch: Epoch::new(
            epoch
                .parse()
                .map_err(|_| format!("invalid checkpoint epoch: {epoch}"))?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli_app;
    use slog::o;

    fn config_from(args: &[&str]) -> Result<ClientConfig, String> {
        let mut argv = vec!["beacon_node"];
        argv.extend_from_slice(args);
        let matches = cli_app().get_matches_from(argv);
        get_config(&matches, &Logger::root(slog::Discard, o!()))
    }

    #[test]
    fn defaults_parse() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.network_name, "mainnet");
        assert_eq!(config.history_mode, HistoryMode::Prune);
        assert!(config.doppelganger_detection);
        assert!(!config.rest.enabled);
    }

    #[test]
    fn flags_override_defaults() {
        let config = config_from(&[
            "--network",
            "minimal",
            "--history-mode",
            "Archive",
            "--subscribe-all-subnets",
            "--doppelganger-detection",
            "false",
            "--stop-at-epoch",
            "100",
            "--fork-choice-version",
            "Pr3431",
        ])
        .unwrap();
        assert_eq!(config.network_name, "minimal");
        assert_eq!(config.history_mode, HistoryMode::Archive);
        assert!(config.subscribe_all_subnets);
        assert!(!config.doppelganger_detection);
        assert_eq!(config.stop_at_epoch, Some(100));
        assert_eq!(config.fork_choice_version, ForkChoiceVersion::Pr3431);
    }

    #[test]
    fn checkpoint_parsing() {
        let checkpoint = parse_checkpoint(
            "0x0101010101010101010101010101010101010101010101010101010101010101:42",
        )
        .unwrap();
        assert_eq!(checkpoint.epoch, Epoch::new(42));
        assert_eq!(checkpoint.root, Hash256::repeat_byte(1));
        assert!(parse_checkpoint("nonsense").is_err());
        assert!(parse_checkpoint("0xff:notanumber").is_err());
    }
}
