//! Runs the MQTT demo against a broker, rotating the device certificate
//! between rounds.
//!
//! Configuration comes from `IOTDEMO_<KEY>` environment variables (or a
//! `.env` file); credentials from the PEM files named by
//! `IOTDEMO_CERT_PATH`, `IOTDEMO_KEY_PATH` and `IOTDEMO_CSR_PATH`. Set
//! `RUST_LOG` to change the log level.

use iotdemo::config::DemoConfig;
use iotdemo::credentials::{RamCredentialStore, provision};
use iotdemo::rotation::RotationAgent;
use iotdemo::runner::run;
use iotdemo::std_support::{StdClock, TcpNetwork, load_provisioning};
use log::{error, info};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match DemoConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {:?}", err);
            return ExitCode::FAILURE;
        }
    };
    let Some(serial_number) = config.serial_number.clone() else {
        error!("IOTDEMO_SERIAL_NUMBER must be set.");
        return ExitCode::FAILURE;
    };

    let files = match load_provisioning() {
        Ok(files) => files,
        Err(err) => {
            error!("Could not read credentials: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut agent = RotationAgent::new(RamCredentialStore::new());
    if let Err(err) = provision(&mut agent.store, &files.provisioning(&serial_number)) {
        error!("Could not provision credentials: {:?}", err);
        return ExitCode::FAILURE;
    }

    info!(
        "Connecting to {}:{} as serial number {}.",
        config.host, config.port, serial_number
    );
    let mut network = TcpNetwork::default();
    let clock = StdClock::new();
    match run(&config, &mut network, &mut agent, &clock) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("MQTT demo failed: {:?}", err);
            ExitCode::FAILURE
        }
    }
}
