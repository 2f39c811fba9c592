// SPDX-License-Identifier: MIT
// cryptomuxd: runs service requests through a cryptomux engine backed by the
// simulated accelerator.
//
// - Loads the engine configuration (file, base64 or built-in demo).
// - Submits the requests given on the command line.
// - Drives the periodic main function and prints completions as JSON.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use clap::Parser;
use log::info;

use cryptomux::config::DeliveryConfig;
use cryptomux::requests::{handle_cli_request, Submission};
use cryptomux::{Accelerator, ChannelDriver, Engine, EngineConfig, JobId, KeyStore, MemoryKeyStore, Processing};

const DEMO_CONFIG: &str = r#"{
    "queues": [
        { "name": "hsm", "channel": 0, "capacity": 4, "pool_size": 2, "retrigger_in_callback": true }
    ],
    "jobs": [
        { "name": "digest", "queue": 0, "priority": 5, "processing": "async", "service": "hash",
          "algorithm": "blake3", "shared_object": true, "delivery": { "kind": "polled", "slot": 0 } },
        { "name": "tag", "queue": 0, "priority": 3, "processing": "async", "service": "mac-generate",
          "algorithm": "hmac-sha256", "delivery": { "kind": "callback" } },
        { "name": "rng", "queue": 0, "priority": 1, "processing": "async", "service": "random-generate",
          "algorithm": "ctr-drbg", "shared_object": true, "delivery": { "kind": "callback" } },
        { "name": "seal", "queue": 0, "priority": 7, "processing": "async", "service": "encrypt",
          "algorithm": "aes128-cbc", "delivery": { "kind": "polled", "slot": 1 } }
    ],
    "polled_slots": 2
}"#;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Engine configuration file (JSON)
    #[arg(long, value_name = "PATH")]
    config: Option<String>,

    /// Engine configuration (base64-encoded JSON)
    #[arg(long = "config-base64", value_name = "BASE64")]
    config_base64: Option<String>,

    /// Processing of the built-in demo jobs, used when no configuration is given
    #[arg(long = "demo-processing", value_enum, default_value_t = Processing::Async)]
    demo_processing: Processing,

    /// Service request to submit (JSON encoded). May be repeated.
    #[arg(long, value_name = "JSON")]
    request: Vec<String>,

    /// Service request to submit (base64-encoded JSON). May be repeated.
    #[arg(long = "request-base64", value_name = "BASE64")]
    request_base64: Vec<String>,

    /// Number of main function rounds to run after submitting
    #[arg(long, default_value_t = 10)]
    rounds: u32,

    /// Period of the main function in milliseconds
    #[arg(long = "period-ms", default_value_t = 10)]
    period_ms: u64,

    /// Time the simulated accelerator takes per asynchronous job
    #[arg(long = "latency-ms", default_value_t = 5)]
    latency_ms: u64,
}

fn validate_args(args: &Args) -> Result<(), String> {
    if args.config.is_some() && args.config_base64.is_some() {
        return Err("--config and --config-base64 may not be used together".into());
    }
    if args.rounds == 0 && !(args.request.is_empty() && args.request_base64.is_empty()) {
        return Err("requests need at least one --rounds to complete".into());
    }
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let config = match (&args.config, &args.config_base64) {
        (Some(path), None) => EngineConfig::from_file(path).with_context(|| format!("loading {path}"))?,
        (None, Some(b64)) => EngineConfig::from_base64(b64).context("decoding --config-base64")?,
        (None, None) => {
            let mut config = EngineConfig::from_json(DEMO_CONFIG)?;
            for job in &mut config.jobs {
                job.processing = args.demo_processing;
                if args.demo_processing == Processing::Sync {
                    job.delivery = DeliveryConfig::None;
                }
            }
            config
        }
        _ => unreachable!("validate_args enforces mutual exclusion"),
    };
    Ok(config)
}

fn requests(args: &Args) -> anyhow::Result<Vec<String>> {
    let mut requests = args.request.clone();
    for b64 in &args.request_base64 {
        let decoded = BASE64_STANDARD.decode(b64).context("decoding --request-base64")?;
        requests.push(String::from_utf8(decoded).context("decoding --request-base64")?);
    }
    Ok(requests)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let args = Args::parse();
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }

    let config = load_config(&args)?;
    let keys: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::default());
    let latency = Duration::from_millis(args.latency_ms);

    let mut builder = Engine::builder(config.clone()).key_store(keys.clone());
    for (i, job) in config.jobs.iter().enumerate() {
        if job.delivery == DeliveryConfig::Callback {
            let name = job.name.clone();
            builder = builder.callback(JobId(i as u32), move |job, result| {
                info!("{} ({}) completed with {:?}", job, name, result);
            });
        }
    }
    let engine = builder.build(|notifier| -> Arc<dyn ChannelDriver> {
        Arc::new(Accelerator::new(notifier, Some(keys.clone()), latency))
    })?;
    engine.init()?;

    info!("Starting cryptomuxd");

    let mut submissions: Vec<Submission> = Vec::new();
    for json in requests(&args)? {
        submissions.push(handle_cli_request(&engine, &json)?);
    }

    for _ in 0..args.rounds {
        for completion in engine.main_function() {
            println!("{}", serde_json::to_string(&completion)?);
        }
        std::thread::sleep(Duration::from_millis(args.period_ms));
    }

    for submission in &submissions {
        println!("{}", serde_json::to_string(&submission.report())?);
    }

    info!("Stopping cryptomuxd");
    Ok(())
}
