// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io;
use std::process::{Command, Output};

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;

use crate::test_log::TestLog;

/// Runs cryptomuxd through `cargo run`. The daemon submits its requests,
/// drives a fixed number of main function rounds and exits.
#[derive(Debug, Default)]
pub struct CryptomuxdBuilder {
    args: Vec<String>,
}

impl CryptomuxdBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_json(mut self, json: &str) -> Self {
        self.args.push("--config-base64".into());
        self.args.push(BASE64_STANDARD.encode(json));
        self
    }

    pub fn request(mut self, json: &str) -> Self {
        self.args.push("--request".into());
        self.args.push(json.into());
        self
    }

    pub fn rounds(mut self, rounds: u32) -> Self {
        self.args.push("--rounds".into());
        self.args.push(rounds.to_string());
        self
    }

    pub fn period_ms(mut self, period: u64) -> Self {
        self.args.push("--period-ms".into());
        self.args.push(period.to_string());
        self
    }

    pub fn latency_ms(mut self, latency: u64) -> Self {
        self.args.push("--latency-ms".into());
        self.args.push(latency.to_string());
        self
    }

    pub fn run(self) -> io::Result<Output> {
        println!("Executing cryptomuxd located via cargo run");
        Command::new("cargo")
            .args(["run", "-q", "-p", "cryptomux", "--bin", "cryptomuxd", "--"])
            .args(&self.args)
            .env("RUST_LOG", "warn")
            .output()
    }

    /// Runs the daemon and parses what it printed.
    pub fn run_and_parse(self) -> io::Result<(Output, TestLog)> {
        let out = self.run()?;
        let log = TestLog::parse(&String::from_utf8_lossy(&out.stdout));
        Ok((out, log))
    }
}
