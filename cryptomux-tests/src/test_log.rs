// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use cryptomux::engine::CancelStatus;
use cryptomux::job::Verification;
use cryptomux::{Completion, JobId, JobResult};
use serde::{Deserialize, Serialize};

/// One submission as printed by cryptomuxd after its main function rounds.
#[derive(Serialize, Deserialize, Debug)]
pub struct LoggedSubmission {
    pub job: Option<JobId>,

    pub accepted: JobResult,

    #[serde(default)]
    pub canceled: Option<CancelStatus>,

    /// Base64 encoded output buffers.
    pub outputs: Vec<String>,

    #[serde(default)]
    pub verification: Option<Verification>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct TestLog {
    pub completions: Vec<Completion>,
    pub submissions: Vec<LoggedSubmission>,
}

impl TestLog {
    /// Sorts the JSON lines of cryptomuxd's stdout into completions and
    /// submission reports. Other lines are skipped.
    pub fn parse(stdout: &str) -> Self {
        let mut log = TestLog::default();
        for line in stdout.lines().map(str::trim).filter(|l| l.starts_with('{')) {
            if let Ok(completion) = serde_json::from_str::<Completion>(line) {
                log.completions.push(completion);
            } else if let Ok(submission) = serde_json::from_str::<LoggedSubmission>(line) {
                log.submissions.push(submission);
            }
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptomux::JobError;

    #[test]
    fn parse_sorts_lines() {
        let stdout = r#"
{"job":0,"partition":0,"result":{"Ok":null}}
not json
{"job":1,"accepted":{"Err":"busy"},"outputs":[]}
"#;
        let log = TestLog::parse(stdout);
        assert_eq!(log.completions.len(), 1);
        assert_eq!(log.completions[0].job, JobId(0));
        assert_eq!(log.submissions.len(), 1);
        assert_eq!(log.submissions[0].accepted, Err(JobError::Busy));
        assert!(log.submissions[0].outputs.is_empty());
    }
}
