//! Process Results
//!
//! The captured outcome of one external command.

use serde::{Deserialize, Serialize};

/// Exit code reported when the program could not be started
pub const EXIT_FAILED_TO_START: i32 = -1;

/// Exit code reported when the program was killed after its timeout
pub const EXIT_TIMED_OUT: i32 = -2;

/// Exit code reported when the program died from a signal
pub const EXIT_SIGNALLED: i32 = -3;

/// Exit code plus captured standard output and error lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Exit code, or one of the negative sentinels
    pub code: i32,
    /// Non-empty stdout lines
    pub output: Vec<String>,
    /// Non-empty stderr lines
    pub error: Vec<String>,
}

impl ProcessResult {
    /// Build a result from raw captured streams
    pub fn from_streams(code: i32, stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            code,
            output: split_lines(&String::from_utf8_lossy(stdout)),
            error: split_lines(&String::from_utf8_lossy(stderr)),
        }
    }

    /// Result for a program that never started
    pub fn failed_to_start() -> Self {
        Self {
            code: EXIT_FAILED_TO_START,
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.code == EXIT_TIMED_OUT
    }

    /// First stdout line, trimmed
    pub fn first_line(&self) -> Option<&str> {
        self.output.first().map(|l| l.trim())
    }

    /// Stdout lines followed by stderr lines
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.iter().chain(self.error.iter()).map(String::as_str)
    }

    /// Text describing a failed command: stderr, else stdout, else the code
    pub fn failure_detail(&self) -> String {
        if !self.error.is_empty() {
            self.error.join("\n")
        } else if !self.output.is_empty() {
            self.output.join("\n")
        } else {
            match self.code {
                EXIT_FAILED_TO_START => "process failed to start".to_string(),
                EXIT_TIMED_OUT => "process timed out".to_string(),
                EXIT_SIGNALLED => "process was terminated by a signal".to_string(),
                code => format!("process exited with code {}", code),
            }
        }
    }
}

/// Split text on `\r` or `\n`, dropping empty lines
pub fn split_lines(text: &str) -> Vec<String> {
    text.split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
