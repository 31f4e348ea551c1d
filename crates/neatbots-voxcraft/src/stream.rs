//! Splitting the simulator's standard output
//!
//! The simulator writes its execution log first. When history recording is
//! on, every recorded organism follows as a block introduced by the history
//! delimiter; the first line of a block names the organism's VXD file.

use serde::{Deserialize, Serialize};

/// Markers used to interpret simulator output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProtocol {
    /// Prefix of every encoded file name, `<label>_<id>.vxd`
    pub label: String,
    pub history_delimiter: String,
    pub diverged_marker: String,
}

impl Default for StreamProtocol {
    fn default() -> Self {
        Self {
            label: "bot".to_string(),
            history_delimiter: "<<<history>>>".to_string(),
            diverged_marker: "Simulation diverged".to_string(),
        }
    }
}

/// One history block, with the organism it belongs to when recoverable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryBlock {
    pub organism_id: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxedOutput {
    pub execution_log: String,
    pub histories: Vec<HistoryBlock>,
}

impl StreamProtocol {
    pub fn encoded_file_name(&self, organism_id: &str) -> String {
        format!("{}_{}.vxd", self.label, organism_id)
    }

    /// First `<label>_<id>.vxd` mention in `line`
    pub fn organism_id_in(&self, line: &str) -> Option<String> {
        let prefix = format!("{}_", self.label);
        let mut rest = line;
        while let Some(start) = rest.find(&prefix) {
            let after = &rest[start + prefix.len()..];
            if let Some(end) = after.find(".vxd") {
                let id = &after[..end];
                let plausible = !id.is_empty()
                    && !id.contains(|c: char| c.is_whitespace() || c == '/' || c == '\\');
                if plausible {
                    return Some(id.to_string());
                }
            }
            rest = after;
        }
        None
    }

    /// Separate the execution log from the history blocks
    pub fn demultiplex(&self, stdout: &str) -> DemuxedOutput {
        let mut parts = stdout.split(self.history_delimiter.as_str());
        let execution_log = parts.next().unwrap_or_default().to_string();

        let histories = parts
            .filter(|block| !block.trim().is_empty())
            .map(|block| {
                let content = block.trim_start_matches(['\r', '\n']).to_string();
                let organism_id = content
                    .lines()
                    .next()
                    .and_then(|header| self.organism_id_in(header));
                HistoryBlock {
                    organism_id,
                    content,
                }
            })
            .collect();

        DemuxedOutput {
            execution_log,
            histories,
        }
    }

    /// Ids of organisms reported as diverged in the execution log, in order
    /// of first mention
    pub fn diverged_organisms(&self, execution_log: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for line in execution_log.lines() {
            if !line.contains(&self.diverged_marker) {
                continue;
            }
            if let Some(id) = self.organism_id_in(line) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}
