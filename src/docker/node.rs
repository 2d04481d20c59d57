use super::cli::DockerCli;
use super::models::{NodeDetail, NodeLabel, NodeSummary};
use super::table::TableDecoder;
use crate::error::Result;

const LABEL_ITEM_PREFIX: &str = "- ";

#[derive(Clone)]
pub struct NodeOps {
    cli: DockerCli,
}

impl NodeOps {
    pub fn new(cli: DockerCli) -> Self {
        Self { cli }
    }

    /// Swarm nodes; `is_master` marks the current leader
    pub async fn list(&self) -> Result<Vec<NodeSummary>> {
        let command = self
            .cli
            .command(&["node", "ls", "--format", NodeSummary::FORMAT])
            .build();
        let result = self.cli.check(command).await?;
        Ok(TableDecoder::piped(NodeSummary::MIN_FIELDS)
            .decode(&result.lines, NodeSummary::from_fields))
    }

    pub async fn info(&self, node: &str) -> Result<NodeDetail> {
        let command = self
            .cli
            .command(&["node", "inspect", node, "--pretty"])
            .combine_stderr(true)
            .build();
        let result = self.cli.check(command).await?;
        Ok(parse_node_pretty(&result.lines))
    }
}

/// Read host details out of `docker node inspect --pretty`.
///
/// Only `Key: value` lines with a single colon are considered. The lines that
/// follow `Labels:` and start with `- ` are `name=value` labels.
pub fn parse_node_pretty<S: AsRef<str>>(lines: &[S]) -> NodeDetail {
    let mut detail = NodeDetail::default();
    let mut in_labels = false;

    for line in lines {
        let line = line.as_ref();

        if in_labels {
            if let Some(item) = line.trim_start().strip_prefix(LABEL_ITEM_PREFIX) {
                if let Some((name, value)) = item.trim().split_once('=') {
                    detail.labels.push(NodeLabel {
                        name: name.to_string(),
                        value: value.to_string(),
                    });
                }
                continue;
            }
            in_labels = false;
        }

        let parts: Vec<&str> = line.split(':').collect();
        let [key, value] = parts.as_slice() else {
            continue;
        };
        let value = value.trim().to_string();

        match key.trim() {
            "Hostname" => detail.hostname = value,
            "Address" => detail.ip = value,
            "Operating System" => detail.os = value,
            "Architecture" => detail.architecture = value,
            "CPUs" => detail.cpus = value,
            "Memory" => detail.memory = value,
            "Labels" => in_labels = true,
            _ => {}
        }
    }

    detail
}
