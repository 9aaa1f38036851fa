//! Human readable summaries of runs and registry contents.

use std::fmt;

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};

use crate::{DeploymentRecord, DeploymentReport, RunReport, WiringReport, client::abi_literal};

/// One row per record: artifact, address, transaction and block.
pub fn records_table(records: &[DeploymentRecord]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Artifact", "Address", "Transaction", "Block"]);

    for record in records {
        table.add_row(vec![
            record.artifact_name.clone(),
            record.address.to_checksum(None),
            record.transaction_hash.clone().unwrap_or_else(|| "-".to_string()),
            record
                .deployed_at_block
                .map(|block| block.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }

    table
}

impl fmt::Display for DeploymentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Network {}: {} deployed, {} reused",
            self.network,
            self.deployed.len(),
            self.reused.len()
        )?;

        let mut records = self.deployed.clone();
        records.extend(self.reused.iter().cloned());
        if !records.is_empty() {
            writeln!(f, "{}", records_table(&records))?;
        }
        Ok(())
    }
}

impl fmt::Display for WiringReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network {}: {} wiring step(s) run", self.network, self.steps.len())?;
        if self.steps.is_empty() {
            return Ok(());
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["#", "Step", "Kind", "Transaction", "Outputs"]);

        for step in &self.steps {
            let outputs: Vec<String> = step.outputs.iter().map(abi_literal).collect();
            table.add_row(vec![
                step.index.to_string(),
                step.id.clone(),
                step.kind.to_string(),
                step.tx_hash.clone().unwrap_or_else(|| "-".to_string()),
                outputs.join(", "),
            ]);
        }

        writeln!(f, "{}", table)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.deployment, self.wiring)
    }
}
