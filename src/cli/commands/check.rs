//! Completeness check of an intake record.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::intake_store;
use crate::cli::display::{action_failure, action_success, output, CommandOutput};
use crate::domain::models::CompletenessReport;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Intake record (YAML or JSON)
    pub record: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub status: String,
    pub complete: bool,
    pub missing: Vec<String>,
}

impl From<&CompletenessReport> for CheckOutput {
    fn from(report: &CompletenessReport) -> Self {
        Self {
            status: report.status.as_str().to_string(),
            complete: report.complete,
            missing: report.missing.iter().map(ToString::to_string).collect(),
        }
    }
}

impl CommandOutput for CheckOutput {
    fn to_human(&self) -> String {
        if self.complete {
            action_success("Intake complete, ready to plan")
        } else {
            let mut lines = vec![action_failure(&format!(
                "Intake incomplete ({} missing)",
                self.missing.len()
            ))];
            lines.extend(self.missing.iter().map(|field| format!("  - {field}")));
            lines.join("\n")
        }
    }
}

pub async fn execute(args: CheckArgs, json_mode: bool) -> Result<()> {
    let store = intake_store(&args.record).await?;
    let report = store.check_completeness().await;
    output(&CheckOutput::from(&report), json_mode);
    Ok(())
}
