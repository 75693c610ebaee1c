// `strata open` — open a strata:// address and show what it selects.

use clap::Args;
use serde::Serialize;

use strata_client::ClientError;
use strata_common::address::from_address;
use strata_common::types::{DocumentRef, FilterState};

use crate::client;
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct OpenArgs {
    /// Address such as `strata://tree?workspace=w1&path=%2Fwork`.
    pub address: String,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenResult {
    pub address: String,
    pub root: String,
    pub path: String,
    pub filters: FilterState,
    pub total_count: u64,
    pub documents: Vec<DocumentRef>,
}

pub fn run(args: OpenArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = client::block_on(open(args)).and_then(|result| result);
    super::finish(format, result, format_human)
}

async fn open(args: OpenArgs) -> anyhow::Result<OpenResult> {
    let location = from_address(&args.address)
        .map_err(|error| ClientError::InvalidOperation(error.to_string()))?;
    let config = client::load_config();
    let mut replica = client::replica(&config, location.root)?;
    replica.open_address(&args.address).await?;

    let page = replica.documents().cloned().unwrap_or_default();
    Ok(OpenResult {
        address: replica.address(),
        root: replica.root().to_string(),
        path: replica.selected_path().to_string(),
        filters: replica.filters().clone(),
        total_count: page.total_count,
        documents: page.documents,
    })
}

fn format_human(result: &OpenResult) -> String {
    let mut header = format!("{} {}", result.root, result.path);
    for feature in &result.filters.features {
        header.push_str(&format!(" +{feature}"));
    }
    for filter in &result.filters.filters {
        header.push_str(&format!(" ?{filter}"));
    }
    let mut lines = vec![header, format!("{} documents", result.total_count)];
    lines.extend(result.documents.iter().map(|doc| format!("{:>8}  {}", doc.id, doc.title)));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_format_shows_selection_and_filters() {
        let result = OpenResult {
            address: String::new(),
            root: "workspace:w1".into(),
            path: "/work".into(),
            filters: FilterState::new(["pdf"], ["urgent"]),
            total_count: 1,
            documents: vec![DocumentRef::new(4, "report")],
        };
        assert_eq!(
            format_human(&result),
            "workspace:w1 /work +pdf ?urgent\n1 documents\n       4  report"
        );
    }
}
