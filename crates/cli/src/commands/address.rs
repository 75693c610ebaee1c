// `strata address` — print the address for a root, path and filters.
// Nothing is fetched; the path is only normalized.

use clap::Args;
use serde::Serialize;

use strata_common::address::to_address;
use strata_common::path::normalize_path;
use strata_common::types::FilterState;

use crate::client::RootArgs;
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct AddressArgs {
    #[command(flatten)]
    pub root: RootArgs,

    #[arg(default_value = "/")]
    pub path: String,

    /// Feature to include (repeatable).
    #[arg(long = "feature")]
    pub features: Vec<String>,

    /// Filter to include (repeatable).
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressResult {
    pub address: String,
}

pub fn run(args: AddressArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    super::finish(format, build(&args), |result| result.address.clone())
}

fn build(args: &AddressArgs) -> anyhow::Result<AddressResult> {
    let root = args.root.root()?;
    let path = normalize_path(&args.path)?;
    let filters = FilterState::new(args.features.iter().cloned(), args.filters.iter().cloned());
    Ok(AddressResult { address: to_address(&root, &path, &filters) })
}
