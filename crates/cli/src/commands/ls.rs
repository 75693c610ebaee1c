// `strata ls` — list documents under a path, filtered and paged.

use clap::Args;
use serde::Serialize;

use strata_common::address::to_address;
use strata_common::path::normalize_path;
use strata_common::types::{DocumentRef, FilterState};

use crate::client::{self, RootArgs};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct LsArgs {
    #[command(flatten)]
    pub root: RootArgs,

    /// Path whose documents to list.
    #[arg(default_value = "/")]
    pub path: String,

    /// Only documents with this feature (repeatable).
    #[arg(long = "feature")]
    pub features: Vec<String>,

    /// Only documents matching this filter (repeatable).
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Documents per page (defaults to the configured page size).
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LsResult {
    pub address: String,
    pub path: String,
    pub page: u32,
    pub total_pages: Option<u64>,
    pub total_count: u64,
    pub documents: Vec<DocumentRef>,
}

pub fn run(args: LsArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = client::block_on(list(args)).and_then(|result| result);
    super::finish(format, result, format_human)
}

async fn list(args: LsArgs) -> anyhow::Result<LsResult> {
    let mut config = client::load_config();
    if let Some(page_size) = args.page_size {
        config.paging.page_size = page_size;
    }
    let root = args.root.root()?;
    let path = normalize_path(&args.path)?;
    let filters = FilterState::new(args.features, args.filters);

    // One load and one query for path and filters together.
    let mut replica = client::replica(&config, root.clone())?;
    replica.open_address(&to_address(&root, &path, &filters)).await?;
    if args.page > 1 {
        replica.set_page(args.page).await?;
    }

    let page = replica.documents().cloned().unwrap_or_default();
    Ok(LsResult {
        address: replica.address(),
        path: replica.selected_path().to_string(),
        page: replica.pager().page(),
        total_pages: replica.pager().total_pages(),
        total_count: page.total_count,
        documents: page.documents,
    })
}

fn format_human(result: &LsResult) -> String {
    let pages = result.total_pages.unwrap_or(1).max(1);
    let mut lines = vec![format!(
        "{}: {} documents (page {}/{})",
        result.path, result.total_count, result.page, pages
    )];
    for doc in &result.documents {
        let mut line = format!("{:>8}  {}", doc.id, doc.title);
        if let Some(status) = &doc.status {
            line.push_str(&format!("  [{status}]"));
        }
        if doc.locked {
            line.push_str("  (locked)");
        }
        lines.push(line);
    }
    lines.join("\n")
}
