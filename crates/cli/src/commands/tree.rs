// `strata tree` — show the layer tree with ids.

use anyhow::Context;
use clap::Args;
use serde::Serialize;

use strata_client::ClientError;
use strata_common::path::{normalize_path, resolve};
use strata_common::types::Node;

use crate::client::{self, RootArgs};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct TreeArgs {
    #[command(flatten)]
    pub root: RootArgs,

    /// Subtree to show.
    #[arg(default_value = "/")]
    pub path: String,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeResult {
    pub root: String,
    pub path: String,
    pub tree: Node,
}

pub fn run(args: TreeArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = client::block_on(fetch_tree(args)).and_then(|result| result);
    super::finish(format, result, format_human)
}

async fn fetch_tree(args: TreeArgs) -> anyhow::Result<TreeResult> {
    let config = client::load_config();
    let root = args.root.root()?;
    let path = normalize_path(&args.path)?;
    let mut replica = client::replica(&config, root.clone())?;
    replica.reload().await.context("failed to load the tree")?;

    let tree = replica.tree().context("tree not loaded")?;
    let node = resolve(&tree, &path)
        .ok_or_else(|| ClientError::NotFound(format!("no layer at `{path}`")))?;
    Ok(TreeResult { root: root.to_string(), path, tree: node.clone() })
}

fn format_human(result: &TreeResult) -> String {
    let mut lines = vec![format!("{} {}", result.root, result.path)];
    for child in &result.tree.children {
        render_tree_node(&mut lines, child, 0);
    }
    lines.join("\n")
}

fn render_tree_node(lines: &mut Vec<String>, node: &Node, depth: usize) {
    let indent = "  ".repeat(depth);
    lines.push(format!("{indent}├─ {} [{}]", node.name, node.id));
    for child in &node.children {
        render_tree_node(lines, child, depth + 1);
    }
}
