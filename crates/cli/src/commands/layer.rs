// `strata layer` — mutate the tree. Every change is one server call
// followed by a full reload.

use anyhow::Context;
use clap::{Args, Subcommand};
use serde::Serialize;

use strata_client::{ClientError, HttpTreeApi, Replica};
use strata_common::path::{normalize_path, resolve};
use strata_common::types::{LayerSummary, Node, NodeId};

use crate::client::{self, RootArgs};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct LayerArgs {
    #[command(flatten)]
    pub root: RootArgs,

    /// Force JSON output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    pub command: LayerCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum LayerCommand {
    /// Create a layer
    Insert {
        path: String,
        /// Create missing ancestors too.
        #[arg(long)]
        auto_create: bool,
    },
    /// Remove a layer
    Rm {
        path: String,
        /// Remove a layer that has children.
        #[arg(short, long)]
        recursive: bool,
    },
    /// Move a layer under another
    Mv {
        from: String,
        /// Destination parent.
        to: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Copy a layer under another
    Cp {
        from: String,
        /// Destination parent.
        to: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Rename a layer
    Rename { path: String, name: String },
    /// Merge the documents of other layers into this one
    Merge {
        path: String,
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Remove the documents of other layers from this one
    Subtract {
        path: String,
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Lock a layer against edits
    Lock { path: String },
    /// Release a layer lock
    Unlock { path: String },
    /// Delete a layer by id
    Delete { path: String },
}

impl LayerCommand {
    fn op(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Rm { .. } => "remove",
            Self::Mv { .. } => "move",
            Self::Cp { .. } => "copy",
            Self::Rename { .. } => "rename",
            Self::Merge { .. } => "merge",
            Self::Subtract { .. } => "subtract",
            Self::Lock { .. } => "lock",
            Self::Unlock { .. } => "unlock",
            Self::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerResult {
    pub op: &'static str,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<LayerSummary>,
}

pub fn run(args: LayerArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = client::block_on(execute(args)).and_then(|result| result);
    super::finish(format, result, format_human)
}

async fn execute(args: LayerArgs) -> anyhow::Result<LayerResult> {
    let config = client::load_config();
    let mut replica = client::replica(&config, args.root.root()?)?;
    let op = args.command.op();
    apply(&mut replica, args.command).await.with_context(|| format!("{op} failed"))
}

async fn apply(
    replica: &mut Replica<HttpTreeApi>,
    command: LayerCommand,
) -> anyhow::Result<LayerResult> {
    let op = command.op();
    let (path, layer) = match command {
        LayerCommand::Insert { path, auto_create } => {
            replica.insert(&path, auto_create).await?;
            (path, None)
        }
        LayerCommand::Rm { path, recursive } => {
            replica.remove(&path, recursive).await?;
            (path, None)
        }
        LayerCommand::Mv { from, to, recursive } => {
            replica.move_node(&from, &to, recursive).await?;
            (to, None)
        }
        LayerCommand::Cp { from, to, recursive } => {
            replica.copy_node(&from, &to, recursive).await?;
            (to, None)
        }
        LayerCommand::Rename { path, name } => {
            let renamed = replica.rename(&path, &name).await?;
            let new_path = renamed_path(&path, &renamed.name)?;
            (new_path, Some(renamed))
        }
        LayerCommand::Merge { path, targets } => {
            let (layer_id, target_ids) = resolve_targets(replica, &path, &targets).await?;
            replica.merge(&layer_id, &target_ids).await?;
            (path, None)
        }
        LayerCommand::Subtract { path, targets } => {
            let (layer_id, target_ids) = resolve_targets(replica, &path, &targets).await?;
            replica.subtract(&layer_id, &target_ids).await?;
            (path, None)
        }
        LayerCommand::Lock { path } => {
            let layer = replica.lock_layer(&path).await?;
            (path, Some(layer))
        }
        LayerCommand::Unlock { path } => {
            let layer = replica.unlock_layer(&path).await?;
            (path, Some(layer))
        }
        LayerCommand::Delete { path } => {
            replica.delete_layer(&path).await?;
            (path, None)
        }
    };
    Ok(LayerResult { op, path: normalize_path(&path)?, layer })
}

/// Path of a layer after its last segment became `name`.
fn renamed_path(path: &str, name: &str) -> anyhow::Result<String> {
    let path = normalize_path(path)?;
    let parent = path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or_default();
    Ok(format!("{parent}/{name}"))
}

/// Layer ids for `path` and each of `targets`, from a fresh snapshot.
async fn resolve_targets(
    replica: &mut Replica<HttpTreeApi>,
    path: &str,
    targets: &[String],
) -> anyhow::Result<(NodeId, Vec<NodeId>)> {
    replica.reload().await?;
    let tree = replica.tree().context("tree not loaded")?;
    let own_id = layer_id(&tree, path)?;
    let target_ids: Vec<NodeId> =
        targets.iter().map(|target| layer_id(&tree, target)).collect::<Result<_, _>>()?;
    Ok((own_id, target_ids))
}

fn layer_id(tree: &Node, path: &str) -> Result<NodeId, ClientError> {
    let path = normalize_path(path)?;
    resolve(tree, &path)
        .map(|node| node.id.clone())
        .ok_or_else(|| ClientError::NotFound(format!("no layer at `{path}`")))
}

fn format_human(result: &LayerResult) -> String {
    match &result.layer {
        Some(layer) if layer.locked => {
            let by =
                layer.locked_by.as_deref().map(|who| format!(" by {who}")).unwrap_or_default();
            format!("{} {} [{}] locked{by}", result.op, result.path, layer.id)
        }
        Some(layer) => format!("{} {} [{}]", result.op, result.path, layer.id),
        None => format!("{} {}", result.op, result.path),
    }
}
