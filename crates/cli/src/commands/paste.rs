// `strata paste` — copy or cut documents from one layer and paste them on
// another. Both halves run in one invocation since nothing persists
// between processes.

use clap::Args;
use serde::Serialize;

use strata_client::{ClipOperation, ClipboardEntry};
use strata_common::path::normalize_path;
use strata_common::types::DocumentId;

use crate::client::{self, RootArgs};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct PasteArgs {
    #[command(flatten)]
    pub root: RootArgs,

    /// Layer the documents are taken from.
    #[arg(long)]
    pub from: String,

    /// Layer the documents are pasted onto.
    #[arg(long)]
    pub to: String,

    /// Move the documents instead of copying them.
    #[arg(long)]
    pub cut: bool,

    /// Document ids.
    #[arg(required = true)]
    pub ids: Vec<DocumentId>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasteResult {
    pub target_path: String,
    #[serde(flatten)]
    pub entry: ClipboardEntry,
}

pub fn run(args: PasteArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = client::block_on(paste(args)).and_then(|result| result);
    super::finish(format, result, format_human)
}

async fn paste(args: PasteArgs) -> anyhow::Result<PasteResult> {
    let config = client::load_config();
    let mut replica = client::replica(&config, args.root.root()?)?;
    replica.navigate(&args.from).await?;
    if args.cut {
        replica.cut_documents(args.ids);
    } else {
        replica.copy_documents(args.ids);
    }
    let entry = replica.paste(&args.to).await?;
    Ok(PasteResult { target_path: normalize_path(&args.to)?, entry })
}

fn format_human(result: &PasteResult) -> String {
    let verb = match result.entry.operation {
        ClipOperation::Copy => "copied",
        ClipOperation::Cut => "moved",
    };
    let count = result.entry.document_ids.len();
    let noun = if count == 1 { "document" } else { "documents" };
    format!("{verb} {count} {noun} from {} to {}", result.entry.source_path, result.target_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::types::RootKey;

    fn result(operation: ClipOperation, ids: Vec<DocumentId>) -> PasteResult {
        PasteResult {
            target_path: "/home".into(),
            entry: ClipboardEntry {
                document_ids: ids,
                operation,
                source_root: RootKey::Workspace("w1".into()),
                source_path: "/work".into(),
            },
        }
    }

    #[test]
    fn human_format_names_the_operation() {
        assert_eq!(
            format_human(&result(ClipOperation::Copy, vec![1, 2])),
            "copied 2 documents from /work to /home"
        );
        assert_eq!(
            format_human(&result(ClipOperation::Cut, vec![7])),
            "moved 1 document from /work to /home"
        );
    }

    #[test]
    fn json_flattens_the_entry() {
        let value = serde_json::to_value(result(ClipOperation::Cut, vec![7])).unwrap();
        assert_eq!(value["target_path"], "/home");
        assert_eq!(value["operation"], "cut");
        assert_eq!(value["document_ids"], serde_json::json!([7]));
    }
}
