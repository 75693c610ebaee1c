// CLI subcommand dispatch.

use clap::Subcommand;
use serde::Serialize;

use crate::output::{self, OutputFormat};

pub mod address;
pub mod layer;
pub mod ls;
pub mod open;
pub mod paste;
pub mod tree;
pub mod watch;

#[derive(Subcommand)]
pub enum Command {
    /// Show the layer tree (or a subtree) with ids
    Tree(tree::TreeArgs),
    /// List documents under a path, filtered and paged
    Ls(ls::LsArgs),
    /// Change the tree: insert, remove, move, copy, rename, merge, lock...
    Layer(layer::LayerArgs),
    /// Copy or move documents from one layer to another
    Paste(paste::PasteArgs),
    /// Follow remote changes and print what they did
    Watch(watch::WatchArgs),
    /// Open a strata:// address and show what it points at
    Open(open::OpenArgs),
    /// Print the address for a path and filters
    Address(address::AddressArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Tree(args) => tree::run(args),
        Command::Ls(args) => ls::run(args),
        Command::Layer(args) => layer::run(args),
        Command::Paste(args) => paste::run(args),
        Command::Watch(args) => watch::run(args),
        Command::Open(args) => open::run(args),
        Command::Address(args) => address::run(args),
    }
}

/// Print a command's result, or its error in the same format.
fn finish<T, F>(format: OutputFormat, result: anyhow::Result<T>, human_fn: F) -> anyhow::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match result {
        Ok(value) => {
            output::print_output(format, &value, human_fn)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}
