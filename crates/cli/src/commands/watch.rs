// `strata watch` — follow remote changes to a root and print a line per
// reconciled change until interrupted.

use std::io::{self, Write};

use anyhow::Context;
use clap::Args;
use tokio::sync::Notify;
use tracing::{debug, info};

use strata_client::sync::{drive, topic_for, SyncUpdate};
use strata_client::{LiveChannel, WsTransport};

use crate::client::{self, RootArgs};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub root: RootArgs,

    /// Path whose documents stay loaded, so field changes to them apply.
    #[arg(default_value = "/")]
    pub path: String,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: WatchArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = client::block_on(watch(args, format)).and_then(|result| result);
    if let Err(e) = &result {
        output::print_anyhow_error(format, e);
    }
    result
}

async fn watch(args: WatchArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = client::load_config();
    let root = args.root.root()?;
    let live_url = config.live_url()?;

    let mut replica = client::replica(&config, root.clone())?;
    replica.load().await.context("failed to load the tree")?;
    replica.navigate(&args.path).await?;

    let mut channel = LiveChannel::new(live_url, client::token()?, WsTransport::new())
        .with_reconnect_policy(config.reconnect.policy());
    channel.subscribe(topic_for(&root)).await?;
    channel.connect().await.context("could not open the live channel")?;
    info!(root = %root, path = %replica.selected_path(), "watching");

    // Stop once stdout is gone (closed pipe); nobody is reading the notices.
    let output_closed = Notify::new();
    let on_update = |update: SyncUpdate| {
        if let Err(error) = write_update(&mut io::stdout().lock(), format, update) {
            debug!(error = %error, "stdout closed, stopping watch");
            output_closed.notify_one();
        }
    };

    tokio::select! {
        _ = drive(&mut replica, &mut channel, on_update) => {}
        _ = output_closed.notified() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
        }
    }
    channel.disconnect().await;
    Ok(())
}

/// Print one update. Notices go to `writer`; sync failures are warnings on
/// stderr and never fail the write.
fn write_update<W: Write>(
    writer: &mut W,
    format: OutputFormat,
    update: SyncUpdate,
) -> io::Result<()> {
    match update {
        SyncUpdate::Notice(notice) => {
            output::write_output(writer, format, &notice, |notice| notice.to_string())
        }
        SyncUpdate::Failed(error) => {
            output::print_warning(format, "SYNC_FAILED", &error.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_client::Notice;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn notice_prints_one_human_line() {
        let mut buf = Vec::new();
        let notice = Notice::info("Layer created", "layer L9");
        write_update(&mut buf, OutputFormat::Human, SyncUpdate::Notice(notice)).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Layer created: layer L9\n");
    }

    #[test]
    fn closed_output_is_reported() {
        let notice = Notice::info("Status changed", "document 42");
        let error = write_update(&mut ClosedPipe, OutputFormat::Human, SyncUpdate::Notice(notice))
            .unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
    }
}
