//! Persistence worker (spec §4.5): periodically snapshots the prefix cache
//! to the durable store, and logs a diagnostic tally between snapshots.

mod store;

use std::time::Duration;

use log::{debug, info, trace};

pub use store::Store;

use crate::context::AppContext;
use crate::error::Result;

/// Tick cadence the worker polls the running flag and considers work at.
const TICK: Duration = Duration::from_secs(10);
/// Snapshots happen every 10th tick (~10 minutes), matching the reference's
/// cadence split between "cheap tally" and "expensive persist".
const SNAPSHOT_EVERY_N_TICKS: u64 = 10;

/// Loads the durable store's contents into `ctx.cache` at startup. Safe to
/// call against a freshly created (empty) store.
pub fn hydrate(store: &Store, ctx: &AppContext) -> Result<()> {
    let entries = store.load_all()?;
    let count = entries.len();
    ctx.cache.hydrate(entries);
    info!("persistence: hydrated {count} prefix(es) from the durable store");
    Ok(())
}

/// Runs until `ctx.running` is cleared, snapshotting the prefix cache every
/// [`SNAPSHOT_EVERY_N_TICKS`] ticks and logging a tally every tick when
/// `debug` is enabled (the reference's "Nb of prefixes: N, swi: S" line).
pub fn run(mut store: Store, ctx: AppContext) {
    let mut tick: u64 = 0;
    while ctx.is_running() {
        std::thread::sleep(TICK);
        if !ctx.is_running() {
            break;
        }
        tick += 1;

        let prefix_count = ctx.cache.len();
        let template_count = ctx.templates.len();
        if ctx.debug {
            trace!("persistence: nb of prefixes: {prefix_count}, templates: {template_count}");
        }

        if tick % SNAPSHOT_EVERY_N_TICKS == 0 {
            let snapshot = ctx.cache.snapshot();
            match store.replace_all(&snapshot) {
                Ok(()) => debug!("persistence: snapshotted {} prefix(es)", snapshot.len()),
                Err(err) => log::warn!("persistence: snapshot failed: {err}"),
            }
        }
    }
}
