//! Companion surface refresh loop.
//!
//! Mirrors what the home-screen extension does: on each tick, re-read the shared
//! store and sort token, recompute the short head of the list and re-render it
//! when it changed. No state is shared with the main process beyond the files.

use anyhow::Result;
use chrono_tz::Tz;
use simplr_core::{Mutation, MutationKind, PreferenceStore, QueryFacade, Task, TaskSource};
use std::time::Duration;

use crate::config::CompanionSection;
use crate::render;

/// Tracks what the surface last showed so unchanged ticks stay quiet.
#[derive(Debug, Default)]
pub struct CompanionState {
    last_version: Option<u64>,
    last_rows: Option<Vec<Task>>,
}

impl CompanionState {
    /// One refresh. Returns the rows when they differ from the previous refresh.
    pub fn refresh<S, P>(
        &mut self,
        facade: &QueryFacade,
        source: &S,
        prefs: &P,
        limit: usize,
    ) -> Result<Option<Vec<Task>>>
    where
        S: TaskSource + ?Sized,
        P: PreferenceStore + ?Sized,
    {
        let view = facade.companion_view(source, prefs, limit)?;
        if self.last_version.is_some_and(|v| v != view.version) {
            facade.apply_mutation(Mutation {
                kind: MutationKind::SnapshotReloaded,
                version: view.version,
            });
        }
        self.last_version = Some(view.version);

        let rows = view.rows;
        if self.last_rows.as_ref() == Some(&rows) {
            return Ok(None);
        }
        self.last_rows = Some(rows.clone());
        Ok(Some(rows))
    }
}

/// Refresh on an interval until Ctrl-C, or until `ticks` refreshes have run.
pub async fn watch<S, P>(
    facade: &QueryFacade,
    source: &S,
    prefs: &P,
    cfg: &CompanionSection,
    tz: Tz,
    ticks: Option<u64>,
) -> Result<()>
where
    S: TaskSource + ?Sized,
    P: PreferenceStore + ?Sized,
{
    let mut interval = tokio::time::interval(Duration::from_secs(cfg.refresh_secs.max(1)));
    let mut state = CompanionState::default();
    let mut done = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("companion watch interrupted");
                break;
            }
        }

        match state.refresh(facade, source, prefs, cfg.limit) {
            Ok(Some(rows)) => {
                println!("--- up next ---");
                render::print_tasks(&rows, tz);
            }
            Ok(None) => tracing::debug!("companion rows unchanged"),
            // A torn read is retried on the next tick.
            Err(e) => {
                let error = format!("{e:#}");
                tracing::warn!(%error, "companion refresh failed");
            }
        }

        done += 1;
        if ticks.is_some_and(|t| done >= t) {
            break;
        }
    }

    let stats = facade.stats();
    tracing::info!(hits = stats.hits, misses = stats.misses, "companion cache");
    Ok(())
}
