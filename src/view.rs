//! The table view. A single task owns the displayed content; everyone else
//! sends it commands and reads snapshots.

use crate::error::FetchError;
use crate::types::Activation;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

const COMMAND_CAPACITY: usize = 16;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSnapshot {
    /// Last successfully fetched table, verbatim.
    pub content: Option<String>,
    /// Error from the most recent refresh, cleared by the next success.
    pub last_error: Option<FetchError>,
    pub rendered_at: Option<OffsetDateTime>,
    pub revision: u64,
}

/// Orders refreshes by when they started. Issued by [`ViewHandle::ticket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

#[derive(Debug)]
enum ViewUpdate {
    Show(RefreshTicket, String),
    ShowError(RefreshTicket, FetchError),
}

#[derive(Debug)]
struct ViewCommand {
    update: ViewUpdate,
    done: oneshot::Sender<()>,
}

#[derive(Clone)]
pub struct ViewHandle {
    commands: mpsc::Sender<ViewCommand>,
    snapshot: watch::Receiver<ViewSnapshot>,
    tickets: Arc<AtomicU64>,
}

impl ViewHandle {
    /// Takes a ticket for a refresh that is about to start.
    pub fn ticket(&self) -> RefreshTicket {
        RefreshTicket(self.tickets.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Replaces the displayed table and waits until the view applied it.
    /// Ignored when a later refresh already displayed its table.
    pub async fn show(&self, ticket: RefreshTicket, html: String) {
        self.submit(ViewUpdate::Show(ticket, html)).await;
    }

    /// Records a failed refresh; the displayed table stays as it is.
    /// Ignored when a later refresh already finished.
    pub async fn show_error(&self, ticket: RefreshTicket, error: FetchError) {
        self.submit(ViewUpdate::ShowError(ticket, error)).await;
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.snapshot.borrow().clone()
    }

    async fn submit(&self, update: ViewUpdate) {
        let (done, applied) = oneshot::channel();
        if self
            .commands
            .send(ViewCommand { update, done })
            .await
            .is_err()
        {
            debug!("view task stopped; dropping update");
            return;
        }
        let _ = applied.await;
    }
}

pub fn spawn_view() -> (ViewHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (snapshot_tx, snapshot_rx) = watch::channel(ViewSnapshot::default());
    let task = tokio::spawn(run_view(commands_rx, snapshot_tx));
    (
        ViewHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
            tickets: Arc::new(AtomicU64::new(0)),
        },
        task,
    )
}

/// Newest tickets applied so far: the one that displayed the current table
/// and the one that decided the current error state.
#[derive(Debug, Default)]
struct Applied {
    content: Option<RefreshTicket>,
    outcome: Option<RefreshTicket>,
}

async fn run_view(
    mut commands: mpsc::Receiver<ViewCommand>,
    snapshot: watch::Sender<ViewSnapshot>,
) {
    let mut applied = Applied::default();
    while let Some(ViewCommand { update, done }) = commands.recv().await {
        let now = OffsetDateTime::now_utc();
        snapshot.send_if_modified(|view| apply(view, &mut applied, update, now));
        let _ = done.send(());
    }
}

fn apply(
    view: &mut ViewSnapshot,
    applied: &mut Applied,
    update: ViewUpdate,
    now: OffsetDateTime,
) -> bool {
    match update {
        ViewUpdate::Show(ticket, html) => {
            if applied.content.is_some_and(|newest| ticket <= newest) {
                debug!(?ticket, "dropping table from an older refresh");
                return false;
            }
            applied.content = Some(ticket);
            view.content = Some(html);
            view.rendered_at = Some(now);
            if applied.outcome.is_none_or(|newest| ticket > newest) {
                applied.outcome = Some(ticket);
                view.last_error = None;
            }
        }
        ViewUpdate::ShowError(ticket, error) => {
            if applied.outcome.is_some_and(|newest| ticket <= newest) {
                debug!(?ticket, "dropping error from an older refresh");
                return false;
            }
            applied.outcome = Some(ticket);
            view.last_error = Some(error);
        }
    }
    view.revision += 1;
    true
}

/// The first activation always loads the table; later ones only when the
/// activation says fresh data is available.
#[derive(Debug, Default)]
pub struct ActivationTracker {
    activated: AtomicBool,
}

impl ActivationTracker {
    pub fn needs_refresh(&self, activation: Activation) -> bool {
        let first = !self.activated.swap(true, Ordering::SeqCst);
        first || activation.covid_data_available
    }
}
