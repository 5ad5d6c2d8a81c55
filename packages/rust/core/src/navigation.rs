//! Retried page moves on the shared session.

use std::time::Duration;

use ratsarchiv_crawler::{Attempt, PageSession, RetryPolicy};
use ratsarchiv_shared::{HarvestError, Result, WalkDirection};
use tracing::debug;

fn open_owned<'a>(session: &'a mut (dyn PageSession + '_), link: String) -> Attempt<'a, (), HarvestError> {
    Box::pin(async move { session.open(&link).await })
}

/// Open `link`, retrying transient failures, then wait `settle`.
pub(crate) async fn open_page(
    session: &mut dyn PageSession,
    retry: &RetryPolicy,
    link: &str,
    settle: Duration,
) -> Result<()> {
    retry
        .run_on(session, HarvestError::classify, |s| open_owned(s, link.to_owned()))
        .await?;
    pause(settle).await;
    Ok(())
}

/// Reopen `location` unless the session is already there.
pub(crate) async fn return_to(
    session: &mut dyn PageSession,
    retry: &RetryPolicy,
    location: &str,
    settle: Duration,
) -> Result<()> {
    if session.location().await? == location {
        return Ok(());
    }
    debug!(%location, "returning to page");
    open_page(session, retry, location, settle).await
}

/// Move one unit in `direction`. Returns whether the page label changed.
pub(crate) async fn step(
    session: &mut dyn PageSession,
    retry: &RetryPolicy,
    direction: WalkDirection,
    settle: Duration,
) -> Result<bool> {
    let changed = retry
        .run_on(session, HarvestError::classify, |s| s.navigate(direction))
        .await?;
    pause(settle).await;
    Ok(changed)
}

pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
