//! Display side of synced captions.

use crate::cue::Cue;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::trace;

/// Draws the caption overlay. `None` means nothing should be visible.
#[async_trait]
pub trait CueRenderer: Send {
    async fn render(&mut self, cue: Option<&Cue>) -> Result<()>;
}

/// Render the current cue and then every change until the session that
/// owns `active` goes away. Gives the renderer back when done.
pub async fn run_overlay<R: CueRenderer>(
    mut active: watch::Receiver<Option<Cue>>,
    mut renderer: R,
) -> Result<R> {
    loop {
        let cue = active.borrow_and_update().clone();
        trace!("rendering cue {:?}", cue.as_ref().map(|c| c.id));
        renderer.render(cue.as_ref()).await?;
        if active.changed().await.is_err() {
            break;
        }
    }
    Ok(renderer)
}
