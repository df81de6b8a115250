//! Boot wait for the OpenStack adapter.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::model::{Server, ServerStatus};

use super::OpenstackApi;

impl OpenstackApi {
    /// Polls the server until it is `ACTIVE` or `ERROR`, or `timeout` passes.
    ///
    /// The server is always checked at least once. A timeout too large to
    /// represent means no deadline. Poll failures are logged
    /// and retried until the deadline so that the caller still receives a
    /// record to classify and clean up. When the server was never visible,
    /// a `BUILD` placeholder carrying the new id is returned.
    pub(super) async fn wait_for_terminal(
        &self,
        id: &str,
        name: &str,
        timeout: Duration,
    ) -> Server {
        // `None` when the timeout reaches past what `Instant` can represent.
        let deadline = Instant::now().checked_add(timeout);
        let mut last_seen = None;

        loop {
            match self.fetch_server(id).await {
                Ok(Some(server)) if server.status.is_boot_terminal() => return server,
                Ok(Some(server)) => {
                    debug!(server_id = %id, status = %server.status, "Waiting for machine");
                    last_seen = Some(server);
                }
                Ok(None) => debug!(server_id = %id, "Machine not visible yet"),
                Err(err) => warn!(server_id = %id, error = %err, "Polling machine failed"),
            }

            let pause = deadline.map_or(self.poll_interval, |end| {
                end.saturating_duration_since(Instant::now())
            });
            if pause.is_zero() {
                break;
            }
            sleep(self.poll_interval.min(pause)).await;
        }

        last_seen.unwrap_or_else(|| Server::new(id, name, ServerStatus::Build))
    }
}
