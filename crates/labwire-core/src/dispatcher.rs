//! The `Dispatcher` trait -- the seam between protocol adapters and the
//! transaction engine.
//!
//! Instrument adapters never touch a [`Transport`](crate::transport::Transport)
//! directly. They build [`TextRequest`]s and hand them to a dispatcher, which
//! writes the commands, matches the replies in submission order, and
//! enforces deadlines. `labwire-text-io` provides the real implementation;
//! tests may substitute their own.

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{PendingReply, Reply, TextRequest};

/// Submits text requests to one device connection.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Submit all `requests` in order and return one result slot per request.
    ///
    /// Returns as soon as the requests are queued; each [`PendingReply`]
    /// resolves independently when its reply completes or times out.
    async fn execute(&self, requests: Vec<TextRequest>) -> Result<Vec<PendingReply>>;

    /// Submit one request and wait for its reply.
    async fn execute_one(&self, request: TextRequest) -> Result<Reply> {
        let mut pending = self.execute(vec![request]).await?;
        match pending.pop() {
            Some(reply) => reply.await,
            None => Err(crate::error::Error::Closed),
        }
    }

    /// Submit a batch and wait for every reply.
    ///
    /// All replies are awaited even if one fails, so that no transaction is
    /// left unobserved; the first failure in submission order is returned.
    async fn execute_all(&self, requests: Vec<TextRequest>) -> Result<Vec<Reply>> {
        let pending = self.execute(requests).await?;
        let mut replies = Vec::with_capacity(pending.len());
        let mut first_err = None;
        for slot in pending {
            match slot.await {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(replies),
        }
    }
}
