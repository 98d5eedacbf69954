//! Oracle backed by a request channel, for interactive front-ends.
//!
//! The driver side holds a [`ChannelOracle`]; whoever owns the receiver (a UI
//! loop, a web handler) answers each [`ComparisonRequest`] through its oneshot
//! reply. The driver waits as long as it takes.

use tokio::sync::{mpsc, oneshot};

use super::{ComparisonOracle, OracleError, OracleVerdict};
use crate::state::ItemId;

/// One pending question for the front-end.
#[derive(Debug)]
pub struct ComparisonRequest {
    pub a: ItemId,
    pub b: ItemId,
    reply: oneshot::Sender<Result<OracleVerdict, OracleError>>,
}

impl ComparisonRequest {
    /// Send the answer back. Returns false if the driver stopped waiting.
    pub fn respond(self, answer: Result<OracleVerdict, OracleError>) -> bool {
        self.reply.send(answer).is_ok()
    }

    pub fn pick(self, winner: ItemId) -> bool {
        self.respond(Ok(OracleVerdict::winner(winner)))
    }

    pub fn skip(self) -> bool {
        self.respond(Ok(OracleVerdict::Skip))
    }
}

#[derive(Debug, Clone)]
pub struct ChannelOracle {
    requests: mpsc::Sender<ComparisonRequest>,
}

impl ChannelOracle {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ComparisonRequest>) {
        let (requests, receiver) = mpsc::channel(buffer.max(1));
        (Self { requests }, receiver)
    }
}

#[async_trait::async_trait]
impl ComparisonOracle for ChannelOracle {
    async fn compare(&self, a: &ItemId, b: &ItemId) -> Result<OracleVerdict, OracleError> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(ComparisonRequest {
                a: a.clone(),
                b: b.clone(),
                reply,
            })
            .await
            .map_err(|_| OracleError::unavailable("request channel closed"))?;
        answer
            .await
            .map_err(|_| OracleError::unavailable("request dropped without an answer"))?
    }
}
