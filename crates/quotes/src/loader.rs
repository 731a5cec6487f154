use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use quoteline_storage::{MessageIdentity, RecipientId};
use snafu::ResultExt;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use super::assembler::QuoteThreadAssembler;
use super::colors::NameColor;
use super::error::{QuoteResult, WorkerGoneSnafu, WorkerJoinSnafu};
use super::message::ConversationMessage;

/// Single result of a background load.
///
/// Await it from async code, poll it with [`PendingLoad::try_take`] from a UI
/// loop, or block on it from a foreground thread outside the runtime.
/// Dropping it stops listening; the worker still runs to completion.
#[derive(Debug)]
pub struct PendingLoad<T> {
    stage: &'static str,
    result_rx: oneshot::Receiver<QuoteResult<T>>,
}

impl<T> PendingLoad<T> {
    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// `None` while the worker is still running. Once a result has been taken
    /// further calls report
    /// [`QuoteError::WorkerGone`](super::error::QuoteError::WorkerGone).
    pub fn try_take(&mut self) -> Option<QuoteResult<T>> {
        match self.result_rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(WorkerGoneSnafu { stage: self.stage }.fail()),
        }
    }

    /// Panics if called from within an async execution context.
    pub fn blocking_wait(self) -> QuoteResult<T> {
        let stage = self.stage;
        self.result_rx
            .blocking_recv()
            .unwrap_or_else(|_| WorkerGoneSnafu { stage }.fail())
    }
}

impl<T> Future for PendingLoad<T> {
    type Output = QuoteResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let stage = this.stage;
        Pin::new(&mut this.result_rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| WorkerGoneSnafu { stage }.fail()))
    }
}

/// Runs quote-thread queries for one message on a worker pool and hands each
/// result back through a [`PendingLoad`].
pub struct QuoteThreadLoader {
    assembler: Arc<QuoteThreadAssembler>,
    worker: Handle,
    message_id: MessageIdentity,
    conversation_id: RecipientId,
}

impl QuoteThreadLoader {
    pub fn new(
        assembler: Arc<QuoteThreadAssembler>,
        worker: Handle,
        message_id: MessageIdentity,
        conversation_id: RecipientId,
    ) -> Self {
        Self {
            assembler,
            worker,
            message_id,
            conversation_id,
        }
    }

    pub fn message_id(&self) -> MessageIdentity {
        self.message_id
    }

    pub fn conversation_id(&self) -> RecipientId {
        self.conversation_id
    }

    pub fn load_messages(&self) -> PendingLoad<Vec<ConversationMessage>> {
        let assembler = Arc::clone(&self.assembler);
        let message_id = self.message_id;
        self.spawn("load-quote-thread", move || {
            assembler.assemble_thread(message_id)
        })
    }

    pub fn load_name_colors(&self) -> PendingLoad<HashMap<RecipientId, NameColor>> {
        let assembler = Arc::clone(&self.assembler);
        let conversation_id = self.conversation_id;
        self.spawn("load-name-colors", move || {
            assembler.resolve_author_colors(conversation_id)
        })
    }

    fn spawn<T, F>(&self, stage: &'static str, job: F) -> PendingLoad<T>
    where
        T: Send + 'static,
        F: FnOnce() -> QuoteResult<T> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let message_id = self.message_id;
        // Store calls block, so the job itself runs on the blocking pool.
        let job = self.worker.spawn_blocking(job);

        self.worker.spawn(async move {
            let result = job
                .await
                .context(WorkerJoinSnafu { stage })
                .and_then(|result| result);

            match &result {
                Ok(_) => tracing::info!(stage, %message_id, "background load finished"),
                Err(error) => {
                    tracing::warn!(stage, %message_id, "background load failed: {error}")
                }
            }

            if result_tx.send(result).is_err() {
                tracing::debug!(stage, %message_id, "load result dropped; no listener");
            }
        });

        PendingLoad { stage, result_rx }
    }
}
