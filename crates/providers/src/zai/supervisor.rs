use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zchat_core::{ChatError, Failure};

use super::stream::{Assembled, StreamReader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LivenessWindows {
    /// From request start until the first non-empty delta.
    pub first_content: Duration,
    /// From the first delta until the read loop finishes.
    pub completion: Duration,
}

impl Default for LivenessWindows {
    fn default() -> Self {
        Self {
            first_content: Duration::from_secs(3),
            completion: Duration::from_secs(30),
        }
    }
}

enum Liveness {
    AwaitingFirstContent,
    AwaitingCompletion(Instant),
    Done(Result<Assembled, ChatError>),
}

/// Run the read loop for `body` as its own task and wait on it through the
/// two liveness windows. `started` anchors the first-content deadline.
///
/// The reader owns its accumulator and hands it back only on completion, so a
/// timed-out attempt never leaks partial text. Every exit path cancels the
/// reader task, which drops the body and with it the connection.
pub async fn supervise<S>(
    body: S,
    started: Instant,
    windows: LivenessWindows,
) -> Result<Assembled, ChatError>
where
    S: Stream<Item = Result<Bytes, Failure>> + Send + 'static,
{
    let (first_tx, mut first_rx) = oneshot::channel::<()>();
    let (done_tx, mut done_rx) = oneshot::channel::<Result<Assembled, ChatError>>();
    let cancel = CancellationToken::new();
    let _cancel_on_exit = cancel.clone().drop_guard();

    let reader = StreamReader::new(started, windows.first_content, first_tx);
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(target:"providers::zai","stream reader cancelled");
            }
            out = reader.run(body) => {
                let _ = done_tx.send(out);
            }
        }
    });

    let first_deadline = started + windows.first_content;
    let mut state = Liveness::AwaitingFirstContent;
    loop {
        state = match state {
            Liveness::AwaitingFirstContent => tokio::select! {
                biased;
                seen = &mut first_rx => match seen {
                    Ok(()) => Liveness::AwaitingCompletion(Instant::now() + windows.completion),
                    // sender dropped: the loop ended before any content
                    Err(_) => Liveness::Done(match (&mut done_rx).await {
                        Ok(Err(e)) => Err(e),
                        Ok(Ok(_)) | Err(_) => Err(ChatError::NoContentTimeout(windows.first_content)),
                    }),
                },
                _ = sleep_until(first_deadline) => {
                    warn!(target:"providers::zai","no content chunks within {:?}", windows.first_content);
                    Liveness::Done(Err(ChatError::NoContentTimeout(windows.first_content)))
                }
            },
            Liveness::AwaitingCompletion(deadline) => match timeout_at(deadline, &mut done_rx).await {
                Ok(Ok(out)) => Liveness::Done(out),
                Ok(Err(_)) => Liveness::Done(Err(ChatError::StreamRead(Failure::Transport(
                    "stream reader stopped without a result".into(),
                )))),
                Err(_) => {
                    warn!(target:"providers::zai","response incomplete after {:?}", windows.completion);
                    Liveness::Done(Err(ChatError::IncompleteResponseTimeout(windows.completion)))
                }
            },
            Liveness::Done(out) => return out,
        };
    }
}
