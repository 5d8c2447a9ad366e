//! Row event stream driven by a transport fragment source.
//!
//! [`RowStream`] implements [`futures::Stream`]: each poll feeds transport
//! fragments through a [`QuerySession`] until a row, an error or the end of
//! the response is available. Dropping or cancelling the stream drops the
//! fragment source, which closes the underlying connection.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    Stream,
    StreamExt,
    stream::{BoxStream, FusedStream},
};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::{
    envelope::{Header, Row},
    error::QueryError,
    frame::{FrameMode, FrameReconstructor},
    metrics,
    session::QuerySession,
};

/// Type-erased source of transport fragments.
pub type FragmentSource = BoxStream<'static, Result<String, QueryError>>;

/// An async stream of rows decoded from a query response.
///
/// The header is consumed internally and exposed through
/// [`header`](Self::header). Every error is terminal: after yielding
/// `Err(..)` the stream returns `None`. A pull query completes when the
/// transport closes; a push query stays open until it is dropped, cancelled
/// through a [`CancellationToken`], closed by the server or failed.
///
/// # Examples
///
/// ```
/// use futures::{StreamExt, TryStreamExt, stream};
/// use querywire::{FrameMode, RowStream};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), querywire::QueryError> {
/// let fragments = stream::iter([
///     "[{\"header\":{\"A\":\"STRING\"}},\n",
///     "{\"row\":{\"columns\":[\"x\"]}}",
///     "]",
/// ])
/// .map(|fragment| Ok(fragment.to_owned()));
///
/// let rows: Vec<_> = RowStream::new(fragments.boxed(), FrameMode::Chunked)
///     .try_collect()
///     .await?;
/// assert_eq!(rows.len(), 1);
/// assert_eq!(rows[0].columns()[0], "x");
/// # Ok(())
/// # }
/// ```
pub struct RowStream<S = FragmentSource> {
    source: Option<S>,
    session: QuerySession,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    done: bool,
}

impl<S> RowStream<S>
where
    S: Stream<Item = Result<String, QueryError>> + Unpin,
{
    /// Create a stream decoding fragments from `source` in `mode`.
    #[must_use]
    pub fn new(source: S, mode: FrameMode) -> Self {
        Self::with_frames(source, FrameReconstructor::new(mode))
    }

    /// Create a stream around a preconfigured reconstructor.
    #[must_use]
    pub fn with_frames(source: S, frames: FrameReconstructor) -> Self {
        Self {
            source: Some(source),
            session: QuerySession::with_frames(frames),
            cancelled: None,
            done: false,
        }
    }

    /// End the stream when `token` is cancelled.
    ///
    /// The fragment source is dropped as soon as cancellation is observed;
    /// no buffered partial value is reported.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancelled = Some(Box::pin(token.cancelled_owned()));
        self
    }

    /// Returns the header, once the server has sent it.
    #[must_use]
    pub fn header(&self) -> Option<&Header> { self.session.header() }

    /// Returns the number of rows yielded so far.
    #[must_use]
    pub fn rows(&self) -> usize { self.session.rows() }

    /// Returns the transport mode this stream decodes.
    #[must_use]
    pub fn mode(&self) -> FrameMode { self.session.mode() }

    /// Stop the stream and release the transport immediately.
    pub fn cancel(&mut self) {
        if !self.done {
            tracing::debug!(stream.rows_total = self.rows(), "row stream cancelled");
        }
        self.close();
    }

    fn close(&mut self) {
        self.done = true;
        self.source = None;
        self.cancelled = None;
    }

    fn fail(&mut self, error: QueryError) -> Poll<Option<Result<Row, QueryError>>> {
        metrics::inc_errors(self.mode());
        tracing::debug!(
            stream.rows_total = self.rows(),
            error = %error,
            "row stream failed"
        );
        self.close();
        Poll::Ready(Some(Err(error)))
    }
}

impl<S> Stream for RowStream<S>
where
    S: Stream<Item = Result<String, QueryError>> + Unpin,
{
    type Item = Result<Row, QueryError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.done {
                return Poll::Ready(None);
            }

            if let Some(cancelled) = this.cancelled.as_mut() {
                if cancelled.as_mut().poll(cx).is_ready() {
                    this.cancel();
                    return Poll::Ready(None);
                }
            }

            match this.session.next_row() {
                Some(Ok(row)) => {
                    metrics::inc_rows(this.mode());
                    tracing::debug!(
                        row.columns = row.columns().len(),
                        stream.rows_received = this.rows(),
                        "row received"
                    );
                    return Poll::Ready(Some(Ok(row)));
                }
                Some(Err(error)) => return this.fail(error),
                None => {}
            }

            if this.session.is_finished() {
                tracing::debug!(stream.rows_total = this.rows(), "row stream completed");
                this.close();
                return Poll::Ready(None);
            }

            let Some(source) = this.source.as_mut() else {
                this.close();
                return Poll::Ready(None);
            };

            match source.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(fragment))) => {
                    if let Err(error) = this.session.push_fragment(&fragment) {
                        return this.fail(error);
                    }
                }
                Poll::Ready(Some(Err(error))) => return this.fail(error),
                Poll::Ready(None) => {
                    this.source = None;
                    if let Err(error) = this.session.finish() {
                        return this.fail(error);
                    }
                }
            }
        }
    }
}

impl<S> FusedStream for RowStream<S>
where
    S: Stream<Item = Result<String, QueryError>> + Unpin,
{
    fn is_terminated(&self) -> bool { self.done }
}

impl<S> std::fmt::Debug for RowStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("session", &self.session)
            .field("open", &self.source.is_some())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
