//! Single-shot result delivery for fetches.
//!
//! # Design
//! Every fetch produces exactly one `ApiResult<T>`, carried over a
//! `tokio::sync::oneshot` channel. The sending side is shared between the
//! `Completer` (the host reporting a response) and any `CancelHandle`s; an
//! atomic state word decides which of the two terminal events wins, so a
//! cancelled fetch never delivers a value and a delivered fetch can no
//! longer be cancelled.
//!
//! `Pending<T>` is the only consumer primitive. It is a `Future`, and
//! `on_complete` is a thin callback wrapper around awaiting it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::http::{HttpRequest, HttpResponse};

const OPEN: u8 = 0;
const DELIVERED: u8 = 1;
const CANCELLED: u8 = 2;

struct Shared<T> {
    state: AtomicU8,
    sender: Mutex<Option<oneshot::Sender<ApiResult<T>>>>,
}

impl<T> Shared<T> {
    /// Move from `OPEN` to `terminal`. Only the first caller succeeds.
    fn finish(&self, terminal: u8) -> bool {
        self.state
            .compare_exchange(OPEN, terminal, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn take_sender(&self) -> Option<oneshot::Sender<ApiResult<T>>> {
        match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }
}

/// Create a connected completer / pending pair.
pub fn channel<T>() -> (Completer<T>, Pending<T>) {
    let (sender, receiver) = oneshot::channel();
    let shared = Arc::new(Shared {
        state: AtomicU8::new(OPEN),
        sender: Mutex::new(Some(sender)),
    });
    (
        Completer {
            shared: Arc::clone(&shared),
        },
        Pending { receiver, shared },
    )
}

// ---------------------------------------------------------------------------
// Producer side
// ---------------------------------------------------------------------------

/// Delivers the result of one fetch.
pub struct Completer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Completer<T> {
    /// Deliver `result`. Returns false if the fetch was already cancelled
    /// or completed, in which case `result` is dropped.
    pub fn complete(self, result: ApiResult<T>) -> bool {
        if !self.shared.finish(DELIVERED) {
            return false;
        }
        match self.shared.take_sender() {
            // A dropped receiver still counts as delivered: the fetch is over.
            Some(sender) => {
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }
}

/// Cancels a fetch that has not delivered yet.
pub struct CancelHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CancelHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> CancelHandle<T> {
    /// Returns true if this call cancelled the fetch, false if it had
    /// already completed or been cancelled.
    pub fn cancel(&self) -> bool {
        if !self.shared.finish(CANCELLED) {
            return false;
        }
        if let Some(sender) = self.shared.take_sender() {
            let _ = sender.send(Err(ApiError::Cancelled));
        }
        debug!("fetch cancelled");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// Consumer side
// ---------------------------------------------------------------------------

/// The eventual result of one fetch.
///
/// Resolves to `Err(ApiError::Cancelled)` when the fetch was cancelled or
/// its completer was dropped without delivering.
pub struct Pending<T> {
    receiver: oneshot::Receiver<ApiResult<T>>,
    shared: Arc<Shared<T>>,
}

impl<T> Pending<T> {
    pub fn cancel_handle(&self) -> CancelHandle<T> {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Take the result without waiting, if it has arrived.
    pub fn try_take(&mut self) -> Option<ApiResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ApiError::Cancelled)),
        }
    }

    /// Wait for the result and hand it to `f`. A cancelled fetch never
    /// reaches `f`; the return value says whether it was called.
    pub async fn on_complete<F>(self, f: F) -> bool
    where
        F: FnOnce(ApiResult<T>),
    {
        let shared = Arc::clone(&self.shared);
        let result = self.await;
        if shared.is_cancelled() {
            return false;
        }
        f(result);
        true
    }
}

impl<T> Future for Pending<T> {
    type Output = ApiResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ApiError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

pub(crate) type ParseFn<T> = Box<dyn FnOnce(HttpResponse) -> ApiResult<T> + Send>;

/// The host's half of a fetch: the request to execute and the slot to
/// report its outcome into.
pub struct Exchange<T> {
    request: HttpRequest,
    completer: Completer<T>,
    parse: ParseFn<T>,
}

impl<T> Exchange<T> {
    pub(crate) fn new(request: HttpRequest, completer: Completer<T>, parse: ParseFn<T>) -> Self {
        Self {
            request,
            completer,
            parse,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// True once the consumer cancelled; the host may skip the round-trip.
    pub fn is_cancelled(&self) -> bool {
        self.completer.is_cancelled()
    }

    /// Report the transport outcome. A response is parsed and delivered;
    /// a transport failure is delivered as `ApiError::Request`. Nothing is
    /// parsed or delivered after cancellation. Returns whether the result
    /// was delivered.
    pub fn fulfill(self, outcome: Result<HttpResponse, String>) -> bool {
        if self.completer.is_cancelled() {
            debug!(path = %self.request.path, "dropping response for cancelled fetch");
            return false;
        }
        let result = outcome.map_err(ApiError::Request).and_then(self.parse);
        self.completer.complete(result)
    }
}
