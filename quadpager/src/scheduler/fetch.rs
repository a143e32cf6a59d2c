//! Tile fetch collaborator interface.
//!
//! The scheduler never performs I/O. It hands `(node, priority)` to a
//! [`TileFetcher`] and keeps a [`FetchHandle`] for cancellation. The fetcher
//! returns a future that resolves to the tile payload or a [`FetchError`].
//!
//! # Cancellation
//!
//! Cancelling a handle is idempotent and safe after the fetch has finished.
//! Every dispatch carries a fresh fetch ID; the scheduler only accepts a
//! completion whose ID matches the node's current fetch, so a result that
//! arrives after cancellation is discarded.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::quadtree::Node;

/// Result of a single fetch.
pub type FetchResult = Result<TilePayload, FetchError>;

/// Boxed future returned by [`TileFetcher::fetch`].
pub type FetchFuture = Pin<Box<dyn Future<Output = FetchResult> + Send + 'static>>;

static NEXT_FETCH_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque tile data plus its animation frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePayload {
    pub data: Bytes,
    pub frame: Option<u32>,
}

impl TilePayload {
    pub fn new(data: Bytes) -> Self {
        Self { data, frame: None }
    }

    pub fn with_frame(mut self, frame: u32) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Cancel handle for one dispatched fetch.
#[derive(Debug, Clone)]
pub struct FetchHandle {
    id: u64,
    token: CancellationToken,
}

impl FetchHandle {
    /// Creates a handle with a fresh fetch ID.
    pub fn new() -> Self {
        Self {
            id: NEXT_FETCH_ID.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancels the fetch. Calling this more than once is harmless.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token the fetcher can watch to stop early.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Default for FetchHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A fetch the scheduler wants started.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub node: Node,
    /// Node as the tile source numbers it (rows flipped when `flip_y` is set).
    pub source: Node,
    pub priority: f64,
    pub handle: FetchHandle,
}

/// A finished fetch reported back to the scheduler.
#[derive(Debug, Clone)]
pub struct FetchCompletion {
    pub node: Node,
    pub fetch_id: u64,
    pub result: FetchResult,
}

impl FetchCompletion {
    pub fn new(request: &FetchRequest, result: FetchResult) -> Self {
        Self {
            node: request.node,
            fetch_id: request.handle.id(),
            result,
        }
    }
}

/// External source of tile data.
///
/// Implementations should watch `cancel` and return
/// [`FetchError::Cancelled`] promptly when it fires.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use quadpager::quadtree::Node;
/// use quadpager::scheduler::{FetchFuture, TileFetcher, TilePayload};
/// use tokio_util::sync::CancellationToken;
///
/// struct Blank;
///
/// impl TileFetcher for Blank {
///     fn fetch(&self, _node: Node, _priority: f64, _cancel: CancellationToken) -> FetchFuture {
///         Box::pin(async { Ok(TilePayload::new(Bytes::new())) })
///     }
/// }
/// ```
pub trait TileFetcher: Send + Sync + 'static {
    /// Starts fetching a node. Higher `priority` should run sooner.
    fn fetch(&self, node: Node, priority: f64, cancel: CancellationToken) -> FetchFuture;

    /// True if the node can be served without network access.
    ///
    /// Used by wait-for-local mode to decide which fetches to wait for.
    fn is_local(&self, _node: &Node) -> bool {
        false
    }
}
