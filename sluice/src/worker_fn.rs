use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The per-item work function supplied by the caller.
///
/// Called concurrently from several workers, each time with a different
/// index. Returning `Err` (or panicking) records an
/// [`Outcome::Failure`](crate::Outcome::Failure) for that index and leaves
/// every other item untouched.
#[async_trait]
pub trait ItemWorker<T>: Send + Sync {
    /// Execute the item at `index`.
    async fn execute(&self, index: u64) -> anyhow::Result<T>;
}

#[async_trait]
impl<T, W> ItemWorker<T> for Arc<W>
where
    T: Send + 'static,
    W: ItemWorker<T> + ?Sized,
{
    async fn execute(&self, index: u64) -> anyhow::Result<T> {
        (**self).execute(index).await
    }
}

/// Runs a synchronous closure inline on the worker task.
///
/// Suited to short CPU-bound transforms. Closures that block for long
/// stretches belong in [`BlockingFnWorker`].
pub struct FnWorker<F> {
    f: F,
}

impl<F> fmt::Debug for FnWorker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWorker").finish_non_exhaustive()
    }
}

/// Wrap a synchronous item function.
pub fn fn_worker<T, F>(f: F) -> FnWorker<F>
where
    F: Fn(u64) -> anyhow::Result<T> + Send + Sync,
{
    FnWorker { f }
}

#[async_trait]
impl<T, F> ItemWorker<T> for FnWorker<F>
where
    T: Send + 'static,
    F: Fn(u64) -> anyhow::Result<T> + Send + Sync,
{
    async fn execute(&self, index: u64) -> anyhow::Result<T> {
        (self.f)(index)
    }
}

/// Runs a synchronous closure on tokio's blocking pool.
///
/// The execution slot stays held while the closure runs, so blocking calls
/// (device synchronisation, legacy I/O) still count against the cap.
pub struct BlockingFnWorker<F> {
    f: Arc<F>,
}

impl<F> fmt::Debug for BlockingFnWorker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingFnWorker").finish_non_exhaustive()
    }
}

/// Wrap a blocking item function.
pub fn blocking_worker<T, F>(f: F) -> BlockingFnWorker<F>
where
    T: Send + 'static,
    F: Fn(u64) -> anyhow::Result<T> + Send + Sync + 'static,
{
    BlockingFnWorker { f: Arc::new(f) }
}

#[async_trait]
impl<T, F> ItemWorker<T> for BlockingFnWorker<F>
where
    T: Send + 'static,
    F: Fn(u64) -> anyhow::Result<T> + Send + Sync + 'static,
{
    async fn execute(&self, index: u64) -> anyhow::Result<T> {
        let f = Arc::clone(&self.f);
        match tokio::task::spawn_blocking(move || f(index)).await {
            Ok(result) => result,
            // Re-raise so the item boundary records it as a panic.
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(anyhow::anyhow!("blocking item task did not finish: {err}")),
        }
    }
}

/// Runs an async closure per index.
pub struct AsyncFnWorker<F> {
    f: F,
}

impl<F> fmt::Debug for AsyncFnWorker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFnWorker").finish_non_exhaustive()
    }
}

/// Wrap an async item function.
pub fn async_worker<T, F, Fut>(f: F) -> AsyncFnWorker<F>
where
    F: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    AsyncFnWorker { f }
}

#[async_trait]
impl<T, F, Fut> ItemWorker<T> for AsyncFnWorker<F>
where
    T: Send + 'static,
    F: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    async fn execute(&self, index: u64) -> anyhow::Result<T> {
        (self.f)(index).await
    }
}

/// Adapts a finite list of opaque items to index-based execution: index `i`
/// runs `f(&items[i])`.
pub struct SliceWorker<I, F> {
    items: Arc<[I]>,
    f: F,
}

impl<I, F> fmt::Debug for SliceWorker<I, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceWorker")
            .field("items", &self.items.len())
            .finish_non_exhaustive()
    }
}

impl<I, F> SliceWorker<I, F> {
    pub fn new(items: impl Into<Arc<[I]>>, f: F) -> Self {
        Self {
            items: items.into(),
            f,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl<I, T, F, Fut> ItemWorker<T> for SliceWorker<I, F>
where
    I: Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(&I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    async fn execute(&self, index: u64) -> anyhow::Result<T> {
        let item = usize::try_from(index)
            .ok()
            .and_then(|i| self.items.get(i))
            .ok_or_else(|| anyhow::anyhow!("no item at index {index}"))?;
        (self.f)(item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_worker() {
        let worker = fn_worker(|i| Ok(i * 3));
        assert_eq!(worker.execute(4).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_blocking_worker_propagates_errors() {
        let worker = blocking_worker(|i| {
            if i == 2 {
                anyhow::bail!("device lost");
            }
            Ok(i)
        });
        assert_eq!(worker.execute(1).await.unwrap(), 1);
        assert_eq!(worker.execute(2).await.unwrap_err().to_string(), "device lost");
    }

    #[tokio::test]
    async fn test_async_worker() {
        let worker = async_worker(|i| async move { Ok::<_, anyhow::Error>(format!("item-{i}")) });
        assert_eq!(worker.execute(7).await.unwrap(), "item-7");
    }

    #[tokio::test]
    async fn test_slice_worker_indexes_items() {
        let worker = SliceWorker::new(vec!["a", "b"], |s: &&str| {
            let s = s.to_uppercase();
            async move { Ok::<_, anyhow::Error>(s) }
        });
        assert_eq!(worker.len(), 2);
        assert_eq!(worker.execute(1).await.unwrap(), "B");
        assert!(worker.execute(2).await.is_err());
    }

    #[tokio::test]
    async fn test_arc_worker_delegates() {
        let worker: Arc<dyn ItemWorker<u64>> = Arc::new(fn_worker(|i| Ok(i + 1)));
        assert_eq!(worker.execute(1).await.unwrap(), 2);
    }
}
