use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::error;
use tokio::task::JoinSet;

/// Observation hooks invoked by the pool around each claim.
///
/// `started` fires before the worker future is polled, `finished` after it
/// resolves. Hooks for different claims may interleave in completion order,
/// but the pair for a single claim never overlaps itself.
pub trait PoolObserver<T, R>: Send + Sync {
    fn started(&self, index: usize, item: &T);
    fn finished(&self, index: usize, item: &T, result: &R);
}

/// No-op observer for callers that don't track progress.
pub struct NoopObserver;

impl<T, R> PoolObserver<T, R> for NoopObserver {
    fn started(&self, _index: usize, _item: &T) {}
    fn finished(&self, _index: usize, _item: &T, _result: &R) {}
}

/// Runs `worker` over all `items` with at most `concurrency` claims in
/// flight, returning results in item order regardless of completion order.
///
/// Effective concurrency is `max(1, min(concurrency, items.len()))`. Worker
/// failures must be encoded in `R`. A worker that panics forfeits its slot:
/// the panic is logged, the claimer is replaced, and the result vector omits
/// that item; the pool itself never panics. Zero items resolves immediately
/// with no observer calls.
pub async fn run_pool<T, R, W, Fut>(
    items: Vec<T>,
    concurrency: usize,
    worker: W,
    observer: Arc<dyn PoolObserver<T, R>>,
) -> Vec<R>
where
    T: Send + Sync + 'static,
    R: Send + 'static,
    W: Fn(usize, Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    if items.is_empty() {
        return Vec::new();
    }

    let total = items.len();
    let claimers = concurrency.clamp(1, total);

    let items: Arc<Vec<Arc<T>>> = Arc::new(items.into_iter().map(Arc::new).collect());
    let cursor = Arc::new(AtomicUsize::new(0));
    let slots: Arc<Mutex<Vec<Option<R>>>> =
        Arc::new(Mutex::new((0..total).map(|_| None).collect()));
    let worker = Arc::new(worker);

    let spawn_claimer = |tasks: &mut JoinSet<()>| {
        let items = Arc::clone(&items);
        let cursor = Arc::clone(&cursor);
        let slots = Arc::clone(&slots);
        let worker = Arc::clone(&worker);
        let observer = Arc::clone(&observer);

        tasks.spawn(async move {
            loop {
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                if index >= items.len() {
                    break;
                }

                let item = Arc::clone(&items[index]);
                observer.started(index, &item);
                let result = worker(index, Arc::clone(&item)).await;
                observer.finished(index, &item, &result);

                if let Ok(mut guard) = slots.lock() {
                    guard[index] = Some(result);
                }
            }
        });
    };

    let mut tasks = JoinSet::new();
    for _ in 0..claimers {
        spawn_claimer(&mut tasks);
    }

    // A panicking worker takes its claimer down with it; replace the claimer
    // so the remaining queue still drains.
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Pool worker panicked: {}", e);
            spawn_claimer(&mut tasks);
        }
    }

    let mut guard = slots.lock().expect("pool slots mutex");
    let results: Vec<R> = guard.iter_mut().filter_map(|slot| slot.take()).collect();
    if results.len() < total {
        error!(
            "Pool dropped {} result(s) to worker panics",
            total - results.len()
        );
    }
    results
}
