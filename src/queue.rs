//! Per-key FIFO task queue.
//!
//! Each key has a lane holding a `running` flag and a FIFO of waiters. A task
//! claims its place in its lane when [`TaskQueue::enqueue`] is *called*, not
//! when the returned future is first polled, so execution order always equals
//! call order. At most one task per key runs at a time; tasks on different
//! keys never wait on each other. A task's failure is its own: the slot is
//! handed to the next waiter whatever the task returned, and also when its
//! future is dropped early.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

#[derive(Default)]
struct Lane {
    running: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

type Lanes<K> = Arc<Mutex<HashMap<K, Lane>>>;

/// Serializes tasks per key.
pub struct TaskQueue<K> {
    lanes: Lanes<K>,
}

impl<K> Default for TaskQueue<K> {
    fn default() -> Self {
        Self {
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> Clone for TaskQueue<K> {
    fn clone(&self) -> Self {
        Self {
            lanes: self.lanes.clone(),
        }
    }
}

impl<K> std::fmt::Debug for TaskQueue<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("lanes", &self.lanes.lock().len())
            .finish()
    }
}

impl<K> TaskQueue<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` behind every task previously enqueued on `key`.
    ///
    /// The place in line is taken immediately; `task` is only invoked once
    /// every earlier task on `key` has settled.
    pub fn enqueue<F, Fut, T>(&self, key: K, task: F) -> impl Future<Output = T> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut ticket = self.claim(key);
        async move {
            ticket.acquire().await;
            let output = task().await;
            drop(ticket);
            output
        }
    }

    /// Whether a task on `key` currently holds the slot.
    pub fn in_flight(&self, key: &K) -> bool {
        self.lanes.lock().get(key).is_some_and(|lane| lane.running)
    }

    /// Number of tasks waiting behind the running one on `key`.
    pub fn waiting(&self, key: &K) -> usize {
        self.lanes
            .lock()
            .get(key)
            .map_or(0, |lane| lane.waiters.iter().filter(|w| !w.is_closed()).count())
    }

    fn claim(&self, key: K) -> Ticket<K> {
        let mut lanes = self.lanes.lock();
        let lane = lanes.entry(key.clone()).or_default();

        let state = if lane.running {
            let (tx, rx) = oneshot::channel();
            lane.waiters.push_back(tx);
            TicketState::Waiting(rx)
        } else {
            lane.running = true;
            TicketState::Holding
        };

        Ticket {
            lanes: self.lanes.clone(),
            key,
            state,
        }
    }
}

/// Hand the slot of `key` to the next live waiter, or mark the lane idle.
fn release<K: Eq + Hash>(lanes: &Lanes<K>, key: &K) {
    let mut lanes = lanes.lock();
    let Some(lane) = lanes.get_mut(key) else {
        return;
    };

    while let Some(waiter) = lane.waiters.pop_front() {
        // A closed receiver belongs to a task whose future was dropped.
        if waiter.send(()).is_ok() {
            return;
        }
    }

    lanes.remove(key);
}

enum TicketState {
    Waiting(oneshot::Receiver<()>),
    Holding,
    Released,
}

/// A place in a lane. Releases the slot on drop if it holds it.
struct Ticket<K: Eq + Hash> {
    lanes: Lanes<K>,
    key: K,
    state: TicketState,
}

impl<K: Eq + Hash> Ticket<K> {
    async fn acquire(&mut self) {
        if let TicketState::Waiting(rx) = &mut self.state {
            // The sender is only dropped after a failed send, which requires
            // this receiver to be closed first; a successful recv grants the slot.
            let _ = rx.await;
            self.state = TicketState::Holding;
        }
    }
}

impl<K: Eq + Hash> Drop for Ticket<K> {
    fn drop(&mut self) {
        let holding = match std::mem::replace(&mut self.state, TicketState::Released) {
            TicketState::Holding => true,
            TicketState::Waiting(mut rx) => {
                rx.close();
                // The slot may have been handed over after the last poll.
                rx.try_recv().is_ok()
            }
            TicketState::Released => false,
        };

        if holding {
            release(&self.lanes, &self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[tokio::test]
    async fn test_runs_in_call_order_regardless_of_poll_order() {
        let queue = TaskQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut futures = Vec::new();
        for i in 0..4 {
            let log = log.clone();
            futures.push(queue.enqueue("webm", move || async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                log.lock().push(i);
                i
            }));
        }

        // Spawn in reverse order; the queue still runs them in call order.
        let mut handles = Vec::new();
        for future in futures.into_iter().rev() {
            handles.push(tokio::spawn(future));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*log.lock(), vec![0, 1, 2, 3]);
        assert!(!queue.in_flight(&"webm"));
    }

    #[tokio::test]
    async fn test_failure_does_not_block_successors() {
        let queue = TaskQueue::new();

        let first = queue.enqueue("mp4", || async { Err::<u32, &str>("boom") });
        let second = queue.enqueue("mp4", || async { Ok::<u32, &str>(2) });

        let (first, second) = tokio::join!(first, second);
        assert_eq!(first, Err("boom"));
        assert_eq!(second, Ok(2));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let queue = TaskQueue::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocked = tokio::spawn(queue.enqueue("webm", || async move {
            let _ = release_rx.await;
            "webm"
        }));

        // mp4 completes while webm is still holding its slot.
        let other = queue.enqueue("mp4", || async { "mp4" }).await;
        assert_eq!(other, "mp4");
        assert!(queue.in_flight(&"webm"));

        release_tx.send(()).unwrap();
        assert_eq!(blocked.await.unwrap(), "webm");
    }

    #[test]
    fn test_waiter_is_woken_when_slot_is_released() {
        let queue = TaskQueue::new();
        let mut first = task::spawn(queue.enqueue("webm", || async { 1 }));
        let mut second = task::spawn(queue.enqueue("webm", || async { 2 }));

        assert_pending!(second.poll());
        assert_ready_eq!(first.poll(), 1);
        assert!(second.is_woken());
        assert_ready_eq!(second.poll(), 2);
        assert!(!queue.in_flight(&"webm"));
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_skipped() {
        let queue = TaskQueue::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = tokio::spawn(queue.enqueue("webm", || async move {
            let _ = release_rx.await;
            1
        }));
        let abandoned = queue.enqueue("webm", || async { 2 });
        let third = queue.enqueue("webm", || async { 3 });
        assert_eq!(queue.waiting(&"webm"), 2);

        drop(abandoned);
        assert_eq!(queue.waiting(&"webm"), 1);

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(third.await, 3);
        assert!(!queue.in_flight(&"webm"));
    }

    #[tokio::test]
    async fn test_at_most_one_in_flight() {
        let queue = TaskQueue::new();
        let active = Arc::new(Mutex::new((0usize, 0usize)));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let active = active.clone();
            handles.push(tokio::spawn(queue.enqueue("webm", move || async move {
                {
                    let mut guard = active.lock();
                    guard.0 += 1;
                    guard.1 = guard.1.max(guard.0);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.lock().0 -= 1;
            })));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(active.lock().1, 1);
    }
}
