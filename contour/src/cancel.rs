//! Cooperative cancellation signal shared between a cache entry's waiters
//! and its in-flight producer.

use std::{
	future::Future,
	pin::Pin,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex,
	},
	task::{Context, Poll, Waker},
};

#[derive(Default)]
struct State {
	fired: AtomicBool,
	wakers: Mutex<Vec<Waker>>,
}

/// A cloneable, fireable cancellation flag. Firing is level-triggered: any
/// clone created before or after firing observes it.
#[derive(Clone, Default)]
pub struct CancelSignal(Arc<State>);

impl CancelSignal {
	pub fn new() -> Self { Self::default() }

	/// Fire the signal, waking every task awaiting [`CancelSignal::cancelled`].
	pub fn cancel(&self) {
		if !self.0.fired.swap(true, Ordering::AcqRel) {
			for waker in self.0.wakers.lock().unwrap().drain(..) {
				waker.wake();
			}
		}
	}

	pub fn is_canceled(&self) -> bool { self.0.fired.load(Ordering::Acquire) }

	/// A future that resolves once this signal fires.
	pub fn cancelled(&self) -> Cancelled { Cancelled(self.0.clone()) }
}

pub struct Cancelled(Arc<State>);

impl Future for Cancelled {
	type Output = ();

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
		if self.0.fired.load(Ordering::Acquire) {
			return Poll::Ready(());
		}
		self.0.wakers.lock().unwrap().push(cx.waker().clone());
		// Re-check: `cancel` may have fired between the load above and
		// registering the waker.
		if self.0.fired.load(Ordering::Acquire) {
			Poll::Ready(())
		} else {
			Poll::Pending
		}
	}
}
