//! Integration points for a host storage engine.
//!
//! The filter itself is a passive in-memory structure; an embedding
//! engine typically resolves an asynchronous block read to obtain the
//! serialized bytes and then signals its own continuation. The trait
//! here is that continuation's shape. The filter never schedules or
//! cancels completions; it only gives the host a uniform handle to
//! finish.

use crate::error::FormatError;

/// Result the host observes for the read that produced (or failed to
/// produce) a filter block.
pub type Status = Result<(), FormatError>;

/// A host-supplied completion handle.
///
/// [`complete`](Completion::complete) consumes the handle, mirroring
/// engines that free the continuation once it has fired. Use
/// [`finish`](Completion::finish) directly to signal without giving up
/// ownership.
pub trait Completion {
    /// Observe the outcome of the outer operation.
    fn finish(&mut self, status: Status);

    /// Signal and drop the handle.
    fn complete(mut self: Box<Self>, status: Status) {
        self.finish(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandle {
        fired: Arc<AtomicUsize>,
    }

    impl Completion for CountingHandle {
        fn finish(&mut self, status: Status) {
            assert!(status.is_ok());
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_complete_consumes_handle() {
        let fired = Arc::new(AtomicUsize::new(0));
        let handle: Box<dyn Completion> = Box::new(CountingHandle {
            fired: Arc::clone(&fired),
        });
        handle.complete(Ok(()));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
