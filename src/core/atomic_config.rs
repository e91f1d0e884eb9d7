//! Copy-on-write holder for a validated configuration snapshot.
//!
//! Readers get an `Arc` to the current snapshot without blocking. Writers are
//! serialized: each update clones the snapshot, mutates the clone, validates
//! it and only then publishes it. Snapshots already handed out never change.
use std::{
    convert::Infallible,
    sync::{Arc, Mutex},
};

use arc_swap::ArcSwap;
use tracing::info;

/// A value that can check its own invariants before being published.
pub trait Validate {
    type Error: std::error::Error + Send + Sync + 'static;

    fn validate(&self) -> Result<(), Self::Error>;
}

/// Why an update was discarded
#[derive(Debug, thiserror::Error)]
pub enum UpdateError<E, V> {
    #[error("update rejected: {0}")]
    Mutator(E),

    #[error("updated configuration is invalid: {0}")]
    Validation(V),
}

pub struct AtomicConfig<T> {
    current: ArcSwap<T>,
    write_lock: Mutex<()>,
}

impl<T> AtomicConfig<T>
where
    T: Clone + Validate,
{
    pub fn new(initial: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            write_lock: Mutex::new(()),
        }
    }

    /// Current snapshot. Never blocks.
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Apply `mutator` to a copy of the current snapshot and publish the copy
    /// if both the mutator and validation succeed.
    ///
    /// On failure the visible snapshot is left untouched.
    pub fn update<F, E>(&self, mutator: F) -> Result<Arc<T>, UpdateError<E, T::Error>>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
    {
        // A writer that panicked mid-mutation never published anything.
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut next = T::clone(&self.current.load());
        mutator(&mut next).map_err(UpdateError::Mutator)?;
        next.validate().map_err(UpdateError::Validation)?;

        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        info!("Configuration snapshot replaced");
        Ok(next)
    }

    /// Replace the snapshot wholesale, validating first.
    pub fn replace(&self, value: T) -> Result<Arc<T>, UpdateError<Infallible, T::Error>> {
        self.update(|current| {
            *current = value;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        value: i64,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("negative value {0}")]
    struct Negative(i64);

    impl Validate for Counter {
        type Error = Negative;

        fn validate(&self) -> Result<(), Negative> {
            if self.value < 0 {
                Err(Negative(self.value))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn sequential_reads_are_identical() {
        let config = AtomicConfig::new(Counter { value: 1 });
        let a = config.get();
        let b = config.get();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn update_publishes_new_snapshot_only() {
        let config = AtomicConfig::new(Counter { value: 1 });
        let before = config.get();

        let after = config
            .update(|c| {
                c.value = 2;
                Ok::<_, ()>(())
            })
            .unwrap();

        assert_eq!(before.value, 1);
        assert_eq!(after.value, 2);
        assert_eq!(config.get().value, 2);
    }

    #[test]
    fn mutator_error_keeps_snapshot() {
        let config = AtomicConfig::new(Counter { value: 1 });
        let result = config.update(|c| {
            c.value = 100;
            Err("nope")
        });
        assert!(matches!(result, Err(UpdateError::Mutator("nope"))));
        assert_eq!(config.get().value, 1);
    }

    #[test]
    fn validation_error_keeps_snapshot() {
        let config = AtomicConfig::new(Counter { value: 1 });
        let result = config.update(|c| {
            c.value = -5;
            Ok::<_, ()>(())
        });
        assert!(matches!(result, Err(UpdateError::Validation(Negative(-5)))));
        assert_eq!(*config.get(), Counter { value: 1 });
    }

    #[test]
    fn replace_validates() {
        let config = AtomicConfig::new(Counter { value: 1 });
        assert!(config.replace(Counter { value: -1 }).is_err());
        assert_eq!(config.replace(Counter { value: 7 }).unwrap().value, 7);
    }
}
