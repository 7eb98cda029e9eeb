//! Reversible functional options.
//!
//! An [`Opt`] mutates some configuration target and hands back another `Opt`
//! that exactly reverses the change. Applying an option once is a permanent
//! reconfiguration; keeping the returned inverse and applying it later makes
//! the change temporary.
//!
//! # Examples
//!
//! ```
//! use followcall::Opt;
//!
//! #[derive(Debug, Default)]
//! struct Settings {
//!     retries: usize,
//! }
//!
//! let mut settings = Settings::default();
//! let undo = Opt::set(|s: &mut Settings| &mut s.retries, 5).apply(&mut settings);
//! assert_eq!(settings.retries, 5);
//!
//! undo.apply(&mut settings);
//! assert_eq!(settings.retries, 0);
//! ```

use std::fmt;
use std::sync::Arc;

/// A configuration change to `T` that returns its own inverse when applied.
///
/// Options are cheap to clone and may be shared between threads, so the same
/// option can be applied any number of times.
pub struct Opt<T: ?Sized> {
    apply: Arc<dyn Fn(&mut T) -> Opt<T> + Send + Sync>,
}

impl<T: ?Sized + 'static> Opt<T> {
    /// Creates an option from a function that mutates the target and returns
    /// the inverse option.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut T) -> Opt<T> + Send + Sync + 'static,
    {
        Self { apply: Arc::new(f) }
    }

    /// Applies the option and returns the option that undoes it.
    pub fn apply(&self, target: &mut T) -> Opt<T> {
        (self.apply)(target)
    }

    /// An option that changes nothing. Its inverse is also a no-op.
    pub fn noop() -> Self {
        Self::new(|_| Opt::noop())
    }

    /// Replaces the field selected by `field` with `value`.
    ///
    /// The inverse puts back whatever value the field held when the option
    /// was applied.
    pub fn set<V>(field: fn(&mut T) -> &mut V, value: V) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        Self::new(move |target| {
            let previous = std::mem::replace(field(target), value.clone());
            Opt::set(field, previous)
        })
    }

    /// Combines several options into one that applies them in order.
    ///
    /// The inverse applies the individual inverses in reverse order.
    pub fn all(opts: impl IntoIterator<Item = Opt<T>>) -> Self {
        let opts: Vec<Opt<T>> = opts.into_iter().collect();
        Self::new(move |target| {
            let mut undo: Vec<Opt<T>> = opts.iter().map(|opt| opt.apply(target)).collect();
            undo.reverse();
            Opt::all(undo)
        })
    }
}

impl<T: ?Sized> Clone for Opt<T> {
    fn clone(&self) -> Self {
        Self {
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Opt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opt").finish_non_exhaustive()
    }
}
