//! Thread policies for the per-event likelihood reduction.
//!
//! An [`ExecutionContext`] is created once per analysis and reused for every evaluation of
//! every bin. With [`ThreadPolicy::Dedicated`] the thread count is fixed, so the order in which
//! partial sums are combined (and therefore the last bits of every `-2 ln L` value) is the same
//! run to run.
//!
//! - [`ThreadPolicy::Single`]: runs on the caller thread with a serial sum.
//! - [`ThreadPolicy::GlobalPool`]: uses the global Rayon pool when available.
//! - [`ThreadPolicy::Dedicated`]: creates a private Rayon pool; reuse the context.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{AngfitError, AngfitResult};

/// Thread-policy options for [`ExecutionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadPolicy {
    /// Run work on the current thread.
    Single,
    /// Use the global Rayon pool.
    GlobalPool,
    /// Use a dedicated Rayon pool with `n_threads`.
    Dedicated(usize),
}

impl ThreadPolicy {
    /// The policy selected by a requested thread count: `0` means the global pool, `1` a
    /// single thread, anything else a dedicated pool of that size.
    pub fn from_threads(n_threads: usize) -> Self {
        match n_threads {
            0 => Self::GlobalPool,
            1 => Self::Single,
            n => Self::Dedicated(n),
        }
    }
}

impl Default for ThreadPolicy {
    fn default() -> Self {
        if cfg!(feature = "rayon") {
            Self::GlobalPool
        } else {
            Self::Single
        }
    }
}

impl Display for ThreadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadPolicy::Single => write!(f, "single"),
            ThreadPolicy::GlobalPool => write!(f, "global"),
            ThreadPolicy::Dedicated(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for ThreadPolicy {
    type Err = AngfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "global" | "globalpool" => Ok(Self::GlobalPool),
            other => other
                .parse::<usize>()
                .map(Self::from_threads)
                .map_err(|_| AngfitError::ParseError {
                    name: s.to_string(),
                    object: "ThreadPolicy".to_string(),
                }),
        }
    }
}

/// Execution context owning the thread policy (and, for [`ThreadPolicy::Dedicated`], the
/// thread pool).
#[derive(Debug)]
pub struct ExecutionContext {
    thread_policy: ThreadPolicy,
    #[cfg(feature = "rayon")]
    dedicated_pool: Option<rayon::ThreadPool>,
}

impl ExecutionContext {
    /// Create a new context with the requested thread policy.
    ///
    /// Returns an error when the requested policy is incompatible with the current feature set
    /// (for example, non-single policy without `rayon`) or when a dedicated pool size is invalid.
    pub fn new(thread_policy: ThreadPolicy) -> AngfitResult<Self> {
        #[cfg(not(feature = "rayon"))]
        {
            if thread_policy != ThreadPolicy::Single {
                return Err(AngfitError::ExecutionContextError {
                    reason: "Rayon feature is required for non-single thread policies".into(),
                });
            }
        }

        #[cfg(feature = "rayon")]
        let dedicated_pool = match thread_policy {
            ThreadPolicy::Dedicated(n_threads) => {
                if n_threads == 0 {
                    return Err(AngfitError::ExecutionContextError {
                        reason: "Dedicated thread pool size must be >= 1".into(),
                    });
                }
                Some(
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(n_threads)
                        .build()?,
                )
            }
            ThreadPolicy::Single | ThreadPolicy::GlobalPool => None,
        };

        Ok(Self {
            thread_policy,
            #[cfg(feature = "rayon")]
            dedicated_pool,
        })
    }

    /// A context running everything on the caller thread.
    pub fn single() -> Self {
        Self {
            thread_policy: ThreadPolicy::Single,
            #[cfg(feature = "rayon")]
            dedicated_pool: None,
        }
    }

    /// Return the configured thread policy.
    pub fn thread_policy(&self) -> ThreadPolicy {
        self.thread_policy
    }

    /// Whether reductions under this context may run in parallel.
    pub fn is_parallel(&self) -> bool {
        cfg!(feature = "rayon") && self.thread_policy != ThreadPolicy::Single
    }

    /// Execute work under this context's thread policy.
    ///
    /// `Dedicated` runs inside the dedicated pool. Other policies run the closure directly.
    #[cfg(feature = "rayon")]
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.dedicated_pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Execute work under this context's thread policy.
    #[cfg(not(feature = "rayon"))]
    pub fn install<R>(&self, op: impl FnOnce() -> R) -> R {
        op()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            thread_policy: ThreadPolicy::default(),
            #[cfg(feature = "rayon")]
            dedicated_pool: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_threads() {
        assert_eq!(ThreadPolicy::from_threads(0), ThreadPolicy::GlobalPool);
        assert_eq!(ThreadPolicy::from_threads(1), ThreadPolicy::Single);
        assert_eq!(ThreadPolicy::from_threads(4), ThreadPolicy::Dedicated(4));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "single".parse::<ThreadPolicy>().unwrap(),
            ThreadPolicy::Single
        );
        assert_eq!(
            "Global".parse::<ThreadPolicy>().unwrap(),
            ThreadPolicy::GlobalPool
        );
        assert_eq!(
            "3".parse::<ThreadPolicy>().unwrap(),
            ThreadPolicy::Dedicated(3)
        );
        assert!("many".parse::<ThreadPolicy>().is_err());
    }

    #[test]
    fn test_single_context() {
        let ctx = ExecutionContext::new(ThreadPolicy::Single).unwrap();
        assert!(!ctx.is_parallel());
        assert_eq!(ctx.install(|| 2 + 2), 4);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_dedicated_context() {
        assert!(ExecutionContext::new(ThreadPolicy::Dedicated(0)).is_err());
        let ctx = ExecutionContext::new(ThreadPolicy::Dedicated(2)).unwrap();
        assert!(ctx.is_parallel());
        assert_eq!(ctx.install(rayon::current_num_threads), 2);
    }

    #[cfg(not(feature = "rayon"))]
    #[test]
    fn test_parallel_requires_rayon() {
        assert!(ExecutionContext::new(ThreadPolicy::GlobalPool).is_err());
    }
}
