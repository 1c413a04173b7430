//! Stack growth for deep recursion.
//!
//! Evaluation recurses once per nested form and once per user function call,
//! so a recursive program can go far deeper than the native thread stack
//! allows. [`ensure_sufficient_stack`] grows the stack on demand with
//! `stacker`, leaving [`Config::max_eval_depth`](crate::Config) as the only
//! bound on recursion.

/// Run `f`, first growing the stack if less than the red zone remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    /// Minimum stack space to keep available (100KB red zone).
    const RED_ZONE: usize = 100 * 1024;

    /// Stack space to allocate when growing (1MB).
    const STACK_PER_RECURSION: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
