use std::cell::Cell;

thread_local! {
    /// A thread-local flag that controls whether gradients are accumulated into parameters.
    static IS_GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Temporarily disables gradient accumulation within the executed closure.
/// Use this for evaluation loops that call backward helpers but must not
/// touch parameter gradient buffers.
pub fn with_no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = GradModeGuard {
        prev: IS_GRAD_ENABLED.with(|flag| flag.replace(false)),
    };
    f()
}

/// Restores the previous grad mode on drop, including during unwinding.
struct GradModeGuard {
    prev: bool,
}

impl Drop for GradModeGuard {
    fn drop(&mut self) {
        IS_GRAD_ENABLED.with(|flag| flag.set(self.prev));
    }
}

/// Returns whether gradient accumulation is currently active on this thread.
pub fn is_grad_enabled() -> bool {
    IS_GRAD_ENABLED.with(|flag| flag.get())
}
