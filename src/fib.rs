//! Fibonacci numbers for the `fib` subcommand.

use crate::error::{PsqlHelperError, Result};

/// The n-th Fibonacci number, 1-indexed: `fib(1) == fib(2) == 1`.
///
/// Fails for `n == 0` and once the value no longer fits in a `u128`
/// (`n > 186`).
pub fn fib(n: u32) -> Result<u128> {
    if n == 0 {
        return Err(PsqlHelperError::invalid_argument(
            "n must be a positive integer",
        ));
    }

    // (current, previous) starting at (fib(1), fib(0))
    let (mut current, mut previous): (u128, u128) = (1, 0);
    for _ in 1..n {
        let next = current.checked_add(previous).ok_or_else(|| {
            PsqlHelperError::invalid_argument(format!(
                "the {}-th Fibonacci number does not fit in 128 bits",
                n
            ))
        })?;
        previous = current;
        current = next;
    }
    Ok(current)
}
