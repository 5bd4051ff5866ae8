//! Resource limits for sandboxed execution
//!
//! These limits prevent runaway scripts from consuming excessive resources.
//!
//! # Fail Points (enabled with `failpoints` feature)
//!
//! - `limits::tick_command` - Inject failures in command counting
//! - `limits::tick_loop` - Inject failures in loop iteration counting
//! - `limits::push_function` - Inject failures in call depth tracking

use std::time::{Duration, Instant};

#[cfg(feature = "failpoints")]
use fail::fail_point;

/// Resource limits for script execution.
///
/// Every limit is a hard bound: exceeding it aborts the invocation with a
/// fatal limit error (exit status 2) rather than degrading behavior.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Maximum number of commands that can be executed (fuel model)
    /// Default: 100,000
    pub max_commands: u64,

    /// Maximum iterations for a single loop
    /// Default: 1,000,000
    pub max_loop_iterations: u64,

    /// Maximum function call depth (recursion limit)
    /// Default: 1,000
    pub max_call_depth: u32,

    /// Optional wall-clock budget for the whole invocation.
    /// Checked at suspension points and on every loop iteration.
    pub timeout: Option<Duration>,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_commands: 100_000,
            max_loop_iterations: 1_000_000,
            max_call_depth: 1_000,
            timeout: None,
        }
    }
}

impl ExecutionLimits {
    /// Create new limits with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum command count
    pub fn max_commands(mut self, count: u64) -> Self {
        self.max_commands = count;
        self
    }

    /// Set maximum loop iterations
    pub fn max_loop_iterations(mut self, count: u64) -> Self {
        self.max_loop_iterations = count;
        self
    }

    /// Set maximum function call depth
    pub fn max_call_depth(mut self, depth: u32) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Set a wall-clock timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Execution counters for tracking resource usage.
///
/// One set of counters lives per invocation and is shared across subshells
/// and command substitutions; a script cannot reset its fuel by forking.
#[derive(Debug, Clone)]
pub struct ExecutionCounters {
    /// Number of commands executed
    pub commands: u64,

    /// Current function call depth
    pub call_depth: u32,

    /// Deadline derived from the timeout at invocation start
    deadline: Option<Instant>,

    /// A limit that already tripped. Once set, every further check fails
    /// with it again: a tripped limit cannot be outrun by unwinding into a
    /// subshell boundary.
    poisoned: Option<LimitExceeded>,
}

impl Default for ExecutionCounters {
    fn default() -> Self {
        Self {
            commands: 0,
            call_depth: 0,
            deadline: None,
            poisoned: None,
        }
    }
}

impl ExecutionCounters {
    /// Create counters for one invocation, arming the deadline if a timeout
    /// is configured.
    pub fn start(limits: &ExecutionLimits) -> Self {
        Self {
            commands: 0,
            call_depth: 0,
            deadline: limits.timeout.map(|t| Instant::now() + t),
            poisoned: None,
        }
    }

    /// Record a tripped limit; returns true when this is the first trip.
    pub fn poison(&mut self, limit: LimitExceeded) -> bool {
        let first = self.poisoned.is_none();
        if first {
            self.poisoned = Some(limit);
        }
        first
    }

    /// Increment command counter, returns error if limit exceeded
    pub fn tick_command(&mut self, limits: &ExecutionLimits) -> Result<(), LimitExceeded> {
        #[cfg(feature = "failpoints")]
        fail_point!("limits::tick_command", |action| {
            match action.as_deref() {
                Some("skip_increment") => return Ok(()),
                Some("force_overflow") => {
                    self.commands = u64::MAX;
                    return Err(LimitExceeded::MaxCommands(limits.max_commands));
                }
                _ => {}
            }
            Ok(())
        });

        self.commands += 1;
        if self.commands > limits.max_commands {
            return Err(LimitExceeded::MaxCommands(limits.max_commands));
        }
        self.check_deadline()
    }

    /// Check one loop iteration against the per-loop bound and the deadline.
    ///
    /// Loops keep their own iteration count (nested loops each get a fresh
    /// bound); this only validates it and the wall clock.
    pub fn tick_loop(
        &mut self,
        iterations: u64,
        limits: &ExecutionLimits,
    ) -> Result<(), LimitExceeded> {
        #[cfg(feature = "failpoints")]
        fail_point!("limits::tick_loop", |action| {
            if action.as_deref() == Some("skip_check") {
                return Ok(());
            }
            Ok(())
        });

        if iterations > limits.max_loop_iterations {
            return Err(LimitExceeded::MaxLoopIterations(limits.max_loop_iterations));
        }
        self.check_deadline()
    }

    /// Push a function call, returns error if depth exceeded
    pub fn push_function(&mut self, limits: &ExecutionLimits) -> Result<(), LimitExceeded> {
        #[cfg(feature = "failpoints")]
        fail_point!("limits::push_function", |action| {
            if action.as_deref() == Some("skip_check") {
                self.call_depth += 1;
                return Ok(());
            }
            Ok(())
        });

        // Check before incrementing so we don't leave invalid state on failure
        if self.call_depth >= limits.max_call_depth {
            return Err(LimitExceeded::MaxCallDepth(limits.max_call_depth));
        }
        self.call_depth += 1;
        Ok(())
    }

    /// Pop a function call
    pub fn pop_function(&mut self) {
        if self.call_depth > 0 {
            self.call_depth -= 1;
        }
    }

    /// Raise `Timeout` once the wall-clock deadline has passed, and re-raise
    /// any limit that already tripped.
    pub fn check_deadline(&self) -> Result<(), LimitExceeded> {
        if let Some(poisoned) = &self.poisoned {
            return Err(poisoned.clone());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(LimitExceeded::Timeout),
            _ => Ok(()),
        }
    }
}

/// Error returned when a resource limit is exceeded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitExceeded {
    #[error("maximum command count exceeded ({0})")]
    MaxCommands(u64),

    #[error("maximum loop iterations exceeded ({0})")]
    MaxLoopIterations(u64),

    #[error("maximum function call depth exceeded ({0})")]
    MaxCallDepth(u32),

    #[error("execution timed out")]
    Timeout,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.max_commands, 100_000);
        assert_eq!(limits.max_loop_iterations, 1_000_000);
        assert_eq!(limits.max_call_depth, 1_000);
        assert!(limits.timeout.is_none());
    }

    #[test]
    fn builder_pattern() {
        let limits = ExecutionLimits::new()
            .max_commands(100)
            .max_loop_iterations(50)
            .max_call_depth(10)
            .timeout(Duration::from_secs(5));

        assert_eq!(limits.max_commands, 100);
        assert_eq!(limits.max_loop_iterations, 50);
        assert_eq!(limits.max_call_depth, 10);
        assert_eq!(limits.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn command_counter_trips_at_limit() {
        let limits = ExecutionLimits::new().max_commands(5);
        let mut counters = ExecutionCounters::start(&limits);

        for _ in 0..5 {
            assert!(counters.tick_command(&limits).is_ok());
        }

        assert_eq!(
            counters.tick_command(&limits),
            Err(LimitExceeded::MaxCommands(5))
        );
    }

    #[test]
    fn loop_counter_is_per_loop() {
        let limits = ExecutionLimits::new().max_loop_iterations(3);
        let mut counters = ExecutionCounters::start(&limits);

        for i in 1..=3 {
            assert!(counters.tick_loop(i, &limits).is_ok());
        }
        assert_eq!(
            counters.tick_loop(4, &limits),
            Err(LimitExceeded::MaxLoopIterations(3))
        );

        // A new loop starts its own count.
        assert!(counters.tick_loop(1, &limits).is_ok());
    }

    #[test]
    fn call_depth_pushes_and_pops() {
        let limits = ExecutionLimits::new().max_call_depth(2);
        let mut counters = ExecutionCounters::start(&limits);

        assert!(counters.push_function(&limits).is_ok());
        assert!(counters.push_function(&limits).is_ok());
        assert_eq!(
            counters.push_function(&limits),
            Err(LimitExceeded::MaxCallDepth(2))
        );

        counters.pop_function();
        assert!(counters.push_function(&limits).is_ok());
    }

    #[test]
    fn deadline_expires() {
        let limits = ExecutionLimits::new().timeout(Duration::from_millis(0));
        let counters = ExecutionCounters::start(&limits);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(counters.check_deadline(), Err(LimitExceeded::Timeout));
    }

    #[test]
    fn no_deadline_never_expires() {
        let counters = ExecutionCounters::default();
        assert!(counters.check_deadline().is_ok());
    }
}
