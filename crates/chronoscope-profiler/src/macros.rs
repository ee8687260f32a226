//! Profiling macros over the global context.

/// Create a profiling scope that measures execution time until end of scope.
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
///
/// # Examples
///
/// ```ignore
/// use chronoscope_profiler::{profile_scope, Tag};
///
/// fn rebuild_pool() {
///     profile_scope!("Pool", "Rebuild");
///     // ... work
/// } // session completes here
/// ```
///
/// With a prebuilt tag:
/// ```ignore
/// profile_scope!(Tag::new("Pool", "Rebuild"));
/// ```
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_scope {
    ($tag:expr) => {
        let _chronoscope_session = $crate::begin_scope($tag);
    };
    ($category:expr, $name:expr) => {
        let _chronoscope_session = $crate::begin_scope_in($category, $name);
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_scope {
    ($tag:expr) => {};
    ($category:expr, $name:expr) => {};
}

/// Record a duration directly (for when you already have the timing).
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
///
/// # Examples
///
/// ```ignore
/// use chronoscope_profiler::{profile_duration, Tag};
/// use std::time::Instant;
///
/// let start = Instant::now();
/// do_work();
/// profile_duration!(Tag::new("Sample", "work"), start.elapsed());
/// ```
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_duration {
    ($tag:expr, $duration:expr) => {
        $crate::record_duration($tag, $duration);
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_duration {
    ($tag:expr, $duration:expr) => {};
}

#[cfg(test)]
mod tests {
    #![cfg_attr(not(feature = "profiling"), allow(unused_imports))]

    use chronoscope_core::Tag;
    use std::time::Duration;

    #[test]
    fn macros_expand_in_statement_position() {
        fn instrumented() -> u32 {
            profile_scope!("Macros", "Scope");
            profile_scope!(Tag::new("Macros", "Tagged"));
            profile_duration!(Tag::new("Macros", "Duration"), Duration::from_micros(5));
            7
        }
        // Nothing is initialized here, so the scopes are inert either way.
        assert_eq!(instrumented(), 7);
    }
}
