//! End-to-end tests driving the user service router.

#[cfg(test)]
mod common;
#[cfg(test)]
mod system_tests;
#[cfg(test)]
mod throttle_tests;
