//! Integration tests for thinlaunch-lib.

mod common;
mod host_tests;
mod launch_tests;
