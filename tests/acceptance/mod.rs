//! Integration tests for cycle kernel acceptance testing.

mod budget_test;
mod common;
mod concurrency_test;
mod kernel_loop_test;
