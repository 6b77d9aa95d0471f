#![allow(dead_code)]

pub use pipewright_test_utils::builders;
pub use pipewright_test_utils::{init_tracing, sh, with_timeout};
