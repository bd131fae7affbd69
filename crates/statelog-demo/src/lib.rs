#![forbid(unsafe_code)]

//! statelog demo: a counter and a todo list instrumented with tracked
//! values, watched by the floating dashboard.

pub mod app;
pub mod cli;
pub mod script;
pub mod terminal;
