// src/lib.rs
//
// Salary structure resolution and payroll run engine. The resolver turns
// an employee's declarative component rules into concrete amounts; the
// payroll engine aggregates attendance and leave into payable days,
// pro-rates days-based components, and drives asynchronous report
// generation. Everything reaches storage through the repository traits in
// `store`; the HTTP layer in `http` is a thin JSON surface over the
// engine.

pub mod attendance;
pub mod config;
pub mod domain;
pub mod http;
pub mod payroll;
pub mod store;
pub mod structure;
