//! Query compilation.
//!
//! Turns untyped filter, sort and paging input into a schema-checked
//! [`Params`](tessera_proto::Params) value. Evaluating the result is the
//! persistence gateway's job.

mod compiler;

pub use compiler::{QueryCompiler, RawQuery};
