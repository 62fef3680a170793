pub mod compile;
pub mod decls;
pub mod distance;
pub mod expr;
pub mod funcs;
pub mod fuzzy;
pub mod lexer;
pub mod loops;
pub mod lower;
pub mod parser;
pub mod store;
pub mod types;
pub mod value;
pub mod vm;

pub use compile::{compile, CompileError};
pub use decls::Decls;
pub use store::{Store, StoreError};
pub use types::Type;
pub use value::Value;
pub use vm::{Program, Stack};

use std::io::Write;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Compile(#[from] CompileError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Evaluate one expression against the store's symbol table and quote the
/// result to `out`, newline-terminated. `limit` caps a top-level list;
/// `parallel` lets the outermost comprehension fan out over worker
/// threads.
pub fn run(
    expr: &str,
    store: &Store,
    limit: Option<usize>,
    parallel: bool,
    out: &mut impl Write,
) -> Result<(), Error> {
    let (mut program, root_type) = compile(expr, store.decls(), parallel)?;
    let result = program.run(&mut Stack::new());
    result.quote(out, &root_type, limit)?;
    writeln!(out)?;
    Ok(())
}
