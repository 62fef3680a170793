use serde::Serialize;

use crate::decls::Decls;
use crate::lexer::{lex, SourceMap};
use crate::lower::Lower;
use crate::parser::Parser;
use crate::types::Type;
use crate::vm::Program;

/// A structured compilation failure. Lex and parse errors carry a real
/// line/column; declaration errors report 0/0 because they concern the
/// expression as a whole.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{error}")]
pub struct CompileError {
    pub error: String,
    pub line: usize,
    pub column: usize,
}

/// Compile an expression against a populated declarations table into a
/// runnable program and its result type.
///
/// Declaration errors accumulate, so a user sees everything wrong with
/// the expression in one verify pass, but no code is emitted when any are
/// present, and the first error wins the report. `parallel` marks the
/// outermost comprehension for worker fan-out.
pub fn compile(source: &str, mut decls: Decls, parallel: bool) -> Result<(Program, Type), CompileError> {
    let map = SourceMap::new(source);
    let positioned = |error: String, position: usize| {
        let (line, column) = map.lookup(position);
        CompileError { error, line, column }
    };

    let tokens = lex(source).map_err(|e| positioned(e.to_string(), e.position))?;
    let ast = Parser::new(tokens, source.len())
        .parse()
        .map_err(|e| positioned(e.to_string(), e.position))?;

    decls.strict(true);
    let mut lower = Lower::new(&mut decls, parallel);
    let root = lower.expr(&ast);
    let loop_count = lower.loop_count();

    let (root_type, errors) = decls.verify(root.id);
    if let Some(first) = errors.first() {
        return Err(CompileError { error: first.clone(), line: 0, column: 0 });
    }
    let Some(root_type) = root_type else {
        return Err(CompileError { error: "internal error: unresolved result type".into(), line: 0, column: 0 });
    };

    let code = root.code();
    let (data, patterns, regexps, funcs) = decls.into_pools();
    let program = Program { code, data, patterns, regexps, funcs, loops: vec![None; loop_count] };

    tracing::debug!("compiled '{}'\n{}", source, program.listing());

    Ok((program, root_type))
}
