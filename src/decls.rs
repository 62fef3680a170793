use std::cell::Cell;
use std::rc::Rc;

use indexmap::IndexMap;
use regex::Regex;

use crate::expr::Expr;
use crate::funcs::Builtin;
use crate::types::{field_pos, FuncType, Type};
use crate::value::Value;

/// Depth bound for symbolic type resolution. References only point
/// "downward" by construction, so this never triggers on real programs.
const MAX_RESOLVE_DEPTH: usize = 128;

struct ExprEntry {
    ty: Type,
    code: String,
}

struct FieldReq {
    eid: i64,
    name: String,
    pos: Rc<Cell<i32>>,
}

/// The elaboration context of one compilation: identifiers and their
/// declared types, inferred types per expression id, pending field-access
/// requests whose physical positions are filled in during `verify`, and
/// the constant pools (values, regexes, built-ins).
#[derive(Default)]
pub struct Decls {
    names: IndexMap<String, Type>,
    exprs: IndexMap<i64, ExprEntry>,
    strict: bool,
    idents: Vec<String>,
    values: Vec<Option<Value>>,
    errors: Vec<String>,
    fields: Vec<FieldReq>,
    same_types: Vec<Vec<i64>>,
    patterns: Vec<String>,
    regexps: Vec<Regex>,
    funcs: Vec<Box<dyn Builtin>>,
}

impl Decls {
    pub fn new() -> Decls {
        Decls::default()
    }

    /// With strict on, unknown identifiers are reported eagerly at first
    /// use instead of at verify time. The compile driver turns this on so
    /// errors follow source order.
    pub fn strict(&mut self, on: bool) {
        self.strict = on;
    }

    /// Bind a name to a value and type, returning its data address. An
    /// empty name is auto-generated (literal and accumulator cells).
    pub fn declare(&mut self, name: &str, v: Option<Value>, t: Type) -> Result<usize, String> {
        let name = if name.is_empty() { format!("+{}", self.idents.len()) } else { name.to_string() };

        if self.names.contains_key(&name) {
            return Err(format!("'{}' is already declared", name));
        }

        let addr = self.insert(&name);
        self.names.insert(name, t);
        self.values[addr] = v;

        Ok(addr)
    }

    /// Install a built-in. Its type shadows any same-named identifier.
    pub fn add_func(&mut self, f: Box<dyn Builtin>) {
        self.names.insert(f.name().to_string(), Type::Func(Box::new(f.signature())));
        self.funcs.push(f);
    }

    /// Compile a pattern into the regex pool, returning its index.
    pub fn regexp(&mut self, pattern: &str) -> Result<usize, String> {
        let re = Regex::new(pattern).map_err(|e| e.to_string())?;
        self.patterns.push(pattern.to_string());
        self.regexps.push(re);
        Ok(self.regexps.len() - 1)
    }

    /// Register an identifier reference and return its (stable) address.
    pub fn use_ident(&mut self, name: &str) -> usize {
        if self.strict && !self.names.contains_key(name) {
            self.err(format!("unknown identifier '{}'", name));
        }

        self.insert(name)
    }

    /// Look up a built-in by name, arity-checked against the argument
    /// expression ids. Argument types are not checked; everything in the
    /// current set is scalar.
    pub fn use_func(&mut self, name: &str, args: &[i64]) -> usize {
        match self.funcs.iter().position(|f| f.name() == name) {
            Some(idx) => {
                let takes = self.funcs[idx].signature().args.len();
                if takes != args.len() {
                    self.err(format!("function '{}' takes {} arguments", name, takes));
                }
                idx
            }
            None => {
                self.err(format!("unknown function {}", name));
                0
            }
        }
    }

    /// Request the position of a field of the given expression. The cell
    /// is shared, deduped on `(eid, name)`, and written during `verify`.
    pub fn use_field(&mut self, eid: i64, name: &str) -> Rc<Cell<i32>> {
        if let Some(f) = self.fields.iter().find(|f| f.eid == eid && f.name == name) {
            return Rc::clone(&f.pos);
        }

        let pos = Rc::new(Cell::new(-1));
        self.fields.push(FieldReq { eid, name: name.to_string(), pos: Rc::clone(&pos) });
        pos
    }

    /// Record an advisory same-type constraint. Recorded, never checked.
    pub fn same_type(&mut self, eids: Vec<i64>) {
        self.same_types.push(eids);
    }

    pub fn same_types(&self) -> &[Vec<i64>] {
        &self.same_types
    }

    /// Record the inferred type and printable source fragment of a node.
    pub fn set_type(&mut self, e: &Expr, t: Type) {
        self.exprs.insert(e.id, ExprEntry { ty: t, code: e.name.to_string() });
    }

    pub(crate) fn err(&mut self, msg: String) {
        self.errors.push(msg);
    }

    pub fn address_of(&self, name: &str) -> Option<usize> {
        self.idents.iter().position(|n| n == name)
    }

    /// Resolve every name, expression and field reference. Returns the
    /// root expression's concrete type and the accumulated error list;
    /// never stops at the first problem.
    pub fn verify(&mut self, root: i64) -> (Option<Type>, Vec<String>) {
        let mut errs = Vec::new();

        // identifiers that were used but never declared
        for n in &self.idents {
            if !self.names.contains_key(n) {
                errs.push(format!("unknown identifier '{}'", n));
            }
        }

        // resolve named types
        for (n, t) in &self.names {
            let before = errs.len();
            if self.resolve(t, &mut errs, 0).is_none() && errs.len() == before {
                errs.push(format!("cannot resolve type of '{}'", n));
            }
        }

        // resolve expression types, capturing the root
        let mut root_type = None;
        for (eid, e) in &self.exprs {
            let before = errs.len();
            match self.resolve(&e.ty, &mut errs, 0) {
                Some(rt) => {
                    if *eid == root {
                        root_type = Some(rt);
                    }
                }
                None => {
                    if errs.len() == before {
                        errs.push(format!("cannot resolve type of '{}'", e.code));
                    }
                }
            }
        }

        // calculate field positions
        for f in &self.fields {
            if f.pos.get() >= 0 {
                continue;
            }
            let Some(e) = self.exprs.get(&f.eid) else { continue };
            let before = errs.len();
            match self.resolve(&e.ty, &mut errs, 0) {
                Some(Type::Object(fields)) => match field_pos(&fields, &f.name) {
                    Some(p) => f.pos.set(p as i32),
                    None => errs.push(format!("object '{}' does not have field '{}'", e.code, f.name)),
                },
                Some(_) => errs.push(format!("expression '{}' is not an object", e.code)),
                None => {
                    // the failed resolution already reported upstream
                    errs.truncate(before);
                }
            }
        }

        self.errors.extend(errs);
        (root_type, self.errors.clone())
    }

    fn insert(&mut self, name: &str) -> usize {
        match self.idents.iter().position(|n| n == name) {
            Some(addr) => addr,
            None => {
                self.idents.push(name.to_string());
                self.values.push(None);
                self.idents.len() - 1
            }
        }
    }

    /// Expand a (possibly symbolic) type to a concrete one. Failures of
    /// field and element references record their specific message; other
    /// failures return `None` and leave the caller to report generically.
    fn resolve(&self, t: &Type, errs: &mut Vec<String>, depth: usize) -> Option<Type> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }

        match t {
            Type::OfExpr(eid) => self.resolve(&self.exprs.get(eid)?.ty, errs, depth + 1),
            Type::OfField(eid, name) => {
                let e = self.exprs.get(eid)?;
                match self.resolve(&e.ty, errs, depth + 1)? {
                    Type::Object(fields) => match field_pos(&fields, name) {
                        Some(p) => Some(fields[p].ty.clone()),
                        None => {
                            errs.push(format!("object '{}' does not have field '{}'", e.code, name));
                            None
                        }
                    },
                    _ => {
                        errs.push(format!("'{}' is not an object", e.code));
                        None
                    }
                }
            }
            Type::OfElem(eid) => {
                let e = self.exprs.get(eid)?;
                match self.resolve(&e.ty, errs, depth + 1)? {
                    Type::List(elem) => Some(*elem),
                    _ => {
                        errs.push(format!("'{}' is not a list", e.code));
                        None
                    }
                }
            }
            Type::OfIdent(name) | Type::OfFunc(name) => {
                self.resolve(self.names.get(name)?, errs, depth + 1)
            }
            Type::Scalar => Some(Type::Scalar),
            Type::List(elem) => Some(Type::List(Box::new(self.resolve(elem, errs, depth + 1)?))),
            Type::Func(ft) => {
                let ret = self.resolve(&ft.ret, errs, depth + 1)?;
                let mut args = Vec::with_capacity(ft.args.len());
                for a in &ft.args {
                    args.push(self.resolve(a, errs, depth + 1)?);
                }
                Some(Type::Func(Box::new(FuncType { ret, args })))
            }
            Type::Object(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for f in fields {
                    if out.iter().any(|r: &crate::types::ObjField| r.name == f.name) {
                        return None; // duplicate field names never resolve
                    }
                    let ty = self.resolve(&f.ty, errs, depth + 1)?;
                    out.push(crate::types::ObjField { name: f.name.clone(), ty });
                }
                Some(Type::Object(out))
            }
        }
    }

    /// Hand the pools over to program assembly: the data area (undeclared
    /// cells zeroed), the regex pool, and the built-ins.
    pub(crate) fn into_pools(self) -> (Vec<Value>, Vec<String>, Vec<Regex>, Vec<Box<dyn Builtin>>) {
        let data = self.values.into_iter().map(Option::unwrap_or_default).collect();
        (data, self.patterns, self.regexps, self.funcs)
    }
}
