use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::vm::Op;

static EXPR_SEQ: AtomicI64 = AtomicI64::new(1);

fn next_eid() -> i64 {
    EXPR_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// An IR node: a unique expression id, a printable name (used in error
/// messages and as the key of sugared object fields), and a thunk that
/// emits the node's machine code. The thunk runs only after `verify`, so
/// shared field-position cells are filled by the time it reads them.
#[derive(Clone)]
pub struct Expr {
    pub id: i64,
    pub name: Rc<str>,
    code: Rc<dyn Fn(&mut Vec<Op>)>,
}

impl Expr {
    fn new(name: String, code: impl Fn(&mut Vec<Op>) + 'static) -> Expr {
        Expr { id: next_eid(), name: Rc::from(name.as_str()), code: Rc::new(code) }
    }

    /// Emit this node's code into `out`.
    pub fn emit(&self, out: &mut Vec<Op>) {
        (self.code)(out);
    }

    pub fn code(&self) -> Vec<Op> {
        let mut out = Vec::new();
        self.emit(&mut out);
        out
    }

    /// Load a declared value (a named global or a pooled literal).
    pub fn load(name: String, addr: usize) -> Expr {
        Expr::new(name, move |out| out.push(Op::Load(addr)))
    }

    /// An object literal. The printable name lists the field keys:
    /// `{id, obj}`.
    pub fn object(fields: Vec<(String, Expr)>) -> Expr {
        let mut name = String::from("{");
        for (i, (key, _)) in fields.iter().enumerate() {
            if i != 0 {
                name.push_str(", ");
            }
            name.push_str(key);
        }
        name.push('}');

        Expr::new(name, move |out| {
            out.push(Op::Object(fields.len()));
            for (i, (_, f)) in fields.iter().enumerate() {
                f.emit(out);
                out.push(Op::Set(i));
            }
        })
    }

    /// A list literal.
    pub fn list(elems: Vec<Expr>) -> Expr {
        Expr::new(String::new(), move |out| {
            out.push(Op::List);
            for e in &elems {
                e.emit(out);
                out.push(Op::Append);
            }
        })
    }

    /// A comprehension: the loop body followed by a load of the
    /// accumulator.
    pub fn comp(lp: crate::loops::Loop, res_addr: usize) -> Expr {
        Expr::new(String::new(), move |out| {
            lp.emit(out);
            out.push(Op::Load(res_addr));
        })
    }

    /// Dotted field access: `base.name`. The position cell is written by
    /// `Decls::verify`.
    pub fn field(self, name: &str, pos: Rc<Cell<i32>>) -> Expr {
        let label = format!("{}.{}", self.name, name);
        Expr::new(label, move |out| {
            self.emit(out);
            out.push(Op::Get(pos.get().max(0) as usize));
        })
    }

    /// Bracketed field access: `base["name"]`. Same machinery as `field`,
    /// different rendering.
    pub fn field_key(self, name: &str, pos: Rc<Cell<i32>>) -> Expr {
        let label = format!("{}[{:?}]", self.name, name);
        Expr::new(label, move |out| {
            self.emit(out);
            out.push(Op::Get(pos.get().max(0) as usize));
        })
    }

    /// List indexing with a literal index, truncated toward zero at parse
    /// time. Out-of-range indexes yield `""` at run time.
    pub fn index(self, text: &str, idx: i64) -> Expr {
        let label = format!("{}[{}]", self.name, text);
        Expr::new(label, move |out| {
            self.emit(out);
            out.push(Op::Index(idx));
        })
    }

    pub fn unary(self, op: Op, symbol: &str) -> Expr {
        let label = format!("{}{}", symbol, self.name);
        Expr::new(label, move |out| {
            self.emit(out);
            out.push(op);
        })
    }

    /// A binary operator. The right operand is emitted first, so each
    /// binary opcode pops the left operand first; the VM relies on this
    /// for subtraction, division and comparisons.
    pub fn binary(self, rhs: Expr, op: Op, symbol: &str) -> Expr {
        let label = format!("{} {} {}", self.name, symbol, rhs.name);
        Expr::new(label, move |out| {
            rhs.emit(out);
            self.emit(out);
            out.push(op);
        })
    }

    /// Regex match against a pooled pattern.
    pub fn matches(self, pattern: &str, re: usize) -> Expr {
        let label = format!("{} =~ {:?}", self.name, pattern);
        Expr::new(label, move |out| {
            self.emit(out);
            out.push(Op::Match(re));
        })
    }

    /// A built-in call. Arguments are emitted last-to-first so the callee
    /// pops them in source order, left first.
    pub fn call(fn_idx: usize, args: Vec<Expr>) -> Expr {
        Expr::new(String::new(), move |out| {
            for a in args.iter().rev() {
                a.emit(out);
            }
            out.push(Op::Call(fn_idx));
        })
    }
}
