use crate::decls::Decls;
use crate::expr::Expr;
use crate::loops::Loop;
use crate::parser::{Ast, BinOp, Qual, UnOp};
use crate::types::{ObjField, Type};
use crate::value::Value;
use crate::vm::Op;

/// Lowers the syntax tree to the addressable IR, registering literals,
/// identifier references, field requests, regex patterns and inferred
/// types with the declarations table as it goes.
///
/// Comprehension qualifiers lower in source order before the head, so with
/// strict mode on, a filter that references a generator variable declared
/// to its right reports an unknown identifier.
pub struct Lower<'a> {
    decls: &'a mut Decls,
    loops: usize,
    parallel: bool,
}

impl<'a> Lower<'a> {
    pub fn new(decls: &'a mut Decls, parallel: bool) -> Lower<'a> {
        Lower { decls, loops: 0, parallel }
    }

    /// How many iterator slots the program needs.
    pub fn loop_count(&self) -> usize {
        self.loops
    }

    pub fn expr(&mut self, ast: &Ast) -> Expr {
        match ast {
            Ast::Number(n) => self.literal(format!("{}", n), Value::Num(*n)),
            Ast::Text(s) => self.literal(format!("{:?}", s), Value::from(s.as_str())),
            Ast::Bool(b) => self.literal(format!("{}", b), Value::Bool(*b)),

            Ast::Ident(name) => {
                let addr = self.decls.use_ident(name);
                let e = Expr::load(name.clone(), addr);
                self.decls.set_type(&e, Type::OfIdent(name.clone()));
                e
            }

            Ast::Object(entries) => {
                let mut fields: Vec<(String, Expr)> = Vec::new();
                let mut tys: Vec<ObjField> = Vec::new();
                for (key, val) in entries {
                    let e = self.expr(val);
                    let k = key.clone().unwrap_or_else(|| e.name.to_string());
                    if fields.iter().any(|(n, _)| *n == k) {
                        self.decls.err(format!("duplicate attribute '{}' in object literal", k));
                        continue;
                    }
                    tys.push(ObjField { name: k.clone(), ty: Type::OfExpr(e.id) });
                    fields.push((k, e));
                }
                let node = Expr::object(fields);
                self.decls.set_type(&node, Type::Object(tys));
                node
            }

            Ast::List(elems) => {
                let es: Vec<Expr> = elems.iter().map(|e| self.expr(e)).collect();
                let elem_ty = match es.first() {
                    Some(first) => Type::OfExpr(first.id),
                    None => Type::Scalar,
                };
                if es.len() > 1 {
                    self.decls.same_type(es.iter().map(|e| e.id).collect());
                }
                let node = Expr::list(es);
                self.decls.set_type(&node, Type::List(Box::new(elem_ty)));
                node
            }

            Ast::Comp { head, quals } => self.comp(head, quals),

            Ast::Field(base, name) => {
                let b = self.expr(base);
                let bid = b.id;
                let cell = self.decls.use_field(bid, name);
                let node = b.field(name, cell);
                self.decls.set_type(&node, Type::OfField(bid, name.clone()));
                node
            }

            Ast::IndexStr(base, key) => {
                let b = self.expr(base);
                let bid = b.id;
                let cell = self.decls.use_field(bid, key);
                let node = b.field_key(key, cell);
                self.decls.set_type(&node, Type::OfField(bid, key.clone()));
                node
            }

            Ast::IndexNum(base, n) => {
                let b = self.expr(base);
                let bid = b.id;
                let node = b.index(&format!("{}", n), n.trunc() as i64);
                self.decls.set_type(&node, Type::OfElem(bid));
                node
            }

            Ast::Unary(op, e) => {
                let inner = self.expr(e);
                let (code, symbol) = match op {
                    UnOp::Not => (Op::Not, "!"),
                    UnOp::Neg => (Op::Neg, "-"),
                    UnOp::Pos => (Op::Pos, "+"),
                };
                let node = inner.unary(code, symbol);
                self.decls.set_type(&node, Type::Scalar);
                node
            }

            Ast::Binary(op, l, r) => {
                let le = self.expr(l);
                let re = self.expr(r);
                let (code, symbol) = match op {
                    BinOp::Mul => (Op::Mul, "*"),
                    BinOp::Div => (Op::Div, "/"),
                    BinOp::Add => (Op::Add, "+"),
                    BinOp::Sub => (Op::Sub, "-"),
                    BinOp::Cat => (Op::Cat, "++"),
                    BinOp::Lt => (Op::Lt, "<"),
                    BinOp::Lte => (Op::Lte, "<="),
                    BinOp::Gt => (Op::Gt, ">"),
                    BinOp::Gte => (Op::Gte, ">="),
                    BinOp::Eq => (Op::Eq, "=="),
                    BinOp::Neq => (Op::Neq, "!="),
                    BinOp::And => (Op::And, "&&"),
                    BinOp::Or => (Op::Or, "||"),
                };
                let node = le.binary(re, code, symbol);
                self.decls.set_type(&node, Type::Scalar);
                node
            }

            Ast::Matches(e, pattern) => {
                let inner = self.expr(e);
                let re = match self.decls.regexp(pattern) {
                    Ok(idx) => idx,
                    Err(msg) => {
                        self.decls.err(msg);
                        0
                    }
                };
                let node = inner.matches(pattern, re);
                self.decls.set_type(&node, Type::Scalar);
                node
            }

            Ast::Call(name, args) => {
                let es: Vec<Expr> = args.iter().map(|a| self.expr(a)).collect();
                let eids: Vec<i64> = es.iter().map(|e| e.id).collect();
                let idx = self.decls.use_func(name, &eids);
                let node = Expr::call(idx, es);
                self.decls.set_type(&node, Type::OfFunc(name.clone()));
                node
            }
        }
    }

    fn comp(&mut self, head: &Ast, quals: &[Qual]) -> Expr {
        let mut lp: Option<Loop> = None;

        for q in quals {
            match q {
                Qual::Gen(name, list) => {
                    let le = self.expr(list);
                    let var_addr = self.declare(name, None, Type::OfElem(le.id));
                    let iter_addr = self.declare("", None, Type::Scalar);

                    let lid = self.loops;
                    self.loops += 1;

                    if let Some(l) = lp.as_mut() {
                        l.nest(lid, var_addr, iter_addr, le, false);
                    } else {
                        // only the outermost loop of the first
                        // comprehension fans out to workers
                        let parallel = self.parallel && lid == 0;
                        lp = Some(Loop::for_each(lid, var_addr, iter_addr, le, parallel));
                    }
                }
                Qual::Filter(f) => {
                    let fe = self.expr(f);
                    if let Some(l) = &mut lp {
                        l.select(fe);
                    }
                }
            }
        }

        let ret = self.expr(head);
        let list_ty = Type::List(Box::new(Type::OfExpr(ret.id)));
        let res_addr = self.declare("", Some(Value::from(Vec::new())), list_ty.clone());

        let node = match lp {
            Some(mut l) => {
                l.ret(ret, res_addr);
                Expr::comp(l, res_addr)
            }
            // the parser guarantees a leading generator
            None => Expr::list(vec![ret]),
        };
        self.decls.set_type(&node, list_ty);
        node
    }

    fn literal(&mut self, name: String, v: Value) -> Expr {
        let addr = self.declare("", Some(v), Type::Scalar);
        let e = Expr::load(name, addr);
        self.decls.set_type(&e, Type::Scalar);
        e
    }

    fn declare(&mut self, name: &str, v: Option<Value>, t: Type) -> usize {
        match self.decls.declare(name, v, t) {
            Ok(addr) => addr,
            Err(msg) => {
                self.decls.err(msg);
                self.decls.address_of(name).unwrap_or(0)
            }
        }
    }
}
