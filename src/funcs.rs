use crate::distance;
use crate::fuzzy::Fuzzy;
use crate::types::{FuncType, Type};
use crate::vm::Stack;

/// A built-in function. Arguments arrive on the stack with the leftmost on
/// top (the compiler emits them in reverse), so `eval` pops them in source
/// order. `fresh` returns an instance with reinitialised per-call state and
/// is used when a program is cloned for a worker.
pub trait Builtin: Send {
    fn name(&self) -> &'static str;
    fn signature(&self) -> FuncType;
    fn eval(&mut self, s: &mut Stack);
    fn fresh(&self) -> Box<dyn Builtin>;
}

fn scalar_fn(arity: usize) -> FuncType {
    FuncType { ret: Type::Scalar, args: vec![Type::Scalar; arity] }
}

/// The full built-in set, in registration order.
pub fn builtins() -> Vec<Box<dyn Builtin>> {
    vec![
        Box::new(Trunc),
        Box::new(Dist),
        Box::new(Trim),
        Box::new(Lower),
        Box::new(Upper),
        Box::new(FuzzyFn::default()),
        Box::new(Replace),
    ]
}

struct Trunc;

impl Builtin for Trunc {
    fn name(&self) -> &'static str {
        "trunc"
    }

    fn signature(&self) -> FuncType {
        scalar_fn(1)
    }

    fn eval(&mut self, s: &mut Stack) {
        let val = s.pop_num();
        s.push_num(val.trunc());
    }

    fn fresh(&self) -> Box<dyn Builtin> {
        Box::new(Trunc)
    }
}

struct Dist;

impl Builtin for Dist {
    fn name(&self) -> &'static str {
        "dist"
    }

    fn signature(&self) -> FuncType {
        scalar_fn(4)
    }

    fn eval(&mut self, s: &mut Stack) {
        let lat1 = s.pop_num();
        let lon1 = s.pop_num();
        let lat2 = s.pop_num();
        let lon2 = s.pop_num();
        s.push_num(distance::dist(lat1, lon1, lat2, lon2));
    }

    fn fresh(&self) -> Box<dyn Builtin> {
        Box::new(Dist)
    }
}

struct Trim;

impl Builtin for Trim {
    fn name(&self) -> &'static str {
        "trim"
    }

    fn signature(&self) -> FuncType {
        scalar_fn(1)
    }

    fn eval(&mut self, s: &mut Stack) {
        let val = s.pop_str();
        s.push_str(val.trim_matches(|c| " \t\r\n".contains(c)).to_string());
    }

    fn fresh(&self) -> Box<dyn Builtin> {
        Box::new(Trim)
    }
}

struct Lower;

impl Builtin for Lower {
    fn name(&self) -> &'static str {
        "lower"
    }

    fn signature(&self) -> FuncType {
        scalar_fn(1)
    }

    fn eval(&mut self, s: &mut Stack) {
        let val = s.pop_str();
        s.push_str(val.to_lowercase());
    }

    fn fresh(&self) -> Box<dyn Builtin> {
        Box::new(Lower)
    }
}

struct Upper;

impl Builtin for Upper {
    fn name(&self) -> &'static str {
        "upper"
    }

    fn signature(&self) -> FuncType {
        scalar_fn(1)
    }

    fn eval(&mut self, s: &mut Stack) {
        let val = s.pop_str();
        s.push_str(val.to_uppercase());
    }

    fn fresh(&self) -> Box<dyn Builtin> {
        Box::new(Upper)
    }
}

struct Replace;

impl Builtin for Replace {
    fn name(&self) -> &'static str {
        "replace"
    }

    fn signature(&self) -> FuncType {
        scalar_fn(3)
    }

    fn eval(&mut self, s: &mut Stack) {
        let val = s.pop_str();
        let from = s.pop_str();
        let to = s.pop_str();
        s.push_str(val.replace(&from, &to));
    }

    fn fresh(&self) -> Box<dyn Builtin> {
        Box::new(Replace)
    }
}

#[derive(Default)]
struct FuzzyFn {
    state: Fuzzy,
}

impl Builtin for FuzzyFn {
    fn name(&self) -> &'static str {
        "fuzzy"
    }

    fn signature(&self) -> FuncType {
        scalar_fn(2)
    }

    fn eval(&mut self, s: &mut Stack) {
        let left = s.pop_str();
        let right = s.pop_str();
        s.push_num(self.state.compare(&left, &right));
    }

    fn fresh(&self) -> Box<dyn Builtin> {
        Box::new(FuzzyFn::default())
    }
}
