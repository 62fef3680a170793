use crate::expr::Expr;
use crate::vm::Op;

/// A nested-comprehension builder.
///
/// The comprehension `[i * j | i <- [1, 2, 3], j <- [10, 20], i == j / 10]`
/// compiles to:
///
/// ```text
///   <list [1, 2, 3]>
///   loop +L1
///   <list [10, 20]>
///   loop +L2
///   <i == j / 10>
///   test -T1          ; to the next iteration of L2
///   <append i * j to the accumulator>
///   next -N1          ; back into L2
///   next -N2          ; back into L1
/// ```
///
/// where every jump is a relative offset computed from the locally-known
/// size of the loop tail. `Loop` and `Next` push the current element twice:
/// the first `Store` files a copy in the reserved iterator cell, the second
/// binds the loop variable.
pub struct Loop {
    lid: usize,
    inner: Option<Box<Loop>>,
    res_addr: usize,
    var_addr: usize,
    iter_addr: usize,
    list: Expr,
    sel: Vec<Expr>,
    ret: Option<Expr>,
    parallel: bool,
}

impl Loop {
    pub fn for_each(lid: usize, var_addr: usize, iter_addr: usize, list: Expr, parallel: bool) -> Loop {
        Loop {
            lid,
            inner: None,
            res_addr: 0,
            var_addr,
            iter_addr,
            list,
            sel: Vec::new(),
            ret: None,
            parallel,
        }
    }

    /// Attach a nested generator to the innermost unfinished loop.
    pub fn nest(&mut self, lid: usize, var_addr: usize, iter_addr: usize, list: Expr, parallel: bool) {
        let innermost = self.innermost_mut();
        innermost.inner = Some(Box::new(Loop::for_each(lid, var_addr, iter_addr, list, parallel)));
    }

    /// Attach a filter predicate to the innermost unfinished loop.
    pub fn select(&mut self, expr: Expr) {
        self.innermost_mut().sel.push(expr);
    }

    /// Attach the return expression and accumulator address to the
    /// innermost loop.
    pub fn ret(&mut self, expr: Expr, res_addr: usize) {
        let innermost = self.innermost_mut();
        innermost.ret = Some(expr);
        innermost.res_addr = res_addr;
    }

    fn innermost_mut(&mut self) -> &mut Loop {
        match self.inner {
            Some(ref mut inner) => inner.innermost_mut(),
            None => self,
        }
    }

    pub fn emit(&self, out: &mut Vec<Op>) {
        self.list.emit(out);
        let clen = self.code_len(None);

        // jump over the loop / jump back to its first instruction
        let loop_jump = clen as i64 + 1 /* Next */ + 1 /* the instruction after the loop */;
        let next_jump = -(clen as i64);

        out.push(Op::Arg(loop_jump));
        out.push(Op::Arg(if self.parallel { 1 } else { 0 }));
        out.push(Op::Loop(self.lid));
        out.push(Op::Store(self.iter_addr));
        out.push(Op::Store(self.var_addr));

        for (i, s) in self.sel.iter().enumerate() {
            s.emit(out);
            out.push(Op::Test(self.code_len(Some(i)) as i64));
        }

        match &self.inner {
            Some(inner) => inner.emit(out),
            None => {
                out.push(Op::Load(self.res_addr));
                if let Some(ret) = &self.ret {
                    ret.emit(out);
                }
                out.push(Op::Append);
                out.push(Op::Store(self.res_addr));
            }
        }

        out.push(Op::Arg(next_jump));
        out.push(Op::Next(self.lid));
    }

    pub fn code(&self) -> Vec<Op> {
        let mut out = Vec::new();
        self.emit(&mut out);
        out
    }

    /// The jump length from a test instruction: `sel_pos` is the index of a
    /// filter (left to right); `None` yields the length of the whole loop
    /// tail, from the first prologue store through the `Arg` that precedes
    /// `Next`.
    fn code_len(&self, sel_pos: Option<usize>) -> usize {
        let mut jump = 0;
        let from = match sel_pos {
            Some(i) => i + 1,
            None => {
                jump += 2; // the two prologue stores
                0
            }
        };

        for s in &self.sel[from..] {
            jump += s.code().len() + 1 /* Test */;
        }

        match &self.inner {
            Some(inner) => jump += inner.code().len(),
            None => {
                jump += 1 /* Load */
                    + self.ret.as_ref().map_or(0, |r| r.code().len())
                    + 1 /* Append */
                    + 1 /* Store */;
            }
        }

        jump + 1 /* Arg */
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_loop(sel: bool) -> Vec<Op> {
        // [ x | x <- xs ]  with an optional filter
        let mut lp = Loop::for_each(0, 1, 2, Expr::load("xs".into(), 0), false);
        if sel {
            lp.select(Expr::load("x".into(), 1));
        }
        lp.ret(Expr::load("x".into(), 1), 3);
        lp.code()
    }

    #[test]
    fn serial_layout() {
        let code = single_loop(false);
        assert_eq!(
            code,
            vec![
                Op::Load(0),
                Op::Arg(9),
                Op::Arg(0),
                Op::Loop(0),
                Op::Store(2),
                Op::Store(1),
                Op::Load(3),
                Op::Load(1),
                Op::Append,
                Op::Store(3),
                Op::Arg(-7),
                Op::Next(0),
            ]
        );
    }

    #[test]
    fn loop_jump_lands_past_next() {
        let code = single_loop(true);
        let loop_at = code.iter().position(|op| matches!(op, Op::Loop(_))).unwrap();
        let Op::Arg(loop_jump) = code[loop_at - 2] else { panic!("expected Arg") };
        // taking the empty-list jump from the Loop instruction lands one
        // past the final Next
        assert_eq!(loop_at as i64 + loop_jump, code.len() as i64);
    }

    #[test]
    fn next_jump_lands_on_first_store() {
        let code = single_loop(true);
        let next_at = code.iter().position(|op| matches!(op, Op::Next(_))).unwrap();
        let Op::Arg(next_jump) = code[next_at - 1] else { panic!("expected Arg") };
        let loop_at = code.iter().position(|op| matches!(op, Op::Loop(_))).unwrap();
        assert_eq!(next_at as i64 + next_jump, loop_at as i64 + 1);
        assert!(matches!(code[(next_at as i64 + next_jump) as usize], Op::Store(_)));
    }

    #[test]
    fn test_jump_lands_on_arg_before_next() {
        let code = single_loop(true);
        let test_at = code.iter().position(|op| matches!(op, Op::Test(_))).unwrap();
        let Op::Test(jump) = code[test_at] else { unreachable!() };
        let target = (test_at as i64 + jump) as usize;
        assert!(matches!(code[target], Op::Arg(n) if n < 0));
        assert!(matches!(code[target + 1], Op::Next(_)));
    }

    #[test]
    fn nested_jumps_stay_in_bounds() {
        // [ i | i <- xs, j <- ys, i ]: nested loop with an inner filter
        let mut lp = Loop::for_each(0, 1, 2, Expr::load("xs".into(), 0), false);
        lp.nest(1, 4, 5, Expr::load("ys".into(), 3), false);
        lp.select(Expr::load("i".into(), 1));
        lp.ret(Expr::load("i".into(), 1), 6);
        let code = lp.code();

        for (at, op) in code.iter().enumerate() {
            let jump = match op {
                Op::Test(j) => Some(*j),
                Op::Arg(j) => Some(*j),
                _ => None,
            };
            if let Some(j) = jump {
                let target = at as i64 + j;
                assert!(
                    target >= 0 && target <= code.len() as i64,
                    "jump at {} leaves the code: {}",
                    at,
                    target
                );
            }
        }
    }

    #[test]
    fn filters_attach_to_innermost() {
        let mut lp = Loop::for_each(0, 1, 2, Expr::load("xs".into(), 0), false);
        lp.select(Expr::load("p".into(), 1));
        lp.nest(1, 4, 5, Expr::load("ys".into(), 3), false);
        lp.select(Expr::load("q".into(), 4));
        lp.ret(Expr::load("i".into(), 1), 6);

        assert_eq!(lp.sel.len(), 1);
        let inner = lp.inner.as_ref().unwrap();
        assert_eq!(inner.sel.len(), 1);
        assert!(inner.ret.is_some());
        assert!(lp.ret.is_none());
    }
}
