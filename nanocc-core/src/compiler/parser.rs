//! Parser
//!
//! Recursive-descent parser for the C subset. Productions are layered by
//! precedence (primary → postfix → unary → multiplicative → … → assignment
//! → comma). The parser performs name resolution against lexically scoped
//! symbol tables, folds constant subexpressions as it goes, reduces `>` and
//! `>=` to `<`/`<=` by operand swap, scales pointer arithmetic, decays array
//! lvalues, and desugars `x++`, `x--`, `++x`, `--x` and `x op= y` into
//! statement-expressions over compiler temporaries.
//!
//! The result is the checked, constant-folded, typed AST the lowering stage
//! consumes; nothing downstream of the parser reports user errors.

use std::collections::HashMap;

use crate::compiler::ast::{
    BinOp, Expr, ExprKind, Function, LabelCounter, LogicalOp, Program, Stmt, SwitchCase, Type,
    UnOp, Var, VarId, VarRef,
};
use crate::compiler::error::{CompileError, Diagnostic};
use crate::compiler::lexer::Lexer;
use crate::compiler::token::{Token, TokenKind};

/// A resolved name.
#[derive(Debug, Clone)]
enum Sym {
    Local(VarId),
    Global(usize),
    Func { ret: Type },
}

/// Result of parsing one declarator.
struct Declaration {
    name: String,
    ty: Type,
    init: Option<Expr>,
    /// Token offset of the declared name, for diagnostics.
    offset: usize,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    labels: &'a mut LabelCounter,
    /// Lexical scopes, outermost first. Index 0 is the file scope.
    scopes: Vec<HashMap<String, Sym>>,
    globals: Vec<Var>,
    functions: Vec<Function>,
    /// Variables of the function currently being parsed.
    vars: Vec<Var>,
    /// Number of enclosing constructs a `break` may target (loops and
    /// switches).
    break_depth: usize,
    /// Number of enclosing loops a `continue` may target.
    continue_depth: usize,
    /// Case tables of the enclosing `switch` statements, innermost last.
    switch_cases: Vec<Vec<SwitchCase>>,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>, labels: &'a mut LabelCounter) -> Self {
        Parser {
            lexer,
            labels,
            scopes: vec![HashMap::new()],
            globals: Vec::new(),
            functions: Vec::new(),
            vars: Vec::new(),
            break_depth: 0,
            continue_depth: 0,
            switch_cases: Vec::new(),
        }
    }

    /// Parse a whole translation unit.
    pub fn parse_program(mut self) -> Result<Program, CompileError> {
        while self.lexer.peek()?.kind != TokenKind::Eof {
            self.parse_top_level()?;
        }
        log::debug!(
            "parsed {} function(s), {} global(s)",
            self.functions.len(),
            self.globals.len()
        );
        Ok(Program {
            globals: self.globals,
            functions: self.functions,
            macros: self.lexer.into_macros(),
        })
    }

    // --- diagnostics ------------------------------------------------------

    fn err(&self, offset: usize, message: &str) -> CompileError {
        CompileError::Syntax(Diagnostic::at_offset(
            self.lexer.file(),
            self.lexer.source(),
            offset,
            message.to_string(),
        ))
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, CompileError> {
        if let Some(t) = self.lexer.consume(kind)? {
            return Ok(t);
        }
        let (offset, found) = {
            let t = self.lexer.peek()?;
            (t.offset, t.kind.describe())
        };
        Err(self.err(
            offset,
            &format!(
                "symbol '{}' expected, but found '{}'.",
                kind.describe(),
                found
            ),
        ))
    }

    fn peek_kind(&mut self) -> Result<TokenKind, CompileError> {
        Ok(self.lexer.peek()?.kind.clone())
    }

    fn peek_offset(&mut self) -> Result<usize, CompileError> {
        Ok(self.lexer.peek()?.offset)
    }

    // --- scopes and symbols -----------------------------------------------

    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn leave_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<Sym> {
        for scope in self.scopes.iter().rev() {
            if let Some(sym) = scope.get(name) {
                return Some(sym.clone());
            }
        }
        None
    }

    fn add_local(&mut self, ty: Type, name: &str) -> VarId {
        let vid = VarId(self.vars.len() as u32);
        self.vars.push(Var::local(ty, name));
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Sym::Local(vid));
        }
        vid
    }

    /// A compiler temporary: present in the frame, invisible to name lookup.
    fn add_temp(&mut self, ty: Type, name: &str) -> VarId {
        let vid = VarId(self.vars.len() as u32);
        self.vars.push(Var::local(ty, name));
        vid
    }

    fn add_global(&mut self, ty: Type, name: &str, data: Option<Vec<u8>>, is_extern: bool) -> usize {
        let idx = self.globals.len();
        self.globals.push(Var::global(ty, name, data, is_extern));
        self.scopes[0].insert(name.to_string(), Sym::Global(idx));
        idx
    }

    // --- expression constructors ------------------------------------------

    /// Reference a variable; array-typed lvalues decay to a pointer to the
    /// first element right here.
    fn varref_expr(&self, vr: VarRef) -> Expr {
        let ty = match vr {
            VarRef::Local(vid) => self.vars[vid.idx()].ty.clone(),
            VarRef::Global(gi) => self.globals[gi].ty.clone(),
        };
        let e = Expr {
            kind: ExprKind::VarRef(vr),
            ctype: ty.clone(),
        };
        if let Type::Array { elem, .. } = ty {
            Expr {
                kind: ExprKind::Addr(Box::new(e)),
                ctype: Type::Ptr(elem),
            }
        } else {
            e
        }
    }

    /// `&e`. Marks the variable address-taken so scalar replacement leaves
    /// it in memory.
    fn addr_of(&mut self, e: Expr) -> Expr {
        if let ExprKind::VarRef(vr) = e.kind {
            match vr {
                VarRef::Local(vid) => self.vars[vid.idx()].address_taken = true,
                VarRef::Global(gi) => self.globals[gi].address_taken = true,
            }
        }
        let ctype = Type::ptr_to(e.ctype.clone());
        Expr {
            kind: ExprKind::Addr(Box::new(e)),
            ctype,
        }
    }

    /// `*e` for an expression already known to be a pointer. A pointee of
    /// array type decays again.
    fn deref_of(&self, e: Expr) -> Expr {
        let inner_ty = e
            .ctype
            .pointee()
            .cloned()
            .expect("dereference of a non-pointer survived type checking");
        let d = Expr {
            kind: ExprKind::Deref(Box::new(e)),
            ctype: inner_ty.clone(),
        };
        if let Type::Array { elem, .. } = inner_ty {
            Expr {
                kind: ExprKind::Addr(Box::new(d)),
                ctype: Type::Ptr(elem),
            }
        } else {
            d
        }
    }

    fn deref_var(&self, vid: VarId) -> Expr {
        self.deref_of(self.varref_expr(VarRef::Local(vid)))
    }

    fn assign(lhs: Expr, rhs: Expr) -> Expr {
        let ctype = lhs.ctype.clone();
        Expr {
            kind: ExprKind::Assign {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ctype,
        }
    }

    fn binop(op: BinOp, lhs: Expr, rhs: Expr, ctype: Type) -> Expr {
        Expr {
            kind: ExprKind::Binop {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ctype,
        }
    }

    /// Multiply an index by the pointee size; elided for 1-byte elements.
    fn scale_ptr(e: Expr, ty: &Type) -> Expr {
        if ty.size() == 1 {
            return e;
        }
        Self::binop(BinOp::Mul, e, Expr::num(ty.size() as i64), Type::Int)
    }

    /// Fold a binary operation over two constants. Division and shifts fold
    /// only when defined.
    fn fold_binop(op: BinOp, a: i64, b: i64) -> Option<i64> {
        Some(match op {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div => {
                if b == 0 {
                    return None;
                }
                a.wrapping_div(b)
            }
            BinOp::Mod => {
                if b == 0 {
                    return None;
                }
                a.wrapping_rem(b)
            }
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
            BinOp::Shl => {
                if !(0..64).contains(&b) {
                    return None;
                }
                a.wrapping_shl(b as u32)
            }
            BinOp::Shr => {
                if !(0..64).contains(&b) {
                    return None;
                }
                a.wrapping_shr(b as u32)
            }
            BinOp::Eq => (a == b) as i64,
            BinOp::Ne => (a != b) as i64,
            BinOp::Lt => (a < b) as i64,
            BinOp::Le => (a <= b) as i64,
        })
    }

    /// Token of a plain binary operator, for the precedence-level loops.
    fn token_binop(kind: &TokenKind) -> Option<BinOp> {
        Some(match kind {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::Amp => BinOp::And,
            TokenKind::Pipe => BinOp::Or,
            TokenKind::Caret => BinOp::Xor,
            TokenKind::Shl => BinOp::Shl,
            TokenKind::Shr => BinOp::Shr,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::Ne => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            _ => return None,
        })
    }

    // --- desugaring -------------------------------------------------------

    /// `x op= y` compiled as `({ T *tmp = &x; *tmp = *tmp op y; })`, so the
    /// addressed location is computed once.
    fn new_assign_equal(
        &mut self,
        op: BinOp,
        lhs: Expr,
        rhs: Expr,
        offset: usize,
    ) -> Result<Expr, CompileError> {
        if !lhs.is_lvalue() {
            return Err(self.err(offset, "the left side of the operator is not a lvalue."));
        }
        let ty = lhs.ctype.clone();
        let tmp = self.add_temp(Type::ptr_to(ty.clone()), "tmp");

        let e1 = Self::assign(self.varref_expr(VarRef::Local(tmp)), self.addr_of(lhs));
        let inner = Self::binop(op, self.deref_var(tmp), rhs, ty.clone());
        let e2 = Self::assign(self.deref_var(tmp), inner);

        Ok(Expr {
            kind: ExprKind::StmtExpr {
                stmts: vec![Stmt::Expr(e1)],
                last: Box::new(e2),
            },
            ctype: ty,
        })
    }

    /// `x++` compiled as `({ T *tmp1 = &x; T tmp2 = *tmp1;
    /// *tmp1 = *tmp1 + 1; tmp2; })`, producing the pre-increment value.
    fn new_post_increase(
        &mut self,
        e: Expr,
        imm: i64,
        offset: usize,
    ) -> Result<Expr, CompileError> {
        if !e.is_lvalue() {
            return Err(self.err(offset, "the left side of the operator is not a lvalue."));
        }
        let ty = e.ctype.clone();
        let tmp1 = self.add_temp(Type::ptr_to(ty.clone()), "tmp1");
        let tmp2 = self.add_temp(ty.clone(), "tmp2");

        let e1 = Self::assign(self.varref_expr(VarRef::Local(tmp1)), self.addr_of(e));
        let e2 = Self::assign(self.varref_expr(VarRef::Local(tmp2)), self.deref_var(tmp1));
        let bumped = Self::binop(BinOp::Add, self.deref_var(tmp1), Expr::num(imm), ty.clone());
        let e3 = Self::assign(self.deref_var(tmp1), bumped);
        let e4 = self.varref_expr(VarRef::Local(tmp2));

        Ok(Expr {
            kind: ExprKind::StmtExpr {
                stmts: vec![Stmt::Expr(e1), Stmt::Expr(e2), Stmt::Expr(e3)],
                last: Box::new(e4),
            },
            ctype: ty,
        })
    }

    // --- primary / postfix ------------------------------------------------

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let kind = self.peek_kind()?;
        let offset = self.peek_offset()?;

        match kind {
            TokenKind::LParen => {
                self.lexer.next()?;
                if self.lexer.consume(&TokenKind::LBrace)?.is_some() {
                    let e = self.parse_stmt_expr()?;
                    self.expect(&TokenKind::RParen)?;
                    return Ok(e);
                }
                let e = self.parse_exp()?;
                self.expect(&TokenKind::RParen)?;
                Ok(e)
            }
            TokenKind::Num(v) => {
                self.lexer.next()?;
                Ok(Expr::num(v))
            }
            TokenKind::CharLit(c) => {
                self.lexer.next()?;
                Ok(Expr::char_lit(c))
            }
            TokenKind::Str(bytes) => {
                self.lexer.next()?;
                Ok(self.string_expr(bytes))
            }
            TokenKind::Ident => {
                let tok = self.lexer.next()?;
                if self.lexer.consume(&TokenKind::LParen)?.is_some() {
                    self.parse_func_call(&tok)
                } else {
                    self.parse_var(&tok)
                }
            }
            _ => Err(self.err(offset, "primary expression expected.")),
        }
    }

    /// Hoist a string literal into a named global; its type is
    /// NUL-inclusive: `char[len + 1]`.
    fn string_expr(&mut self, bytes: Vec<u8>) -> Expr {
        let mut data = bytes;
        data.push(0);
        let len = data.len();
        let name = format!(".L.str{}", self.labels.next());
        let idx = self.add_global(Type::array_of(Type::Char, len), &name, Some(data), false);
        self.varref_expr(VarRef::Global(idx))
    }

    fn parse_var(&mut self, tok: &Token) -> Result<Expr, CompileError> {
        match self.lookup(&tok.text) {
            Some(Sym::Local(vid)) => Ok(self.varref_expr(VarRef::Local(vid))),
            Some(Sym::Global(gi)) => Ok(self.varref_expr(VarRef::Global(gi))),
            _ => Err(self.err(tok.offset, "undefined variable.")),
        }
    }

    fn parse_func_call(&mut self, tok: &Token) -> Result<Expr, CompileError> {
        let ret = match self.lookup(&tok.text) {
            Some(Sym::Func { ret }) => ret,
            _ => return Err(self.err(tok.offset, "undefined function.")),
        };

        let mut args: Vec<Expr> = Vec::new();
        while self.lexer.consume(&TokenKind::RParen)?.is_none() {
            if !args.is_empty() {
                self.expect(&TokenKind::Comma)?;
            }
            args.push(self.parse_assign()?);
        }
        if args.len() > 6 {
            return Err(self.err(tok.offset, "too many arguments in function call."));
        }

        Ok(Expr {
            kind: ExprKind::Call {
                name: tok.text.clone(),
                args,
            },
            ctype: ret,
        })
    }

    fn parse_post_prefix(&mut self) -> Result<Expr, CompileError> {
        let mut e = self.parse_primary()?;
        loop {
            let kind = self.peek_kind()?;
            let offset = self.peek_offset()?;
            match kind {
                TokenKind::PlusPlus => {
                    self.lexer.next()?;
                    e = self.new_post_increase(e, 1, offset)?;
                }
                TokenKind::MinusMinus => {
                    self.lexer.next()?;
                    e = self.new_post_increase(e, -1, offset)?;
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    // Member access needs struct layout, which this subset
                    // does not carry.
                    return Err(self.err(offset, "unsupported type."));
                }
                TokenKind::LBracket => {
                    self.lexer.next()?;
                    let pointee = match e.ctype.pointee() {
                        Some(p) => p.clone(),
                        None => return Err(self.err(offset, "operand must be a pointer.")),
                    };
                    let idx = Self::scale_ptr(self.parse_assign()?, &pointee);
                    let sum_ty = e.ctype.clone();
                    let sum = Self::binop(BinOp::Add, e, idx, sum_ty);
                    self.expect(&TokenKind::RBracket)?;
                    e = self.deref_of(sum);
                }
                _ => return Ok(e),
            }
        }
    }

    // --- unary ------------------------------------------------------------

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let kind = self.peek_kind()?;
        let offset = self.peek_offset()?;

        match kind {
            TokenKind::Minus => {
                self.lexer.next()?;
                let e = self.parse_unary()?;
                if let Some(v) = e.const_value() {
                    return Ok(Expr::num(v.wrapping_neg()));
                }
                if !e.ctype.is_num() {
                    return Err(self.err(offset, "the right side of the operator is not a number."));
                }
                Ok(Self::binop(BinOp::Sub, Expr::num(0), e, Type::Int))
            }
            TokenKind::Not | TokenKind::Tilde => {
                self.lexer.next()?;
                let e = self.parse_unary()?;
                if let Some(v) = e.const_value() {
                    let folded = if kind == TokenKind::Not { (v == 0) as i64 } else { !v };
                    return Ok(Expr::num(folded));
                }
                if !e.ctype.is_num() {
                    return Err(self.err(offset, "the right side of the operator is not a number."));
                }
                let op = if kind == TokenKind::Not { UnOp::Not } else { UnOp::BitNot };
                Ok(Expr {
                    kind: ExprKind::Unop {
                        op,
                        operand: Box::new(e),
                    },
                    ctype: Type::Int,
                })
            }
            TokenKind::Star => {
                self.lexer.next()?;
                let e = self.parse_unary()?;
                match e.ctype.pointee() {
                    None => return Err(self.err(offset, "operand must be a pointer.")),
                    Some(Type::Void) => {
                        return Err(self.err(offset, "cannot dereference void pointer."))
                    }
                    Some(_) => {}
                }
                Ok(self.deref_of(e))
            }
            TokenKind::Amp => {
                self.lexer.next()?;
                let e = self.parse_unary()?;
                if !e.is_lvalue() {
                    return Err(self.err(offset, "operand must be a lvalue expression."));
                }
                Ok(self.addr_of(e))
            }
            TokenKind::PlusPlus => {
                self.lexer.next()?;
                let e = self.parse_unary()?;
                self.new_assign_equal(BinOp::Add, e, Expr::num(1), offset)
            }
            TokenKind::MinusMinus => {
                self.lexer.next()?;
                let e = self.parse_unary()?;
                self.new_assign_equal(BinOp::Sub, e, Expr::num(1), offset)
            }
            _ => self.parse_post_prefix(),
        }
    }

    // --- binary precedence levels -----------------------------------------

    /// Shared loop for the levels without pointer special cases: folds
    /// constants, then type-checks both sides as numbers.
    fn parse_num_binop_level(
        &mut self,
        ops: &[TokenKind],
        next: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let mut lhs = next(self)?;
        loop {
            let kind = self.peek_kind()?;
            let offset = self.peek_offset()?;
            if !ops.contains(&kind) {
                return Ok(lhs);
            }
            self.lexer.next()?;
            let op = Self::token_binop(&kind).expect("operator table out of sync");
            let rhs = next(self)?;

            if let (Some(a), Some(b)) = (lhs.const_value(), rhs.const_value()) {
                if let Some(v) = Self::fold_binop(op, a, b) {
                    lhs = Expr::num(v);
                    continue;
                }
            }
            if !lhs.ctype.is_num() {
                return Err(self.err(offset, "the left side of the operator is not a number."));
            }
            if !rhs.ctype.is_num() {
                return Err(self.err(offset, "the right side of the operator is not a number."));
            }
            lhs = Self::binop(op, lhs, rhs, Type::Int);
        }
    }

    fn parse_muldiv(&mut self) -> Result<Expr, CompileError> {
        self.parse_num_binop_level(
            &[TokenKind::Star, TokenKind::Slash, TokenKind::Percent],
            Self::parse_unary,
        )
    }

    fn parse_addsub(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_muldiv()?;
        loop {
            let kind = self.peek_kind()?;
            let offset = self.peek_offset()?;
            if kind != TokenKind::Plus && kind != TokenKind::Minus {
                return Ok(lhs);
            }
            self.lexer.next()?;
            let rhs = self.parse_muldiv()?;

            if let (Some(a), Some(b)) = (lhs.const_value(), rhs.const_value()) {
                let v = if kind == TokenKind::Plus {
                    a.wrapping_add(b)
                } else {
                    a.wrapping_sub(b)
                };
                lhs = Expr::num(v);
                continue;
            }

            if kind == TokenKind::Plus {
                // Pointer goes on the left; the integer side is scaled.
                let (l, r, swapped) = if rhs.ctype.pointee().is_some() {
                    (rhs, lhs, true)
                } else {
                    (lhs, rhs, false)
                };
                if !r.ctype.is_num() {
                    let side = if swapped { "left" } else { "right" };
                    return Err(self.err(
                        offset,
                        &format!("the {} side of the operator is not a number.", side),
                    ));
                }
                lhs = if let Some(pointee) = l.ctype.pointee() {
                    let pointee = pointee.clone();
                    let ty = l.ctype.clone();
                    Self::binop(BinOp::Add, l, Self::scale_ptr(r, &pointee), ty)
                } else {
                    Self::binop(BinOp::Add, l, r, Type::Int)
                };
            } else {
                lhs = match (lhs.ctype.pointee().cloned(), rhs.ctype.pointee().is_some()) {
                    (Some(pointee), true) => {
                        if lhs.ctype != rhs.ctype {
                            return Err(self.err(offset, "incompatible pointer."));
                        }
                        // Pointer difference is in elements.
                        let diff = Self::binop(BinOp::Sub, lhs, rhs, Type::Int);
                        if pointee.size() == 1 {
                            diff
                        } else {
                            Self::binop(
                                BinOp::Div,
                                diff,
                                Expr::num(pointee.size() as i64),
                                Type::Int,
                            )
                        }
                    }
                    (Some(pointee), false) => {
                        let ty = lhs.ctype.clone();
                        Self::binop(BinOp::Sub, lhs, Self::scale_ptr(rhs, &pointee), ty)
                    }
                    _ => Self::binop(BinOp::Sub, lhs, rhs, Type::Int),
                };
            }
        }
    }

    fn parse_shift(&mut self) -> Result<Expr, CompileError> {
        self.parse_num_binop_level(&[TokenKind::Shl, TokenKind::Shr], Self::parse_addsub)
    }

    fn parse_relation(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_shift()?;
        loop {
            let kind = self.peek_kind()?;
            let offset = self.peek_offset()?;
            if !matches!(
                kind,
                TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge
            ) {
                return Ok(lhs);
            }
            self.lexer.next()?;
            let rhs = self.parse_shift()?;

            // Reduce > and >= to < and <= by operand swap.
            let (op, a, b) = match kind {
                TokenKind::Lt => (BinOp::Lt, lhs, rhs),
                TokenKind::Le => (BinOp::Le, lhs, rhs),
                TokenKind::Gt => (BinOp::Lt, rhs, lhs),
                _ => (BinOp::Le, rhs, lhs),
            };

            if let (Some(x), Some(y)) = (a.const_value(), b.const_value()) {
                let v = match op {
                    BinOp::Lt => (x < y) as i64,
                    _ => (x <= y) as i64,
                };
                lhs = Expr::num(v);
                continue;
            }
            if !a.ctype.is_num() {
                return Err(self.err(offset, "the left side of the operator is not a number."));
            }
            if !b.ctype.is_num() {
                return Err(self.err(offset, "the right side of the operator is not a number."));
            }
            lhs = Self::binop(op, a, b, Type::Int);
        }
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        self.parse_num_binop_level(&[TokenKind::EqEq, TokenKind::Ne], Self::parse_relation)
    }

    fn parse_bitand(&mut self) -> Result<Expr, CompileError> {
        self.parse_num_binop_level(&[TokenKind::Amp], Self::parse_equality)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, CompileError> {
        self.parse_num_binop_level(&[TokenKind::Caret], Self::parse_bitand)
    }

    fn parse_bitor(&mut self) -> Result<Expr, CompileError> {
        self.parse_num_binop_level(&[TokenKind::Pipe], Self::parse_bitxor)
    }

    /// Shared loop for `&&` and `||`; the chain stays n-ary so the lowering
    /// stage can emit one short-circuit network per chain.
    fn parse_logical_level(
        &mut self,
        tok: TokenKind,
        op: LogicalOp,
        next: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let first = next(self)?;
        let offset = self.peek_offset()?;
        if self.peek_kind()? != tok {
            return Ok(first);
        }
        if !first.ctype.is_num() {
            return Err(self.err(offset, "the left side of the operator is not a number."));
        }
        let mut exprs = vec![first];
        while self.lexer.consume(&tok)?.is_some() {
            let offset = self.peek_offset()?;
            let e = next(self)?;
            if !e.ctype.is_num() {
                return Err(self.err(offset, "the right side of the operator is not a number."));
            }
            exprs.push(e);
        }
        Ok(Expr {
            kind: ExprKind::Logical { op, exprs },
            ctype: Type::Int,
        })
    }

    fn parse_logical_and(&mut self) -> Result<Expr, CompileError> {
        self.parse_logical_level(TokenKind::AndAnd, LogicalOp::And, Self::parse_bitor)
    }

    fn parse_logical_or(&mut self) -> Result<Expr, CompileError> {
        self.parse_logical_level(TokenKind::OrOr, LogicalOp::Or, Self::parse_logical_and)
    }

    fn parse_conditional(&mut self) -> Result<Expr, CompileError> {
        let cond = self.parse_logical_or()?;
        if self.lexer.consume(&TokenKind::Question)?.is_none() {
            return Ok(cond);
        }
        let then = self.parse_exp()?;
        self.expect(&TokenKind::Colon)?;
        let els = self.parse_conditional()?;
        let ctype = then.ctype.clone();
        Ok(Expr {
            kind: ExprKind::Cond {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            },
            ctype,
        })
    }

    fn parse_assign(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.parse_conditional()?;
        let kind = self.peek_kind()?;
        let offset = self.peek_offset()?;

        if kind == TokenKind::Assign {
            self.lexer.next()?;
            if !lhs.is_lvalue() {
                return Err(self.err(offset, "the left side of the operator is not a lvalue."));
            }
            let rhs = self.parse_assign()?;
            return Ok(Self::assign(lhs, rhs));
        }
        if kind.is_compound_assign() {
            self.lexer.next()?;
            let ty = lhs.ctype.clone();
            let op = Self::token_binop(&kind.base_op()).expect("compound operator table out of sync");
            let rhs = self.parse_assign()?;
            let mut e = self.new_assign_equal(op, lhs, rhs, offset)?;
            e.ctype = ty;
            return Ok(e);
        }
        Ok(lhs)
    }

    fn parse_exp(&mut self) -> Result<Expr, CompileError> {
        let first = self.parse_assign()?;
        if self.peek_kind()? != TokenKind::Comma {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.lexer.consume(&TokenKind::Comma)?.is_some() {
            exprs.push(self.parse_assign()?);
        }
        let ctype = exprs.last().map(|e| e.ctype.clone()).unwrap_or(Type::Int);
        Ok(Expr {
            kind: ExprKind::Comma(exprs),
            ctype,
        })
    }

    fn parse_const_exp(&mut self) -> Result<i64, CompileError> {
        let offset = self.peek_offset()?;
        let e = self.parse_exp()?;
        e.const_value()
            .ok_or_else(|| self.err(offset, "constant expression expected."))
    }

    /// `({ stmt; …; e })`, the opening `({` already consumed.
    fn parse_stmt_expr(&mut self) -> Result<Expr, CompileError> {
        self.enter_scope();
        let mut stmts: Vec<Stmt> = Vec::new();
        let end = loop {
            stmts.push(self.parse_stmt()?);
            if let Some(t) = self.lexer.consume(&TokenKind::RBrace)? {
                break t;
            }
        };
        self.leave_scope();

        match stmts.pop() {
            Some(Stmt::Expr(last)) => {
                let ctype = last.ctype.clone();
                Ok(Expr {
                    kind: ExprKind::StmtExpr {
                        stmts,
                        last: Box::new(last),
                    },
                    ctype,
                })
            }
            _ => Err(self.err(end.offset, "statement expression returning void.")),
        }
    }

    // --- declarations -----------------------------------------------------

    fn parse_typename(&mut self) -> Result<Type, CompileError> {
        let offset = self.peek_offset()?;
        match self.peek_kind()? {
            TokenKind::KwVoid => {
                self.lexer.next()?;
                Ok(Type::Void)
            }
            TokenKind::KwInt => {
                self.lexer.next()?;
                Ok(Type::Int)
            }
            TokenKind::KwChar => {
                self.lexer.next()?;
                Ok(Type::Char)
            }
            _ => Err(self.err(offset, "unsupported type.")),
        }
    }

    /// Array dimension suffix: `[3][5]`. An empty dimension parses as 0 and
    /// is only meaningful for parameters, which decay.
    fn parse_array_suffix(&mut self, mut ty: Type) -> Result<Type, CompileError> {
        let mut dims: Vec<usize> = Vec::new();
        while self.lexer.consume(&TokenKind::LBracket)?.is_some() {
            if self.lexer.consume(&TokenKind::RBracket)?.is_some() {
                dims.push(0);
                continue;
            }
            let offset = self.peek_offset()?;
            let len = self.parse_const_exp()?;
            if len < 0 {
                return Err(self.err(offset, "constant expression expected."));
            }
            dims.push(len as usize);
            self.expect(&TokenKind::RBracket)?;
        }
        for len in dims.into_iter().rev() {
            ty = Type::array_of(ty, len);
        }
        Ok(ty)
    }

    /// Replace the placeholder leaf of a parenthesized declarator with the
    /// type built from the surrounding context.
    fn substitute(ty: Type, repl: Type) -> Type {
        match ty {
            Type::Void => repl,
            Type::Ptr(base) => Type::ptr_to(Self::substitute(*base, repl)),
            Type::Array { elem, len } => Type::array_of(Self::substitute(*elem, repl), len),
            other => other,
        }
    }

    fn declarator(&mut self, mut ty: Type) -> Result<Declaration, CompileError> {
        while self.lexer.consume(&TokenKind::Star)?.is_some() {
            ty = Type::ptr_to(ty);
        }
        self.direct_declarator(ty)
    }

    fn direct_declarator(&mut self, ty: Type) -> Result<Declaration, CompileError> {
        let kind = self.peek_kind()?;
        let offset = self.peek_offset()?;
        match kind {
            TokenKind::Ident => {
                let tok = self.lexer.next()?;
                let ty = self.parse_array_suffix(ty)?;
                let init = if self.lexer.consume(&TokenKind::Assign)?.is_some() {
                    Some(self.parse_assign()?)
                } else {
                    None
                };
                Ok(Declaration {
                    name: tok.text,
                    ty,
                    init,
                    offset: tok.offset,
                })
            }
            TokenKind::LParen => {
                self.lexer.next()?;
                // The inner declarator binds tighter; parse it against a
                // placeholder and patch the real type in afterwards.
                let inner = self.declarator(Type::Void)?;
                self.expect(&TokenKind::RParen)?;
                let outer = self.parse_array_suffix(ty)?;
                let ty = Self::substitute(inner.ty, outer);
                let init = if self.lexer.consume(&TokenKind::Assign)?.is_some() {
                    Some(self.parse_assign()?)
                } else {
                    None
                };
                Ok(Declaration {
                    name: inner.name,
                    ty,
                    init,
                    offset: inner.offset,
                })
            }
            _ => Err(self.err(offset, "bad direct-declarator.")),
        }
    }

    /// Local declaration; returns the initializing assignment, if any
    /// (`T var = init` becomes `T var; var = init`).
    fn parse_declaration(&mut self) -> Result<Option<Expr>, CompileError> {
        let ty = self.parse_typename()?;
        let mut decl = self.declarator(ty)?;
        if decl.ty == Type::Void {
            return Err(self.err(decl.offset, "unsupported type."));
        }
        let vid = self.add_local(decl.ty.clone(), &decl.name);

        match decl.init.take() {
            None => Ok(None),
            Some(init) => {
                let lhs = self.varref_expr(VarRef::Local(vid));
                if !lhs.is_lvalue() {
                    return Err(self.err(decl.offset, "the left side of the operator is not a lvalue."));
                }
                Ok(Some(Self::assign(lhs, init)))
            }
        }
    }

    fn parse_decl_or_exp(&mut self) -> Result<Option<Expr>, CompileError> {
        if self.peek_kind()?.is_typename() {
            self.parse_declaration()
        } else {
            Ok(Some(self.parse_exp()?))
        }
    }

    // --- statements -------------------------------------------------------

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        let kind = self.peek_kind()?;
        let offset = self.peek_offset()?;

        match kind {
            TokenKind::KwIf => {
                self.lexer.next()?;
                self.expect(&TokenKind::LParen)?;
                let cond = self.parse_exp()?;
                self.expect(&TokenKind::RParen)?;
                let then = Box::new(self.parse_stmt()?);
                let els = if self.lexer.consume(&TokenKind::KwElse)?.is_some() {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If { cond, then, els })
            }
            TokenKind::KwFor => {
                self.lexer.next()?;
                self.enter_scope();
                self.break_depth += 1;
                self.continue_depth += 1;

                self.expect(&TokenKind::LParen)?;
                let init = if self.lexer.consume(&TokenKind::Semi)?.is_none() {
                    let e = self.parse_decl_or_exp()?;
                    self.expect(&TokenKind::Semi)?;
                    e
                } else {
                    None
                };
                let cond = if self.lexer.consume(&TokenKind::Semi)?.is_none() {
                    let e = self.parse_exp()?;
                    self.expect(&TokenKind::Semi)?;
                    Some(e)
                } else {
                    None
                };
                let step = if self.lexer.consume(&TokenKind::RParen)?.is_none() {
                    let e = self.parse_exp()?;
                    self.expect(&TokenKind::RParen)?;
                    Some(e)
                } else {
                    None
                };
                let body = Box::new(self.parse_stmt()?);

                self.break_depth -= 1;
                self.continue_depth -= 1;
                self.leave_scope();
                Ok(Stmt::For {
                    init,
                    cond,
                    step,
                    body,
                })
            }
            TokenKind::KwWhile => {
                self.lexer.next()?;
                self.break_depth += 1;
                self.continue_depth += 1;

                self.expect(&TokenKind::LParen)?;
                let cond = self.parse_exp()?;
                self.expect(&TokenKind::RParen)?;
                let body = Box::new(self.parse_stmt()?);

                self.break_depth -= 1;
                self.continue_depth -= 1;
                Ok(Stmt::For {
                    init: None,
                    cond: Some(cond),
                    step: None,
                    body,
                })
            }
            TokenKind::KwDo => {
                self.lexer.next()?;
                self.break_depth += 1;
                self.continue_depth += 1;
                let body = Box::new(self.parse_stmt()?);
                self.break_depth -= 1;
                self.continue_depth -= 1;

                self.expect(&TokenKind::KwWhile)?;
                self.expect(&TokenKind::LParen)?;
                let cond = self.parse_exp()?;
                self.expect(&TokenKind::RParen)?;
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::DoWhile { cond, body })
            }
            TokenKind::KwSwitch => {
                self.lexer.next()?;
                self.break_depth += 1;
                self.switch_cases.push(Vec::new());

                self.expect(&TokenKind::LParen)?;
                let cond = self.parse_exp()?;
                self.expect(&TokenKind::RParen)?;
                let body = Box::new(self.parse_stmt()?);

                self.break_depth -= 1;
                let cases = self.switch_cases.pop().unwrap_or_default();
                Ok(Stmt::Switch { cond, cases, body })
            }
            TokenKind::KwCase => {
                self.lexer.next()?;
                if self.switch_cases.is_empty() {
                    return Err(self.err(offset, "stray case."));
                }
                let value = self.parse_const_exp()?;
                self.expect(&TokenKind::Colon)?;
                let body = Box::new(self.parse_stmt()?);
                let table = self
                    .switch_cases
                    .last_mut()
                    .expect("switch table vanished during case body");
                let index = table.len();
                table.push(SwitchCase { value: Some(value) });
                Ok(Stmt::Case { index, body })
            }
            TokenKind::KwDefault => {
                self.lexer.next()?;
                if self.switch_cases.is_empty() {
                    return Err(self.err(offset, "stray case."));
                }
                self.expect(&TokenKind::Colon)?;
                let body = Box::new(self.parse_stmt()?);
                let table = self
                    .switch_cases
                    .last_mut()
                    .expect("switch table vanished during case body");
                let index = table.len();
                table.push(SwitchCase { value: None });
                Ok(Stmt::Case { index, body })
            }
            TokenKind::KwBreak => {
                self.lexer.next()?;
                if self.break_depth == 0 {
                    return Err(self.err(offset, "stray break."));
                }
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Break)
            }
            TokenKind::KwContinue => {
                self.lexer.next()?;
                if self.continue_depth == 0 {
                    return Err(self.err(offset, "stray continue."));
                }
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Continue)
            }
            TokenKind::KwReturn => {
                self.lexer.next()?;
                let value = if self.peek_kind()? == TokenKind::Semi {
                    None
                } else {
                    Some(self.parse_exp()?)
                };
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Return(value))
            }
            TokenKind::LBrace => {
                self.lexer.next()?;
                self.parse_compound()
            }
            TokenKind::Semi => {
                self.lexer.next()?;
                Ok(Stmt::Null)
            }
            _ => match self.parse_decl_or_exp()? {
                None => {
                    self.expect(&TokenKind::Semi)?;
                    Ok(Stmt::Null)
                }
                Some(e) => {
                    self.expect(&TokenKind::Semi)?;
                    Ok(Stmt::Expr(e))
                }
            },
        }
    }

    /// `{ stmt* }`, the opening brace already consumed.
    fn parse_compound(&mut self) -> Result<Stmt, CompileError> {
        self.enter_scope();
        let mut stmts: Vec<Stmt> = Vec::new();
        while self.lexer.consume(&TokenKind::RBrace)?.is_none() {
            stmts.push(self.parse_stmt()?);
        }
        self.leave_scope();
        Ok(Stmt::Block(stmts))
    }

    // --- top level --------------------------------------------------------

    fn parse_param(&mut self, base: Type) -> Result<VarId, CompileError> {
        let decl = self.declarator(base)?;
        // Array parameters decay to pointers.
        let ty = match decl.ty {
            Type::Array { elem, .. } => Type::Ptr(elem),
            t => t,
        };
        if ty == Type::Void {
            return Err(self.err(decl.offset, "unsupported type."));
        }
        Ok(self.add_local(ty, &decl.name))
    }

    fn parse_top_level(&mut self) -> Result<(), CompileError> {
        let is_extern = self.lexer.consume(&TokenKind::KwExtern)?.is_some();
        let mut ty = self.parse_typename()?;
        while self.lexer.consume(&TokenKind::Star)?.is_some() {
            ty = Type::ptr_to(ty);
        }
        let ident = self.expect(&TokenKind::Ident)?;

        if self.lexer.consume(&TokenKind::LParen)?.is_some() {
            // Function declaration or definition.
            self.vars = Vec::new();
            self.break_depth = 0;
            self.continue_depth = 0;
            self.switch_cases = Vec::new();
            self.enter_scope();

            let mut params: Vec<VarId> = Vec::new();
            if self.lexer.consume(&TokenKind::RParen)?.is_none() {
                loop {
                    let base = self.parse_typename()?;
                    if base == Type::Void
                        && params.is_empty()
                        && self.peek_kind()? == TokenKind::RParen
                    {
                        self.lexer.next()?;
                        break;
                    }
                    params.push(self.parse_param(base)?);
                    if self.lexer.consume(&TokenKind::Comma)?.is_none() {
                        self.expect(&TokenKind::RParen)?;
                        break;
                    }
                }
            }

            if params.len() > 6 {
                return Err(self.err(ident.offset, "too many function parameters."));
            }

            // Register the function before its body so recursion resolves.
            self.scopes[0].insert(
                ident.text.clone(),
                Sym::Func {
                    ret: ty.clone(),
                },
            );

            if self.lexer.consume(&TokenKind::Semi)?.is_some() {
                // Prototype only.
                self.leave_scope();
                return Ok(());
            }

            self.expect(&TokenKind::LBrace)?;
            let body = self.parse_compound()?;
            self.leave_scope();

            self.functions.push(Function {
                name: ident.text,
                params,
                vars: std::mem::take(&mut self.vars),
                body: Some(body),
                blocks: Vec::new(),
                regs: Vec::new(),
            });
            return Ok(());
        }

        // Global variable.
        let ty = self.parse_array_suffix(ty)?;
        if ty == Type::Void {
            return Err(self.err(ident.offset, "unsupported type."));
        }
        self.expect(&TokenKind::Semi)?;
        self.add_global(ty, &ident.text, None, is_extern);
        Ok(())
    }
}
