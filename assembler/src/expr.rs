//! Operand expressions.

use crate::error::{AsmError, AsmErrorKind, Phase};
use crate::symbols::SymbolTable;
use crate::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// An operand expression as handed over by the front end.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Int(i32, Span),
    Sym(String, Span),
    /// `*`, the current location counter.
    LocCtr(Span),
    Neg(Box<Expr>, Span),
    Bin(BinOp, Box<Expr>, Box<Expr>, Span),
}

/// What an expression is evaluated against: the active section's symbols
/// and the location counter at the referencing command.
pub struct EvalContext<'a> {
    pub symbols: &'a SymbolTable,
    pub locctr: i32,
    /// Evaluate imported symbols as zero instead of failing. Used for word
    /// initializers whose external terms are fixed up at link time.
    pub externals_as_zero: bool,
}

impl<'a> EvalContext<'a> {
    pub fn new(symbols: &'a SymbolTable, locctr: i32) -> Self {
        EvalContext {
            symbols,
            locctr,
            externals_as_zero: false,
        }
    }
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Int(_, span)
            | Expr::Sym(_, span)
            | Expr::LocCtr(span)
            | Expr::Neg(_, span)
            | Expr::Bin(_, _, _, span) => *span,
        }
    }

    pub fn eval(&self, ctx: &EvalContext) -> Result<i32, AsmError> {
        match self {
            Expr::Int(value, _) => Ok(*value),
            Expr::Sym(name, span) => match ctx.symbols.get(name) {
                Some(sym) if sym.defined => Ok(sym.value),
                Some(sym) if sym.imported && ctx.externals_as_zero => Ok(0),
                Some(sym) if sym.imported => Err(AsmError::new(
                    Phase::Resolve,
                    AsmErrorKind::ExternalSymbolNotAllowedHere { name: name.clone() },
                    Some(*span),
                )),
                _ => Err(AsmError::new(
                    Phase::Resolve,
                    AsmErrorKind::UndefinedSymbol { name: name.clone() },
                    Some(*span),
                )),
            },
            Expr::LocCtr(_) => Ok(ctx.locctr),
            Expr::Neg(inner, _) => Ok(-inner.eval(ctx)?),
            Expr::Bin(op, left, right, _) => {
                let l = left.eval(ctx)?;
                let r = right.eval(ctx)?;
                match op {
                    BinOp::Add => Ok(l + r),
                    BinOp::Sub => Ok(l - r),
                    BinOp::Mul => Ok(l * r),
                    BinOp::Div | BinOp::Mod if r == 0 => Err(AsmError::new(
                        Phase::Resolve,
                        AsmErrorKind::DivisionByZero,
                        Some(right.span()),
                    )),
                    BinOp::Div => Ok(l / r),
                    BinOp::Mod => Ok(l % r),
                }
            }
        }
    }

    /// Pure predicate: would `eval` succeed right now? Used by
    /// forward-reference directives (ORG) to decide whether to defer.
    pub fn can_eval(&self, ctx: &EvalContext) -> bool {
        match self {
            Expr::Int(..) | Expr::LocCtr(..) => true,
            Expr::Sym(name, _) => match ctx.symbols.get(name) {
                Some(sym) => sym.defined || (sym.imported && ctx.externals_as_zero),
                None => false,
            },
            Expr::Neg(inner, _) => inner.can_eval(ctx),
            Expr::Bin(_, left, right, _) => left.can_eval(ctx) && right.can_eval(ctx),
        }
    }

    pub fn uses_locctr(&self) -> bool {
        match self {
            Expr::Int(..) | Expr::Sym(..) => false,
            Expr::LocCtr(..) => true,
            Expr::Neg(inner, _) => inner.uses_locctr(),
            Expr::Bin(_, left, right, _) => left.uses_locctr() || right.uses_locctr(),
        }
    }

    pub fn has_syms(&self) -> bool {
        match self {
            Expr::Int(..) | Expr::LocCtr(..) => false,
            Expr::Sym(..) => true,
            Expr::Neg(inner, _) => inner.has_syms(),
            Expr::Bin(_, left, right, _) => left.has_syms() || right.has_syms(),
        }
    }

    /// Net symbol count of an add/subtract chain. Any multiplicative
    /// operator over symbols poisons the count.
    pub fn count_add_sub(&self) -> i32 {
        match self {
            Expr::Int(..) | Expr::LocCtr(..) => 0,
            Expr::Sym(..) => 1,
            Expr::Neg(inner, _) => {
                let n = inner.count_add_sub();
                if n == i32::max_value() {
                    n
                } else {
                    -n
                }
            }
            Expr::Bin(op, left, right, _) => {
                let l = left.count_add_sub();
                let r = right.count_add_sub();
                if l == i32::max_value() || r == i32::max_value() {
                    return i32::max_value();
                }
                match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    _ if !self.has_syms() => 0,
                    _ => i32::max_value(),
                }
            }
        }
    }

    /// All symbol names referenced anywhere in the expression.
    pub fn extract_syms(&self) -> Vec<String> {
        let mut syms = Vec::new();
        self.collect_syms(1, &mut syms);
        syms.into_iter().map(|(name, _)| name).collect()
    }

    /// Symbol names with the sign they contribute under in an add/subtract
    /// chain. Only meaningful when `count_add_sub` did not poison.
    pub fn extract_signed_syms(&self) -> Vec<(String, i32)> {
        let mut syms = Vec::new();
        self.collect_syms(1, &mut syms);
        syms
    }

    fn collect_syms(&self, sign: i32, out: &mut Vec<(String, i32)>) {
        match self {
            Expr::Int(..) | Expr::LocCtr(..) => {}
            Expr::Sym(name, _) => out.push((name.clone(), sign)),
            Expr::Neg(inner, _) => inner.collect_syms(-sign, out),
            Expr::Bin(op, left, right, _) => {
                left.collect_syms(sign, out);
                let rsign = if *op == BinOp::Sub { -sign } else { sign };
                right.collect_syms(rsign, out);
            }
        }
    }

    /// Convenience constructors for front ends and tests.
    pub fn int(value: i32) -> Expr {
        Expr::Int(value, Span::default())
    }

    pub fn sym(name: &str) -> Expr {
        Expr::Sym(name.to_string(), Span::default())
    }

    pub fn bin(op: BinOp, left: Expr, right: Expr) -> Expr {
        let span = left.span();
        Expr::Bin(op, Box::new(left), Box::new(right), span)
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Int(value, _) => write!(f, "{}", value),
            Expr::Sym(name, _) => write!(f, "{}", name),
            Expr::LocCtr(_) => write!(f, "*"),
            Expr::Neg(inner, _) => write!(f, "-{}", inner),
            Expr::Bin(op, left, right, _) => {
                let op = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Mod => "%",
                };
                write!(f, "{}{}{}", left, op, right)
            }
        }
    }
}
