//! Affine index expressions over dimension and symbol variables.
//!
//! Expressions are the quasi-affine subset needed by launch-grid indexing:
//! sums, multiplication by constants, and floor division / modulo by positive
//! constants. Constructors fold constants and trivial identities eagerly, so
//! `d0 * 1 + 0` is built as `d0`; range-dependent folding is done by
//! [`AffineExpr::simplify`] once the variable ranges are known.

use std::fmt;
use std::ops::{Add, Mul};

/// Closed integer interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub lower: i64,
    pub upper: i64,
}

impl Interval {
    pub const fn new(lower: i64, upper: i64) -> Self {
        Self { lower, upper }
    }

    pub const fn point(value: i64) -> Self {
        Self { lower: value, upper: value }
    }

    /// `[0, size - 1]`, the range of an index into an extent of `size`.
    pub const fn from_size(size: usize) -> Self {
        Self { lower: 0, upper: size as i64 - 1 }
    }

    pub const fn is_empty(&self) -> bool {
        self.lower > self.upper
    }

    pub const fn is_point(&self) -> bool {
        self.lower == self.upper
    }

    /// Number of integers in the interval.
    pub const fn size(&self) -> usize {
        if self.is_empty() { 0 } else { (self.upper - self.lower + 1) as usize }
    }

    pub const fn contains(&self, value: i64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub const fn is_subset_of(&self, other: &Interval) -> bool {
        self.lower >= other.lower && self.upper <= other.upper
    }

    pub fn intersect(&self, other: &Interval) -> Interval {
        Interval::new(self.lower.max(other.lower), self.upper.min(other.upper))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Quasi-affine expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AffineExpr {
    Const(i64),
    Dim(usize),
    Symbol(usize),
    Add(Box<AffineExpr>, Box<AffineExpr>),
    Mul(Box<AffineExpr>, i64),
    FloorDiv(Box<AffineExpr>, i64),
    Mod(Box<AffineExpr>, i64),
}

impl AffineExpr {
    pub const fn dim(index: usize) -> Self {
        Self::Dim(index)
    }

    pub const fn symbol(index: usize) -> Self {
        Self::Symbol(index)
    }

    pub const fn constant(value: i64) -> Self {
        Self::Const(value)
    }

    pub const fn as_const(&self) -> Option<i64> {
        match self {
            Self::Const(c) => Some(*c),
            _ => None,
        }
    }

    /// Floor division by a positive constant.
    ///
    /// # Panics
    /// Panics if `divisor <= 0`; divisors always come from tile extents.
    pub fn floor_div(self, divisor: i64) -> Self {
        assert!(divisor > 0, "floordiv by non-positive divisor {divisor}");
        match self {
            _ if divisor == 1 => self,
            Self::Const(c) => Self::Const(c.div_euclid(divisor)),
            other => Self::FloorDiv(Box::new(other), divisor),
        }
    }

    /// Non-negative remainder by a positive constant.
    ///
    /// # Panics
    /// Panics if `divisor <= 0`.
    pub fn modulo(self, divisor: i64) -> Self {
        assert!(divisor > 0, "mod by non-positive divisor {divisor}");
        match self {
            _ if divisor == 1 => Self::Const(0),
            Self::Const(c) => Self::Const(c.rem_euclid(divisor)),
            other => Self::Mod(Box::new(other), divisor),
        }
    }

    /// Evaluate at a concrete point.
    pub fn eval(&self, dims: &[i64], symbols: &[i64]) -> i64 {
        match self {
            Self::Const(c) => *c,
            Self::Dim(i) => dims[*i],
            Self::Symbol(i) => symbols[*i],
            Self::Add(lhs, rhs) => lhs.eval(dims, symbols) + rhs.eval(dims, symbols),
            Self::Mul(expr, c) => expr.eval(dims, symbols) * c,
            Self::FloorDiv(expr, d) => expr.eval(dims, symbols).div_euclid(*d),
            Self::Mod(expr, d) => expr.eval(dims, symbols).rem_euclid(*d),
        }
    }

    /// Conservative value range given variable ranges.
    ///
    /// Variables without a declared range are treated as unbounded.
    pub fn bounds(&self, dims: &[Interval], symbols: &[Interval]) -> Interval {
        const UNBOUNDED: Interval = Interval::new(i64::MIN, i64::MAX);
        match self {
            Self::Const(c) => Interval::point(*c),
            Self::Dim(i) => dims.get(*i).copied().unwrap_or(UNBOUNDED),
            Self::Symbol(i) => symbols.get(*i).copied().unwrap_or(UNBOUNDED),
            Self::Add(lhs, rhs) => {
                let (l, r) = (lhs.bounds(dims, symbols), rhs.bounds(dims, symbols));
                Interval::new(l.lower.saturating_add(r.lower), l.upper.saturating_add(r.upper))
            }
            Self::Mul(expr, c) => {
                let b = expr.bounds(dims, symbols);
                let (x, y) = (b.lower.saturating_mul(*c), b.upper.saturating_mul(*c));
                Interval::new(x.min(y), x.max(y))
            }
            Self::FloorDiv(expr, d) => {
                let b = expr.bounds(dims, symbols);
                Interval::new(b.lower.div_euclid(*d), b.upper.div_euclid(*d))
            }
            Self::Mod(expr, d) => {
                let b = expr.bounds(dims, symbols);
                if b.lower.div_euclid(*d) == b.upper.div_euclid(*d) {
                    Interval::new(b.lower.rem_euclid(*d), b.upper.rem_euclid(*d))
                } else {
                    Interval::new(0, d - 1)
                }
            }
        }
    }

    /// Fold sub-expressions whose value is fixed by the variable ranges.
    ///
    /// `e mod n` becomes `e` and `e floordiv n` becomes `0` when `e` is known
    /// to lie in `[0, n - 1]`; any sub-expression with a single possible value
    /// becomes that constant.
    pub fn simplify(&self, dims: &[Interval], symbols: &[Interval]) -> AffineExpr {
        let bounds = self.bounds(dims, symbols);
        if bounds.is_point() {
            return Self::Const(bounds.lower);
        }
        match self {
            Self::Const(_) | Self::Dim(_) | Self::Symbol(_) => self.clone(),
            Self::Add(lhs, rhs) => lhs.simplify(dims, symbols) + rhs.simplify(dims, symbols),
            Self::Mul(expr, c) => expr.simplify(dims, symbols) * *c,
            Self::FloorDiv(expr, d) => {
                let inner = expr.simplify(dims, symbols);
                if inner.bounds(dims, symbols).is_subset_of(&Interval::new(0, d - 1)) {
                    Self::Const(0)
                } else {
                    inner.floor_div(*d)
                }
            }
            Self::Mod(expr, d) => {
                let inner = expr.simplify(dims, symbols);
                if inner.bounds(dims, symbols).is_subset_of(&Interval::new(0, d - 1)) {
                    inner
                } else {
                    inner.modulo(*d)
                }
            }
        }
    }

    /// Substitute every dimension variable `d_i` with `dims[i]`.
    pub fn replace_dims(&self, dims: &[AffineExpr]) -> AffineExpr {
        match self {
            Self::Dim(i) => dims[*i].clone(),
            Self::Const(_) | Self::Symbol(_) => self.clone(),
            Self::Add(lhs, rhs) => lhs.replace_dims(dims) + rhs.replace_dims(dims),
            Self::Mul(expr, c) => expr.replace_dims(dims) * *c,
            Self::FloorDiv(expr, d) => expr.replace_dims(dims).floor_div(*d),
            Self::Mod(expr, d) => expr.replace_dims(dims).modulo(*d),
        }
    }

    /// Visit every variable occurrence.
    pub fn walk_vars(&self, f: &mut impl FnMut(&AffineExpr)) {
        match self {
            Self::Const(_) => {}
            Self::Dim(_) | Self::Symbol(_) => f(self),
            Self::Add(lhs, rhs) => {
                lhs.walk_vars(f);
                rhs.walk_vars(f);
            }
            Self::Mul(expr, _) | Self::FloorDiv(expr, _) | Self::Mod(expr, _) => expr.walk_vars(f),
        }
    }

    pub fn is_function_of_symbol(&self, index: usize) -> bool {
        let mut found = false;
        self.walk_vars(&mut |v| found |= *v == Self::Symbol(index));
        found
    }

    pub fn is_function_of_dim(&self, index: usize) -> bool {
        let mut found = false;
        self.walk_vars(&mut |v| found |= *v == Self::Dim(index));
        found
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Add(..) => 0,
            Self::Mul(..) | Self::FloorDiv(..) | Self::Mod(..) => 1,
            Self::Const(_) | Self::Dim(_) | Self::Symbol(_) => 2,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence { write!(f, "({self})") } else { write!(f, "{self}") }
    }
}

impl Add for AffineExpr {
    type Output = AffineExpr;

    fn add(self, rhs: AffineExpr) -> AffineExpr {
        match (self, rhs) {
            (Self::Const(a), Self::Const(b)) => Self::Const(a + b),
            (Self::Const(0), other) | (other, Self::Const(0)) => other,
            (c @ Self::Const(_), other) => Self::Add(Box::new(other), Box::new(c)),
            (lhs, rhs) => Self::Add(Box::new(lhs), Box::new(rhs)),
        }
    }
}

impl Add<i64> for AffineExpr {
    type Output = AffineExpr;

    fn add(self, rhs: i64) -> AffineExpr {
        self + Self::Const(rhs)
    }
}

impl Mul<i64> for AffineExpr {
    type Output = AffineExpr;

    fn mul(self, rhs: i64) -> AffineExpr {
        match self {
            _ if rhs == 0 => Self::Const(0),
            _ if rhs == 1 => self,
            Self::Const(c) => Self::Const(c * rhs),
            Self::Mul(expr, c) => Self::Mul(expr, c * rhs),
            other => Self::Mul(Box::new(other), rhs),
        }
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(c) => write!(f, "{c}"),
            Self::Dim(i) => write!(f, "d{i}"),
            Self::Symbol(i) => write!(f, "s{i}"),
            Self::Add(lhs, rhs) => match rhs.as_ref() {
                Self::Const(c) if *c < 0 => write!(f, "{lhs} - {}", -c),
                _ => write!(f, "{lhs} + {rhs}"),
            },
            Self::Mul(expr, c) => {
                expr.fmt_operand(f, 1)?;
                write!(f, " * {c}")
            }
            Self::FloorDiv(expr, d) => {
                expr.fmt_operand(f, 2)?;
                write!(f, " floordiv {d}")
            }
            Self::Mod(expr, d) => {
                expr.fmt_operand(f, 2)?;
                write!(f, " mod {d}")
            }
        }
    }
}
