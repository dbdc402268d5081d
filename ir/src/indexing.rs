//! Constrained affine indexing maps.
//!
//! An [`IndexingMap`] sends a point of its domain (dimension variables
//! `d0..dn` and range symbols `s0..sm`, each with an inclusive interval) to a
//! tuple of [`AffineExpr`] results. Extra constraints `expr in [lo, hi]`
//! restrict the domain further; a point outside a constraint has no image.
//!
//! Maps print in the domain notation used throughout the planner logs:
//!
//! ```text
//! (d0, d1)[s0] -> (d1, d0 * 4 + s0),
//! domain:
//! d0 in [0, 63],
//! d1 in [0, 7],
//! s0 in [0, 3]
//! ```

use std::fmt;

use smallvec::SmallVec;
use snafu::ensure;

use crate::affine::{AffineExpr, Interval};
use crate::shape::{Layout, strides};
use crate::{Result, error::*};

/// A point of a map domain or image.
pub type Point = SmallVec<[i64; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingMap {
    dims: Vec<Interval>,
    symbols: Vec<Interval>,
    results: SmallVec<[AffineExpr; 4]>,
    constraints: Vec<(AffineExpr, Interval)>,
    undefined: bool,
}

impl IndexingMap {
    pub fn new(dims: Vec<Interval>, symbols: Vec<Interval>, results: impl IntoIterator<Item = AffineExpr>) -> Self {
        Self { dims, symbols, results: results.into_iter().collect(), constraints: Vec::new(), undefined: false }
    }

    /// The sentinel for "this map does not exist": a strategy returns it when
    /// the corresponding phase is skipped entirely.
    pub fn undefined() -> Self {
        Self {
            dims: Vec::new(),
            symbols: Vec::new(),
            results: SmallVec::new(),
            constraints: Vec::new(),
            undefined: true,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.undefined
    }

    pub fn dims(&self) -> &[Interval] {
        &self.dims
    }

    pub fn symbols(&self) -> &[Interval] {
        &self.symbols
    }

    pub fn results(&self) -> &[AffineExpr] {
        &self.results
    }

    pub fn constraints(&self) -> &[(AffineExpr, Interval)] {
        &self.constraints
    }

    pub fn num_dims(&self) -> usize {
        self.dims.len()
    }

    pub fn num_symbols(&self) -> usize {
        self.symbols.len()
    }

    pub fn add_constraint(&mut self, expr: AffineExpr, range: Interval) {
        self.constraints.push((expr, range));
    }

    pub fn with_constraint(mut self, expr: AffineExpr, range: Interval) -> Self {
        self.add_constraint(expr, range);
        self
    }

    /// Whether symbol `index` occurs in any result expression.
    pub fn is_symbol_used(&self, index: usize) -> bool {
        self.results.iter().any(|r| r.is_function_of_symbol(index))
    }

    /// Collapse the range of every symbol absent from the results to `[0, 0]`.
    ///
    /// A symbol that no result depends on would otherwise multiply the number
    /// of times each image point is visited. Symbol positions are kept so that
    /// callers can still address e.g. the vector lane by its index.
    pub fn collapse_unused_symbols(mut self) -> Self {
        for index in 0..self.symbols.len() {
            if !self.is_symbol_used(index) {
                self.symbols[index] = Interval::point(0);
            }
        }
        self.simplify()
    }

    /// Fold results and constraints using the domain ranges.
    ///
    /// Constraints that hold for the whole domain are dropped.
    pub fn simplify(mut self) -> Self {
        if self.undefined {
            return self;
        }
        let (dims, symbols) = (&self.dims, &self.symbols);
        self.results = self.results.iter().map(|r| r.simplify(dims, symbols)).collect();
        let mut constraints: Vec<(AffineExpr, Interval)> = Vec::with_capacity(self.constraints.len());
        for (expr, range) in &self.constraints {
            let expr = expr.simplify(dims, symbols);
            if expr.bounds(dims, symbols).is_subset_of(range) {
                continue;
            }
            if !constraints.iter().any(|(e, r)| *e == expr && r == range) {
                constraints.push((expr, *range));
            }
        }
        self.constraints = constraints;
        self
    }

    /// Check that every variable is declared and every interval is non-empty.
    ///
    /// # Errors
    /// [`Error::DimOutOfDomain`], [`Error::SymbolOutOfDomain`] or
    /// [`Error::EmptyInterval`].
    pub fn verify(&self) -> Result<()> {
        if self.undefined {
            return Ok(());
        }
        for (i, range) in self.dims.iter().enumerate() {
            ensure!(!range.is_empty(), EmptyIntervalSnafu { what: format!("d{i}"), lower: range.lower, upper: range.upper });
        }
        for (i, range) in self.symbols.iter().enumerate() {
            ensure!(!range.is_empty(), EmptyIntervalSnafu { what: format!("s{i}"), lower: range.lower, upper: range.upper });
        }
        for (expr, range) in &self.constraints {
            ensure!(
                !range.is_empty(),
                EmptyIntervalSnafu { what: format!("constraint {expr}"), lower: range.lower, upper: range.upper }
            );
        }

        let exprs = self.results.iter().chain(self.constraints.iter().map(|(e, _)| e));
        for expr in exprs {
            let mut outcome = Ok(());
            expr.walk_vars(&mut |var| {
                if outcome.is_err() {
                    return;
                }
                outcome = match *var {
                    AffineExpr::Dim(index) if index >= self.dims.len() => {
                        DimOutOfDomainSnafu { index, num_dims: self.dims.len() }.fail()
                    }
                    AffineExpr::Symbol(index) if index >= self.symbols.len() => {
                        SymbolOutOfDomainSnafu { index, num_symbols: self.symbols.len() }.fail()
                    }
                    _ => Ok(()),
                };
            });
            outcome?;
        }
        Ok(())
    }

    /// Whether a domain point lies inside every variable range and constraint.
    pub fn contains(&self, dims: &[i64], symbols: &[i64]) -> bool {
        !self.undefined
            && dims.len() == self.dims.len()
            && symbols.len() == self.symbols.len()
            && dims.iter().zip(&self.dims).all(|(v, r)| r.contains(*v))
            && symbols.iter().zip(&self.symbols).all(|(v, r)| r.contains(*v))
            && self.satisfies_constraints(dims, symbols)
    }

    pub fn satisfies_constraints(&self, dims: &[i64], symbols: &[i64]) -> bool {
        self.constraints.iter().all(|(expr, range)| range.contains(expr.eval(dims, symbols)))
    }

    /// Image of a domain point. The caller is responsible for the point being
    /// inside the domain (see [`IndexingMap::contains`]).
    pub fn evaluate(&self, dims: &[i64], symbols: &[i64]) -> Point {
        self.results.iter().map(|r| r.eval(dims, symbols)).collect()
    }

    /// Conservative range of each result over the domain.
    pub fn result_ranges(&self) -> Vec<Interval> {
        self.results.iter().map(|r| r.bounds(&self.dims, &self.symbols)).collect()
    }

    /// All domain points `(dims, symbols)` that satisfy the constraints, in
    /// lexicographic order with the last symbol varying fastest.
    pub fn domain_points(&self) -> DomainPoints<'_> {
        let ranges: Vec<Interval> = self.dims.iter().chain(&self.symbols).copied().collect();
        let start = if self.undefined || ranges.iter().any(Interval::is_empty) {
            None
        } else {
            Some(ranges.iter().map(|r| r.lower).collect())
        };
        DomainPoints { map: self, ranges, current: start }
    }

    /// `next ∘ self`: feed this map's results into the dimensions of `next`.
    ///
    /// `next` must be symbol-free; its constraints are carried over.
    ///
    /// # Errors
    /// [`Error::UndefinedMap`] if either map is undefined,
    /// [`Error::ResultArityMismatch`] if `next` does not take this map's results.
    pub fn compose(&self, next: &IndexingMap) -> Result<IndexingMap> {
        ensure!(!self.undefined && !next.undefined, UndefinedMapSnafu { operation: "compose" });
        ensure!(
            next.dims.len() == self.results.len() && next.symbols.is_empty(),
            ResultArityMismatchSnafu { results: self.results.len(), rank: next.dims.len() }
        );
        let results = next.results.iter().map(|r| r.replace_dims(&self.results));
        let mut composed = IndexingMap::new(self.dims.clone(), self.symbols.clone(), results);
        composed.constraints = self.constraints.clone();
        for (expr, range) in &next.constraints {
            composed.add_constraint(expr.replace_dims(&self.results), *range);
        }
        Ok(composed.simplify())
    }
}

impl fmt::Display for IndexingMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.undefined {
            return write!(f, "UNDEFINED");
        }
        let dims = (0..self.dims.len()).map(|i| format!("d{i}")).collect::<Vec<_>>().join(", ");
        write!(f, "({dims})")?;
        if !self.symbols.is_empty() {
            let symbols = (0..self.symbols.len()).map(|i| format!("s{i}")).collect::<Vec<_>>().join(", ");
            write!(f, "[{symbols}]")?;
        }
        let results = self.results.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        write!(f, " -> ({results})")?;

        let mut domain: Vec<String> = Vec::new();
        domain.extend(self.dims.iter().enumerate().map(|(i, r)| format!("d{i} in {r}")));
        domain.extend(self.symbols.iter().enumerate().map(|(i, r)| format!("s{i} in {r}")));
        domain.extend(self.constraints.iter().map(|(e, r)| format!("{e} in {r}")));
        if !domain.is_empty() {
            write!(f, ",\ndomain:\n{}", domain.join(",\n"))?;
        }
        Ok(())
    }
}

/// Iterator over the constrained domain of an [`IndexingMap`].
pub struct DomainPoints<'a> {
    map: &'a IndexingMap,
    ranges: Vec<Interval>,
    current: Option<Vec<i64>>,
}

impl DomainPoints<'_> {
    fn advance(&mut self) {
        let Some(current) = self.current.as_mut() else { return };
        for (value, range) in current.iter_mut().zip(&self.ranges).rev() {
            if *value < range.upper {
                *value += 1;
                return;
            }
            *value = range.lower;
        }
        self.current = None;
    }
}

impl Iterator for DomainPoints<'_> {
    type Item = (Point, Point);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let point = self.current.clone()?;
            self.advance();
            let (dims, symbols) = point.split_at(self.map.dims.len());
            if self.map.satisfies_constraints(dims, symbols) {
                return Some((Point::from_slice(dims), Point::from_slice(symbols)));
            }
        }
    }
}

/// Row-major linear index of `indices` within `sizes`.
pub fn linearize_index(indices: &[AffineExpr], sizes: &[usize]) -> AffineExpr {
    indices
        .iter()
        .zip(strides(sizes))
        .fold(AffineExpr::constant(0), |acc, (index, stride)| acc + index.clone() * stride as i64)
}

/// Row-major multi-index of `linear` within `sizes`, assuming `linear` is in
/// bounds: the outermost coordinate is not reduced modulo its size and
/// size-1 coordinates are the constant 0.
pub fn delinearize_in_bounds_index(linear: AffineExpr, sizes: &[usize]) -> SmallVec<[AffineExpr; 4]> {
    let strides = strides(sizes);
    sizes
        .iter()
        .zip(&strides)
        .enumerate()
        .map(|(i, (&size, &stride))| {
            if size == 1 {
                return AffineExpr::constant(0);
            }
            let coordinate = linear.clone().floor_div(stride as i64);
            if i == 0 { coordinate } else { coordinate.modulo(size as i64) }
        })
        .collect()
}

/// Map from a row-major iteration space of extents `from` onto the logical
/// coordinates of a tensor with `shape` stored in `layout`.
///
/// Both sides must hold the same number of elements; the map reinterprets the
/// same linear memory order (a bitcast).
pub fn bitcast_map(from: &[usize], shape: &[usize], layout: &Layout) -> IndexingMap {
    let dims: Vec<Interval> = from.iter().map(|&s| Interval::from_size(s)).collect();
    let variables: Vec<AffineExpr> = (0..from.len()).map(AffineExpr::dim).collect();
    let linear = linearize_index(&variables, from);

    let physical_order = layout.major_to_minor();
    let physical = delinearize_in_bounds_index(linear, &layout.physical_shape(shape));
    let mut logical: SmallVec<[AffineExpr; 4]> = SmallVec::from_elem(AffineExpr::constant(0), shape.len());
    for (position, expr) in physical.into_iter().enumerate() {
        logical[physical_order[position]] = expr;
    }
    IndexingMap::new(dims, Vec::new(), logical).simplify()
}
