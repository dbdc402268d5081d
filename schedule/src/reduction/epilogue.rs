//! Epilogues: the fused computation between reduction results and roots.
//!
//! After a group's combine tree finishes, each root is produced from the
//! hero results by the elementwise ops and reshapes between hero and root.
//! The planner does not emit code for them; it walks the graph and calls
//! back into an [`EpilogueBuilder`] supplied by the emission backend.

use std::collections::HashMap;

use snafu::{OptionExt, ResultExt};
use strider_ir::{
    BinaryOp, ConstValue, DType, FusionGraph, IndexingMap, Layout, NodeId, NodeKind, ReduceOp, Shape, UnaryOp,
    bitcast_map,
};
use tracing::trace;

use super::analysis::{HeroFacts, ReductionAnalysis};
use super::error::*;

/// Value a hero's accumulation is seeded with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitValue {
    pub hero: NodeId,
    /// The reduce's init operand.
    pub init: NodeId,
    /// Value of `init` when it is a constant.
    pub constant: Option<ConstValue>,
    pub combiner: ReduceOp,
    /// Combiner identity; per-thread accumulators start from it and `init`
    /// is combined in once, when the result is written.
    pub identity: ConstValue,
}

impl InitValue {
    pub fn for_hero(hero: &HeroFacts) -> Self {
        Self {
            hero: hero.node,
            init: hero.init,
            constant: hero.init_value,
            combiner: hero.combiner,
            identity: hero.combiner.identity(hero.dtype),
        }
    }

    /// Whether combining with `init` is a no-op.
    pub fn is_identity(&self) -> bool {
        self.constant == Some(self.identity)
    }
}

/// What the backend needs to emit one group's epilogue.
#[derive(Debug, Clone, PartialEq)]
pub struct EpilogueSpecification {
    pub group_id: usize,
    pub heroes: Vec<NodeId>,
    pub roots: Vec<NodeId>,
    /// Iteration space of the epilogue: the shared hero output shape.
    pub index_ranges: Shape,
    /// Per root, hero output coordinates to root coordinates.
    pub root_indexing: Vec<IndexingMap>,
}

impl EpilogueSpecification {
    pub fn for_group(analysis: &ReductionAnalysis, group_id: usize) -> Result<Self> {
        let heroes = analysis
            .reduction_heroes()
            .get(group_id)
            .context(InvariantViolationSnafu { message: format!("no reduction group {group_id}") })?
            .clone();
        let roots = analysis.reduction_roots()[group_id].clone();
        let first = heroes
            .first()
            .and_then(|&hero| analysis.hero(hero))
            .context(InvariantViolationSnafu { message: format!("group {group_id} has no hero") })?;
        let index_ranges = first.output_shape.clone();

        let mut root_indexing = Vec::with_capacity(roots.len());
        for &root in &roots {
            let facts = analysis
                .roots()
                .iter()
                .find(|r| r.node == root)
                .context(InvariantViolationSnafu { message: format!("unknown root {root}") })?;
            root_indexing.push(hero_to_root_map(&index_ranges, &facts.shape));
        }
        Ok(Self { group_id, heroes, roots, index_ranges, root_indexing })
    }
}

/// Map from hero output coordinates to the coordinates of a root derived
/// from it; roots reshape the hero output in logical row-major order.
pub fn hero_to_root_map(hero_shape: &[usize], root_shape: &[usize]) -> IndexingMap {
    bitcast_map(hero_shape, root_shape, &Layout::row_major(root_shape.len()))
}

/// Callbacks the emission backend implements to materialize an epilogue.
pub trait EpilogueBuilder {
    type Value: Clone;

    fn constant(&mut self, value: ConstValue, dtype: DType) -> Self::Value;

    fn unary(&mut self, op: UnaryOp, dtype: DType, operand: Self::Value) -> Self::Value;

    fn binary(&mut self, op: BinaryOp, dtype: DType, lhs: Self::Value, rhs: Self::Value) -> Self::Value;

    /// Select lane `lane` of a vector value.
    fn extract_lane(&mut self, vector: Self::Value, lane: Self::Value) -> Self::Value;
}

/// Output values of every root of `group_id`, in root order.
///
/// Reduction roots are rebuilt from `reduction_results` (one value per
/// hero) through the ops between hero and root. Side-output roots are taken
/// from `side_outputs`, already materialized, with lane `vector_index`
/// selected when given.
///
/// # Errors
/// [`ReductionError::InvariantViolation`] when a hero result or side output
/// is missing, or when a root depends on a fusion parameter other than
/// through its hero.
#[tracing::instrument(skip_all, fields(group_id = group_id))]
pub fn compose<B: EpilogueBuilder>(
    graph: &FusionGraph,
    analysis: &ReductionAnalysis,
    group_id: usize,
    builder: &mut B,
    reduction_results: &HashMap<NodeId, B::Value>,
    side_outputs: &HashMap<NodeId, B::Value>,
    vector_index: Option<&B::Value>,
) -> Result<Vec<B::Value>> {
    let roots = analysis
        .groups()
        .grouped_roots
        .get(group_id)
        .context(InvariantViolationSnafu { message: format!("no reduction group {group_id}") })?;
    let side_output_roots = analysis.side_output_roots().get(group_id).map_or(&[][..], Vec::as_slice);
    compose_roots(graph, roots, side_output_roots, builder, reduction_results, side_outputs, vector_index)
}

/// [`compose`] over an explicit root list; `side_output_roots` names the
/// roots of `roots` that are not derived from a reduction.
pub fn compose_roots<B: EpilogueBuilder>(
    graph: &FusionGraph,
    roots: &[NodeId],
    side_output_roots: &[NodeId],
    builder: &mut B,
    reduction_results: &HashMap<NodeId, B::Value>,
    side_outputs: &HashMap<NodeId, B::Value>,
    vector_index: Option<&B::Value>,
) -> Result<Vec<B::Value>> {
    let mut composer = Composer { graph, builder, reduction_results, memo: HashMap::new() };
    let mut values = Vec::with_capacity(roots.len());
    for &root in roots {
        let is_side_output = side_output_roots.contains(&root);
        let value = if is_side_output {
            let value = side_outputs
                .get(&root)
                .context(InvariantViolationSnafu { message: format!("side output {root} was not materialized") })?
                .clone();
            match vector_index {
                Some(lane) => composer.builder.extract_lane(value, lane.clone()),
                None => value,
            }
        } else {
            composer.evaluate(root)?
        };
        trace!(%root, side_output = is_side_output, "composed root");
        values.push(value);
    }
    Ok(values)
}

struct Composer<'a, B: EpilogueBuilder> {
    graph: &'a FusionGraph,
    builder: &'a mut B,
    reduction_results: &'a HashMap<NodeId, B::Value>,
    memo: HashMap<NodeId, B::Value>,
}

impl<B: EpilogueBuilder> Composer<'_, B> {
    fn evaluate(&mut self, id: NodeId) -> Result<B::Value> {
        if let Some(value) = self.memo.get(&id) {
            return Ok(value.clone());
        }
        let graph = self.graph;
        let node = graph.node(id).context(IrSnafu)?;
        let value = match node.kind() {
            NodeKind::Reduce { .. } => self
                .reduction_results
                .get(&id)
                .context(InvariantViolationSnafu { message: format!("no reduction result for hero {id}") })?
                .clone(),
            NodeKind::Constant(value) => self.builder.constant(*value, node.dtype()),
            // Epilogue values are per output element; broadcasts and reshapes
            // only move them.
            NodeKind::Broadcast { .. } | NodeKind::Reshape => self.evaluate(node.operands()[0])?,
            NodeKind::Unary(op) => {
                let operand = self.evaluate(node.operands()[0])?;
                self.builder.unary(*op, node.dtype(), operand)
            }
            NodeKind::Binary(op) => {
                let lhs = self.evaluate(node.operands()[0])?;
                let rhs = self.evaluate(node.operands()[1])?;
                self.builder.binary(*op, node.dtype(), lhs, rhs)
            }
            NodeKind::Parameter { number } => {
                return InvariantViolationSnafu {
                    message: format!("epilogue reads parameter {number} outside of a reduction"),
                }
                .fail();
            }
        };
        self.memo.insert(id, value.clone());
        Ok(value)
    }
}
