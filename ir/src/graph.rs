//! Read-only fact base describing a fused reduction subgraph.
//!
//! A [`FusionGraph`] is an operator DAG in definition order: every operand is
//! defined before its user, so node ids are already a topological order. The
//! planner never mutates a graph; it only queries shapes, layouts, element
//! types and operand lists.

use std::collections::HashSet;

use smallvec::{SmallVec, smallvec};
use snafu::{OptionExt, ensure};
use strider_dtype::DType;

use crate::shape::{Layout, Shape, element_count, validate_shape};
use crate::types::{BinaryOp, ConstValue, ReduceOp, UnaryOp};
use crate::{Result, error::*};

/// Index of a node inside its [`FusionGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Operator kind of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Fusion input.
    Parameter { number: usize },
    /// Scalar or splat constant.
    Constant(ConstValue),
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// `dimensions[i]` is the output dimension that operand dimension `i` maps to.
    Broadcast { dimensions: SmallVec<[usize; 4]> },
    /// Element-count preserving reshape in logical row-major order.
    Reshape,
    /// Reduction of operand 0 along `dimensions`, seeded with the scalar operand 1.
    Reduce { dimensions: SmallVec<[usize; 4]>, combiner: ReduceOp },
}

impl NodeKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Parameter { .. } => "parameter",
            Self::Constant(_) => "constant",
            Self::Unary(_) => "unary",
            Self::Binary(_) => "binary",
            Self::Broadcast { .. } => "broadcast",
            Self::Reshape => "reshape",
            Self::Reduce { .. } => "reduce",
        }
    }

    const fn operand_count(&self) -> usize {
        match self {
            Self::Parameter { .. } | Self::Constant(_) => 0,
            Self::Unary(_) | Self::Broadcast { .. } | Self::Reshape => 1,
            Self::Binary(_) | Self::Reduce { .. } => 2,
        }
    }

    /// Elementwise ops and reshapes: ops an epilogue may be built from.
    pub const fn is_elementwise_or_reshape(&self) -> bool {
        matches!(self, Self::Unary(_) | Self::Binary(_) | Self::Reshape)
    }
}

/// One operator with its per-node facts.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    name: String,
    kind: NodeKind,
    shape: Shape,
    layout: Layout,
    dtype: DType,
    operands: SmallVec<[NodeId; 2]>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn operands(&self) -> &[NodeId] {
        &self.operands
    }

    pub fn is_reduce(&self) -> bool {
        matches!(self.kind, NodeKind::Reduce { .. })
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant(_))
    }

    /// Reduced dimensions and combiner, for reduce nodes.
    pub fn reduce_info(&self) -> Option<(&[usize], ReduceOp)> {
        match &self.kind {
            NodeKind::Reduce { dimensions, combiner } => Some((dimensions.as_slice(), *combiner)),
            _ => None,
        }
    }
}

/// Immutable operator graph of one fusion with its ordered output roots.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionGraph {
    name: String,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl FusionGraph {
    pub fn builder(name: impl Into<String>) -> FusionBuilder {
        FusionBuilder { name: name.into(), nodes: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Look up a node.
    ///
    /// # Errors
    /// Returns [`Error::UnknownNode`] for ids from another graph.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).context(UnknownNodeSnafu { id, len: self.nodes.len() })
    }

    /// Operand `index` of `id`.
    pub fn operand(&self, id: NodeId, index: usize) -> Result<&Node> {
        let node = self.node(id)?;
        let operand = *node.operands.get(index).context(OperandCountMismatchSnafu {
            kind: node.kind.name(),
            expected: index + 1,
            got: node.operands.len(),
        })?;
        self.node(operand)
    }

    /// Nodes that use `id` as an operand, in definition order.
    pub fn users(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes.iter().filter(|n| n.operands.contains(&id)).map(|n| n.id).collect()
    }

    /// All nodes reachable from `id` through operand edges, including `id`.
    pub fn backward_slice(&self, id: NodeId) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current.0) {
                stack.extend(node.operands.iter().copied());
            }
        }
        seen
    }

    /// Reduce nodes in definition order.
    pub fn reduces(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_reduce())
    }
}

/// Incremental constructor for [`FusionGraph`].
///
/// Builder methods only record nodes; [`FusionBuilder::build`] validates
/// operand counts, shapes and layouts for the whole graph at once.
#[derive(Debug, Clone)]
pub struct FusionBuilder {
    name: String,
    nodes: Vec<Node>,
}

impl FusionBuilder {
    fn push(
        &mut self,
        name: String,
        kind: NodeKind,
        shape: Shape,
        layout: Layout,
        dtype: DType,
        operands: SmallVec<[NodeId; 2]>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { id, name, kind, shape, layout, dtype, operands });
        id
    }

    fn facts(&self, id: NodeId) -> (Shape, DType) {
        self.nodes.get(id.0).map(|n| (n.shape.clone(), n.dtype)).unwrap_or((Shape::new(), DType::Float32))
    }

    /// Row-major parameter.
    pub fn parameter(&mut self, number: usize, shape: &[usize], dtype: DType) -> NodeId {
        self.parameter_with_layout(number, shape, Layout::row_major(shape.len()), dtype)
    }

    pub fn parameter_with_layout(&mut self, number: usize, shape: &[usize], layout: Layout, dtype: DType) -> NodeId {
        let name = format!("p{number}");
        self.push(name, NodeKind::Parameter { number }, Shape::from_slice(shape), layout, dtype, smallvec![])
    }

    /// Scalar constant.
    pub fn constant(&mut self, value: ConstValue, dtype: DType) -> NodeId {
        let name = format!("c{}", self.nodes.len());
        self.push(name, NodeKind::Constant(value), Shape::new(), Layout::row_major(0), dtype, smallvec![])
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> NodeId {
        let (shape, dtype) = self.facts(operand);
        let name = format!("{op:?}.{}", self.nodes.len()).to_lowercase();
        let layout = Layout::row_major(shape.len());
        self.push(name, NodeKind::Unary(op), shape, layout, dtype, smallvec![operand])
    }

    pub fn convert(&mut self, operand: NodeId, dtype: DType) -> NodeId {
        let (shape, _) = self.facts(operand);
        let name = format!("convert.{}", self.nodes.len());
        let layout = Layout::row_major(shape.len());
        self.push(name, NodeKind::Unary(UnaryOp::Convert), shape, layout, dtype, smallvec![operand])
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        let (shape, dtype) = self.facts(lhs);
        let name = format!("{op:?}.{}", self.nodes.len()).to_lowercase();
        let layout = Layout::row_major(shape.len());
        self.push(name, NodeKind::Binary(op), shape, layout, dtype, smallvec![lhs, rhs])
    }

    pub fn broadcast(&mut self, operand: NodeId, shape: &[usize], dimensions: &[usize]) -> NodeId {
        let (_, dtype) = self.facts(operand);
        let name = format!("broadcast.{}", self.nodes.len());
        let kind = NodeKind::Broadcast { dimensions: SmallVec::from_slice(dimensions) };
        self.push(name, kind, Shape::from_slice(shape), Layout::row_major(shape.len()), dtype, smallvec![operand])
    }

    pub fn reshape(&mut self, operand: NodeId, shape: &[usize]) -> NodeId {
        let (_, dtype) = self.facts(operand);
        let name = format!("reshape.{}", self.nodes.len());
        let layout = Layout::row_major(shape.len());
        self.push(name, NodeKind::Reshape, Shape::from_slice(shape), layout, dtype, smallvec![operand])
    }

    /// Reduce `input` along `dimensions`; the output keeps the remaining dimensions in order.
    pub fn reduce(&mut self, input: NodeId, init: NodeId, dimensions: &[usize], combiner: ReduceOp) -> NodeId {
        let (input_shape, dtype) = self.facts(input);
        let shape: Shape =
            input_shape.iter().enumerate().filter(|(d, _)| !dimensions.contains(d)).map(|(_, &s)| s).collect();
        let name = format!("reduce.{}", self.nodes.len());
        let kind = NodeKind::Reduce { dimensions: SmallVec::from_slice(dimensions), combiner };
        let layout = Layout::row_major(shape.len());
        self.push(name, kind, shape, layout, dtype, smallvec![input, init])
    }

    /// Override the physical layout of an already recorded node.
    pub fn set_layout(&mut self, id: NodeId, layout: Layout) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.layout = layout;
        }
    }

    /// Validate the recorded nodes and freeze them with the given output roots.
    pub fn build(self, roots: &[NodeId]) -> Result<FusionGraph> {
        for node in &self.nodes {
            self.validate(node)?;
        }
        for &root in roots {
            ensure!(root.0 < self.nodes.len(), UnknownNodeSnafu { id: root, len: self.nodes.len() });
        }
        Ok(FusionGraph { name: self.name, nodes: self.nodes, roots: roots.to_vec() })
    }

    fn validate(&self, node: &Node) -> Result<()> {
        ensure!(
            node.operands.len() == node.kind.operand_count(),
            OperandCountMismatchSnafu { kind: node.kind.name(), expected: node.kind.operand_count(), got: node.operands.len() }
        );
        for &operand in &node.operands {
            ensure!(operand < node.id, OperandNotDefinedSnafu { node: node.id, operand });
        }
        validate_shape(&node.shape)?;
        ensure!(
            node.layout.rank() == node.shape.len(),
            InvalidLayoutSnafu { minor_to_major: SmallVec::from_slice(node.layout.minor_to_major()), rank: node.shape.len() }
        );

        let operand_shape = |i: usize| self.nodes[node.operands[i].0].shape.clone();
        match &node.kind {
            NodeKind::Parameter { .. } | NodeKind::Constant(_) => {}
            NodeKind::Unary(op) => {
                let input = operand_shape(0);
                ensure!(
                    input == node.shape,
                    ElementwiseShapeMismatchSnafu { op: op.name(), lhs: input, rhs: node.shape.clone() }
                );
            }
            NodeKind::Binary(op) => {
                let (lhs, rhs) = (operand_shape(0), operand_shape(1));
                ensure!(lhs == rhs, ElementwiseShapeMismatchSnafu { op: op.name(), lhs, rhs });
            }
            NodeKind::Broadcast { dimensions } => {
                let operand = operand_shape(0);
                let valid = dimensions.len() == operand.len()
                    && dimensions.iter().zip(&operand).all(|(&d, &s)| d < node.shape.len() && node.shape[d] == s);
                ensure!(
                    valid,
                    InvalidBroadcastSnafu { operand, shape: node.shape.clone(), dimensions: dimensions.clone() }
                );
            }
            NodeKind::Reshape => {
                let input_size = element_count(&operand_shape(0));
                let output_size = element_count(&node.shape);
                ensure!(input_size == output_size, ReshapeSizeMismatchSnafu { input_size, output_size });
            }
            NodeKind::Reduce { dimensions, .. } => {
                let input = operand_shape(0);
                for &dim in dimensions {
                    ensure!(dim < input.len(), ReduceDimensionOutOfRangeSnafu { dim, rank: input.len() });
                }
                let expected: Shape =
                    input.iter().enumerate().filter(|(d, _)| !dimensions.contains(d)).map(|(_, &s)| s).collect();
                ensure!(expected == node.shape, ReduceShapeMismatchSnafu { expected, actual: node.shape.clone() });
                let init = operand_shape(1);
                ensure!(init.is_empty(), NonScalarInitSnafu { node: node.id, rank: init.len() });
            }
        }
        Ok(())
    }
}
