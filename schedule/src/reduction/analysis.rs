//! Reduction analysis: heroes, groups and the collapsed reduction shape.
//!
//! Runs once per fusion. Every root is traced back to its *hero*, the reduce
//! operator whose result it is derived from through elementwise ops and
//! reshapes. Roots that share any non-constant node are grouped; each group
//! becomes one independent combine tree. The first hero's operand shape,
//! layout and reduced dimensions determine the [`ReductionDimensions`].

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use smallvec::SmallVec;
use snafu::{OptionExt, ResultExt, ensure};
use strider_dtype::DType;
use strider_ir::{ConstValue, FusionGraph, Layout, NodeId, NodeKind, ReduceOp, Shape};
use tracing::debug;

use super::dimensions::ReductionDimensions;
use super::error::*;
use crate::config::ReductionConfig;
use crate::device::DeviceInfo;

/// Partition of the fusion roots into independent reduction groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionGroups {
    /// Roots of each group, in root order.
    pub grouped_roots: Vec<Vec<NodeId>>,
    /// Group of each root, indexed like the fusion roots.
    pub group_id_per_root: Vec<usize>,
    /// Whether each root is derived from a reduce hero.
    pub is_reduction_root: Vec<bool>,
}

impl ReductionGroups {
    pub fn num_groups(&self) -> usize {
        self.grouped_roots.len()
    }
}

/// Facts about one reduce hero that later stages need.
#[derive(Debug, Clone, PartialEq)]
pub struct HeroFacts {
    pub node: NodeId,
    pub combiner: ReduceOp,
    /// Accumulator element type.
    pub dtype: DType,
    pub operand_shape: Shape,
    pub operand_layout: Layout,
    pub operand_dtype: DType,
    pub reduced_dims: SmallVec<[usize; 4]>,
    pub output_shape: Shape,
    pub init: NodeId,
    /// Value of the init operand when it is a constant.
    pub init_value: Option<ConstValue>,
}

impl HeroFacts {
    /// Layout of the reduce output: the operand layout restricted to the kept
    /// dimensions.
    pub fn output_layout(&self) -> Result<Layout> {
        let output_dim = |dim: usize| dim - self.reduced_dims.iter().filter(|&&r| r < dim).count();
        let minor_to_major: SmallVec<[usize; 4]> = self
            .operand_layout
            .minor_to_major()
            .iter()
            .filter(|dim| !self.reduced_dims.contains(dim))
            .map(|&dim| output_dim(dim))
            .collect();
        Layout::new(minor_to_major).context(IrSnafu)
    }
}

/// Facts about one fusion root.
#[derive(Debug, Clone, PartialEq)]
pub struct RootFacts {
    pub node: NodeId,
    pub shape: Shape,
    pub dtype: DType,
    pub hero: Option<NodeId>,
}

/// Result of analyzing a reduction fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionAnalysis {
    groups: ReductionGroups,
    dimensions: ReductionDimensions,
    first_hero: NodeId,
    reduction_heroes: Vec<Vec<NodeId>>,
    reduction_roots: Vec<Vec<NodeId>>,
    side_output_roots: Vec<Vec<NodeId>>,
    heroes: Vec<HeroFacts>,
    roots: Vec<RootFacts>,
}

impl ReductionAnalysis {
    /// Analyze `graph`, rejecting fusions outside the supported subset.
    ///
    /// # Errors
    /// [`ReductionError::UnsupportedShape`] when the fusion has no reduction,
    /// several groups, side outputs, a layout that is neither a row nor a
    /// column reduction, mismatched heroes, or a reduction that would need a
    /// cross-block combine.
    #[tracing::instrument(skip_all, fields(fusion = graph.name()))]
    pub fn analyze(graph: &FusionGraph, device: &DeviceInfo, config: &ReductionConfig) -> Result<Self> {
        ensure!(
            graph.reduces().next().is_some(),
            UnsupportedShapeSnafu { category: UnsupportedCategory::NoReduction, reason: "fusion has no reduce" }
        );

        let groups = group_roots(graph)?;
        ensure!(
            groups.num_groups() == 1,
            UnsupportedShapeSnafu {
                category: UnsupportedCategory::MultipleGroups,
                reason: format!("{} independent reduction groups", groups.num_groups()),
            }
        );

        let mut roots = Vec::with_capacity(graph.roots().len());
        for &root in graph.roots() {
            let node = graph.node(root).context(IrSnafu)?;
            let hero = find_reduction_hero(graph, root)?;
            roots.push(RootFacts { node: root, shape: Shape::from_slice(node.shape()), dtype: node.dtype(), hero });
        }

        let mut reduction_heroes = vec![Vec::new(); groups.num_groups()];
        let mut reduction_roots = vec![Vec::new(); groups.num_groups()];
        let mut side_output_roots = vec![Vec::new(); groups.num_groups()];
        for (root, &group) in roots.iter().zip(&groups.group_id_per_root) {
            match root.hero {
                Some(hero) => {
                    reduction_roots[group].push(root.node);
                    if !reduction_heroes[group].contains(&hero) {
                        reduction_heroes[group].push(hero);
                    }
                }
                None => side_output_roots[group].push(root.node),
            }
        }
        let side_outputs = side_output_roots.iter().flatten().collect_vec();
        ensure!(
            side_outputs.is_empty(),
            UnsupportedShapeSnafu {
                category: UnsupportedCategory::SideOutputs,
                reason: format!("roots {} are not derived from a reduction", side_outputs.iter().join(", ")),
            }
        );

        let heroes = reduction_heroes.iter().flatten().map(|&hero| hero_facts(graph, hero)).collect::<Result<Vec<_>>>()?;
        let first = heroes.first().context(InvariantViolationSnafu { message: "group without heroes" })?;
        for other in &heroes[1..] {
            let same = other.operand_shape == first.operand_shape
                && other.operand_layout == first.operand_layout
                && other.reduced_dims.iter().sorted().eq(first.reduced_dims.iter().sorted());
            ensure!(
                same,
                UnsupportedShapeSnafu {
                    category: UnsupportedCategory::MismatchedHeroes,
                    reason: format!("{} and {} reduce different iteration spaces", first.node, other.node),
                }
            );
        }

        let dimensions = reduction_dimensions(&first.operand_shape, &first.operand_layout, &first.reduced_dims)?;
        check_race_free(&dimensions, device, config)?;
        let first_hero = first.node;
        debug!(%dimensions, heroes = heroes.len(), roots = roots.len(), "reduction analysis");

        Ok(Self {
            groups,
            dimensions,
            first_hero,
            reduction_heroes,
            reduction_roots,
            side_output_roots,
            heroes,
            roots,
        })
    }

    pub fn groups(&self) -> &ReductionGroups {
        &self.groups
    }

    pub fn dimensions(&self) -> &ReductionDimensions {
        &self.dimensions
    }

    pub fn first_hero(&self) -> NodeId {
        self.first_hero
    }

    /// De-duplicated heroes of each group.
    pub fn reduction_heroes(&self) -> &[Vec<NodeId>] {
        &self.reduction_heroes
    }

    /// Roots with a reduction hero, per group.
    pub fn reduction_roots(&self) -> &[Vec<NodeId>] {
        &self.reduction_roots
    }

    /// Roots without a reduction hero, per group.
    pub fn side_output_roots(&self) -> &[Vec<NodeId>] {
        &self.side_output_roots
    }

    pub fn heroes(&self) -> &[HeroFacts] {
        &self.heroes
    }

    pub fn hero(&self, node: NodeId) -> Option<&HeroFacts> {
        self.heroes.iter().find(|h| h.node == node)
    }

    pub fn roots(&self) -> &[RootFacts] {
        &self.roots
    }

    pub fn root(&self, index: usize) -> Option<&RootFacts> {
        self.roots.get(index)
    }

    /// Narrowest hero operand element width, in bits.
    pub fn smallest_input_bits(&self) -> usize {
        strider_dtype::smallest_bits(self.heroes.iter().map(|h| &h.operand_dtype)).unwrap_or(32)
    }

    /// Whether any hero reads or accumulates complex values.
    pub fn has_complex(&self) -> bool {
        self.heroes.iter().any(|h| h.operand_dtype.is_complex() || h.dtype.is_complex())
    }

    /// Shared-memory bytes needed for one partial result of every hero.
    pub fn partial_bytes(&self) -> usize {
        self.heroes.iter().map(|h| h.dtype.bytes()).sum()
    }
}

/// Constants and broadcasts of constants.
fn is_trivial(graph: &FusionGraph, id: NodeId) -> bool {
    let Ok(node) = graph.node(id) else { return false };
    match node.kind() {
        NodeKind::Constant(_) => true,
        NodeKind::Broadcast { .. } => node.operands().iter().all(|&op| is_trivial(graph, op)),
        _ => false,
    }
}

/// Trace `root` through elementwise ops and reshapes to its reduce hero.
///
/// Binary ops are followed when exactly one operand is non-trivial.
pub fn find_reduction_hero(graph: &FusionGraph, root: NodeId) -> Result<Option<NodeId>> {
    let mut current = graph.node(root).context(IrSnafu)?;
    loop {
        match current.kind() {
            NodeKind::Reduce { .. } => return Ok(Some(current.id())),
            NodeKind::Unary(_) | NodeKind::Reshape => {
                current = graph.operand(current.id(), 0).context(IrSnafu)?;
            }
            NodeKind::Binary(_) => {
                let mut non_trivial = current.operands().iter().filter(|&&op| !is_trivial(graph, op));
                match (non_trivial.next(), non_trivial.next()) {
                    (Some(&operand), None) => current = graph.node(operand).context(IrSnafu)?,
                    _ => return Ok(None),
                }
            }
            NodeKind::Parameter { .. } | NodeKind::Constant(_) | NodeKind::Broadcast { .. } => return Ok(None),
        }
    }
}

/// Group roots that share any non-trivial node.
pub fn group_roots(graph: &FusionGraph) -> Result<ReductionGroups> {
    let roots = graph.roots();
    let slices: Vec<HashSet<NodeId>> = roots
        .iter()
        .map(|&root| graph.backward_slice(root).into_iter().filter(|&n| !is_trivial(graph, n)).collect())
        .collect();

    let mut parent: Vec<usize> = (0..roots.len()).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    for (i, j) in (0..roots.len()).tuple_combinations() {
        if !slices[i].is_disjoint(&slices[j]) {
            let (a, b) = (find(&mut parent, i), find(&mut parent, j));
            parent[a.max(b)] = a.min(b);
        }
    }

    let mut group_of_representative: HashMap<usize, usize> = HashMap::new();
    let mut grouped_roots: Vec<Vec<NodeId>> = Vec::new();
    let mut group_id_per_root = Vec::with_capacity(roots.len());
    let mut is_reduction_root = Vec::with_capacity(roots.len());
    for (i, &root) in roots.iter().enumerate() {
        let representative = find(&mut parent, i);
        let group = *group_of_representative.entry(representative).or_insert_with(|| {
            grouped_roots.push(Vec::new());
            grouped_roots.len() - 1
        });
        grouped_roots[group].push(root);
        group_id_per_root.push(group);
        is_reduction_root.push(find_reduction_hero(graph, root)?.is_some());
    }

    Ok(ReductionGroups { grouped_roots, group_id_per_root, is_reduction_root })
}

fn hero_facts(graph: &FusionGraph, hero: NodeId) -> Result<HeroFacts> {
    let node = graph.node(hero).context(IrSnafu)?;
    let (reduced_dims, combiner) =
        node.reduce_info().context(InvariantViolationSnafu { message: format!("hero {hero} is not a reduce") })?;
    let operand = graph.operand(hero, 0).context(IrSnafu)?;
    let init = graph.operand(hero, 1).context(IrSnafu)?;
    let init_value = match init.kind() {
        NodeKind::Constant(value) => Some(*value),
        _ => None,
    };
    Ok(HeroFacts {
        node: hero,
        combiner,
        dtype: node.dtype(),
        operand_shape: Shape::from_slice(operand.shape()),
        operand_layout: operand.layout().clone(),
        operand_dtype: operand.dtype(),
        reduced_dims: SmallVec::from_slice(reduced_dims),
        output_shape: Shape::from_slice(node.shape()),
        init: init.id(),
        init_value,
    })
}

/// Collapse a reduce operand into row or column reduction dimensions.
///
/// Size-1 dimensions are dropped and physically adjacent dimensions of the
/// same kind (reduced or kept) are merged. The remaining runs must read
/// `[reduced][kept][reduced]` (row) or `[kept][reduced][kept]` (column) from
/// major to minor, with any outer run optional.
pub fn reduction_dimensions(shape: &[usize], layout: &Layout, reduced_dims: &[usize]) -> Result<ReductionDimensions> {
    let mut runs: SmallVec<[(bool, usize); 4]> = SmallVec::new();
    for dim in layout.major_to_minor() {
        let size = shape[dim];
        if size == 1 {
            continue;
        }
        let reduced = reduced_dims.contains(&dim);
        match runs.last_mut() {
            Some((kind, run)) if *kind == reduced => *run *= size,
            _ => runs.push((reduced, size)),
        }
    }

    let dimensions = match runs.as_slice() {
        [] => ReductionDimensions::row(1, 1, 1),
        [(true, reduced)] => ReductionDimensions::row(1, 1, *reduced),
        [(false, kept)] => ReductionDimensions::row(1, *kept, 1),
        [(false, kept), (true, reduced)] => ReductionDimensions::row(1, *kept, *reduced),
        [(true, batch), (false, kept), (true, reduced)] => ReductionDimensions::row(*batch, *kept, *reduced),
        [(true, reduced), (false, kept)] => ReductionDimensions::column(1, *reduced, *kept),
        [(false, batch), (true, reduced), (false, kept)] => ReductionDimensions::column(*batch, *reduced, *kept),
        _ => {
            let pattern = runs.iter().map(|(reduced, size)| if *reduced { format!("r{size}") } else { format!("k{size}") });
            return UnsupportedShapeSnafu {
                category: UnsupportedCategory::Layout,
                reason: format!("physical pattern [{}] is neither a row nor a column reduction", pattern.format(", ")),
            }
            .fail();
        }
    };
    Ok(dimensions)
}

/// Reject reductions whose combine tree could not finish inside one block.
pub fn check_race_free(dimensions: &ReductionDimensions, device: &DeviceInfo, config: &ReductionConfig) -> Result<()> {
    if dimensions.is_row_reduction {
        let max_reduced = config.max_row_threads * config.row_tile_elements_per_thread;
        ensure!(
            dimensions.reduced_size() <= max_reduced,
            UnsupportedShapeSnafu {
                category: UnsupportedCategory::CrossBlock,
                reason: format!("row of {} elements exceeds {max_reduced}", dimensions.reduced_size()),
            }
        );
        ensure!(
            dimensions.batch_size() <= config.batch_race_free_bound,
            UnsupportedShapeSnafu {
                category: UnsupportedCategory::CrossBlock,
                reason: format!("batch {} exceeds {}", dimensions.batch_size(), config.batch_race_free_bound),
            }
        );
    } else {
        let max_reduced = device.warp_size * config.column_tile_rows_per_thread;
        ensure!(
            dimensions.reduced_size() <= max_reduced,
            UnsupportedShapeSnafu {
                category: UnsupportedCategory::CrossBlock,
                reason: format!("column of {} elements exceeds {max_reduced}", dimensions.reduced_size()),
            }
        );
    }
    Ok(())
}
