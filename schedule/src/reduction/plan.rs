use std::collections::HashMap;

use snafu::{ResultExt, ensure};
use strider_ir::{FusionGraph, IndexingMap, NodeId, bitcast_map};
use tracing::debug;

use super::analysis::ReductionAnalysis;
use super::combine::validate_combine_sequence;
use super::dimensions::ReductionDimensions;
use super::epilogue::{self, EpilogueBuilder, EpilogueSpecification, InitValue, hero_to_root_map};
use super::error::*;
use super::maps::{project_results, verify_map};
use super::strategy::ReductionStrategy;
use super::tiling::{ElementInfo, LaunchDimensions, TilingParameters, check_config};
use crate::config::ReductionConfig;
use crate::device::DeviceInfo;

/// Complete launch and indexing plan of a reduction fusion.
///
/// Planning is a pure function of the graph, the device and the
/// configuration; all accessors are read-only views of write-once facts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionPlan {
    analysis: ReductionAnalysis,
    strategy: ReductionStrategy,
    launch: LaunchDimensions,
    shared_memory_bytes: usize,
}

impl ReductionPlan {
    /// Analyze `graph` and plan its reduction for `device`.
    ///
    /// # Errors
    /// [`ReductionError::UnsupportedShape`] for fusions outside the supported
    /// subset and [`ReductionError::ResourceLimitExceeded`] when no tiling fits
    /// the device; both mean the caller should fall back. Any other error is
    /// a planner bug or a configuration with a zero tunable.
    #[tracing::instrument(skip_all, fields(fusion = graph.name(), device = %device.name))]
    pub fn new(graph: &FusionGraph, device: &DeviceInfo, config: &ReductionConfig) -> Result<Self> {
        check_config(config)?;
        let analysis = ReductionAnalysis::analyze(graph, device, config)?;
        let elements = ElementInfo::from_analysis(&analysis);
        let strategy = ReductionStrategy::plan(analysis.dimensions(), &elements, device, config)?;

        let launch = strategy.launch_dimensions();
        launch.validate(device)?;
        strategy.verify_maps()?;
        validate_combine_sequence(&strategy.combine_steps(), device.warp_size)?;

        let shared_memory_bytes =
            strategy.shared_tile_shape().map_or(0, |[rows, columns]| rows * columns * elements.partial_bytes);
        ensure!(
            shared_memory_bytes <= device.shared_memory_per_block,
            ResourceLimitExceededSnafu {
                resource: "shared memory",
                value: shared_memory_bytes,
                max: device.shared_memory_per_block,
            }
        );

        debug!(strategy = strategy.name(), %launch, shared_memory_bytes, "reduction plan");
        Ok(Self { analysis, strategy, launch, shared_memory_bytes })
    }

    pub fn analysis(&self) -> &ReductionAnalysis {
        &self.analysis
    }

    pub fn strategy(&self) -> &ReductionStrategy {
        &self.strategy
    }

    pub fn dimensions(&self) -> &ReductionDimensions {
        self.analysis.dimensions()
    }

    pub fn tiling(&self) -> &TilingParameters {
        self.strategy.tiling()
    }

    pub fn launch_dimensions(&self) -> LaunchDimensions {
        self.launch
    }

    /// Bytes of the shared scratch tile; 0 when the strategy needs none.
    pub fn shared_memory_bytes(&self) -> usize {
        self.shared_memory_bytes
    }

    /// Projected input map restricted to the results `keep`.
    ///
    /// Tile-offset symbols used only by the dropped results are collapsed to
    /// a single value.
    pub fn input_indexing_for_results(&self, keep: &[usize]) -> IndexingMap {
        project_results(&self.strategy.thread_id_to_input_map(), keep)
    }

    /// Logical coordinates of root `root_index` written by each thread.
    ///
    /// `None` when the root does not exist or is not a reduction root.
    pub fn thread_id_to_output_indexing(&self, root_index: usize) -> Result<Option<IndexingMap>> {
        let Some(root) = self.analysis.root(root_index) else { return Ok(None) };
        let Some(hero) = root.hero.and_then(|hero| self.analysis.hero(hero)) else { return Ok(None) };

        let projected_shape = self.dimensions().output_shape();
        let to_hero = bitcast_map(&projected_shape, &hero.output_shape, &hero.output_layout()?);
        let mut map = self.strategy.thread_id_to_output_map().compose(&to_hero).context(IrSnafu)?;
        if root.shape != hero.output_shape {
            map = map.compose(&hero_to_root_map(&hero.output_shape, &root.shape)).context(IrSnafu)?;
        }
        verify_map("root output", &map)?;
        Ok(Some(map))
    }

    /// Logical coordinates of operand `hero_operand_index` of the hero of root
    /// `root_index` read by each thread.
    ///
    /// Operand 0 is the reduced input; operand 1 is the scalar init value,
    /// whose map has no results. `None` for any other operand, for unknown
    /// roots and for roots without a hero.
    pub fn thread_id_to_input_indexing(&self, root_index: usize, hero_operand_index: usize) -> Result<Option<IndexingMap>> {
        let Some(root) = self.analysis.root(root_index) else { return Ok(None) };
        let Some(hero) = root.hero.and_then(|hero| self.analysis.hero(hero)) else { return Ok(None) };

        let projected = self.strategy.thread_id_to_input_map();
        match hero_operand_index {
            0 => {
                let to_operand = bitcast_map(&self.dimensions().dimensions, &hero.operand_shape, &hero.operand_layout);
                let map = projected.compose(&to_operand).context(IrSnafu)?;
                verify_map("hero operand", &map)?;
                Ok(Some(map))
            }
            1 => Ok(Some(project_results(&projected, &[]))),
            _ => Ok(None),
        }
    }

    /// Epilogue specification of every group.
    pub fn epilogues(&self) -> Result<Vec<EpilogueSpecification>> {
        (0..self.analysis.groups().num_groups())
            .map(|group_id| EpilogueSpecification::for_group(&self.analysis, group_id))
            .collect()
    }

    /// Init values of the heroes of `group_id`, in hero order.
    pub fn inits(&self, group_id: usize) -> Option<Vec<InitValue>> {
        let heroes = self.analysis.reduction_heroes().get(group_id)?;
        heroes.iter().map(|&hero| self.analysis.hero(hero).map(InitValue::for_hero)).collect()
    }

    /// Build the output values of the roots of `group_id` with `builder`.
    ///
    /// See [`epilogue::compose`].
    pub fn compose_epilogue<B: EpilogueBuilder>(
        &self,
        graph: &FusionGraph,
        group_id: usize,
        builder: &mut B,
        reduction_results: &HashMap<NodeId, B::Value>,
        side_outputs: &HashMap<NodeId, B::Value>,
        vector_index: Option<&B::Value>,
    ) -> Result<Vec<B::Value>> {
        epilogue::compose(graph, &self.analysis, group_id, builder, reduction_results, side_outputs, vector_index)
    }
}
