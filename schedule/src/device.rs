//! Target device limits.
//!
//! The planner never talks to a device; it only needs the handful of
//! architectural limits that constrain a launch grid and the shared-memory
//! scratch buffers of the combine phase.

/// Architectural limits of a GPU target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    /// Device identifier (e.g. "CUDA_SM80", "Metal").
    pub name: String,

    /// Threads per warp (wavefront, SIMD group, subgroup).
    ///
    /// Shuffle trees never cross a warp boundary.
    pub warp_size: usize,

    /// Maximum number of threads in one block.
    pub max_threads_per_block: usize,

    /// Shared memory available to one block, in bytes.
    ///
    /// Typical values: 16KB (WebGPU) to 64KB (AMD).
    pub shared_memory_per_block: usize,

    /// Maximum number of blocks along grid `x`, `y` and `z`.
    ///
    /// Launches whose block count exceeds the `x` limit are spread over `y`
    /// and `z`.
    pub max_grid_dims: [usize; 3],
}

impl DeviceInfo {
    /// Default CUDA target (SM80).
    pub fn cuda() -> Self {
        Self::cuda_sm80()
    }

    /// CUDA SM75 (Turing - RTX 20xx, T4).
    pub fn cuda_sm75() -> Self {
        Self {
            name: "CUDA_SM75".to_string(),
            warp_size: 32,
            max_threads_per_block: 1024,
            shared_memory_per_block: 49152,
            max_grid_dims: [2147483647, 65535, 65535],
        }
    }

    /// CUDA SM80 (Ampere - A100, RTX 30xx).
    pub fn cuda_sm80() -> Self {
        Self { name: "CUDA_SM80".to_string(), ..Self::cuda_sm75() }
    }

    /// CUDA SM89 (Ada - RTX 40xx, L4).
    pub fn cuda_sm89() -> Self {
        Self { name: "CUDA_SM89".to_string(), ..Self::cuda_sm75() }
    }

    /// AMD CDNA3 (MI300 series), 64-wide wavefronts.
    pub fn amd_cdna3() -> Self {
        Self {
            name: "AMD_CDNA3".to_string(),
            warp_size: 64,
            max_threads_per_block: 1024,
            shared_memory_per_block: 65536, // 64KB LDS
            max_grid_dims: [2147483647, 65536, 65536],
        }
    }

    /// AMD RDNA3 (RX 7000 series) in wave32 mode.
    pub fn amd_rdna3() -> Self {
        Self {
            name: "AMD_RDNA3".to_string(),
            warp_size: 32,
            max_threads_per_block: 1024,
            shared_memory_per_block: 65536,
            max_grid_dims: [2147483647, 65536, 65536],
        }
    }

    /// Apple GPUs (M1/M2/M3).
    pub fn metal() -> Self {
        Self {
            name: "Metal".to_string(),
            warp_size: 32,
            max_threads_per_block: 1024,
            shared_memory_per_block: 32768, // 32KB threadgroup memory
            max_grid_dims: [4294967295, 65535, 65535],
        }
    }

    /// Intel Xe with 16-wide subgroups.
    pub fn intel_xe() -> Self {
        Self {
            name: "IntelXe".to_string(),
            warp_size: 16,
            max_threads_per_block: 512,
            shared_memory_per_block: 65536,
            max_grid_dims: [2147483647, 65535, 65535],
        }
    }

    /// WebGPU with the default adapter limits.
    pub fn webgpu() -> Self {
        Self {
            name: "WebGPU".to_string(),
            warp_size: 32,
            max_threads_per_block: 256,
            shared_memory_per_block: 16384,
            max_grid_dims: [65535, 65535, 65535],
        }
    }

    /// Blocks a full 3-D grid can hold.
    pub fn max_grid_blocks(&self) -> usize {
        self.max_grid_dims.iter().fold(1usize, |acc, &d| acc.saturating_mul(d))
    }

    /// Largest power-of-two lane count `l <= warp_size` such that an `l x l`
    /// thread tile fits in one block.
    pub fn square_tile_lanes(&self) -> usize {
        let mut lanes = 1;
        while lanes * 2 <= self.warp_size && (lanes * 2) * (lanes * 2) <= self.max_threads_per_block {
            lanes *= 2;
        }
        lanes
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self::cuda()
    }
}
