//! Compute backend the segmentation batches are stacked on.
//!
//! `cuda` and `wgpu` move batches to the GPU. Without either feature they
//! stay on the CPU through `ndarray`.

use amseg_train::SegmentationBatcher;
use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        use burn::backend::cuda::{Cuda, CudaDevice};

        pub type SelectedBackend = Cuda;
        pub type SelectedDevice = CudaDevice;
        const BACKEND_NAME: &str = "CUDA (NVIDIA GPU)";
    } else if #[cfg(feature = "wgpu")] {
        use burn::backend::wgpu::{Wgpu, WgpuDevice};

        pub type SelectedBackend = Wgpu;
        pub type SelectedDevice = WgpuDevice;
        const BACKEND_NAME: &str = "WGPU (GPU)";
    } else {
        use burn::backend::ndarray::{NdArray, NdArrayDevice};

        pub type SelectedBackend = NdArray;
        pub type SelectedDevice = NdArrayDevice;
        const BACKEND_NAME: &str = "NdArray (CPU)";
    }
}

/// Default device of the selected backend.
pub fn create_device() -> SelectedDevice {
    SelectedDevice::default()
}

/// Backend name for the `info` and `inspect` output.
pub const fn get_backend_name() -> &'static str {
    BACKEND_NAME
}

/// Batcher stacking [`amseg_train::SegmentationItem`]s on the selected backend.
pub const fn batcher() -> SegmentationBatcher<SelectedBackend> {
    SegmentationBatcher::new()
}
