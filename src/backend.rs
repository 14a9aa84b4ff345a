//! Backend selection
//!
//! NdArray (CPU) by default; the `cuda` feature switches training and
//! inference to the CUDA backend.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn_ndarray::NdArray;

/// Backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

pub fn default_device() -> <TrainingBackend as Backend>::Device {
    Default::default()
}

pub fn backend_name() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA (GPU)"
    } else {
        "NdArray (CPU)"
    }
}
