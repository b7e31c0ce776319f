//! Backend selection. CPU NdArray by default; compile with `--features wgpu`
//! to train on a GPU through wgpu. All parallelism below the host loop
//! (kernels, autodiff) belongs to the backend.

use burn::backend::Autodiff;

#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray<f32>;

#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu<f32, i32>;

pub type TrainBackend = Autodiff<InferBackend>;

pub type Device = <InferBackend as burn::tensor::backend::Backend>::Device;

/// The device every tensor in the run is placed on. This is the only explicit
/// resource decision the driver makes.
pub fn default_device() -> Device {
    Device::default()
}
