use tch::Device;
use tracing::debug;

/// The device on which reproducible noise is sampled.
pub const REFERENCE_DEVICE: Device = Device::Cpu;

/// Picks the device to use for each pipeline component, components listed
/// in `cpu` (or all of them when `all` is listed) run on the CPU.
pub struct DeviceSetup {
    accelerator_device: Device,
    cpu: Vec<String>,
}

impl DeviceSetup {
    pub fn new(cpu: Vec<String>) -> Self {
        let accelerator_device =
            if tch::utils::has_mps() { Device::Mps } else { Device::cuda_if_available() };
        Self { accelerator_device, cpu }
    }

    pub fn get(&self, name: &str) -> Device {
        if self.cpu.iter().any(|c| c == "all" || c == name) {
            Device::Cpu
        } else {
            self.accelerator_device
        }
    }
}

/// Whether two devices belong to the same family, e.g. two CUDA devices
/// with different ordinals.
pub(crate) fn same_device_kind(lhs: Device, rhs: Device) -> bool {
    std::mem::discriminant(&lhs) == std::mem::discriminant(&rhs)
}

/// Makes libtorch operations as deterministic as possible: seeds the global
/// CPU and CUDA generators, disables cuDNN benchmarking and pins the cuBLAS
/// workspace configuration. This only affects code relying on the global
/// random state, explicit generators are unaffected.
///
/// Call this before any CUDA work in the process: cuBLAS reads
/// `CUBLAS_WORKSPACE_CONFIG` once, when its handle gets created, so setting
/// it after the first CUDA operation has no effect.
pub fn enable_full_determinism(seed: i64) {
    std::env::set_var("CUBLAS_WORKSPACE_CONFIG", ":16:8");
    tch::manual_seed(seed);
    tch::Cuda::manual_seed_all(seed as u64);
    tch::Cuda::cudnn_set_benchmark(false);
    debug!(seed, "enabled full determinism");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_kinds() {
        assert!(same_device_kind(Device::Cuda(0), Device::Cuda(1)));
        assert!(same_device_kind(Device::Cpu, REFERENCE_DEVICE));
        assert!(!same_device_kind(Device::Cpu, Device::Cuda(0)));
        assert!(!same_device_kind(Device::Mps, Device::Cuda(0)));
    }

    #[test]
    fn device_setup_forces_cpu() {
        let setup = DeviceSetup::new(vec!["unet".to_string()]);
        assert_eq!(setup.get("unet"), Device::Cpu);
        let setup = DeviceSetup::new(vec!["all".to_string()]);
        assert_eq!(setup.get("vae"), Device::Cpu);
    }
}
