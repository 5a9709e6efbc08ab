//! Environment pins
//!
//! Captures the facts that make two otherwise-identical runs comparable:
//! where the run happened and which processor set was registered.

use semantiva_pipeline::ProcessorRegistry;
use semantiva_trace::EnvironmentPins;

/// Pin the current process environment against `registry`.
#[must_use]
pub fn environment_pins(registry: &ProcessorRegistry) -> EnvironmentPins {
    EnvironmentPins {
        platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        runtime_version: env!("CARGO_PKG_VERSION").to_string(),
        registry_fingerprint: registry.fingerprint().to_string(),
    }
}
