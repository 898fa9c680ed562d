//! Harvester and converter model backends.

/// Native floating-point converter backend.
pub mod accelerated;
pub mod converter;
pub mod harvester;
pub mod numeric;
/// Cross-backend consistency checking.
pub mod verify;

// Re-export the main types for convenience
pub use accelerated::AcceleratedConverter;
pub use converter::ConverterModel;
pub use converter::ReferenceConverter;
pub use harvester::Harvester;
pub use harvester::OperatingPoint;
