//! Adapters implementing the outbound ports.

pub mod simulated;

pub use simulated::SimulatedVehicle;
