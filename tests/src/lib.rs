//! # Vehicle Gateway Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/
//! │   ├── telemetry_flow.rs   # fan-out, bursts, request/reply over a loopback link
//! │   ├── transfer_flow.rs    # listing, index matching, downloads, clock
//! │   └── gateway_flow.rs     # the assembled runtime and its commands
//! └── benches/
//!     └── bridge_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p gw-tests
//! cargo test -p gw-tests integration::transfer_flow
//! cargo bench -p gw-tests
//! ```

pub mod integration;
