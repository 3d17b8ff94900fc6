// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # compute-vm
//!
//! A declarative resolver for cloud compute instances and instance templates.
//!
//! ## Overview
//!
//! compute-vm maps one YAML configuration to the complete set of resources an
//! infrastructure engine has to materialize:
//!
//! - Exactly one top-level resource: an instance or an instance template
//! - Attached disks, created from images, snapshots or nothing, or referenced
//! - Static address reservations for network interfaces
//! - An optional service account, instance group, firewall rules and bindings
//!
//! ## Architecture
//!
//! Resolution is a pure function. The same configuration always yields the
//! same [`DecisionSet`], and an invalid configuration yields one error and
//! nothing else:
//!
//! 1. **Load**: `compute-vm.yaml`, `.env` and `COMPUTE_VM_*` overrides
//! 2. **Validate**: field formats and bounds
//! 3. **Resolve**: shape, encryption, features, disks, addresses, interfaces
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation and fingerprints
//! - [`resolver`]: The decision function and its output types
//! - [`cli`]: Command-line interface
//! - [`error`]: Error types
//!
//! ## Example
//!
//! ```yaml
//! project_id: my-project
//! zone: europe-west1-b
//! name: web
//! attached_disks:
//!   - name: data
//!     size: 100
//!     options:
//!       replica_zone: europe-west1-c
//! network_interfaces:
//!   - network: default
//!     subnetwork: default
//!     nat: true
//! firewall_rules: {}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod resolver;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, InstanceConfig};
pub use error::{ConfigError, ResolveError, Result, VmError};
pub use resolver::{DecisionSet, ModuleOutputs, resolve};
