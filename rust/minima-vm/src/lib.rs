//! Minima virtual machine.
//!
//! Executes the three-address-code programs produced by
//! `minima-compiler`: a call-stack execution model with suspendable
//! input, dynamic re-validation of runtime types, and the language's
//! numeric-domain constraints.

pub mod values;
pub mod vm;
