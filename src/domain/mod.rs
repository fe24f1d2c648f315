// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits describing the captioning problem.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only structs, enums, traits and pure functions
//
// Everything here is unit-testable without a device.

// Typed errors of the captioning core
pub mod error;

// Word <-> index mapping with reserved tokens
pub mod vocabulary;

// An image's feature grid plus its reference captions
pub mod caption;

// Abstractions the data layer implements
pub mod traits;
