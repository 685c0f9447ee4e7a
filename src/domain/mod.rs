// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain structs, enums and traits describing the dataset:
// image/mask pairs, the three partitions, and the source
// abstraction the enumerator implements.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain Rust data and traits

/// Typed errors for enumeration, pairing, splitting and decoding
pub mod error;

/// An image/mask pair and the train/validation/test partitions
pub mod sample;

/// Core abstractions (traits) that other layers implement
pub mod traits;
