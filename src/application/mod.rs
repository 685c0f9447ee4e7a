// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Workflow coordination only. Each use case wires the data,
// ml and infra layers together for one CLI command; none of
// them does tensor math or parses arguments.

// Enumerate, split, build pipelines, fit
pub mod train_use_case;

// Score the best checkpoint on the held-out test partition
pub mod evaluate_use_case;
