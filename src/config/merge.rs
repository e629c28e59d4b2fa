//! Merge rules between configuration layers.

pub mod merge_policy;
