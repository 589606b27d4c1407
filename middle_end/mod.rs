pub mod ir;
pub mod cfg;
pub mod dataflow;
pub mod dominators;
pub mod analysis;
pub mod ssa;
pub mod optimization;
pub mod vectorization;
pub mod pipeline;
