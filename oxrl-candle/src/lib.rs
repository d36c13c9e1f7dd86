pub mod optimizer;
pub mod policy;
pub mod rollout_memory;
pub mod sequential;
pub mod value;
