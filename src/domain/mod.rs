pub mod error;
pub mod fee_decay;
pub mod fixed_point;
pub mod normalize;
pub mod position;
pub mod types;
