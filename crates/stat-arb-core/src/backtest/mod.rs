pub mod performance;
pub mod pipeline;
pub mod trades;
