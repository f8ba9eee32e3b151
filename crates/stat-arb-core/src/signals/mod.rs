pub mod hedge_ratio;
pub mod spread;
pub mod state_machine;
