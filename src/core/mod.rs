pub mod momentum;
pub mod risk_gate;
pub mod stake;
