mod filter;
mod strike_runner;

pub use filter::OpportunityFilter;
pub use strike_runner::StrikeRunner;
