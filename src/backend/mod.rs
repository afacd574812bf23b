pub mod mock;
pub mod poll;

pub use mock::MockReadiness;
pub use poll::PollReadiness;
