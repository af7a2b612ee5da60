pub mod aggregator;
pub mod cancellation;
pub mod clock;
pub mod instances;
pub mod providers;
pub mod scheduler;

pub use aggregator::Aggregator;
pub use cancellation::{CancelSummary, Registry};
pub use clock::{Clock, FixedClock, SystemClock};
pub use instances::InstanceRegistry;
pub use providers::{JustWatchClient, ReleaseSource};
pub use scheduler::{PollContext, PollTask};
