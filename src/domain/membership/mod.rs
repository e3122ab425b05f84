pub mod bitmap;
pub mod driver;
pub mod negotiation;
pub mod version_retry;

pub use bitmap::MemberBitmap;
pub use negotiation::{MembershipProposal, MembershipVerdict, Negotiator};
pub use version_retry::{RetryPolicy, RetryState, VersionRetry};
