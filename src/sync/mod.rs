//! Round synchronization primitives shared by the party tasks.

mod barrier;
mod cancel;

pub use barrier::RoundBarrier;
pub use cancel::CancellationToken;
