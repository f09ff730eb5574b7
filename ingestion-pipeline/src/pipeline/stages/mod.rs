mod chunk;
mod embed;
mod enrich;
mod finalize;
mod index;
mod parse;

pub use chunk::chunk;
pub use embed::embed;
pub use enrich::enrich;
pub use finalize::finalize;
pub use index::index;
pub use parse::parse;

use state_machines::core::GuardError;

use common::error::AppError;

/// Every stage's transition call ends in the same `.map_err` shape; centralized
/// so a failed guard always produces the same diagnostic regardless of which
/// event rejected it.
fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}
