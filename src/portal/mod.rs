//! Access to the academic portal.
//!
//! [`PortalFetcher`] is the seam between the records service and the
//! network: the service only ever sees raw records, and tests substitute an
//! in-memory fetcher. [`HttpPortalClient`] talks to the real portal using an
//! already-authenticated session cookie.

mod http;
mod traits;

pub use http::HttpPortalClient;
pub use traits::{PortalFetcher, RawClassroomReport, RawGradeReport, RawRecord};
