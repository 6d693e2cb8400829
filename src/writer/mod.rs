//! Archive creation
//!
//! [`Creator`] collects items, metadata and redirects, hands content to the
//! cluster workers as it arrives, and lays out the directory when closed.

mod clusters;
mod creator;
mod finalize;

pub use clusters::BlobRef;
pub use creator::{Creator, CreatorState};
