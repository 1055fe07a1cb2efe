//! # Gateway - Node HTTP Surface
//!
//! Routes:
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /sync/events` | Signed event ingress |
//! | `POST /sync/range` | Block range download |
//! | `GET /sync/snapshot` | State snapshot for fast-sync |
//! | `GET /sync/headers` | Header range for light sync |
//! | `GET /block` | Single block by height or hash |
//! | `POST /sync/fork_check` | Hash at a height |
//! | `GET /health` | Quick health |
//! | `GET /status` | Full status with peer snapshot |
//! | `POST /node/status-update` | Peer status notifications |

pub mod errors;
pub mod router;
pub mod routes;
pub mod state;

pub use errors::ApiError;
pub use router::build_router;
pub use state::{AppState, QuickStatus, StatusSource};
