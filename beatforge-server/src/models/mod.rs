pub mod arrange;

pub use arrange::{ArrangeRequest, ArrangeResponse, HealthResponse};
