pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use services::availability::AvailabilityService;
pub use services::conflict::ConflictIndex;
pub use services::slots::SlotService;
pub use services::timezone::TimezoneNormalizer;
