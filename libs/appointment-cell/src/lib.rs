pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use services::booking::BookingService;
pub use services::lifecycle::AppointmentLifecycleService;
pub use services::range::DateRangeResolver;
pub use services::search::SchedulingOrchestrator;
