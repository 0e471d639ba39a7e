pub mod access;
pub mod amenities;
pub mod inquiries;
pub mod properties;
pub mod reservations;

pub use access::{AccessGrant, AccessLogFilter, AccessManager, ClientInfo, NewAccessCodeInput};
pub use amenities::AmenityManager;
pub use inquiries::{InquiryManager, NewInquiryInput};
pub use properties::{NewImageInput, NewPropertyInput, PropertyChanges, PropertyManager};
pub use reservations::{NewReservationInput, ReservationFilter, ReservationManager};
