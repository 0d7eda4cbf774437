pub mod booking;
pub mod event;
pub mod seat;
pub mod waitlist;

pub use booking::{Booking, BookingDetails, BookingStatus, Ticket};
pub use event::{Event, NewEvent};
pub use seat::{Seat, SeatStatus};
pub use waitlist::WaitlistEntry;
