pub mod auth_flow;
pub mod reconciler;

pub use auth_flow::{AllowList, AuthStatus, CalendarAuthFlow, CallbackOutcome};
pub use reconciler::{AppointmentReconciler, CancelOutcome, CreatedAppointment};
