/// Useful enumerations for categorizing events.
pub mod enums;
/// Closed forms of the special functions used by the angular basis.
pub mod functions;
