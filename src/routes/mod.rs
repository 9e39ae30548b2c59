/// Router Module Index
///
/// Routes are grouped by who may reach them. Access control is attached per group in
/// `create_router`, so a handler can't end up in the wrong group by accident.

/// Pages anyone can open. Visibility of hidden posts is decided in the handlers.
pub mod public;

/// Login-only pages. Wrapped in the authentication layer.
pub mod authenticated;

/// Staff pages. Wrapped in the authentication layer; the staff check runs in each handler.
pub mod admin;
