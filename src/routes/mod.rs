/// Router Module Index
///
/// Routes are grouped by who may reach them. Access control is attached at
/// the module level (layers in `create_router`) or, where it depends on the
/// submission, inside the handler.

/// Routes open to everyone. Posting a comment additionally needs a session,
/// checked by the handler.
pub mod public;

/// The authentication module, nested under `/auth`.
pub mod account;

/// Routes restricted to members of the `admin` group.
pub mod admin;
