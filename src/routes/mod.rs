/// Router Module Index
///
/// One route table per access class. The class a table belongs to must agree with
/// `policy::access_for`, which decides authorization from the request path.

/// Routes reachable without a token.
pub mod public;

/// Routes requiring any valid token; note routes are additionally owner-checked.
pub mod authenticated;

/// Routes restricted to the `admin` role.
pub mod admin;
