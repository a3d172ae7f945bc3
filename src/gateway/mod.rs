pub mod redirect;
pub mod server;

pub use redirect::{build_redirect_location, redirect_handler, request_scheme, RedirectState};
pub use server::{admin_app, discovery_app, AdminState, DiscoveryServer};
