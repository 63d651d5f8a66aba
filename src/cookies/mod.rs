//! Cookie handling: the store, file persistence and the request/response bridge.

pub mod bridge;
pub mod netscape;
pub mod store;

pub use bridge::{
    RequestView, ResponseView, extract_cookies, guess_cookie_domain, process_cookie_options,
};
pub use netscape::{CookieFile, CookieLine, read_cookie_file, write_cookie_file};
pub use store::{Cookie, CookieStore, LoadSummary};
