/// Grade portal scraping module
mod client;
pub mod config;
mod cookies;
mod error;
pub mod form;
pub mod grades;
pub mod report_card;
pub mod session;
mod table;
pub mod transport;
mod types;

pub use client::PortalClient;
pub use config::{LoginForm, PortalConfig, PortalPaths};
pub use cookies::CookieJar;
pub use error::PortalError;
pub use session::{
    MemorySessionStore, Session, SessionId, SessionManager, SessionState, SessionStore,
};
pub use transport::{PortalRequest, PortalTransport};
pub use types::*;
